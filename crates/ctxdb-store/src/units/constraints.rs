//! Project constraints.

use async_trait::async_trait;

use ctxdb_schema::schema::{ColumnSchema, DefaultValue, ForeignKeyAction, SqlType, TableSchema};

use super::{drop_tables, lookup_table, seed_names};
use crate::adapter::ConnectionAdapter;
use crate::ddl::SafeDdl;
use crate::error::Result;
use crate::runner::Migration;

/// Constraint categories every installation starts with.
pub const CONSTRAINT_CATEGORIES: [&str; 4] =
    ["architecture", "security", "performance", "code-style"];

fn constraints() -> TableSchema {
    TableSchema::new("t_constraints")
        .column(ColumnSchema::id("id"))
        .column(
            ColumnSchema::new("category_id", SqlType::BigInt)
                .not_null()
                .references("m_constraint_categories", "id", ForeignKeyAction::Restrict),
        )
        .column(ColumnSchema::new("constraint_text", SqlType::Text).not_null())
        .column(
            ColumnSchema::new("priority", SqlType::Integer)
                .not_null()
                .default(DefaultValue::Integer(2)),
        )
        .column(ColumnSchema::new("layer_id", SqlType::BigInt).references(
            "m_layers",
            "id",
            ForeignKeyAction::SetNull,
        ))
        .column(ColumnSchema::new("agent_id", SqlType::BigInt).references(
            "m_agents",
            "id",
            ForeignKeyAction::SetNull,
        ))
        .column(
            ColumnSchema::new("active", SqlType::Boolean)
                .not_null()
                .default(DefaultValue::Bool(true)),
        )
        .column(ColumnSchema::new("ts", SqlType::BigInt).not_null())
}

/// Creates and seeds `m_constraint_categories`, then creates `t_constraints`.
pub struct CreateConstraints;

#[async_trait]
impl Migration for CreateConstraints {
    fn version(&self) -> i64 {
        20_250_104_000_000
    }

    fn name(&self) -> &str {
        "create_constraints"
    }

    async fn up(&self, adapter: &dyn ConnectionAdapter) -> Result<()> {
        let ddl = SafeDdl::new(adapter);
        ddl.create_table_if_absent(&lookup_table("m_constraint_categories", 100))
            .await?;
        seed_names(&ddl, "m_constraint_categories", &CONSTRAINT_CATEGORIES).await?;
        ddl.create_table_if_absent(&constraints()).await?;
        Ok(())
    }

    async fn down(&self, adapter: &dyn ConnectionAdapter) -> Result<()> {
        drop_tables(
            &SafeDdl::new(adapter),
            &["t_constraints", "m_constraint_categories"],
        )
        .await
    }
}
