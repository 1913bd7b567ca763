//! Decisions and their tags.

use async_trait::async_trait;

use ctxdb_schema::schema::{
    ColumnSchema, DefaultValue, ForeignKeyAction, IndexSchema, SqlType, TableSchema,
};

use super::drop_tables;
use crate::adapter::ConnectionAdapter;
use crate::ddl::{ObjectKind, SafeDdl};
use crate::error::Result;
use crate::runner::Migration;

/// Creates `t_decisions`, its layer/time index, and `t_decision_tags`.
pub struct CreateDecisions;

fn decisions() -> TableSchema {
    TableSchema::new("t_decisions")
        .column(ColumnSchema::id("id"))
        .column(
            ColumnSchema::new("key_name", SqlType::Varchar(200))
                .not_null()
                .unique(),
        )
        .column(ColumnSchema::new("value", SqlType::Text).not_null())
        .column(ColumnSchema::new("agent_id", SqlType::BigInt).references(
            "m_agents",
            "id",
            ForeignKeyAction::SetNull,
        ))
        .column(ColumnSchema::new("layer_id", SqlType::BigInt).references(
            "m_layers",
            "id",
            ForeignKeyAction::SetNull,
        ))
        .column(
            ColumnSchema::new("status", SqlType::Varchar(20))
                .not_null()
                .default(DefaultValue::String("active".into())),
        )
        .column(ColumnSchema::new("ts", SqlType::BigInt).not_null())
}

fn decision_tags() -> TableSchema {
    TableSchema::new("t_decision_tags")
        .column(
            ColumnSchema::new("decision_id", SqlType::BigInt)
                .not_null()
                .references("t_decisions", "id", ForeignKeyAction::Cascade),
        )
        .column(
            ColumnSchema::new("tag_id", SqlType::BigInt)
                .not_null()
                .references("m_tags", "id", ForeignKeyAction::Cascade),
        )
        .primary_key(["decision_id", "tag_id"])
}

const LAYER_TS_INDEX: &str = "idx_decisions_layer_ts";

#[async_trait]
impl Migration for CreateDecisions {
    fn version(&self) -> i64 {
        20_250_102_000_000
    }

    fn name(&self) -> &str {
        "create_decisions"
    }

    async fn up(&self, adapter: &dyn ConnectionAdapter) -> Result<()> {
        let ddl = SafeDdl::new(adapter);
        ddl.create_table_if_absent(&decisions()).await?;
        ddl.create_index_if_absent(&IndexSchema::new(
            LAYER_TS_INDEX,
            "t_decisions",
            ["layer_id", "ts"],
        ))
        .await?;
        ddl.create_table_if_absent(&decision_tags()).await?;
        Ok(())
    }

    async fn down(&self, adapter: &dyn ConnectionAdapter) -> Result<()> {
        let ddl = SafeDdl::new(adapter);
        ddl.drop_if_exists(ObjectKind::Table, "t_decision_tags")
            .await?;
        ddl.drop_if_exists(
            ObjectKind::Index {
                table: "t_decisions",
            },
            LAYER_TS_INDEX,
        )
        .await?;
        drop_tables(&ddl, &["t_decisions"]).await
    }
}

/// Adds `t_decisions.created_at`, defaulting to the insert time.
///
/// The expression default cannot be added in place on SQLite, so there this
/// unit rebuilds `t_decisions`.
pub struct AddDecisionCreatedAt;

#[async_trait]
impl Migration for AddDecisionCreatedAt {
    fn version(&self) -> i64 {
        20_250_107_000_000
    }

    fn name(&self) -> &str {
        "add_decision_created_at"
    }

    async fn up(&self, adapter: &dyn ConnectionAdapter) -> Result<()> {
        let column = ColumnSchema::new("created_at", SqlType::Timestamp)
            .default(DefaultValue::Expression("CURRENT_TIMESTAMP".into()));
        SafeDdl::new(adapter)
            .add_column_if_absent("t_decisions", &column)
            .await?;
        Ok(())
    }

    async fn down(&self, adapter: &dyn ConnectionAdapter) -> Result<()> {
        SafeDdl::new(adapter)
            .drop_column_if_present("t_decisions", "created_at")
            .await?;
        Ok(())
    }
}
