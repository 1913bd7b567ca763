//! Master tables and layer seed data.

use async_trait::async_trait;

use ctxdb_schema::schema::{ColumnSchema, DefaultValue, SqlType, TableSchema};

use super::{drop_tables, lookup_table, seed_names, unseed_names};
use crate::adapter::ConnectionAdapter;
use crate::ddl::SafeDdl;
use crate::error::Result;
use crate::runner::Migration;

/// Architecture layers every installation starts with.
pub const LAYERS: [&str; 5] = [
    "presentation",
    "business",
    "data",
    "infrastructure",
    "cross-cutting",
];

/// Creates `m_agents`, `m_layers`, `m_files` and `m_tags`.
pub struct CreateMasterTables;

#[async_trait]
impl Migration for CreateMasterTables {
    fn version(&self) -> i64 {
        20_250_101_000_000
    }

    fn name(&self) -> &str {
        "create_master_tables"
    }

    async fn up(&self, adapter: &dyn ConnectionAdapter) -> Result<()> {
        let ddl = SafeDdl::new(adapter);
        ddl.create_table_if_absent(
            &lookup_table("m_agents", 200).column(
                ColumnSchema::new("last_active_ts", SqlType::BigInt)
                    .not_null()
                    .default(DefaultValue::Integer(0)),
            ),
        )
        .await?;
        ddl.create_table_if_absent(&lookup_table("m_layers", 100))
            .await?;
        ddl.create_table_if_absent(
            &TableSchema::new("m_files")
                .column(ColumnSchema::id("id"))
                .column(
                    ColumnSchema::new("path", SqlType::Varchar(500))
                        .not_null()
                        .unique(),
                ),
        )
        .await?;
        ddl.create_table_if_absent(&lookup_table("m_tags", 100))
            .await?;
        Ok(())
    }

    async fn down(&self, adapter: &dyn ConnectionAdapter) -> Result<()> {
        drop_tables(
            &SafeDdl::new(adapter),
            &["m_tags", "m_files", "m_layers", "m_agents"],
        )
        .await
    }
}

/// Seeds the standard layers, keyed by name.
pub struct SeedLayers;

#[async_trait]
impl Migration for SeedLayers {
    fn version(&self) -> i64 {
        20_250_101_000_100
    }

    fn name(&self) -> &str {
        "seed_layers"
    }

    async fn up(&self, adapter: &dyn ConnectionAdapter) -> Result<()> {
        seed_names(&SafeDdl::new(adapter), "m_layers", &LAYERS).await
    }

    async fn down(&self, adapter: &dyn ConnectionAdapter) -> Result<()> {
        unseed_names(&SafeDdl::new(adapter), "m_layers", &LAYERS).await
    }
}
