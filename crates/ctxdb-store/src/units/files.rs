//! File change log.

use async_trait::async_trait;

use ctxdb_schema::schema::{ColumnSchema, ForeignKeyAction, IndexSchema, SqlType, TableSchema};

use crate::adapter::ConnectionAdapter;
use crate::ddl::{ObjectKind, SafeDdl};
use crate::error::Result;
use crate::runner::Migration;

const FILE_TS_INDEX: &str = "idx_file_changes_file_ts";

/// Creates `t_file_changes` and its file/time index.
pub struct CreateFileChanges;

#[async_trait]
impl Migration for CreateFileChanges {
    fn version(&self) -> i64 {
        20_250_105_000_000
    }

    fn name(&self) -> &str {
        "create_file_changes"
    }

    async fn up(&self, adapter: &dyn ConnectionAdapter) -> Result<()> {
        let table = TableSchema::new("t_file_changes")
            .column(ColumnSchema::id("id"))
            .column(
                ColumnSchema::new("file_id", SqlType::BigInt)
                    .not_null()
                    .references("m_files", "id", ForeignKeyAction::Cascade),
            )
            .column(ColumnSchema::new("agent_id", SqlType::BigInt).references(
                "m_agents",
                "id",
                ForeignKeyAction::SetNull,
            ))
            .column(ColumnSchema::new("change_type", SqlType::Varchar(20)).not_null())
            .column(ColumnSchema::new("description", SqlType::Text))
            .column(ColumnSchema::new("ts", SqlType::BigInt).not_null());

        let ddl = SafeDdl::new(adapter);
        ddl.create_table_if_absent(&table).await?;
        ddl.create_index_if_absent(&IndexSchema::new(
            FILE_TS_INDEX,
            "t_file_changes",
            ["file_id", "ts"],
        ))
        .await?;
        Ok(())
    }

    async fn down(&self, adapter: &dyn ConnectionAdapter) -> Result<()> {
        let ddl = SafeDdl::new(adapter);
        ddl.drop_if_exists(
            ObjectKind::Index {
                table: "t_file_changes",
            },
            FILE_TS_INDEX,
        )
        .await?;
        ddl.drop_if_exists(ObjectKind::Table, "t_file_changes")
            .await?;
        Ok(())
    }
}
