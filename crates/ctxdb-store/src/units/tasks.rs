//! Task board.

use async_trait::async_trait;

use ctxdb_schema::schema::{
    ColumnSchema, DefaultValue, ForeignKeyAction, IndexSchema, SqlType, TableSchema,
};

use super::{drop_tables, lookup_table, seed_names};
use crate::adapter::ConnectionAdapter;
use crate::ddl::{ObjectKind, SafeDdl};
use crate::error::Result;
use crate::runner::Migration;

/// Task statuses, in board order.
pub const TASK_STATUSES: [&str; 6] = [
    "todo",
    "in_progress",
    "waiting_review",
    "blocked",
    "done",
    "archived",
];

const STATUS_PRIORITY_INDEX: &str = "idx_tasks_status_priority";

fn tasks() -> TableSchema {
    TableSchema::new("t_tasks")
        .column(ColumnSchema::id("id"))
        .column(ColumnSchema::new("title", SqlType::Varchar(200)).not_null())
        .column(ColumnSchema::new("description", SqlType::Text))
        .column(
            ColumnSchema::new("status_id", SqlType::BigInt)
                .not_null()
                .references("m_task_statuses", "id", ForeignKeyAction::Restrict),
        )
        .column(
            ColumnSchema::new("priority", SqlType::Integer)
                .not_null()
                .default(DefaultValue::Integer(2)),
        )
        .column(
            ColumnSchema::new("assigned_agent_id", SqlType::BigInt).references(
                "m_agents",
                "id",
                ForeignKeyAction::SetNull,
            ),
        )
        .column(ColumnSchema::new("layer_id", SqlType::BigInt).references(
            "m_layers",
            "id",
            ForeignKeyAction::SetNull,
        ))
        .column(ColumnSchema::new("created_ts", SqlType::BigInt).not_null())
        .column(ColumnSchema::new("updated_ts", SqlType::BigInt).not_null())
}

/// Creates and seeds `m_task_statuses`, then creates `t_tasks`.
pub struct CreateTasks;

#[async_trait]
impl Migration for CreateTasks {
    fn version(&self) -> i64 {
        20_250_103_000_000
    }

    fn name(&self) -> &str {
        "create_tasks"
    }

    async fn up(&self, adapter: &dyn ConnectionAdapter) -> Result<()> {
        let ddl = SafeDdl::new(adapter);
        ddl.create_table_if_absent(&lookup_table("m_task_statuses", 50))
            .await?;
        seed_names(&ddl, "m_task_statuses", &TASK_STATUSES).await?;
        ddl.create_table_if_absent(&tasks()).await?;
        ddl.create_index_if_absent(&IndexSchema::new(
            STATUS_PRIORITY_INDEX,
            "t_tasks",
            ["status_id", "priority"],
        ))
        .await?;
        Ok(())
    }

    async fn down(&self, adapter: &dyn ConnectionAdapter) -> Result<()> {
        let ddl = SafeDdl::new(adapter);
        ddl.drop_if_exists(ObjectKind::Index { table: "t_tasks" }, STATUS_PRIORITY_INDEX)
            .await?;
        drop_tables(&ddl, &["t_tasks", "m_task_statuses"]).await
    }
}
