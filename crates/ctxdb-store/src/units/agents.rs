//! Agent pooling flags: introduced, then retired.

use async_trait::async_trait;

use ctxdb_schema::schema::{ColumnSchema, DefaultValue, SqlType};

use crate::adapter::ConnectionAdapter;
use crate::ddl::SafeDdl;
use crate::error::Result;
use crate::runner::Migration;

const POOLING_FLAGS: [&str; 2] = ["is_reusable", "in_use"];

fn flag(name: &str) -> ColumnSchema {
    ColumnSchema::new(name, SqlType::Boolean)
        .not_null()
        .default(DefaultValue::Bool(false))
}

async fn add_flags(adapter: &dyn ConnectionAdapter) -> Result<()> {
    let ddl = SafeDdl::new(adapter);
    for name in POOLING_FLAGS {
        ddl.add_column_if_absent("m_agents", &flag(name)).await?;
    }
    Ok(())
}

async fn drop_flags(adapter: &dyn ConnectionAdapter) -> Result<()> {
    let ddl = SafeDdl::new(adapter);
    for name in POOLING_FLAGS.iter().rev() {
        ddl.drop_column_if_present("m_agents", name).await?;
    }
    Ok(())
}

/// Adds `m_agents.is_reusable` and `m_agents.in_use`.
pub struct AddAgentPoolingFlags;

#[async_trait]
impl Migration for AddAgentPoolingFlags {
    fn version(&self) -> i64 {
        20_250_106_000_000
    }

    fn name(&self) -> &str {
        "add_agent_pooling_flags"
    }

    async fn up(&self, adapter: &dyn ConnectionAdapter) -> Result<()> {
        add_flags(adapter).await
    }

    async fn down(&self, adapter: &dyn ConnectionAdapter) -> Result<()> {
        drop_flags(adapter).await
    }
}

/// Removes the pooling flags again; agents are no longer pooled.
///
/// `down` restores both columns with their original defaults, so rolling back
/// past this unit leaves the table as [`AddAgentPoolingFlags`] shaped it.
pub struct RetireAgentPoolingFlags;

#[async_trait]
impl Migration for RetireAgentPoolingFlags {
    fn version(&self) -> i64 {
        20_250_108_000_000
    }

    fn name(&self) -> &str {
        "retire_agent_pooling_flags"
    }

    async fn up(&self, adapter: &dyn ConnectionAdapter) -> Result<()> {
        drop_flags(adapter).await
    }

    async fn down(&self, adapter: &dyn ConnectionAdapter) -> Result<()> {
        add_flags(adapter).await
    }
}
