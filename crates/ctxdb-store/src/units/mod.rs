//! Built-in migration units for the context store.
//!
//! Every unit goes through [`SafeDdl`], so each one re-checks the live schema
//! and is a no-op when its target state already holds.

mod agents;
mod constraints;
mod decisions;
mod files;
mod master;
mod tasks;

pub use agents::{AddAgentPoolingFlags, RetireAgentPoolingFlags};
pub use constraints::{CreateConstraints, CONSTRAINT_CATEGORIES};
pub use decisions::{AddDecisionCreatedAt, CreateDecisions};
pub use files::CreateFileChanges;
pub use master::{CreateMasterTables, SeedLayers, LAYERS};
pub use tasks::{CreateTasks, TASK_STATUSES};

use ctxdb_schema::schema::{ColumnSchema, SqlType, TableSchema};
use ctxdb_schema::SqlValue;

use crate::ddl::{ObjectKind, SafeDdl};
use crate::error::Result;
use crate::runner::Migration;

/// All built-in units, in version order.
#[must_use]
pub fn builtin_migrations() -> Vec<Box<dyn Migration>> {
    vec![
        Box::new(CreateMasterTables),
        Box::new(SeedLayers),
        Box::new(CreateDecisions),
        Box::new(CreateTasks),
        Box::new(CreateConstraints),
        Box::new(CreateFileChanges),
        Box::new(AddAgentPoolingFlags),
        Box::new(AddDecisionCreatedAt),
        Box::new(RetireAgentPoolingFlags),
    ]
}

/// A name-keyed lookup table: `id` plus a unique `name`.
fn lookup_table(name: &str, width: usize) -> TableSchema {
    TableSchema::new(name)
        .column(ColumnSchema::id("id"))
        .column(
            ColumnSchema::new("name", SqlType::Varchar(width))
                .not_null()
                .unique(),
        )
}

async fn seed_names(ddl: &SafeDdl<'_>, table: &str, names: &[&str]) -> Result<()> {
    for name in names {
        ddl.insert_if_absent(table, "name", &[("name", SqlValue::from(*name))])
            .await?;
    }
    Ok(())
}

async fn unseed_names(ddl: &SafeDdl<'_>, table: &str, names: &[&str]) -> Result<()> {
    for name in names.iter().rev() {
        ddl.delete_if_present(table, "name", SqlValue::from(*name))
            .await?;
    }
    Ok(())
}

/// Drops `tables` in the given order, skipping any already gone.
async fn drop_tables(ddl: &SafeDdl<'_>, tables: &[&str]) -> Result<()> {
    for table in tables {
        ddl.drop_if_exists(ObjectKind::Table, table).await?;
    }
    Ok(())
}
