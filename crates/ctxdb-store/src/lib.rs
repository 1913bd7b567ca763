//! Idempotent, engine-aware schema migrations for the context database.
//!
//! `ctxdb-store` owns the storage session of the context server and keeps its
//! schema current on SQLite, PostgreSQL and MySQL:
//!
//! - **Adapter** - one async session contract per engine, with catalog checks
//! - **Factory** - builds the adapter for a configuration and holds the
//!   process-wide handle
//! - **Safe DDL** - guarded create/add/drop helpers, including the SQLite
//!   table rebuild
//! - **Ledger** - the `_ctxdb_migrations` record of applied units
//! - **Runner** - applies and rolls back versioned units in order
//! - **Units** - the built-in context-server schema
//!
//! # Example
//!
//! ```rust,no_run
//! use ctxdb_store::prelude::*;
//!
//! # async fn run() -> ctxdb_store::error::Result<()> {
//! let adapter = initialize_database(&DatabaseConfig::sqlite("context.db")).await?;
//! assert!(adapter.has_table("t_decisions").await?);
//!
//! let count = transaction(|db| {
//!     Box::pin(async move {
//!         db.execute("INSERT INTO m_tags (name) VALUES (?)", &["auth".into()])
//!             .await
//!     })
//! })
//! .await?;
//! assert_eq!(count, 1);
//!
//! close_database().await?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod config;
pub mod ddl;
pub mod error;
pub mod factory;
pub mod ledger;
pub mod runner;
pub mod units;

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{info, warn};

use crate::adapter::{with_transaction, ConnectionAdapter};
use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::factory::AdapterFactory;
use crate::runner::{Migration, MigrationRunner};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::adapter::{
        with_transaction, ConnectionAdapter, MysqlAdapter, PostgresAdapter, Row, SqliteAdapter,
        TableSnapshot,
    };
    pub use crate::config::{DatabaseConfig, Durability};
    pub use crate::ddl::{ObjectKind, SafeDdl};
    pub use crate::error::{Direction, Result, StoreError};
    pub use crate::factory::AdapterFactory;
    pub use crate::ledger::{AppliedMigration, Ledger};
    pub use crate::runner::{
        Migration, MigrationReport, MigrationRunner, MigrationStatus, UnitState,
    };
    pub use crate::units::builtin_migrations;
    pub use crate::{close_database, get_adapter, initialize_database, transaction};
    pub use ctxdb_schema::prelude::*;
}

/// Opens the database, installs it as the process-wide adapter and migrates
/// it to the latest built-in schema.
///
/// Every caller that later uses [`get_adapter`] observes the migrated schema.
/// If migrating fails the handle is released again and the error returned.
pub async fn initialize_database(config: &DatabaseConfig) -> Result<Arc<dyn ConnectionAdapter>> {
    initialize_database_with(config, units::builtin_migrations()).await
}

/// Like [`initialize_database`], but migrates with `units` instead of the
/// built-in set.
pub async fn initialize_database_with(
    config: &DatabaseConfig,
    units: Vec<Box<dyn Migration>>,
) -> Result<Arc<dyn ConnectionAdapter>> {
    let adapter = AdapterFactory::create(config).await?;
    let runner = MigrationRunner::new(adapter.clone(), units)?;

    if let Some(previous) = AdapterFactory::set_instance(adapter.clone()) {
        warn!(engine = %previous.engine(), "replacing an initialized database; closing the old one");
        previous.close().await?;
    }

    match runner.migrate_to_latest().await {
        Ok(report) => {
            info!(
                engine = %adapter.engine(),
                applied = report.units.len(),
                "database ready"
            );
            Ok(adapter)
        }
        Err(err) => {
            if let Err(reset_err) = AdapterFactory::reset().await {
                warn!(error = %reset_err, "releasing the database after a failed migration");
            }
            Err(err)
        }
    }
}

/// Returns the process-wide adapter.
///
/// Fails with [`StoreError::NotInitialized`](error::StoreError::NotInitialized)
/// before [`initialize_database`] has succeeded.
pub fn get_adapter() -> Result<Arc<dyn ConnectionAdapter>> {
    AdapterFactory::get_instance()
}

/// Releases the process-wide adapter. Safe to call any number of times.
pub async fn close_database() -> Result<()> {
    AdapterFactory::reset().await
}

/// Runs `body` in a transaction on the process-wide adapter.
///
/// See [`with_transaction`] for commit and rollback behavior.
pub async fn transaction<T, F>(body: F) -> Result<T>
where
    F: for<'a> FnOnce(&'a dyn ConnectionAdapter) -> BoxFuture<'a, Result<T>>,
{
    let adapter = get_adapter()?;
    with_transaction(adapter.as_ref(), body).await
}
