//! Adapter construction and the process-wide adapter handle.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;

use ctxdb_schema::EngineKind;

use crate::adapter::{ConnectionAdapter, MysqlAdapter, PostgresAdapter, SqliteAdapter};
use crate::config::DatabaseConfig;
use crate::error::{Result, StoreError};

static INSTANCE: RwLock<Option<Arc<dyn ConnectionAdapter>>> = RwLock::new(None);

/// Builds adapters and owns the process-wide handle.
///
/// The handle is constructed once (usually by
/// [`initialize_database`](crate::initialize_database)), read by everything
/// else through [`get_instance`](Self::get_instance), and released with
/// [`reset`](Self::reset) before exit or between tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdapterFactory;

impl AdapterFactory {
    /// Opens the adapter for `config.engine`.
    pub async fn create(config: &DatabaseConfig) -> Result<Arc<dyn ConnectionAdapter>> {
        let adapter: Arc<dyn ConnectionAdapter> = match config.engine {
            EngineKind::Sqlite => Arc::new(SqliteAdapter::open(config).await?),
            EngineKind::Postgres => Arc::new(PostgresAdapter::open(config).await?),
            EngineKind::Mysql => Arc::new(MysqlAdapter::open(config).await?),
        };
        Ok(adapter)
    }

    /// Opens an adapter for an engine given by name, overriding `config.engine`.
    ///
    /// Fails with [`StoreError::UnsupportedEngine`] for names outside the
    /// supported set.
    pub async fn create_from_name(
        engine: &str,
        mut config: DatabaseConfig,
    ) -> Result<Arc<dyn ConnectionAdapter>> {
        config.engine = engine.parse()?;
        Self::create(&config).await
    }

    /// Returns the installed adapter.
    pub fn get_instance() -> Result<Arc<dyn ConnectionAdapter>> {
        INSTANCE
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(StoreError::NotInitialized)
    }

    /// Returns whether an adapter is installed.
    #[must_use]
    pub fn is_initialized() -> bool {
        INSTANCE
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Installs `adapter` as the process-wide handle, returning the one it
    /// replaces. The replaced adapter is not closed.
    pub fn set_instance(adapter: Arc<dyn ConnectionAdapter>) -> Option<Arc<dyn ConnectionAdapter>> {
        info!(engine = %adapter.engine(), "installing database adapter");
        INSTANCE
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(adapter)
    }

    /// Clears the handle and closes the adapter it held. Safe to call when
    /// nothing is installed.
    pub async fn reset() -> Result<()> {
        let previous = INSTANCE
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(adapter) = previous {
            info!(engine = %adapter.engine(), "releasing database adapter");
            adapter.close().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_sqlite() {
        let adapter = AdapterFactory::create(&DatabaseConfig::sqlite_in_memory())
            .await
            .unwrap();
        assert_eq!(adapter.engine(), EngineKind::Sqlite);
        adapter.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_create_from_unknown_name() {
        let result =
            AdapterFactory::create_from_name("oracle", DatabaseConfig::sqlite_in_memory()).await;
        assert!(matches!(result, Err(StoreError::UnsupportedEngine(_))));
    }

    #[tokio::test]
    async fn test_create_from_alias() {
        let adapter =
            AdapterFactory::create_from_name("embedded", DatabaseConfig::sqlite_in_memory())
                .await
                .unwrap();
        assert_eq!(adapter.engine(), EngineKind::Sqlite);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_before_connecting() {
        let config = DatabaseConfig {
            host: None,
            ..DatabaseConfig::postgres("localhost", "ctx", "ctx")
        };
        let result = AdapterFactory::create(&config).await;
        assert!(matches!(result, Err(StoreError::Config(_))));
    }
}
