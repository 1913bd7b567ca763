//! Database configuration.
//!
//! Configuration is usually read from the `[database]` table of a TOML file:
//!
//! ```toml
//! [database]
//! engine = "postgres"
//! host = "localhost"
//! user = "ctx"
//! password = "secret"
//! database = "ctx"
//! durability = "throughput"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use ctxdb_schema::EngineKind;

use crate::error::{Result, StoreError};

/// Path value that selects a private in-memory SQLite database.
pub const MEMORY_PATH: &str = ":memory:";

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Durability/sync-mode hint applied as a session setting where the engine allows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Durability {
    /// Favor throughput (relaxed fsync / asynchronous commit).
    #[serde(alias = "fast")]
    Throughput,
    /// Favor durability (full fsync / synchronous commit).
    #[default]
    #[serde(alias = "safe")]
    Durability,
}

/// Connection parameters for one of the supported engines.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseConfig {
    /// Which engine to connect to.
    pub engine: EngineKind,
    /// Database file (SQLite only). `:memory:` selects an in-memory database.
    pub path: Option<PathBuf>,
    /// Server host (client/server engines).
    pub host: Option<String>,
    /// Server port; engine default when unset.
    pub port: Option<u16>,
    /// User name (client/server engines).
    pub user: Option<String>,
    /// Password (client/server engines).
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// Database name (client/server engines).
    pub database: Option<String>,
    /// Pool size for client/server engines. SQLite always uses one connection.
    pub max_connections: u32,
    /// Durability hint.
    pub durability: Durability,
    /// Busy/lock wait override in milliseconds.
    pub lock_timeout_ms: Option<u64>,
}

/// On-disk shape of the `[database]` table. The engine is kept as a string so
/// that unknown engines surface as [`StoreError::UnsupportedEngine`].
#[derive(Debug, Deserialize)]
struct RawDatabaseConfig {
    engine: String,
    path: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    password: Option<String>,
    database: Option<String>,
    max_connections: Option<u32>,
    #[serde(default)]
    durability: Durability,
    lock_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    database: RawDatabaseConfig,
}

impl DatabaseConfig {
    fn bare(engine: EngineKind) -> Self {
        Self {
            engine,
            path: None,
            host: None,
            port: None,
            user: None,
            password: None,
            database: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            durability: Durability::default(),
            lock_timeout_ms: None,
        }
    }

    /// SQLite database stored in `path`.
    #[must_use]
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::bare(EngineKind::Sqlite)
        }
    }

    /// Private in-memory SQLite database.
    #[must_use]
    pub fn sqlite_in_memory() -> Self {
        Self::sqlite(MEMORY_PATH)
    }

    /// PostgreSQL server connection.
    #[must_use]
    pub fn postgres(
        host: impl Into<String>,
        user: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: Some(host.into()),
            user: Some(user.into()),
            database: Some(database.into()),
            ..Self::bare(EngineKind::Postgres)
        }
    }

    /// MySQL server connection.
    #[must_use]
    pub fn mysql(
        host: impl Into<String>,
        user: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: Some(host.into()),
            user: Some(user.into()),
            database: Some(database.into()),
            ..Self::bare(EngineKind::Mysql)
        }
    }

    /// Sets the password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the durability hint.
    #[must_use]
    pub fn with_durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    /// Sets the busy/lock wait.
    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Parses the `[database]` table of a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(source)?;
        let raw = file.database;
        let engine: EngineKind = raw.engine.parse()?;
        let config = Self {
            engine,
            path: raw.path,
            host: raw.host,
            port: raw.port,
            user: raw.user,
            password: raw.password,
            database: raw.database,
            max_connections: raw.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS),
            durability: raw.durability,
            lock_timeout_ms: raw.lock_timeout_ms,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&source)
    }

    /// Checks that the parameters required by the selected engine are present.
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(StoreError::Config(
                "max_connections must be at least 1".to_string(),
            ));
        }
        match self.engine {
            EngineKind::Sqlite => {
                if self.path.as_ref().map_or(true, |p| p.as_os_str().is_empty()) {
                    return Err(StoreError::Config(
                        "sqlite requires a database `path`".to_string(),
                    ));
                }
            }
            EngineKind::Postgres | EngineKind::Mysql => {
                for (field, value) in [
                    ("host", &self.host),
                    ("user", &self.user),
                    ("database", &self.database),
                ] {
                    if value.as_deref().map_or(true, str::is_empty) {
                        return Err(StoreError::Config(format!(
                            "{} requires `{}`",
                            self.engine, field
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Returns whether this is an in-memory SQLite database.
    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        self.engine == EngineKind::Sqlite
            && self
                .path
                .as_ref()
                .is_some_and(|p| p.as_os_str() == MEMORY_PATH)
    }

    /// Returns the port, falling back to the engine default.
    #[must_use]
    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or(match self.engine {
            EngineKind::Postgres => 5432,
            EngineKind::Mysql => 3306,
            EngineKind::Sqlite => 0,
        })
    }

    /// Returns the busy/lock wait, falling back to the engine default.
    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout_ms.map_or_else(
            || self.engine.capabilities().default_lock_timeout,
            Duration::from_millis,
        )
    }
}
