//! Error types for the storage layer.

use std::fmt;

/// Direction a migration unit was run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Forward (`up`).
    Up,
    /// Reverse (`down`).
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => f.write_str("up"),
            Self::Down => f.write_str("down"),
        }
    }
}

/// Errors that can occur while talking to the database or evolving its schema.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A session could not be opened or is no longer usable.
    #[error("Connection error: {message}")]
    Connection {
        /// What went wrong.
        message: String,
        /// Driver error, if any.
        #[source]
        source: Option<sqlx::Error>,
    },

    /// A single statement failed.
    #[error("Query failed while trying to {intent}: {source}")]
    Query {
        /// What the statement was meant to accomplish.
        intent: String,
        /// Driver error.
        #[source]
        source: sqlx::Error,
    },

    /// Configuration names an engine outside the supported set.
    #[error(transparent)]
    UnsupportedEngine(#[from] ctxdb_schema::UnknownEngine),

    /// The process-wide adapter was requested before it was initialized.
    #[error("Database has not been initialized; call initialize_database first")]
    NotInitialized,

    /// A migration unit's `up` or `down` failed.
    #[error("Migration {version} '{name}' failed during {direction}: {source}")]
    MigrationFailed {
        /// Version of the failing unit.
        version: i64,
        /// Name of the failing unit.
        name: String,
        /// Which procedure failed.
        direction: Direction,
        /// Underlying error.
        #[source]
        source: Box<StoreError>,
    },

    /// A transaction was requested while one is already open on the adapter.
    #[error("Nested transactions are not supported")]
    NestedTransaction,

    /// Commit or rollback was requested with no open transaction.
    #[error("No transaction is open")]
    NoTransaction,

    /// Rows violate a foreign key after a unit or table rebuild ran with
    /// enforcement suspended.
    #[error("Foreign key check failed: {count} row(s) in '{table}' reference missing rows in '{parent}'")]
    ForeignKeyViolation {
        /// Child table.
        table: String,
        /// Referenced table.
        parent: String,
        /// Number of offending rows.
        count: usize,
    },

    /// The ledger records a version no registered unit carries.
    #[error("Ledger records migration {version} '{name}' but no such unit is registered")]
    UnknownMigration {
        /// Recorded version.
        version: i64,
        /// Recorded name.
        name: String,
    },

    /// Invalid configuration or unit registration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A value read back from the database did not have the expected shape.
    #[error("Unexpected value for column '{column}': {message}")]
    Decode {
        /// Column name.
        column: String,
        /// What was expected.
        message: String,
    },

    /// IO error (reading configuration files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error.
    #[error("Invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),
}

impl StoreError {
    /// Builds a [`StoreError::Query`] tagged with the statement's intent.
    pub fn query(intent: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Query {
            intent: intent.into(),
            source,
        }
    }

    /// Builds a [`StoreError::Connection`].
    pub fn connection(message: impl Into<String>, source: Option<sqlx::Error>) -> Self {
        Self::Connection {
            message: message.into(),
            source,
        }
    }

    /// Replaces the intent recorded on a [`StoreError::Query`].
    #[must_use]
    pub fn with_intent(self, intent: impl Into<String>) -> Self {
        match self {
            Self::Query { source, .. } => Self::Query {
                intent: intent.into(),
                source,
            },
            other => other,
        }
    }

    /// Returns the `(version, name)` of the failing unit for migration failures.
    #[must_use]
    pub fn failed_unit(&self) -> Option<(i64, &str)> {
        match self {
            Self::MigrationFailed { version, name, .. } => Some((*version, name.as_str())),
            _ => None,
        }
    }
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_failed_names_unit() {
        let err = StoreError::MigrationFailed {
            version: 20250102000000,
            name: "create_decisions".to_string(),
            direction: Direction::Up,
            source: Box::new(StoreError::Config("boom".to_string())),
        };
        let message = err.to_string();
        assert!(message.contains("20250102000000"));
        assert!(message.contains("create_decisions"));
        assert!(message.contains("during up"));
        assert_eq!(err.failed_unit(), Some((20250102000000, "create_decisions")));
    }

    #[test]
    fn test_query_error_carries_intent() {
        let err = StoreError::query("create table m_agents", sqlx::Error::RowNotFound);
        assert!(err.to_string().starts_with("Query failed while trying to create table m_agents"));
    }

    #[test]
    fn test_unsupported_engine_message() {
        let err: StoreError = "oracle".parse::<ctxdb_schema::EngineKind>().unwrap_err().into();
        assert!(err.to_string().contains("unsupported database engine 'oracle'"));
    }
}
