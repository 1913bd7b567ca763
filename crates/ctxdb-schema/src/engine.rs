//! Engine identities and the dialect capability table.
//!
//! Every engine-specific branch in the workspace consults [`Capabilities`]
//! instead of matching on [`EngineKind`] directly, so that knowledge about
//! what an engine can and cannot do lives in exactly one place.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The relational engine a connection targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Embedded, file-backed engine (SQLite).
    #[serde(alias = "embedded")]
    Sqlite,
    /// PostgreSQL-compatible server.
    #[serde(alias = "postgresql")]
    Postgres,
    /// MySQL-compatible server.
    #[serde(alias = "mariadb")]
    Mysql,
}

/// Error returned when an engine name is not one of the supported engines.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported database engine '{0}' (expected sqlite, postgres or mysql)")]
pub struct UnknownEngine(pub String);

impl EngineKind {
    /// All supported engines.
    pub const ALL: [Self; 3] = [Self::Sqlite, Self::Postgres, Self::Mysql];

    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
        }
    }

    /// Returns the static capability record for this engine.
    #[must_use]
    pub const fn capabilities(self) -> &'static Capabilities {
        match self {
            Self::Sqlite => &SQLITE,
            Self::Postgres => &POSTGRES,
            Self::Mysql => &MYSQL,
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = UnknownEngine;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" | "embedded" => Ok(Self::Sqlite),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::Mysql),
            _ => Err(UnknownEngine(s.to_string())),
        }
    }
}

/// Static description of an engine's DDL behaviour and session defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    /// `CREATE TABLE IF NOT EXISTS` is accepted.
    pub create_table_if_not_exists: bool,
    /// `CREATE INDEX IF NOT EXISTS` is accepted.
    pub create_index_if_not_exists: bool,
    /// `ALTER TABLE .. ADD COLUMN IF NOT EXISTS` is accepted.
    pub add_column_if_not_exists: bool,
    /// `DROP INDEX IF EXISTS` is accepted.
    pub drop_index_if_exists: bool,
    /// `DROP INDEX` must name the owning table (`DROP INDEX i ON t`).
    pub drop_index_requires_table: bool,
    /// The engine has a real boolean type (`TRUE`/`FALSE` literals).
    pub native_boolean: bool,
    /// Structural statements participate in transactions and roll back.
    pub transactional_ddl: bool,
    /// `ALTER TABLE .. ALTER/MODIFY COLUMN` is supported.
    pub alter_column: bool,
    /// `ADD COLUMN` accepts PRIMARY KEY, UNIQUE, expression defaults and
    /// NOT NULL without a default. When false such columns need a table rebuild.
    pub add_column_with_constraints: bool,
    /// `ALTER TABLE .. DROP COLUMN` works in place for any column, including
    /// indexed, unique and referencing ones. When false, columns are dropped
    /// by rebuilding the table.
    pub drop_column: bool,
    /// Name of the session setting that toggles foreign-key enforcement,
    /// if enforcement is switchable at all.
    pub foreign_key_setting: Option<&'static str>,
    /// Name of the session setting that trades durability for throughput.
    pub durability_setting: Option<&'static str>,
    /// Name of the session setting that bounds lock waits.
    pub lock_timeout_setting: &'static str,
    /// Default busy/lock wait.
    pub default_lock_timeout: Duration,
    /// Identifier quote character.
    pub identifier_quote: char,
    /// Bind parameters are numbered (`$1`) rather than positional (`?`).
    pub numbered_placeholders: bool,
}

/// SQLite.
pub const SQLITE: Capabilities = Capabilities {
    create_table_if_not_exists: true,
    create_index_if_not_exists: true,
    add_column_if_not_exists: false,
    drop_index_if_exists: true,
    drop_index_requires_table: false,
    native_boolean: false,
    transactional_ddl: true,
    alter_column: false,
    add_column_with_constraints: false,
    drop_column: false,
    foreign_key_setting: Some("foreign_keys"),
    durability_setting: Some("synchronous"),
    lock_timeout_setting: "busy_timeout",
    default_lock_timeout: Duration::from_secs(5),
    identifier_quote: '"',
    numbered_placeholders: false,
};

/// PostgreSQL.
pub const POSTGRES: Capabilities = Capabilities {
    create_table_if_not_exists: true,
    create_index_if_not_exists: true,
    add_column_if_not_exists: true,
    drop_index_if_exists: true,
    drop_index_requires_table: false,
    native_boolean: true,
    transactional_ddl: true,
    alter_column: true,
    add_column_with_constraints: true,
    drop_column: true,
    foreign_key_setting: None,
    durability_setting: Some("synchronous_commit"),
    lock_timeout_setting: "lock_timeout",
    default_lock_timeout: Duration::from_secs(5),
    identifier_quote: '"',
    numbered_placeholders: true,
};

/// MySQL / MariaDB.
pub const MYSQL: Capabilities = Capabilities {
    create_table_if_not_exists: true,
    create_index_if_not_exists: false,
    add_column_if_not_exists: false,
    drop_index_if_exists: false,
    drop_index_requires_table: true,
    native_boolean: false,
    transactional_ddl: false,
    alter_column: true,
    add_column_with_constraints: true,
    drop_column: true,
    foreign_key_setting: Some("foreign_key_checks"),
    durability_setting: None,
    lock_timeout_setting: "innodb_lock_wait_timeout",
    default_lock_timeout: Duration::from_secs(5),
    identifier_quote: '`',
    numbered_placeholders: false,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_engine_aliases() {
        assert_eq!("sqlite".parse::<EngineKind>().unwrap(), EngineKind::Sqlite);
        assert_eq!("Embedded".parse::<EngineKind>().unwrap(), EngineKind::Sqlite);
        assert_eq!("postgresql".parse::<EngineKind>().unwrap(), EngineKind::Postgres);
        assert_eq!(" MariaDB ".parse::<EngineKind>().unwrap(), EngineKind::Mysql);
    }

    #[test]
    fn test_parse_unknown_engine() {
        let err = "oracle".parse::<EngineKind>().unwrap_err();
        assert_eq!(err, UnknownEngine("oracle".to_string()));
        assert!(err.to_string().contains("oracle"));
    }

    #[test]
    fn test_capabilities_differ_where_engines_differ() {
        assert!(EngineKind::Sqlite.capabilities().transactional_ddl);
        assert!(!EngineKind::Mysql.capabilities().transactional_ddl);
        assert!(EngineKind::Postgres.capabilities().native_boolean);
        assert!(!EngineKind::Sqlite.capabilities().add_column_with_constraints);
        assert!(EngineKind::Mysql.capabilities().drop_index_requires_table);
        assert_eq!(EngineKind::Mysql.capabilities().identifier_quote, '`');
        assert!(EngineKind::Postgres.capabilities().numbered_placeholders);
        assert!(!EngineKind::Sqlite.capabilities().drop_column);
        assert!(!EngineKind::Sqlite.capabilities().alter_column);
        assert_eq!(EngineKind::Postgres.capabilities().foreign_key_setting, None);
    }

    #[test]
    fn test_display_round_trips_through_from_str() {
        for engine in EngineKind::ALL {
            assert_eq!(engine.to_string().parse::<EngineKind>().unwrap(), engine);
        }
    }
}
