//! Migration ledger.
//!
//! This module manages the `_ctxdb_migrations` table that records which
//! migration units have been applied. Rows are appended when a unit's `up`
//! succeeds and removed when its `down` succeeds.

use std::collections::BTreeSet;

use chrono::{DateTime, SecondsFormat, Utc};

use ctxdb_schema::schema::{ColumnSchema, SqlType, TableSchema};
use ctxdb_schema::SqlValue;

use crate::adapter::{ConnectionAdapter, Row};
use crate::ddl::SafeDdl;
use crate::error::{Result, StoreError};

/// Name of the ledger table.
pub const LEDGER_TABLE: &str = "_ctxdb_migrations";

/// A record of an applied migration unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    /// Unit version.
    pub version: i64,
    /// Unit name.
    pub name: String,
    /// When the unit was applied.
    pub applied_at: DateTime<Utc>,
}

/// Schema of the ledger table.
#[must_use]
pub fn ledger_schema() -> TableSchema {
    TableSchema::new(LEDGER_TABLE)
        .column(ColumnSchema::new("version", SqlType::BigInt).primary_key())
        .column(ColumnSchema::new("name", SqlType::Varchar(255)).not_null())
        .column(ColumnSchema::new("applied_at", SqlType::Varchar(64)).not_null())
}

/// Reads and writes the ledger through an adapter.
#[derive(Clone, Copy)]
pub struct Ledger<'a> {
    adapter: &'a dyn ConnectionAdapter,
}

impl<'a> Ledger<'a> {
    /// Creates a ledger over `adapter`.
    #[must_use]
    pub fn new(adapter: &'a dyn ConnectionAdapter) -> Self {
        Self { adapter }
    }

    /// Ensures the ledger table exists. Safe to call any number of times.
    pub async fn ensure_table(&self) -> Result<()> {
        SafeDdl::new(self.adapter)
            .create_table_if_absent(&ledger_schema())
            .await?;
        Ok(())
    }

    /// Records a unit as applied, stamped with the current time.
    pub async fn record_applied(&self, version: i64, name: &str) -> Result<()> {
        let dialect = self.adapter.dialect();
        let sql = format!(
            "INSERT INTO {} (version, name, applied_at) VALUES ({}, {}, {})",
            dialect.quote_identifier(LEDGER_TABLE),
            dialect.placeholder(1),
            dialect.placeholder(2),
            dialect.placeholder(3)
        );
        let applied_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        self.adapter
            .execute(
                &sql,
                &[version.into(), name.into(), SqlValue::Text(applied_at)],
            )
            .await
            .map_err(|e| e.with_intent(format!("record migration {version} as applied")))?;
        Ok(())
    }

    /// Removes the ledger row of a rolled back unit.
    pub async fn record_unapplied(&self, version: i64, name: &str) -> Result<()> {
        let dialect = self.adapter.dialect();
        let sql = format!(
            "DELETE FROM {} WHERE version = {}",
            dialect.quote_identifier(LEDGER_TABLE),
            dialect.placeholder(1)
        );
        let affected = self
            .adapter
            .execute(&sql, &[version.into()])
            .await
            .map_err(|e| e.with_intent(format!("remove migration {version} from the ledger")))?;

        if affected == 0 {
            return Err(StoreError::UnknownMigration {
                version,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Checks if a version has been applied.
    pub async fn is_applied(&self, version: i64) -> Result<bool> {
        let dialect = self.adapter.dialect();
        let sql = format!(
            "SELECT version FROM {} WHERE version = {}",
            dialect.quote_identifier(LEDGER_TABLE),
            dialect.placeholder(1)
        );
        Ok(self.adapter.query_one(&sql, &[version.into()]).await?.is_some())
    }

    /// Gets all applied units in ascending version order.
    pub async fn applied(&self) -> Result<Vec<AppliedMigration>> {
        self.select("ORDER BY version").await
    }

    /// Gets the set of applied versions.
    pub async fn applied_versions(&self) -> Result<BTreeSet<i64>> {
        Ok(self
            .applied()
            .await?
            .into_iter()
            .map(|m| m.version)
            .collect())
    }

    /// Gets the `n` most recently applied units, newest first.
    pub async fn last_applied(&self, n: usize) -> Result<Vec<AppliedMigration>> {
        let mut applied = self.applied().await?;
        applied.reverse();
        applied.truncate(n);
        Ok(applied)
    }

    /// Counts applied units.
    pub async fn count(&self) -> Result<usize> {
        Ok(self.applied().await?.len())
    }

    async fn select(&self, tail: &str) -> Result<Vec<AppliedMigration>> {
        let sql = format!(
            "SELECT version, name, applied_at FROM {} {tail}",
            self.adapter.dialect().quote_identifier(LEDGER_TABLE)
        );
        self.adapter
            .query(&sql, &[])
            .await
            .map_err(|e| e.with_intent("read the migration ledger"))?
            .iter()
            .map(decode_row)
            .collect()
    }
}

fn decode_row(row: &Row) -> Result<AppliedMigration> {
    let applied_at_str = row.get_string("applied_at")?;
    let applied_at = DateTime::parse_from_rfc3339(&applied_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Decode {
            column: "applied_at".to_string(),
            message: format!("'{applied_at_str}' is not an RFC 3339 timestamp: {e}"),
        })?;
    Ok(AppliedMigration {
        version: row.get_i64("version")?,
        name: row.get_string("name")?,
        applied_at,
    })
}
