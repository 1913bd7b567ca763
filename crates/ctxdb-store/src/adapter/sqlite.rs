//! SQLite adapter.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Column, Row as SqlxRow, TypeInfo, ValueRef};
use tracing::{debug, info};

use ctxdb_schema::{EngineKind, SqlValue};

use super::session::Session;
use super::{bind_values, statement_summary, ConnectionAdapter, Row};
use crate::config::{DatabaseConfig, Durability};
use crate::error::{Result, StoreError};

/// Adapter over an embedded SQLite database file (or a private in-memory one).
pub struct SqliteAdapter {
    session: Session<sqlx::Sqlite>,
}

impl SqliteAdapter {
    /// Opens the database described by `config`, creating the file if needed.
    ///
    /// Applies foreign key enforcement, the lock wait, and the durability
    /// hint through the pragmas named in the engine's capability record. File databases use WAL journaling. The pool
    /// holds a single connection that never expires, so `max_connections`
    /// is ignored.
    pub async fn open(config: &DatabaseConfig) -> Result<Self> {
        config.validate()?;
        if config.engine != EngineKind::Sqlite {
            return Err(StoreError::Config(format!(
                "sqlite adapter cannot open a {} configuration",
                config.engine
            )));
        }

        let caps = EngineKind::Sqlite.capabilities();
        let synchronous = match config.durability {
            Durability::Throughput => "NORMAL",
            Durability::Durability => "FULL",
        };

        let (options, target) = if config.is_in_memory() {
            let options = SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| StoreError::connection("invalid in-memory sqlite options", Some(e)))?;
            (options, "in-memory".to_string())
        } else {
            let path = config.path.clone().unwrap_or_default();
            let target = path.display().to_string();
            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal);
            (options, target)
        };

        // One long-lived connection: SQLite has a single writer, and
        // connection-scoped pragmas toggled during migrations must stick.
        let pool_options = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>);

        let mut options = options.pragma(
            caps.lock_timeout_setting,
            config.lock_timeout().as_millis().to_string(),
        );
        if let Some(setting) = caps.foreign_key_setting {
            options = options.pragma(setting, "ON");
        }
        if let Some(setting) = caps.durability_setting {
            options = options.pragma(setting, synchronous);
        }

        let pool = pool_options.connect_with(options).await.map_err(|e| {
            StoreError::connection(format!("cannot open sqlite database {target}"), Some(e))
        })?;

        info!(
            database = %target,
            durability = ?config.durability,
            busy_timeout_ms = %config.lock_timeout().as_millis(),
            "sqlite database opened"
        );
        Ok(Self::from_pool(pool))
    }

    /// Opens a private in-memory database with default settings.
    pub async fn in_memory() -> Result<Self> {
        Self::open(&DatabaseConfig::sqlite_in_memory()).await
    }

    /// Wraps an existing pool. Session settings are whatever the pool applies.
    #[must_use]
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            session: Session::new(EngineKind::Sqlite, pool),
        }
    }
}

#[async_trait]
impl ConnectionAdapter for SqliteAdapter {
    fn engine(&self) -> EngineKind {
        EngineKind::Sqlite
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        debug!(engine = "sqlite", sql = %sql, "execute");
        let query = bind_values(sqlx::query(sql), params);
        let mut slot = self.session.lock().await?;
        let result = match slot.as_mut() {
            Some(tx) => query.execute(&mut **tx).await,
            None => query.execute(self.session.pool()).await,
        };
        result
            .map(|done| done.rows_affected())
            .map_err(|e| StoreError::query(statement_summary(sql), e))
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        debug!(engine = "sqlite", sql = %sql, "query");
        let query = bind_values(sqlx::query(sql), params);
        let mut slot = self.session.lock().await?;
        let rows = match slot.as_mut() {
            Some(tx) => query.fetch_all(&mut **tx).await,
            None => query.fetch_all(self.session.pool()).await,
        }
        .map_err(|e| StoreError::query(statement_summary(sql), e))?;
        rows.iter().map(decode_row).collect()
    }

    async fn begin(&self) -> Result<()> {
        self.session.begin().await
    }

    async fn commit(&self) -> Result<()> {
        self.session.commit().await
    }

    async fn rollback(&self) -> Result<()> {
        self.session.rollback().await
    }

    async fn in_transaction(&self) -> bool {
        self.session.in_transaction().await
    }

    async fn close(&self) -> Result<()> {
        self.session.close().await
    }

    fn is_closed(&self) -> bool {
        self.session.is_closed()
    }
}

fn decode_row(row: &SqliteRow) -> Result<Row> {
    let mut columns = Vec::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        let name = column.name().to_string();
        let value = decode_value(row, index)
            .map_err(|e| StoreError::query(format!("decode column {name}"), e))?;
        columns.push((name, value));
    }
    Ok(Row::new(columns))
}

/// Decodes by the value's runtime storage class, not the declared type.
fn decode_value(row: &SqliteRow, index: usize) -> std::result::Result<SqlValue, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }
    let type_name = raw.type_info().name().to_ascii_uppercase();
    Ok(match type_name.as_str() {
        "INTEGER" | "BOOLEAN" | "INT8" => SqlValue::Int(row.try_get_unchecked::<i64, _>(index)?),
        "REAL" | "NUMERIC" => SqlValue::Float(row.try_get_unchecked::<f64, _>(index)?),
        "BLOB" => SqlValue::Blob(row.try_get_unchecked::<Vec<u8>, _>(index)?),
        _ => SqlValue::Text(row.try_get_unchecked::<String, _>(index)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::with_transaction;

    async fn adapter() -> SqliteAdapter {
        SqliteAdapter::in_memory()
            .await
            .expect("Failed to open in-memory SQLite database")
    }

    #[tokio::test]
    async fn test_execute_and_query() {
        let db = adapter().await;
        db.execute(
            "CREATE TABLE m_tags (id INTEGER PRIMARY KEY, name TEXT NOT NULL, weight REAL, raw BLOB)",
            &[],
        )
        .await
        .unwrap();

        let inserted = db
            .execute(
                "INSERT INTO m_tags (name, weight, raw) VALUES (?, ?, ?)",
                &["auth".into(), 0.5.into(), SqlValue::Blob(vec![1, 2])],
            )
            .await
            .unwrap();
        assert_eq!(inserted, 1);

        let rows = db
            .query("SELECT id, name, weight, raw, NULL AS missing FROM m_tags", &[])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_i64("id").unwrap(), 1);
        assert_eq!(rows[0].get_string("name").unwrap(), "auth");
        assert_eq!(rows[0].get("weight"), Some(&SqlValue::Float(0.5)));
        assert_eq!(rows[0].get("raw"), Some(&SqlValue::Blob(vec![1, 2])));
        assert_eq!(rows[0].get("missing"), Some(&SqlValue::Null));
    }

    #[tokio::test]
    async fn test_null_parameter() {
        let db = adapter().await;
        db.execute("CREATE TABLE t (v TEXT)", &[]).await.unwrap();
        db.execute("INSERT INTO t (v) VALUES (?)", &[SqlValue::Null])
            .await
            .unwrap();
        let row = db.query_one("SELECT v FROM t", &[]).await.unwrap().unwrap();
        assert_eq!(row.get_opt_string("v").unwrap(), None);
    }

    #[tokio::test]
    async fn test_introspection() {
        let db = adapter().await;
        db.execute(
            "CREATE TABLE m_files (id INTEGER PRIMARY KEY, path TEXT NOT NULL UNIQUE)",
            &[],
        )
        .await
        .unwrap();
        db.execute("CREATE INDEX idx_files_path ON m_files (path)", &[])
            .await
            .unwrap();

        assert!(db.has_table("m_files").await.unwrap());
        assert!(!db.has_table("m_missing").await.unwrap());
        assert!(db.has_column("m_files", "path").await.unwrap());
        assert!(!db.has_column("m_files", "size").await.unwrap());
        assert!(db.has_index("idx_files_path").await.unwrap());
        assert_eq!(db.list_tables().await.unwrap(), vec!["m_files"]);
        assert_eq!(db.list_columns("m_files").await.unwrap(), vec!["id", "path"]);
        // The UNIQUE autoindex is not listed.
        assert_eq!(db.list_indexes("m_files").await.unwrap(), vec!["idx_files_path"]);
    }

    #[tokio::test]
    async fn test_catalog_checks_ignore_identifier_case() {
        let db = adapter().await;
        db.execute("CREATE TABLE m_Files (id INTEGER PRIMARY KEY, Path TEXT)", &[])
            .await
            .unwrap();
        db.execute("CREATE INDEX Idx_Files_Path ON m_Files (Path)", &[])
            .await
            .unwrap();
        db.execute("CREATE VIEW v_Files AS SELECT Path FROM m_Files", &[])
            .await
            .unwrap();

        assert!(db.has_table("M_FILES").await.unwrap());
        assert!(db.has_column("m_files", "path").await.unwrap());
        assert!(db.has_index("idx_files_path").await.unwrap());
        assert!(db.has_view("V_FILES").await.unwrap());
        assert!(!db.has_table("v_files").await.unwrap());
        assert_eq!(db.list_indexes("M_FILES").await.unwrap(), vec!["Idx_Files_Path"]);
    }

    #[tokio::test]
    async fn test_session_settings_follow_config() {
        let config = DatabaseConfig::sqlite_in_memory()
            .with_durability(Durability::Throughput)
            .with_lock_timeout(Duration::from_millis(1500));
        let db = SqliteAdapter::open(&config).await.unwrap();
        let caps = EngineKind::Sqlite.capabilities();

        let setting = |row: Row| row.columns()[0].1.clone();
        let timeout = db
            .query_one(&format!("PRAGMA {}", caps.lock_timeout_setting), &[])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(setting(timeout), SqlValue::Int(1500));
        let synchronous = db.query_one("PRAGMA synchronous", &[]).await.unwrap().unwrap();
        // NORMAL
        assert_eq!(setting(synchronous), SqlValue::Int(1));
        let foreign_keys = db.query_one("PRAGMA foreign_keys", &[]).await.unwrap().unwrap();
        assert_eq!(setting(foreign_keys), SqlValue::Int(1));
    }

    #[tokio::test]
    async fn test_foreign_keys_enforced() {
        let db = adapter().await;
        db.execute("CREATE TABLE p (id INTEGER PRIMARY KEY)", &[])
            .await
            .unwrap();
        db.execute(
            "CREATE TABLE c (id INTEGER PRIMARY KEY, p_id INTEGER REFERENCES p (id))",
            &[],
        )
        .await
        .unwrap();
        let result = db.execute("INSERT INTO c (p_id) VALUES (42)", &[]).await;
        assert!(matches!(result, Err(StoreError::Query { .. })));
    }

    #[tokio::test]
    async fn test_transaction_commit_and_rollback() {
        let db = adapter().await;
        db.execute("CREATE TABLE t (v INTEGER)", &[]).await.unwrap();

        db.begin().await.unwrap();
        assert!(db.in_transaction().await);
        db.execute("INSERT INTO t (v) VALUES (1)", &[]).await.unwrap();
        db.rollback().await.unwrap();
        assert!(!db.in_transaction().await);

        db.begin().await.unwrap();
        db.execute("INSERT INTO t (v) VALUES (2)", &[]).await.unwrap();
        db.commit().await.unwrap();

        let rows = db.query("SELECT v FROM t", &[]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_i64("v").unwrap(), 2);
    }

    #[tokio::test]
    async fn test_nested_begin_rejected() {
        let db = adapter().await;
        db.begin().await.unwrap();
        assert!(matches!(db.begin().await, Err(StoreError::NestedTransaction)));
        db.rollback().await.unwrap();
        assert!(matches!(db.commit().await, Err(StoreError::NoTransaction)));
    }

    #[tokio::test]
    async fn test_with_transaction_rolls_back_structure() {
        let db = adapter().await;
        let result: Result<()> = with_transaction(&db, |tx| {
            Box::pin(async move {
                tx.execute("CREATE TABLE t_scratch (v INTEGER)", &[]).await?;
                assert!(tx.has_table("t_scratch").await?);
                Err(StoreError::Config("abort".to_string()))
            })
        })
        .await;

        assert!(result.is_err());
        assert!(!db.in_transaction().await);
        assert!(!db.has_table("t_scratch").await.unwrap());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let db = adapter().await;
        db.close().await.unwrap();
        db.close().await.unwrap();
        assert!(db.is_closed());
        assert!(matches!(
            db.execute("SELECT 1", &[]).await,
            Err(StoreError::Connection { .. })
        ));
    }

    #[tokio::test]
    async fn test_file_database_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let db = SqliteAdapter::open(&DatabaseConfig::sqlite(dir.path().join("ctx.db")))
            .await
            .unwrap();
        let row = db
            .query_one("PRAGMA journal_mode", &[])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.get_string("journal_mode").unwrap(), "wal");
        db.close().await.unwrap();
    }
}
