//! Connection adapters.
//!
//! A [`ConnectionAdapter`] hides one engine's driver behind a uniform async
//! contract: run a statement, fetch rows, manage a transaction, and answer
//! catalog questions. Higher layers never touch the driver directly.
//!
//! While a transaction is open on an adapter, every statement and every
//! catalog check issued through it runs inside that transaction.

mod catalog;
pub mod mysql;
pub mod postgres;
mod session;
pub mod sqlite;

pub use mysql::MysqlAdapter;
pub use postgres::PostgresAdapter;
pub use sqlite::SqliteAdapter;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::warn;

use ctxdb_schema::dialect::{dialect_for, MigrationDialect};
use ctxdb_schema::{Capabilities, EngineKind, SqlValue};

use crate::error::{Result, StoreError};

/// One fetched row: column names paired with decoded values, in select order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: Vec<(String, SqlValue)>,
}

impl Row {
    /// Creates a row from `(column, value)` pairs.
    #[must_use]
    pub fn new(columns: Vec<(String, SqlValue)>) -> Self {
        Self { columns }
    }

    /// Returns the value of `column`, if selected.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    }

    /// Returns `column` as an integer.
    pub fn get_i64(&self, column: &str) -> Result<i64> {
        self.require(column)?
            .as_i64()
            .ok_or_else(|| decode_error(column, "an integer"))
    }

    /// Returns `column` as text.
    pub fn get_string(&self, column: &str) -> Result<String> {
        self.require(column)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| decode_error(column, "text"))
    }

    /// Returns `column` as text, or `None` when it is NULL.
    pub fn get_opt_string(&self, column: &str) -> Result<Option<String>> {
        let value = self.require(column)?;
        if value.is_null() {
            return Ok(None);
        }
        value
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| decode_error(column, "text or NULL"))
    }

    /// Returns `column` as a boolean (accepts native booleans and 0/1).
    pub fn get_bool(&self, column: &str) -> Result<bool> {
        self.require(column)?
            .as_bool()
            .ok_or_else(|| decode_error(column, "a boolean"))
    }

    /// Returns all `(column, value)` pairs.
    #[must_use]
    pub fn columns(&self) -> &[(String, SqlValue)] {
        &self.columns
    }

    /// Returns the number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns whether the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    fn require(&self, column: &str) -> Result<&SqlValue> {
        self.get(column).ok_or_else(|| StoreError::Decode {
            column: column.to_string(),
            message: "column not present in result".to_string(),
        })
    }
}

fn decode_error(column: &str, expected: &str) -> StoreError {
    StoreError::Decode {
        column: column.to_string(),
        message: format!("expected {expected}"),
    }
}

/// Structural fingerprint of one table: its columns and named indexes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSnapshot {
    /// Table name.
    pub name: String,
    /// Column names in declaration order.
    pub columns: Vec<String>,
    /// Explicitly created index names, sorted.
    pub indexes: Vec<String>,
}

/// Uniform async session contract over one engine.
#[async_trait]
pub trait ConnectionAdapter: Send + Sync {
    /// Engine this adapter talks to.
    fn engine(&self) -> EngineKind;

    /// DDL dialect for this adapter's engine.
    fn dialect(&self) -> &'static dyn MigrationDialect {
        dialect_for(self.engine())
    }

    /// Capability record for this adapter's engine.
    fn capabilities(&self) -> &'static Capabilities {
        self.engine().capabilities()
    }

    /// Runs one statement and returns the number of affected rows.
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    /// Runs one query and returns every row.
    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>>;

    /// Opens a transaction. Fails with [`StoreError::NestedTransaction`] if
    /// one is already open.
    async fn begin(&self) -> Result<()>;

    /// Commits the open transaction.
    async fn commit(&self) -> Result<()>;

    /// Rolls back the open transaction.
    async fn rollback(&self) -> Result<()>;

    /// Returns whether a transaction is open.
    async fn in_transaction(&self) -> bool;

    /// Releases the underlying session. Calling it twice is a no-op.
    async fn close(&self) -> Result<()>;

    /// Returns whether [`close`](Self::close) has been called.
    fn is_closed(&self) -> bool;

    /// Runs a query and returns the first row, if any.
    async fn query_one(&self, sql: &str, params: &[SqlValue]) -> Result<Option<Row>> {
        Ok(self.query(sql, params).await?.into_iter().next())
    }

    /// Returns whether a table named `table` exists in the current schema.
    async fn has_table(&self, table: &str) -> Result<bool> {
        let q = catalog::table_exists(self.engine(), table);
        Ok(!self.query(q.sql, &q.params).await?.is_empty())
    }

    /// Returns whether a view named `view` exists in the current schema.
    async fn has_view(&self, view: &str) -> Result<bool> {
        let q = catalog::view_exists(self.engine(), view);
        Ok(!self.query(q.sql, &q.params).await?.is_empty())
    }

    /// Returns whether `table` has a column named `column`.
    async fn has_column(&self, table: &str, column: &str) -> Result<bool> {
        let q = catalog::column_exists(self.engine(), table, column);
        Ok(!self.query(q.sql, &q.params).await?.is_empty())
    }

    /// Returns whether an index named `index` exists in the current schema.
    async fn has_index(&self, index: &str) -> Result<bool> {
        let q = catalog::index_exists(self.engine(), index);
        Ok(!self.query(q.sql, &q.params).await?.is_empty())
    }

    /// Lists user tables, sorted by name.
    async fn list_tables(&self) -> Result<Vec<String>> {
        let q = catalog::tables(self.engine());
        names(self.query(q.sql, &q.params).await?)
    }

    /// Lists the columns of `table` in declaration order.
    async fn list_columns(&self, table: &str) -> Result<Vec<String>> {
        let q = catalog::columns(self.engine(), table);
        names(self.query(q.sql, &q.params).await?)
    }

    /// Lists explicitly created indexes on `table`, sorted by name. Indexes
    /// that only back a primary key, unique or foreign key constraint are
    /// left out.
    async fn list_indexes(&self, table: &str) -> Result<Vec<String>> {
        let q = catalog::indexes(self.engine(), table);
        names(self.query(q.sql, &q.params).await?)
    }

    /// Captures the structure of every user table.
    async fn snapshot(&self) -> Result<Vec<TableSnapshot>> {
        let mut tables = Vec::new();
        for name in self.list_tables().await? {
            let columns = self.list_columns(&name).await?;
            let indexes = self.list_indexes(&name).await?;
            tables.push(TableSnapshot {
                name,
                columns,
                indexes,
            });
        }
        Ok(tables)
    }
}

fn names(rows: Vec<Row>) -> Result<Vec<String>> {
    rows.iter().map(|row| row.get_string("name")).collect()
}

/// Runs `body` inside a transaction on `adapter`.
///
/// Commits when `body` succeeds. On failure the transaction is rolled back
/// and the original error is returned. Engines without transactional DDL
/// still get a transaction, but structural statements inside it commit on
/// their own and survive the rollback.
pub async fn with_transaction<'a, T, F>(adapter: &'a dyn ConnectionAdapter, body: F) -> Result<T>
where
    F: FnOnce(&'a dyn ConnectionAdapter) -> BoxFuture<'a, Result<T>>,
{
    if !adapter.capabilities().transactional_ddl {
        warn!(
            engine = %adapter.engine(),
            "engine commits structural statements implicitly; rollback covers data changes only"
        );
    }

    adapter.begin().await?;
    match body(adapter).await {
        Ok(value) => {
            adapter.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = adapter.rollback().await {
                warn!(error = %rollback_err, "rollback after failure did not succeed");
            }
            Err(err)
        }
    }
}

/// Binds positional parameters onto a sqlx query.
///
/// NULL is bound as a nullable text value; every supported engine coerces
/// it to the target column's type.
pub(crate) fn bind_values<'q, DB>(
    mut query: sqlx::query::Query<'q, DB, <DB as sqlx::Database>::Arguments<'q>>,
    params: &[SqlValue],
) -> sqlx::query::Query<'q, DB, <DB as sqlx::Database>::Arguments<'q>>
where
    DB: sqlx::Database,
    bool: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    i64: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    f64: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    String: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    Vec<u8>: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    Option<String>: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
{
    for param in params {
        query = match param {
            SqlValue::Null => query.bind(Option::<String>::None),
            SqlValue::Bool(b) => query.bind(*b),
            SqlValue::Int(i) => query.bind(*i),
            SqlValue::Float(f) => query.bind(*f),
            SqlValue::Text(s) => query.bind(s.clone()),
            SqlValue::Blob(b) => query.bind(b.clone()),
        };
    }
    query
}

/// Short, single-line form of a statement for error intents and logs.
pub(crate) fn statement_summary(sql: &str) -> String {
    const MAX: usize = 80;
    let flat = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.len() <= MAX {
        return format!("run `{flat}`");
    }
    let mut cut = MAX;
    while !flat.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("run `{}...`", &flat[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_accessors() {
        let row = Row::new(vec![
            ("version".to_string(), SqlValue::Int(20250101000000)),
            ("name".to_string(), SqlValue::Text("create_master_tables".into())),
            ("note".to_string(), SqlValue::Null),
            ("in_use".to_string(), SqlValue::Int(0)),
        ]);

        assert_eq!(row.get_i64("version").unwrap(), 20250101000000);
        assert_eq!(row.get_string("NAME").unwrap(), "create_master_tables");
        assert_eq!(row.get_opt_string("note").unwrap(), None);
        assert!(!row.get_bool("in_use").unwrap());
        assert_eq!(row.len(), 4);
    }

    #[test]
    fn test_row_missing_column() {
        let row = Row::default();
        assert!(row.is_empty());
        assert!(matches!(
            row.get_i64("version"),
            Err(StoreError::Decode { ref column, .. }) if column == "version"
        ));
    }

    #[test]
    fn test_row_type_mismatch() {
        let row = Row::new(vec![("name".to_string(), SqlValue::Blob(vec![1, 2]))]);
        assert!(matches!(row.get_string("name"), Err(StoreError::Decode { .. })));
    }

    #[test]
    fn test_statement_summary_flattens_and_truncates() {
        assert_eq!(
            statement_summary("SELECT 1\n  FROM t"),
            "run `SELECT 1 FROM t`"
        );
        let long = format!("SELECT {}", "x, ".repeat(60));
        let summary = statement_summary(&long);
        assert!(summary.ends_with("...`"));
        assert!(summary.len() < 100);
    }
}
