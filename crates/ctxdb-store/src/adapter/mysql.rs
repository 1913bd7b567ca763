//! MySQL adapter.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Row as SqlxRow, TypeInfo, ValueRef};
use tracing::{debug, info};

use ctxdb_schema::dialect::dialect_for;
use ctxdb_schema::{EngineKind, SqlValue};

use super::session::Session;
use super::{bind_values, statement_summary, ConnectionAdapter, Row};
use crate::config::DatabaseConfig;
use crate::error::{Result, StoreError};

/// Adapter over a MySQL (or MariaDB) server.
pub struct MysqlAdapter {
    session: Session<sqlx::MySql>,
}

impl MysqlAdapter {
    /// Connects to the server described by `config`.
    ///
    /// Every pooled connection sets the lock wait and foreign key settings
    /// named in the capability record right after connecting. MySQL has no per-session
    /// durability switch, so the durability hint is only logged.
    pub async fn open(config: &DatabaseConfig) -> Result<Self> {
        config.validate()?;
        if config.engine != EngineKind::Mysql {
            return Err(StoreError::Config(format!(
                "mysql adapter cannot open a {} configuration",
                config.engine
            )));
        }

        let host = config.host.clone().unwrap_or_default();
        let database = config.database.clone().unwrap_or_default();
        // innodb_lock_wait_timeout is whole seconds, minimum 1.
        let lock_wait_secs = config.lock_timeout().as_millis().div_ceil(1000).max(1);
        let caps = EngineKind::Mysql.capabilities();
        let dialect = dialect_for(EngineKind::Mysql);
        let mut session_sql = vec![
            dialect.set_setting_sql(caps.lock_timeout_setting, &lock_wait_secs.to_string()),
        ];
        if let Some(setting) = caps.foreign_key_setting {
            session_sql.push(dialect.set_setting_sql(setting, "1"));
        }

        let mut options = MySqlConnectOptions::new()
            .host(&host)
            .port(config.port_or_default())
            .username(config.user.as_deref().unwrap_or_default())
            .database(&database);
        if let Some(password) = &config.password {
            options = options.password(password);
        }

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .after_connect(move |conn, _meta| {
                let session_sql = session_sql.clone();
                Box::pin(async move {
                    for sql in &session_sql {
                        sqlx::query(sql).execute(&mut *conn).await?;
                    }
                    Ok(())
                })
            })
            .connect_with(options)
            .await
            .map_err(|e| {
                StoreError::connection(
                    format!("cannot connect to mysql at {host}/{database}"),
                    Some(e),
                )
            })?;

        info!(
            host = %host,
            database = %database,
            lock_wait_secs = %lock_wait_secs,
            durability = ?config.durability,
            "mysql connection pool opened; durability hint has no session equivalent"
        );
        Ok(Self::from_pool(pool))
    }

    /// Wraps an existing pool. Session settings are whatever the pool applies.
    #[must_use]
    pub fn from_pool(pool: MySqlPool) -> Self {
        Self {
            session: Session::new(EngineKind::Mysql, pool),
        }
    }
}

#[async_trait]
impl ConnectionAdapter for MysqlAdapter {
    fn engine(&self) -> EngineKind {
        EngineKind::Mysql
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        debug!(engine = "mysql", sql = %sql, "execute");
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
        debug!(engine = "mysql", sql = %sql, "query");
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

fn decode_row(row: &MySqlRow) -> Result<Row> {
    let mut columns = Vec::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        let name = column.name().to_string();
        let value = decode_value(row, index)
            .map_err(|e| StoreError::query(format!("decode column {name}"), e))?;
        columns.push((name, value));
    }
    Ok(Row::new(columns))
}

fn decode_value(row: &MySqlRow, index: usize) -> std::result::Result<SqlValue, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }
    let type_name = raw.type_info().name().to_ascii_uppercase();
    Ok(match type_name.as_str() {
        "BOOLEAN" => SqlValue::Bool(row.try_get_unchecked::<bool, _>(index)?),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            SqlValue::Int(row.try_get_unchecked::<i64, _>(index)?)
        }
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => {
            let value = row.try_get_unchecked::<u64, _>(index)?;
            SqlValue::Int(i64::try_from(value).map_err(|e| sqlx::Error::Decode(Box::new(e)))?)
        }
        "FLOAT" => SqlValue::Float(f64::from(row.try_get_unchecked::<f32, _>(index)?)),
        "DOUBLE" => SqlValue::Float(row.try_get_unchecked::<f64, _>(index)?),
        "DATETIME" | "TIMESTAMP" => {
            SqlValue::Text(row.try_get_unchecked::<NaiveDateTime, _>(index)?.to_string())
        }
        "DATE" => SqlValue::Text(row.try_get_unchecked::<NaiveDate, _>(index)?.to_string()),
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            // information_schema may report names as binary strings.
            let bytes = row.try_get_unchecked::<Vec<u8>, _>(index)?;
            match String::from_utf8(bytes) {
                Ok(text) => SqlValue::Text(text),
                Err(err) => SqlValue::Blob(err.into_bytes()),
            }
        }
        _ => SqlValue::Text(row.try_get_unchecked::<String, _>(index)?),
    })
}
