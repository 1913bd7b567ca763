//! PostgreSQL adapter.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Row as SqlxRow, TypeInfo, ValueRef};
use tracing::{debug, info};

use ctxdb_schema::{EngineKind, SqlValue};

use super::session::Session;
use super::{bind_values, statement_summary, ConnectionAdapter, Row};
use crate::config::{DatabaseConfig, Durability};
use crate::error::{Result, StoreError};

/// Adapter over a PostgreSQL server.
pub struct PostgresAdapter {
    session: Session<sqlx::Postgres>,
}

impl PostgresAdapter {
    /// Connects to the server described by `config`.
    ///
    /// The lock wait and durability settings named in the capability record
    /// are passed as startup options so every pooled connection carries them. Foreign keys are always
    /// enforced by the server.
    pub async fn open(config: &DatabaseConfig) -> Result<Self> {
        config.validate()?;
        if config.engine != EngineKind::Postgres {
            return Err(StoreError::Config(format!(
                "postgres adapter cannot open a {} configuration",
                config.engine
            )));
        }

        let host = config.host.clone().unwrap_or_default();
        let database = config.database.clone().unwrap_or_default();
        let lock_timeout = format!("{}ms", config.lock_timeout().as_millis());
        let synchronous_commit = match config.durability {
            Durability::Throughput => "off",
            Durability::Durability => "on",
        };

        let caps = EngineKind::Postgres.capabilities();
        let mut settings = vec![(caps.lock_timeout_setting, lock_timeout.as_str())];
        if let Some(setting) = caps.durability_setting {
            settings.push((setting, synchronous_commit));
        }

        let mut options = PgConnectOptions::new()
            .host(&host)
            .port(config.port_or_default())
            .username(config.user.as_deref().unwrap_or_default())
            .database(&database)
            .options(settings);
        if let Some(password) = &config.password {
            options = options.password(password);
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| {
                StoreError::connection(
                    format!("cannot connect to postgres at {host}/{database}"),
                    Some(e),
                )
            })?;

        info!(
            host = %host,
            database = %database,
            lock_timeout = %lock_timeout,
            synchronous_commit,
            "postgres connection pool opened"
        );
        Ok(Self::from_pool(pool))
    }

    /// Wraps an existing pool. Session settings are whatever the pool applies.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            session: Session::new(EngineKind::Postgres, pool),
        }
    }
}

#[async_trait]
impl ConnectionAdapter for PostgresAdapter {
    fn engine(&self) -> EngineKind {
        EngineKind::Postgres
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        debug!(engine = "postgres", sql = %sql, "execute");
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
        debug!(engine = "postgres", sql = %sql, "query");
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

fn decode_row(row: &PgRow) -> Result<Row> {
    let mut columns = Vec::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        let name = column.name().to_string();
        let value = decode_value(row, index)
            .map_err(|e| StoreError::query(format!("decode column {name}"), e))?;
        columns.push((name, value));
    }
    Ok(Row::new(columns))
}

fn decode_value(row: &PgRow, index: usize) -> std::result::Result<SqlValue, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }
    let type_name = raw.type_info().name().to_ascii_uppercase();
    Ok(match type_name.as_str() {
        "BOOL" => SqlValue::Bool(row.try_get::<bool, _>(index)?),
        "INT2" => SqlValue::Int(i64::from(row.try_get::<i16, _>(index)?)),
        "INT4" => SqlValue::Int(i64::from(row.try_get::<i32, _>(index)?)),
        "INT8" => SqlValue::Int(row.try_get::<i64, _>(index)?),
        "FLOAT4" => SqlValue::Float(f64::from(row.try_get::<f32, _>(index)?)),
        "FLOAT8" => SqlValue::Float(row.try_get::<f64, _>(index)?),
        "BYTEA" => SqlValue::Blob(row.try_get::<Vec<u8>, _>(index)?),
        "TIMESTAMP" => SqlValue::Text(row.try_get::<NaiveDateTime, _>(index)?.to_string()),
        "TIMESTAMPTZ" => SqlValue::Text(row.try_get::<DateTime<Utc>, _>(index)?.to_rfc3339()),
        "DATE" => SqlValue::Text(row.try_get::<NaiveDate, _>(index)?.to_string()),
        "JSON" | "JSONB" => {
            SqlValue::Text(row.try_get::<serde_json::Value, _>(index)?.to_string())
        }
        _ => SqlValue::Text(row.try_get_unchecked::<String, _>(index)?),
    })
}
