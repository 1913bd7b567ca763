//! Guarded structural operations.
//!
//! Every helper re-checks the live catalog before acting, so a migration unit
//! written against [`SafeDdl`] can run on any engine, any number of times,
//! against a schema that may already be partly (or entirely) in place. Only an
//! explicit existence confirmation suppresses a statement; a failing guard
//! check propagates as an error.
//!
//! Each helper logs exactly one line saying whether it changed something or
//! found the object already in the wanted state.

mod rebuild;

pub(crate) use rebuild::{check_foreign_keys, restore_foreign_keys, suspend_foreign_keys};

use tracing::{debug, info};

use ctxdb_schema::dialect::MigrationDialect;
use ctxdb_schema::schema::{ColumnSchema, IndexSchema, TableSchema};
use ctxdb_schema::{Capabilities, SqlValue};

use crate::adapter::ConnectionAdapter;
use crate::error::{Result, StoreError};

use rebuild::{rebuild_table, Change};

/// Outcome of a guarded create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Created {
    /// Whether a statement was executed.
    pub created: bool,
}

/// Outcome of [`SafeDdl::add_column_if_absent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Added {
    /// Whether the column was added.
    pub added: bool,
    /// Whether the table had to be rebuilt to add it.
    pub rebuilt: bool,
}

/// Outcome of a guarded drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dropped {
    /// Whether the object existed and was dropped.
    pub dropped: bool,
}

/// Outcome of [`SafeDdl::rename_column_if_present`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Renamed {
    /// Whether the column was renamed.
    pub renamed: bool,
}

/// Outcome of [`SafeDdl::insert_if_absent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inserted {
    /// Whether a row was inserted.
    pub inserted: bool,
}

/// Kind of object for [`SafeDdl::drop_if_exists`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind<'a> {
    /// A table.
    Table,
    /// An index on `table`.
    Index {
        /// Owning table; some engines need it to drop the index.
        table: &'a str,
    },
    /// A view.
    View,
}

impl ObjectKind<'_> {
    const fn label(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Index { .. } => "index",
            Self::View => "view",
        }
    }
}

/// Guarded structural operations over a [`ConnectionAdapter`].
#[derive(Clone, Copy)]
pub struct SafeDdl<'a> {
    adapter: &'a dyn ConnectionAdapter,
}

impl<'a> SafeDdl<'a> {
    /// Wraps `adapter`.
    #[must_use]
    pub fn new(adapter: &'a dyn ConnectionAdapter) -> Self {
        Self { adapter }
    }

    /// Returns the wrapped adapter.
    #[must_use]
    pub fn adapter(&self) -> &'a dyn ConnectionAdapter {
        self.adapter
    }

    fn dialect(&self) -> &'static dyn MigrationDialect {
        self.adapter.dialect()
    }

    fn capabilities(&self) -> &'static Capabilities {
        self.adapter.capabilities()
    }

    /// Creates `table` unless a table of that name exists.
    pub async fn create_table_if_absent(&self, table: &TableSchema) -> Result<Created> {
        if self.adapter.has_table(&table.name).await? {
            debug!(table = %table.name, "table already present");
            return Ok(Created { created: false });
        }
        let sql = self.dialect().create_table_sql(table, true);
        self.adapter
            .execute(&sql, &[])
            .await
            .map_err(|e| e.with_intent(format!("create table {}", table.name)))?;
        info!(table = %table.name, "table created");
        Ok(Created { created: true })
    }

    /// Adds `column` to `table` unless it is already there.
    ///
    /// On engines that cannot add a constrained column in place the table is
    /// rebuilt; see the `rebuild` module.
    pub async fn add_column_if_absent(&self, table: &str, column: &ColumnSchema) -> Result<Added> {
        if self.adapter.has_column(table, &column.name).await? {
            debug!(table, column = %column.name, "column already present");
            return Ok(Added {
                added: false,
                rebuilt: false,
            });
        }

        if !self.capabilities().add_column_with_constraints && column.needs_constraint_support() {
            rebuild_table(self.adapter, table, Change::AddColumn(column)).await?;
            info!(table, column = %column.name, "column added by table rebuild");
            return Ok(Added {
                added: true,
                rebuilt: true,
            });
        }

        let sql = self.dialect().add_column_sql(table, column, true);
        self.adapter
            .execute(&sql, &[])
            .await
            .map_err(|e| e.with_intent(format!("add column {}.{}", table, column.name)))?;
        info!(table, column = %column.name, "column added");
        Ok(Added {
            added: true,
            rebuilt: false,
        })
    }

    /// Creates `index` unless an index of that name exists. Columns keep the
    /// order given in the schema.
    pub async fn create_index_if_absent(&self, index: &IndexSchema) -> Result<Created> {
        if self.adapter.has_index(&index.name).await? {
            debug!(table = %index.table, index = %index.name, "index already present");
            return Ok(Created { created: false });
        }
        let sql = self.dialect().create_index_sql(index, true);
        self.adapter
            .execute(&sql, &[])
            .await
            .map_err(|e| e.with_intent(format!("create index {}", index.name)))?;
        info!(
            table = %index.table,
            index = %index.name,
            columns = %index.columns.join(", "),
            "index created"
        );
        Ok(Created { created: true })
    }

    /// Drops the named object if it exists. Never fails because the object is
    /// already gone.
    pub async fn drop_if_exists(&self, kind: ObjectKind<'_>, name: &str) -> Result<Dropped> {
        let exists = match kind {
            ObjectKind::Table => self.adapter.has_table(name).await?,
            ObjectKind::Index { .. } => self.adapter.has_index(name).await?,
            ObjectKind::View => self.adapter.has_view(name).await?,
        };
        if !exists {
            debug!(kind = kind.label(), name, "already absent");
            return Ok(Dropped { dropped: false });
        }

        let dialect = self.dialect();
        let sql = match kind {
            ObjectKind::Table => dialect.drop_table_sql(name, true),
            ObjectKind::Index { table } => dialect.drop_index_sql(name, table, true),
            ObjectKind::View => dialect.drop_view_sql(name, true),
        };
        self.adapter
            .execute(&sql, &[])
            .await
            .map_err(|e| e.with_intent(format!("drop {} {}", kind.label(), name)))?;
        info!(kind = kind.label(), name, "dropped");
        Ok(Dropped { dropped: true })
    }

    /// Drops `column` from `table` if both exist.
    ///
    /// Engines whose in-place `DROP COLUMN` refuses indexed or constrained
    /// columns go through a table rebuild instead.
    pub async fn drop_column_if_present(&self, table: &str, column: &str) -> Result<Dropped> {
        if !self.adapter.has_table(table).await? || !self.adapter.has_column(table, column).await? {
            debug!(table, column, "column already absent");
            return Ok(Dropped { dropped: false });
        }

        let caps = self.capabilities();
        if !caps.drop_column {
            rebuild_table(self.adapter, table, Change::DropColumn(column)).await?;
            info!(table, column, "column dropped by table rebuild");
            return Ok(Dropped { dropped: true });
        }

        let sql = self.dialect().drop_column_sql(table, column);
        self.adapter
            .execute(&sql, &[])
            .await
            .map_err(|e| e.with_intent(format!("drop column {table}.{column}")))?;
        info!(table, column, "column dropped");
        Ok(Dropped { dropped: true })
    }

    /// Renames `from` to `to` on `table`. A no-op when `to` already exists or
    /// `from` is gone; data is never dropped and re-created.
    pub async fn rename_column_if_present(
        &self,
        table: &str,
        from: &str,
        to: &str,
    ) -> Result<Renamed> {
        if self.adapter.has_column(table, to).await? {
            debug!(table, from, to, "column already renamed");
            return Ok(Renamed { renamed: false });
        }
        if !self.adapter.has_column(table, from).await? {
            debug!(table, from, to, "column to rename is absent; skipped");
            return Ok(Renamed { renamed: false });
        }
        let sql = self.dialect().rename_column_sql(table, from, to);
        self.adapter
            .execute(&sql, &[])
            .await
            .map_err(|e| e.with_intent(format!("rename column {table}.{from} to {to}")))?;
        info!(table, from, to, "column renamed");
        Ok(Renamed { renamed: true })
    }

    /// Inserts `values` into `table` unless a row with the same natural key
    /// exists. `key_column` must be one of the columns in `values`.
    pub async fn insert_if_absent(
        &self,
        table: &str,
        key_column: &str,
        values: &[(&str, SqlValue)],
    ) -> Result<Inserted> {
        let key = values
            .iter()
            .find(|(column, _)| *column == key_column)
            .map(|(_, value)| value.clone())
            .ok_or_else(|| {
                StoreError::Config(format!(
                    "seed row for {table} does not include its key column {key_column}"
                ))
            })?;

        if self.row_exists(table, key_column, &key).await? {
            debug!(table, key = %key.to_sql_inline(), "row already present");
            return Ok(Inserted { inserted: false });
        }

        let dialect = self.dialect();
        let columns: Vec<String> = values.iter().map(|(c, _)| (*c).to_string()).collect();
        let placeholders = (1..=values.len())
            .map(|i| dialect.placeholder(i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            dialect.quote_identifier(table),
            dialect.quote_list(&columns),
            placeholders
        );
        let params: Vec<SqlValue> = values.iter().map(|(_, v)| v.clone()).collect();
        self.adapter.execute(&sql, &params).await.map_err(|e| {
            e.with_intent(format!("seed {table} row {key_column} = {}", key.to_sql_inline()))
        })?;
        info!(table, key = %key.to_sql_inline(), "row inserted");
        Ok(Inserted { inserted: true })
    }

    /// Deletes the row of `table` whose `key_column` equals `key`, if any.
    pub async fn delete_if_present(
        &self,
        table: &str,
        key_column: &str,
        key: SqlValue,
    ) -> Result<Dropped> {
        if !self.adapter.has_table(table).await? {
            debug!(table, key = %key.to_sql_inline(), "table absent; nothing to delete");
            return Ok(Dropped { dropped: false });
        }
        let dialect = self.dialect();
        let sql = format!(
            "DELETE FROM {} WHERE {} = {}",
            dialect.quote_identifier(table),
            dialect.quote_identifier(key_column),
            dialect.placeholder(1)
        );
        let affected = self
            .adapter
            .execute(&sql, std::slice::from_ref(&key))
            .await
            .map_err(|e| {
                e.with_intent(format!("delete {table} row {key_column} = {}", key.to_sql_inline()))
            })?;
        if affected == 0 {
            debug!(table, key = %key.to_sql_inline(), "row already absent");
        } else {
            info!(table, key = %key.to_sql_inline(), "row deleted");
        }
        Ok(Dropped {
            dropped: affected > 0,
        })
    }

    async fn row_exists(&self, table: &str, key_column: &str, key: &SqlValue) -> Result<bool> {
        let dialect = self.dialect();
        let sql = format!(
            "SELECT 1 AS present FROM {} WHERE {} = {}",
            dialect.quote_identifier(table),
            dialect.quote_identifier(key_column),
            dialect.placeholder(1)
        );
        Ok(self
            .adapter
            .query_one(&sql, std::slice::from_ref(key))
            .await?
            .is_some())
    }
}
