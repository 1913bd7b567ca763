//! Database dialect implementations.
//!
//! Each dialect knows how to spell the structural statements the migration
//! layer needs for one engine. Shared spelling lives in the trait's default
//! methods; engines override only where their syntax differs. Whether a
//! clause such as `IF NOT EXISTS` may be emitted at all is decided by the
//! engine's [`Capabilities`], never by the caller.

mod mysql;
mod postgres;
mod sqlite;

pub use mysql::MysqlDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use crate::engine::{Capabilities, EngineKind};
use crate::schema::{ColumnSchema, DefaultValue, ForeignKeyRef, IndexSchema, SqlType, TableSchema};

static SQLITE: SqliteDialect = SqliteDialect::new();
static POSTGRES: PostgresDialect = PostgresDialect::new();
static MYSQL: MysqlDialect = MysqlDialect::new();

/// Returns the dialect for an engine.
#[must_use]
pub fn dialect_for(engine: EngineKind) -> &'static dyn MigrationDialect {
    match engine {
        EngineKind::Sqlite => &SQLITE,
        EngineKind::Postgres => &POSTGRES,
        EngineKind::Mysql => &MYSQL,
    }
}

/// Trait for database-specific SQL generation.
pub trait MigrationDialect: Send + Sync {
    /// Returns the engine this dialect targets.
    fn engine(&self) -> EngineKind;

    /// Returns the dialect name.
    fn name(&self) -> &'static str {
        self.engine().as_str()
    }

    /// Returns the engine's capability record.
    fn capabilities(&self) -> &'static Capabilities {
        self.engine().capabilities()
    }

    /// Returns the SQL type name for the given type.
    fn type_name(&self, sql_type: &SqlType) -> String;

    /// Returns the auto-increment keyword for this dialect.
    fn auto_increment_keyword(&self) -> &'static str;

    /// Quote an identifier (table name, column name, etc.).
    fn quote_identifier(&self, name: &str) -> String {
        let q = self.capabilities().identifier_quote;
        let escaped = name.replace(q, &format!("{q}{q}"));
        format!("{q}{escaped}{q}")
    }

    /// Returns the bind placeholder for the 1-based parameter `index`.
    fn placeholder(&self, index: usize) -> String {
        if self.capabilities().numbered_placeholders {
            format!("${index}")
        } else {
            "?".to_string()
        }
    }

    /// Renders a default value, honouring native booleans.
    fn render_default(&self, default: &DefaultValue) -> Option<String> {
        match default {
            DefaultValue::Bool(b) if self.capabilities().native_boolean => {
                Some(if *b { "TRUE" } else { "FALSE" }.to_string())
            }
            other => other.to_sql(),
        }
    }

    /// Generates column definition SQL (without foreign key clauses).
    fn column_definition(&self, column: &ColumnSchema) -> String {
        let mut parts = vec![
            self.quote_identifier(&column.name),
            self.type_name(&column.sql_type),
        ];

        if column.primary_key {
            parts.push("PRIMARY KEY".to_string());
            if column.auto_increment {
                parts.push(self.auto_increment_keyword().to_string());
            }
        }

        if !column.nullable && !column.primary_key {
            parts.push("NOT NULL".to_string());
        }

        if column.unique && !column.primary_key {
            parts.push("UNIQUE".to_string());
        }

        if let Some(default_sql) = self.render_default(&column.default) {
            parts.push(format!("DEFAULT {}", default_sql));
        }

        parts.join(" ")
    }

    /// Renders a `REFERENCES` clause.
    fn references_clause(&self, fk: &ForeignKeyRef) -> String {
        format!(
            "REFERENCES {} ({}) ON DELETE {}",
            self.quote_identifier(&fk.table),
            self.quote_identifier(&fk.column),
            fk.on_delete.to_sql()
        )
    }

    /// Name given to the foreign key constraint on `table.column`.
    ///
    /// Naming constraints keeps engines that auto-create a backing index from
    /// inventing their own index names.
    fn foreign_key_name(&self, table: &str, column: &str) -> String {
        format!("fk_{table}_{column}")
    }

    /// Generates SQL for creating a table.
    ///
    /// Foreign keys are emitted as table constraints because not every engine
    /// honours inline column references.
    fn create_table_sql(&self, table: &TableSchema, if_not_exists: bool) -> String {
        let mut sql = String::from("CREATE TABLE ");
        if if_not_exists && self.capabilities().create_table_if_not_exists {
            sql.push_str("IF NOT EXISTS ");
        }
        sql.push_str(&self.quote_identifier(&table.name));
        sql.push_str(" (\n");

        let inline_pk = table.has_inline_primary_key();
        let mut defs: Vec<String> = table
            .columns
            .iter()
            .map(|c| {
                if c.primary_key && !inline_pk {
                    let mut plain = c.clone();
                    plain.primary_key = false;
                    plain.nullable = false;
                    self.column_definition(&plain)
                } else {
                    self.column_definition(c)
                }
            })
            .collect();

        if !table.primary_key.is_empty() && !inline_pk {
            defs.push(format!("PRIMARY KEY ({})", self.quote_list(&table.primary_key)));
        }

        for columns in &table.unique_constraints {
            defs.push(format!("UNIQUE ({})", self.quote_list(columns)));
        }

        for column in &table.columns {
            if let Some(fk) = &column.references {
                defs.push(format!(
                    "CONSTRAINT {} FOREIGN KEY ({}) {}",
                    self.quote_identifier(&self.foreign_key_name(&table.name, &column.name)),
                    self.quote_identifier(&column.name),
                    self.references_clause(fk)
                ));
            }
        }

        sql.push_str("  ");
        sql.push_str(&defs.join(",\n  "));
        sql.push_str("\n)");
        sql
    }

    /// Generates SQL for adding a column.
    fn add_column_sql(&self, table: &str, column: &ColumnSchema, if_not_exists: bool) -> String {
        let mut sql = format!("ALTER TABLE {} ADD COLUMN ", self.quote_identifier(table));
        if if_not_exists && self.capabilities().add_column_if_not_exists {
            sql.push_str("IF NOT EXISTS ");
        }
        sql.push_str(&self.column_definition(column));
        if let Some(fk) = &column.references {
            sql.push(' ');
            sql.push_str(&self.references_clause(fk));
        }
        sql
    }

    /// Generates SQL for creating an index. Column order is kept as given.
    fn create_index_sql(&self, index: &IndexSchema, if_not_exists: bool) -> String {
        let mut sql = String::from("CREATE ");
        if index.unique {
            sql.push_str("UNIQUE ");
        }
        sql.push_str("INDEX ");
        if if_not_exists && self.capabilities().create_index_if_not_exists {
            sql.push_str("IF NOT EXISTS ");
        }
        sql.push_str(&self.quote_identifier(&index.name));
        sql.push_str(" ON ");
        sql.push_str(&self.quote_identifier(&index.table));
        sql.push_str(" (");
        sql.push_str(&self.quote_list(&index.columns));
        sql.push(')');
        sql
    }

    /// Generates SQL for dropping a table.
    fn drop_table_sql(&self, name: &str, if_exists: bool) -> String {
        let mut sql = String::from("DROP TABLE ");
        if if_exists {
            sql.push_str("IF EXISTS ");
        }
        sql.push_str(&self.quote_identifier(name));
        sql
    }

    /// Generates SQL for dropping a view.
    fn drop_view_sql(&self, name: &str, if_exists: bool) -> String {
        let mut sql = String::from("DROP VIEW ");
        if if_exists {
            sql.push_str("IF EXISTS ");
        }
        sql.push_str(&self.quote_identifier(name));
        sql
    }

    /// Generates SQL for dropping an index that belongs to `table`.
    fn drop_index_sql(&self, name: &str, table: &str, if_exists: bool) -> String {
        let caps = self.capabilities();
        let mut sql = String::from("DROP INDEX ");
        if if_exists && caps.drop_index_if_exists {
            sql.push_str("IF EXISTS ");
        }
        sql.push_str(&self.quote_identifier(name));
        if caps.drop_index_requires_table {
            sql.push_str(" ON ");
            sql.push_str(&self.quote_identifier(table));
        }
        sql
    }

    /// Generates SQL for dropping a column.
    fn drop_column_sql(&self, table: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote_identifier(table),
            self.quote_identifier(column)
        )
    }

    /// Generates SQL for renaming a table.
    fn rename_table_sql(&self, old_name: &str, new_name: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME TO {}",
            self.quote_identifier(old_name),
            self.quote_identifier(new_name)
        )
    }

    /// Generates SQL for renaming a column.
    fn rename_column_sql(&self, table: &str, old_name: &str, new_name: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            self.quote_identifier(table),
            self.quote_identifier(old_name),
            self.quote_identifier(new_name)
        )
    }

    /// Generates the statement assigning a connection-scoped setting, such as
    /// one named in [`Capabilities::foreign_key_setting`].
    fn set_setting_sql(&self, setting: &str, value: &str) -> String {
        format!("SET {setting} = {value}")
    }

    /// Generates a query reading a connection-scoped setting into a single
    /// column named after the setting.
    fn show_setting_sql(&self, setting: &str) -> String {
        format!("SELECT current_setting('{setting}') AS {setting}")
    }

    /// Query listing rows whose foreign keys point at missing parents, on
    /// engines that can defer enforcement and check afterwards.
    fn foreign_key_check_sql(&self) -> Option<&'static str> {
        None
    }

    /// Quotes and comma-joins a list of identifiers.
    fn quote_list(&self, names: &[String]) -> String {
        names
            .iter()
            .map(|n| self.quote_identifier(n))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ForeignKeyAction;

    fn decisions() -> TableSchema {
        TableSchema::new("t_decisions")
            .column(ColumnSchema::id("id"))
            .column(ColumnSchema::new("key", SqlType::Varchar(200)).not_null().unique())
            .column(
                ColumnSchema::new("agent_id", SqlType::BigInt).references(
                    "m_agents",
                    "id",
                    ForeignKeyAction::SetNull,
                ),
            )
            .column(
                ColumnSchema::new("archived", SqlType::Boolean)
                    .not_null()
                    .default(DefaultValue::Bool(false)),
            )
    }

    #[test]
    fn test_dialect_for_matches_engine() {
        for engine in EngineKind::ALL {
            assert_eq!(dialect_for(engine).engine(), engine);
        }
    }

    #[test]
    fn test_every_dialect_names_the_same_columns() {
        for engine in EngineKind::ALL {
            let d = dialect_for(engine);
            let sql = d.create_table_sql(&decisions(), true);
            for name in ["t_decisions", "id", "key", "agent_id", "archived", "m_agents"] {
                assert!(
                    sql.contains(&d.quote_identifier(name)),
                    "{engine}: {name} missing from {sql}"
                );
            }
            assert!(
                sql.contains(&format!(
                    "CONSTRAINT {} FOREIGN KEY",
                    d.quote_identifier("fk_t_decisions_agent_id")
                )),
                "{engine}: {sql}"
            );
        }
    }

    #[test]
    fn test_boolean_defaults_follow_native_boolean() {
        let column = ColumnSchema::new("in_use", SqlType::Boolean)
            .not_null()
            .default(DefaultValue::Bool(true));
        assert!(
            dialect_for(EngineKind::Postgres)
                .column_definition(&column)
                .ends_with("DEFAULT TRUE")
        );
        assert!(
            dialect_for(EngineKind::Sqlite)
                .column_definition(&column)
                .ends_with("DEFAULT 1")
        );
        assert!(
            dialect_for(EngineKind::Mysql)
                .column_definition(&column)
                .ends_with("DEFAULT 1")
        );
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(dialect_for(EngineKind::Postgres).placeholder(2), "$2");
        assert_eq!(dialect_for(EngineKind::Sqlite).placeholder(2), "?");
        assert_eq!(dialect_for(EngineKind::Mysql).placeholder(2), "?");
    }

    #[test]
    fn test_quote_identifier_escapes_quote_char() {
        assert_eq!(
            dialect_for(EngineKind::Sqlite).quote_identifier("we\"ird"),
            "\"we\"\"ird\""
        );
        assert_eq!(dialect_for(EngineKind::Mysql).quote_identifier("a`b"), "`a``b`");
    }

    #[test]
    fn test_composite_index_keeps_column_order() {
        let index = IndexSchema::new("idx_decisions_layer_ts", "t_decisions", ["layer_id", "ts"]);
        for engine in EngineKind::ALL {
            let d = dialect_for(engine);
            let sql = d.create_index_sql(&index, true);
            let layer = sql.find(&d.quote_identifier("layer_id")).unwrap();
            let ts = sql.find(&d.quote_identifier("ts")).unwrap();
            assert!(layer < ts, "{engine}: {sql}");
        }
    }

    #[test]
    fn test_if_not_exists_only_where_supported() {
        let index = IndexSchema::new("idx_a", "t", ["a"]);
        assert!(
            dialect_for(EngineKind::Sqlite)
                .create_index_sql(&index, true)
                .contains("IF NOT EXISTS")
        );
        assert!(
            !dialect_for(EngineKind::Mysql)
                .create_index_sql(&index, true)
                .contains("IF NOT EXISTS")
        );
    }

    #[test]
    fn test_drop_index_names_table_where_required() {
        assert_eq!(
            dialect_for(EngineKind::Mysql).drop_index_sql("idx_a", "t", true),
            "DROP INDEX `idx_a` ON `t`"
        );
        assert_eq!(
            dialect_for(EngineKind::Postgres).drop_index_sql("idx_a", "t", true),
            "DROP INDEX IF EXISTS \"idx_a\""
        );
    }

    #[test]
    fn test_drop_view_and_table() {
        let d = dialect_for(EngineKind::Sqlite);
        assert_eq!(d.drop_view_sql("v_tagged", true), "DROP VIEW IF EXISTS \"v_tagged\"");
        assert_eq!(d.drop_table_sql("t_tasks", false), "DROP TABLE \"t_tasks\"");
    }

    #[test]
    fn test_session_settings_use_capability_names() {
        for engine in EngineKind::ALL {
            let d = dialect_for(engine);
            let caps = d.capabilities();
            let set = d.set_setting_sql(caps.lock_timeout_setting, "5");
            assert!(set.contains(caps.lock_timeout_setting), "{engine}: {set}");
            let show = d.show_setting_sql(caps.lock_timeout_setting);
            assert!(show.contains(caps.lock_timeout_setting), "{engine}: {show}");
        }

        let sqlite = dialect_for(EngineKind::Sqlite);
        assert_eq!(sqlite.set_setting_sql("foreign_keys", "OFF"), "PRAGMA foreign_keys = OFF");
        assert_eq!(sqlite.show_setting_sql("foreign_keys"), "PRAGMA foreign_keys");
        assert!(sqlite.foreign_key_check_sql().is_some());

        let mysql = dialect_for(EngineKind::Mysql);
        assert_eq!(
            mysql.set_setting_sql("foreign_key_checks", "1"),
            "SET SESSION foreign_key_checks = 1"
        );
        assert!(mysql.foreign_key_check_sql().is_none());
    }
}
