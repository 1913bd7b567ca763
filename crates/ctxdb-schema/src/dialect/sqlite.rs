//! SQLite dialect for migrations.
//!
//! SQLite has limited ALTER TABLE support: columns carrying PRIMARY KEY,
//! UNIQUE, expression defaults, or NOT NULL without a default cannot be added
//! in place. Those go through the table-rebuild path of the helper layer
//! (create shadow table, copy data, drop the old table, rename the shadow).

use crate::engine::EngineKind;
use crate::schema::{ColumnSchema, SqlType};

use super::MigrationDialect;

/// SQLite migration dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Generates the column-list copy used while rebuilding a table.
    #[must_use]
    pub fn copy_rows_sql(&self, from: &str, to: &str, columns: &[String]) -> String {
        let cols = self.quote_list(columns);
        format!(
            "INSERT INTO {} ({cols}) SELECT {cols} FROM {}",
            self.quote_identifier(to),
            self.quote_identifier(from)
        )
    }
}

impl MigrationDialect for SqliteDialect {
    fn engine(&self) -> EngineKind {
        EngineKind::Sqlite
    }

    fn type_name(&self, sql_type: &SqlType) -> String {
        match sql_type {
            SqlType::Integer | SqlType::SmallInt | SqlType::BigInt => "INTEGER".to_string(),
            SqlType::Text | SqlType::Varchar(_) | SqlType::Json => "TEXT".to_string(),
            SqlType::Boolean => "INTEGER".to_string(), // stored as 0/1
            SqlType::Timestamp => "TEXT".to_string(),
            SqlType::Real | SqlType::Double => "REAL".to_string(),
            SqlType::Blob => "BLOB".to_string(),
        }
    }

    fn auto_increment_keyword(&self) -> &'static str {
        "AUTOINCREMENT"
    }

    fn set_setting_sql(&self, setting: &str, value: &str) -> String {
        format!("PRAGMA {setting} = {value}")
    }

    fn show_setting_sql(&self, setting: &str) -> String {
        format!("PRAGMA {setting}")
    }

    fn foreign_key_check_sql(&self) -> Option<&'static str> {
        Some("PRAGMA foreign_key_check")
    }

    fn column_definition(&self, column: &ColumnSchema) -> String {
        // AUTOINCREMENT is only legal on a column typed exactly INTEGER PRIMARY KEY.
        let mut parts = vec![
            self.quote_identifier(&column.name),
            self.type_name(&column.sql_type),
        ];

        if column.primary_key {
            parts.push("PRIMARY KEY".to_string());
            if column.auto_increment {
                parts.push(self.auto_increment_keyword().to_string());
            }
        } else {
            if !column.nullable {
                parts.push("NOT NULL".to_string());
            }
            if column.unique {
                parts.push("UNIQUE".to_string());
            }
        }

        if let Some(default_sql) = self.render_default(&column.default) {
            // Expression defaults must be parenthesised unless they are one of
            // the CURRENT_* keywords.
            let needs_parens = column.default.is_expression()
                && !default_sql.to_ascii_uppercase().starts_with("CURRENT_");
            if needs_parens {
                parts.push(format!("DEFAULT ({})", default_sql));
            } else {
                parts.push(format!("DEFAULT {}", default_sql));
            }
        }

        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DefaultValue, IndexSchema, TableSchema};

    fn dialect() -> SqliteDialect {
        SqliteDialect::new()
    }

    #[test]
    fn test_create_table_simple() {
        let table = TableSchema::new("m_agents")
            .column(ColumnSchema::id("id"))
            .column(ColumnSchema::new("name", SqlType::Varchar(200)).not_null());

        let sql = dialect().create_table_sql(&table, false);
        assert!(sql.starts_with("CREATE TABLE \"m_agents\""));
        assert!(sql.contains("\"id\" INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(sql.contains("\"name\" TEXT NOT NULL"));
    }

    #[test]
    fn test_create_table_if_not_exists() {
        let table = TableSchema::new("m_layers").column(ColumnSchema::id("id"));
        let sql = dialect().create_table_sql(&table, true);
        assert!(sql.contains("IF NOT EXISTS"));
    }

    #[test]
    fn test_composite_primary_key() {
        let table = TableSchema::new("t_decision_tags")
            .column(ColumnSchema::new("decision_id", SqlType::BigInt).primary_key())
            .column(ColumnSchema::new("tag_id", SqlType::BigInt).primary_key());

        let sql = dialect().create_table_sql(&table, false);
        assert!(sql.contains("PRIMARY KEY (\"decision_id\", \"tag_id\")"));
        assert!(sql.contains("\"decision_id\" INTEGER NOT NULL"));
    }

    #[test]
    fn test_add_column() {
        let column = ColumnSchema::new("in_use", SqlType::Boolean)
            .not_null()
            .default(DefaultValue::Bool(false));
        let sql = dialect().add_column_sql("m_agents", &column, true);
        // SQLite has no ADD COLUMN IF NOT EXISTS; the guard check covers it.
        assert_eq!(
            sql,
            "ALTER TABLE \"m_agents\" ADD COLUMN \"in_use\" INTEGER NOT NULL DEFAULT 0"
        );
    }

    #[test]
    fn test_expression_defaults() {
        let ts = ColumnSchema::new("created_at", SqlType::Timestamp)
            .default(DefaultValue::Expression("CURRENT_TIMESTAMP".into()));
        assert!(dialect().column_definition(&ts).ends_with("DEFAULT CURRENT_TIMESTAMP"));

        let epoch = ColumnSchema::new("ts", SqlType::BigInt)
            .default(DefaultValue::Expression("unixepoch()".into()));
        assert!(dialect().column_definition(&epoch).ends_with("DEFAULT (unixepoch())"));
    }

    #[test]
    fn test_create_index() {
        let index = IndexSchema::new("idx_files_path", "m_files", ["path"]).unique();
        assert_eq!(
            dialect().create_index_sql(&index, false),
            "CREATE UNIQUE INDEX \"idx_files_path\" ON \"m_files\" (\"path\")"
        );
    }

    #[test]
    fn test_copy_rows() {
        let sql = dialect().copy_rows_sql(
            "m_agents",
            "_m_agents_shadow",
            &["id".to_string(), "name".to_string()],
        );
        assert_eq!(
            sql,
            "INSERT INTO \"_m_agents_shadow\" (\"id\", \"name\") SELECT \"id\", \"name\" FROM \"m_agents\""
        );
    }

    #[test]
    fn test_type_names() {
        let d = dialect();
        assert_eq!(d.type_name(&SqlType::BigInt), "INTEGER");
        assert_eq!(d.type_name(&SqlType::Varchar(255)), "TEXT");
        assert_eq!(d.type_name(&SqlType::Boolean), "INTEGER");
        assert_eq!(d.type_name(&SqlType::Timestamp), "TEXT");
        assert_eq!(d.type_name(&SqlType::Blob), "BLOB");
    }
}
