//! PostgreSQL dialect for migrations.

use crate::engine::EngineKind;
use crate::schema::{ColumnSchema, SqlType};

use super::MigrationDialect;

/// PostgreSQL dialect for migration SQL generation.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Creates a new PostgreSQL dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl MigrationDialect for PostgresDialect {
    fn engine(&self) -> EngineKind {
        EngineKind::Postgres
    }

    fn type_name(&self, sql_type: &SqlType) -> String {
        match sql_type {
            SqlType::Integer => "INTEGER".to_string(),
            SqlType::BigInt => "BIGINT".to_string(),
            SqlType::SmallInt => "SMALLINT".to_string(),
            SqlType::Text => "TEXT".to_string(),
            SqlType::Varchar(len) => format!("VARCHAR({})", len),
            SqlType::Boolean => "BOOLEAN".to_string(),
            SqlType::Timestamp => "TIMESTAMP".to_string(),
            SqlType::Real => "REAL".to_string(),
            SqlType::Double => "DOUBLE PRECISION".to_string(),
            SqlType::Blob => "BYTEA".to_string(),
            SqlType::Json => "JSONB".to_string(),
        }
    }

    fn auto_increment_keyword(&self) -> &'static str {
        // PostgreSQL expresses auto-increment through SERIAL types.
        ""
    }

    fn column_definition(&self, column: &ColumnSchema) -> String {
        let data_type = if column.auto_increment && column.primary_key {
            match column.sql_type {
                SqlType::Integer | SqlType::SmallInt => "SERIAL".to_string(),
                SqlType::BigInt => "BIGSERIAL".to_string(),
                _ => self.type_name(&column.sql_type),
            }
        } else {
            self.type_name(&column.sql_type)
        };

        let mut sql = format!("{} {}", self.quote_identifier(&column.name), data_type);

        if column.primary_key {
            sql.push_str(" PRIMARY KEY");
        } else {
            if !column.nullable {
                sql.push_str(" NOT NULL");
            }
            if column.unique {
                sql.push_str(" UNIQUE");
            }
        }

        if let Some(default_sql) = self.render_default(&column.default) {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default_sql);
        }

        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DefaultValue, ForeignKeyAction, TableSchema};

    fn dialect() -> PostgresDialect {
        PostgresDialect::new()
    }

    #[test]
    fn test_serial_primary_key() {
        let table = TableSchema::new("t_tasks")
            .column(ColumnSchema::id("id"))
            .column(ColumnSchema::new("title", SqlType::Varchar(200)).not_null());

        let sql = dialect().create_table_sql(&table, true);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"t_tasks\""));
        assert!(sql.contains("\"id\" BIGSERIAL PRIMARY KEY"));
        assert!(!sql.contains("AUTOINCREMENT"));
    }

    #[test]
    fn test_add_column_if_not_exists() {
        let column = ColumnSchema::new("is_reusable", SqlType::Boolean)
            .not_null()
            .default(DefaultValue::Bool(true));
        assert_eq!(
            dialect().add_column_sql("m_agents", &column, true),
            "ALTER TABLE \"m_agents\" ADD COLUMN IF NOT EXISTS \"is_reusable\" BOOLEAN NOT NULL DEFAULT TRUE"
        );
    }

    #[test]
    fn test_add_column_with_reference() {
        let column = ColumnSchema::new("layer_id", SqlType::BigInt).references(
            "m_layers",
            "id",
            ForeignKeyAction::Restrict,
        );
        let sql = dialect().add_column_sql("t_tasks", &column, false);
        assert!(sql.ends_with("REFERENCES \"m_layers\" (\"id\") ON DELETE RESTRICT"));
    }

    #[test]
    fn test_type_names() {
        let d = dialect();
        assert_eq!(d.type_name(&SqlType::BigInt), "BIGINT");
        assert_eq!(d.type_name(&SqlType::Varchar(255)), "VARCHAR(255)");
        assert_eq!(d.type_name(&SqlType::Blob), "BYTEA");
        assert_eq!(d.type_name(&SqlType::Json), "JSONB");
    }
}
