//! MySQL dialect for migrations.
//!
//! MySQL commits implicitly around every structural statement, ignores inline
//! column `REFERENCES` clauses, and has no `IF [NOT] EXISTS` for indexes.

use crate::engine::EngineKind;
use crate::schema::{ColumnSchema, SqlType};

use super::MigrationDialect;

/// MySQL migration dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    /// Creates a new MySQL dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl MigrationDialect for MysqlDialect {
    fn engine(&self) -> EngineKind {
        EngineKind::Mysql
    }

    fn type_name(&self, sql_type: &SqlType) -> String {
        match sql_type {
            SqlType::Integer => "INT".to_string(),
            SqlType::BigInt => "BIGINT".to_string(),
            SqlType::SmallInt => "SMALLINT".to_string(),
            SqlType::Text => "TEXT".to_string(),
            SqlType::Varchar(len) => format!("VARCHAR({})", len),
            SqlType::Boolean => "TINYINT(1)".to_string(),
            SqlType::Timestamp => "DATETIME".to_string(),
            SqlType::Real => "FLOAT".to_string(),
            SqlType::Double => "DOUBLE".to_string(),
            SqlType::Blob => "LONGBLOB".to_string(),
            SqlType::Json => "JSON".to_string(),
        }
    }

    fn auto_increment_keyword(&self) -> &'static str {
        "AUTO_INCREMENT"
    }

    fn set_setting_sql(&self, setting: &str, value: &str) -> String {
        format!("SET SESSION {setting} = {value}")
    }

    fn show_setting_sql(&self, setting: &str) -> String {
        format!("SELECT @@SESSION.{setting} AS {setting}")
    }

    fn add_column_sql(&self, table: &str, column: &ColumnSchema, _if_not_exists: bool) -> String {
        let mut sql = format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_identifier(table),
            self.column_definition(column)
        );
        if let Some(fk) = &column.references {
            sql.push_str(&format!(
                ", ADD CONSTRAINT {} FOREIGN KEY ({}) {}",
                self.quote_identifier(&self.foreign_key_name(table, &column.name)),
                self.quote_identifier(&column.name),
                self.references_clause(fk)
            ));
        }
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ForeignKeyAction, TableSchema};

    fn dialect() -> MysqlDialect {
        MysqlDialect::new()
    }

    #[test]
    fn test_auto_increment_primary_key() {
        let table = TableSchema::new("m_tags")
            .column(ColumnSchema::id("id"))
            .column(ColumnSchema::new("name", SqlType::Varchar(100)).not_null().unique());

        let sql = dialect().create_table_sql(&table, true);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS `m_tags`"));
        assert!(sql.contains("`id` BIGINT PRIMARY KEY AUTO_INCREMENT"));
        assert!(sql.contains("`name` VARCHAR(100) NOT NULL UNIQUE"));
    }

    #[test]
    fn test_add_column_with_reference_uses_constraint_clause() {
        let column = ColumnSchema::new("agent_id", SqlType::BigInt).references(
            "m_agents",
            "id",
            ForeignKeyAction::SetNull,
        );
        assert_eq!(
            dialect().add_column_sql("t_file_changes", &column, true),
            "ALTER TABLE `t_file_changes` ADD COLUMN `agent_id` BIGINT, \
             ADD CONSTRAINT `fk_t_file_changes_agent_id` FOREIGN KEY (`agent_id`) REFERENCES `m_agents` (`id`) ON DELETE SET NULL"
        );
    }

    #[test]
    fn test_type_names() {
        let d = dialect();
        assert_eq!(d.type_name(&SqlType::Boolean), "TINYINT(1)");
        assert_eq!(d.type_name(&SqlType::Timestamp), "DATETIME");
        assert_eq!(d.type_name(&SqlType::Varchar(64)), "VARCHAR(64)");
    }
}
