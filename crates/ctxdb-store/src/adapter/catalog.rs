//! Catalog queries per engine.
//!
//! Every query selects a single text column aliased `name`. Postgres and
//! MySQL catalog columns are cast to plain text so they decode uniformly.
//! Table checks match base tables only; views have their own check. SQLite
//! identifiers are case-insensitive, so its comparisons are too.

use ctxdb_schema::{EngineKind, SqlValue};

pub(crate) struct CatalogQuery {
    pub sql: &'static str,
    pub params: Vec<SqlValue>,
}

fn query(sql: &'static str, params: Vec<SqlValue>) -> CatalogQuery {
    CatalogQuery { sql, params }
}

pub(crate) fn tables(engine: EngineKind) -> CatalogQuery {
    let sql = match engine {
        EngineKind::Sqlite => {
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
             ORDER BY name"
        }
        EngineKind::Postgres => {
            "SELECT table_name::text AS name FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
             ORDER BY table_name"
        }
        EngineKind::Mysql => {
            "SELECT CAST(TABLE_NAME AS CHAR) AS name FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE' \
             ORDER BY TABLE_NAME"
        }
    };
    query(sql, Vec::new())
}

pub(crate) fn table_exists(engine: EngineKind, table: &str) -> CatalogQuery {
    let sql = match engine {
        EngineKind::Sqlite => {
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ? COLLATE NOCASE"
        }
        EngineKind::Postgres => {
            "SELECT table_name::text AS name FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
             AND table_name = $1"
        }
        EngineKind::Mysql => {
            "SELECT CAST(TABLE_NAME AS CHAR) AS name FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE' AND TABLE_NAME = ?"
        }
    };
    query(sql, vec![table.into()])
}

pub(crate) fn view_exists(engine: EngineKind, view: &str) -> CatalogQuery {
    let sql = match engine {
        EngineKind::Sqlite => {
            "SELECT name FROM sqlite_master WHERE type = 'view' AND name = ? COLLATE NOCASE"
        }
        EngineKind::Postgres => {
            "SELECT table_name::text AS name FROM information_schema.views \
             WHERE table_schema = current_schema() AND table_name = $1"
        }
        EngineKind::Mysql => {
            "SELECT CAST(TABLE_NAME AS CHAR) AS name FROM information_schema.VIEWS \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?"
        }
    };
    query(sql, vec![view.into()])
}

pub(crate) fn columns(engine: EngineKind, table: &str) -> CatalogQuery {
    let sql = match engine {
        EngineKind::Sqlite => "SELECT name FROM pragma_table_info(?) ORDER BY cid",
        EngineKind::Postgres => {
            "SELECT column_name::text AS name FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = $1 \
             ORDER BY ordinal_position"
        }
        EngineKind::Mysql => {
            "SELECT CAST(COLUMN_NAME AS CHAR) AS name FROM information_schema.COLUMNS \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
             ORDER BY ORDINAL_POSITION"
        }
    };
    query(sql, vec![table.into()])
}

pub(crate) fn column_exists(engine: EngineKind, table: &str, column: &str) -> CatalogQuery {
    let sql = match engine {
        EngineKind::Sqlite => "SELECT name FROM pragma_table_info(?) WHERE name = ? COLLATE NOCASE",
        EngineKind::Postgres => {
            "SELECT column_name::text AS name FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = $1 AND column_name = $2"
        }
        EngineKind::Mysql => {
            "SELECT CAST(COLUMN_NAME AS CHAR) AS name FROM information_schema.COLUMNS \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND COLUMN_NAME = ?"
        }
    };
    query(sql, vec![table.into(), column.into()])
}

pub(crate) fn indexes(engine: EngineKind, table: &str) -> CatalogQuery {
    match engine {
        // Constraint-backed indexes carry no SQL text.
        EngineKind::Sqlite => query(
            "SELECT name FROM sqlite_master \
             WHERE type = 'index' AND tbl_name = ? COLLATE NOCASE AND sql IS NOT NULL \
             ORDER BY name",
            vec![table.into()],
        ),
        EngineKind::Postgres => query(
            "SELECT ic.relname::text AS name \
             FROM pg_index x \
             JOIN pg_class ic ON ic.oid = x.indexrelid \
             JOIN pg_class tc ON tc.oid = x.indrelid \
             JOIN pg_namespace n ON n.oid = tc.relnamespace \
             WHERE n.nspname = current_schema() AND tc.relname = $1 \
             AND NOT EXISTS (SELECT 1 FROM pg_constraint k WHERE k.conindid = x.indexrelid) \
             ORDER BY ic.relname",
            vec![table.into()],
        ),
        EngineKind::Mysql => query(
            "SELECT DISTINCT CAST(INDEX_NAME AS CHAR) AS name FROM information_schema.STATISTICS \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND INDEX_NAME <> 'PRIMARY' \
             AND INDEX_NAME NOT IN ( \
                 SELECT CONSTRAINT_NAME FROM information_schema.TABLE_CONSTRAINTS \
                 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?) \
             ORDER BY name",
            vec![table.into(), table.into()],
        ),
    }
}

pub(crate) fn index_exists(engine: EngineKind, index: &str) -> CatalogQuery {
    let sql = match engine {
        EngineKind::Sqlite => {
            "SELECT name FROM sqlite_master WHERE type = 'index' AND name = ? COLLATE NOCASE"
        }
        EngineKind::Postgres => {
            "SELECT indexname::text AS name FROM pg_indexes \
             WHERE schemaname = current_schema() AND indexname = $1"
        }
        EngineKind::Mysql => {
            "SELECT DISTINCT CAST(INDEX_NAME AS CHAR) AS name FROM information_schema.STATISTICS \
             WHERE TABLE_SCHEMA = DATABASE() AND INDEX_NAME = ?"
        }
    };
    query(sql, vec![index.into()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders_match_engine() {
        let pg = column_exists(EngineKind::Postgres, "m_agents", "name");
        assert!(pg.sql.contains("$2"));
        assert_eq!(pg.params.len(), 2);

        let mysql = indexes(EngineKind::Mysql, "t_tasks");
        assert_eq!(mysql.sql.matches('?').count(), mysql.params.len());

        let sqlite = column_exists(EngineKind::Sqlite, "m_agents", "name");
        assert_eq!(sqlite.sql.matches('?').count(), 2);
    }

    #[test]
    fn test_every_query_selects_name() {
        for engine in EngineKind::ALL {
            for q in [
                tables(engine),
                table_exists(engine, "t"),
                view_exists(engine, "v"),
                columns(engine, "t"),
                column_exists(engine, "t", "c"),
                indexes(engine, "t"),
                index_exists(engine, "i"),
            ] {
                assert!(q.sql.contains("name"), "{engine}: {}", q.sql);
            }
        }
    }

    #[test]
    fn test_table_checks_exclude_views() {
        for engine in [EngineKind::Postgres, EngineKind::Mysql] {
            let q = table_exists(engine, "v_tagged");
            assert!(
                q.sql.to_ascii_uppercase().contains("'BASE TABLE'"),
                "{engine}: {}",
                q.sql
            );
        }
        assert!(table_exists(EngineKind::Sqlite, "t").sql.contains("type = 'table'"));
    }
}
