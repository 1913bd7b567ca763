//! The built-in units on every engine.
//!
//! PostgreSQL and MySQL runs need a disposable database and are skipped
//! unless `CTXDB_TEST_PG_HOST` / `CTXDB_TEST_MYSQL_HOST` are set. The other
//! connection parameters default to `ctxdb` and can be overridden with
//! `CTXDB_TEST_{PG,MYSQL}_{PORT,USER,PASSWORD,DATABASE}`.
//! Everything in the target database is rolled back before the run.

use std::collections::BTreeMap;
use std::sync::Arc;

use ctxdb_store::ledger::LEDGER_TABLE;
use ctxdb_store::prelude::*;

/// Table name to sorted column and index names.
type Shape = BTreeMap<String, (Vec<String>, Vec<String>)>;

fn server_config(prefix: &str, engine: EngineKind) -> Option<DatabaseConfig> {
    let var = |name: &str| std::env::var(format!("CTXDB_TEST_{prefix}_{name}")).ok();
    let host = var("HOST")?;
    let user = var("USER").unwrap_or_else(|| "ctxdb".to_string());
    let database = var("DATABASE").unwrap_or_else(|| "ctxdb".to_string());

    let mut config = match engine {
        EngineKind::Postgres => DatabaseConfig::postgres(host, user, database),
        EngineKind::Mysql => DatabaseConfig::mysql(host, user, database),
        EngineKind::Sqlite => return None,
    };
    if let Some(password) = var("PASSWORD") {
        config = config.with_password(password);
    }
    if let Some(port) = var("PORT").and_then(|p| p.parse().ok()) {
        config = config.with_port(port);
    }
    Some(config)
}

async fn shape(db: &Arc<dyn ConnectionAdapter>) -> Shape {
    db.snapshot()
        .await
        .unwrap()
        .into_iter()
        .map(|mut table| {
            table.columns.sort();
            table.indexes.sort();
            (table.name, (table.columns, table.indexes))
        })
        .collect()
}

/// Rolls back whatever a previous run left, then migrates from empty.
async fn migrate_from_empty(db: &Arc<dyn ConnectionAdapter>) -> Shape {
    let runner = MigrationRunner::new(db.clone(), builtin_migrations()).unwrap();
    runner.rollback_last(usize::MAX).await.unwrap();
    SafeDdl::new(db.as_ref())
        .drop_if_exists(ObjectKind::Table, LEDGER_TABLE)
        .await
        .unwrap();
    assert!(db.list_tables().await.unwrap().is_empty(), "database is not empty");

    runner.migrate_to_latest().await.unwrap();
    let migrated = shape(db).await;

    // Idempotence holds on every engine.
    assert!(runner.migrate_to_latest().await.unwrap().is_empty());
    assert_eq!(shape(db).await, migrated);

    // Seeds are keyed by name.
    let layers = db
        .query_one("SELECT COUNT(*) AS n FROM m_layers", &[])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(layers.get_i64("n").unwrap(), 5);

    migrated
}

async fn check_engine(config: DatabaseConfig, expected: &Shape) {
    let engine = config.engine;
    let db = AdapterFactory::create(&config).await.unwrap();
    let migrated = migrate_from_empty(&db).await;
    assert_eq!(&migrated, expected, "{engine} schema differs from sqlite");

    // Full rollback leaves only the ledger.
    let runner = MigrationRunner::new(db.clone(), builtin_migrations()).unwrap();
    runner.rollback_last(usize::MAX).await.unwrap();
    assert_eq!(db.list_tables().await.unwrap(), vec![LEDGER_TABLE]);

    db.close().await.unwrap();
}

async fn sqlite_shape() -> Shape {
    let db = AdapterFactory::create(&DatabaseConfig::sqlite_in_memory())
        .await
        .unwrap();
    migrate_from_empty(&db).await
}

#[tokio::test]
async fn test_sqlite_schema_shape() {
    let shape = sqlite_shape().await;
    assert_eq!(shape.len(), 12);
    let (columns, indexes) = &shape["t_file_changes"];
    assert_eq!(
        columns,
        &["agent_id", "change_type", "description", "file_id", "id", "ts"]
    );
    assert_eq!(indexes, &["idx_file_changes_file_ts"]);
}

#[tokio::test]
async fn test_postgres_matches_sqlite() {
    let Some(config) = server_config("PG", EngineKind::Postgres) else {
        eprintln!("CTXDB_TEST_PG_HOST not set; skipping");
        return;
    };
    check_engine(config, &sqlite_shape().await).await;
}

#[tokio::test]
async fn test_mysql_matches_sqlite() {
    let Some(config) = server_config("MYSQL", EngineKind::Mysql) else {
        eprintln!("CTXDB_TEST_MYSQL_HOST not set; skipping");
        return;
    };
    check_engine(config, &sqlite_shape().await).await;
}
