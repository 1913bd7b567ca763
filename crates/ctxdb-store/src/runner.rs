//! Migration runner.
//!
//! This module applies and rolls back versioned migration units against a
//! connection adapter, recording progress in the ledger.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::adapter::{with_transaction, ConnectionAdapter};
use crate::ddl::{check_foreign_keys, restore_foreign_keys, suspend_foreign_keys};
use crate::error::{Direction, Result, StoreError};
use crate::ledger::Ledger;

/// One versioned, self-checking schema or data change.
///
/// Both procedures must inspect the live schema before acting so that they
/// are no-ops when their target state already holds.
#[async_trait]
pub trait Migration: Send + Sync {
    /// Version, unique across all units. Units run in ascending order.
    fn version(&self) -> i64;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// Applies the change.
    async fn up(&self, adapter: &dyn ConnectionAdapter) -> Result<()>;

    /// Reverts the change.
    async fn down(&self, adapter: &dyn ConnectionAdapter) -> Result<()>;
}

/// Lifecycle of a unit within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    /// Not yet attempted.
    Pending,
    /// `up` or `down` is executing.
    Running,
    /// `up` completed and the ledger row is committed.
    Applied,
    /// `down` completed and the ledger row is removed.
    RolledBack,
    /// The procedure failed; the run stopped here.
    Failed,
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Applied => "applied",
            Self::RolledBack => "rolled back",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A unit's state at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitReport {
    /// Unit version.
    pub version: i64,
    /// Unit name.
    pub name: String,
    /// Final state.
    pub state: UnitState,
}

/// Outcome of [`MigrationRunner::migrate_to_latest`] or
/// [`MigrationRunner::rollback_last`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Direction of the run.
    pub direction: Direction,
    /// Every unit the run planned to touch, in execution order.
    pub units: Vec<UnitReport>,
}

impl MigrationReport {
    fn new(direction: Direction) -> Self {
        Self {
            direction,
            units: Vec::new(),
        }
    }

    fn plan(&mut self, unit: &dyn Migration) {
        self.units.push(UnitReport {
            version: unit.version(),
            name: unit.name().to_string(),
            state: UnitState::Pending,
        });
    }

    fn set(&mut self, index: usize, state: UnitState) {
        if let Some(unit) = self.units.get_mut(index) {
            unit.state = state;
        }
    }

    /// Returns whether the run touched nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Versions that reached `state`, in execution order.
    #[must_use]
    pub fn versions_in(&self, state: UnitState) -> Vec<i64> {
        self.units
            .iter()
            .filter(|u| u.state == state)
            .map(|u| u.version)
            .collect()
    }
}

/// Status of one unit as reported by [`MigrationRunner::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Unit version.
    pub version: i64,
    /// Unit name (from the ledger when the unit is not registered).
    pub name: String,
    /// When the unit was applied, if it was.
    pub applied_at: Option<DateTime<Utc>>,
    /// Whether a unit with this version is registered with the runner.
    pub registered: bool,
}

impl MigrationStatus {
    /// Returns whether the unit has been applied.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        self.applied_at.is_some()
    }
}

/// Applies and rolls back a fixed set of migration units.
///
/// The runner assumes exclusive use of its adapter for the duration of a
/// run. Units are executed strictly one after the other.
pub struct MigrationRunner {
    adapter: Arc<dyn ConnectionAdapter>,
    units: Vec<Box<dyn Migration>>,
}

impl MigrationRunner {
    /// Creates a runner over `units`, sorted by version.
    ///
    /// Fails with [`StoreError::Config`] when two units share a version.
    pub fn new(adapter: Arc<dyn ConnectionAdapter>, mut units: Vec<Box<dyn Migration>>) -> Result<Self> {
        units.sort_by_key(|unit| unit.version());
        if let Some(pair) = units.windows(2).find(|w| w[0].version() == w[1].version()) {
            return Err(StoreError::Config(format!(
                "migrations '{}' and '{}' share version {}",
                pair[0].name(),
                pair[1].name(),
                pair[0].version()
            )));
        }
        Ok(Self { adapter, units })
    }

    /// Returns the adapter.
    #[must_use]
    pub fn adapter(&self) -> &Arc<dyn ConnectionAdapter> {
        &self.adapter
    }

    /// Returns the registered units in version order.
    pub fn units(&self) -> impl Iterator<Item = &dyn Migration> {
        self.units.iter().map(AsRef::as_ref)
    }

    fn ledger(&self) -> Ledger<'_> {
        Ledger::new(self.adapter.as_ref())
    }

    fn find(&self, version: i64) -> Option<&dyn Migration> {
        self.units
            .binary_search_by_key(&version, |unit| unit.version())
            .ok()
            .map(|index| self.units[index].as_ref())
    }

    /// Returns registered units without a ledger row, in version order.
    pub async fn pending(&self) -> Result<Vec<&dyn Migration>> {
        let ledger = self.ledger();
        ledger.ensure_table().await?;
        let applied = ledger.applied_versions().await?;
        Ok(self
            .units()
            .filter(|unit| !applied.contains(&unit.version()))
            .collect())
    }

    /// Lists every registered unit and every ledger row, by version.
    pub async fn status(&self) -> Result<Vec<MigrationStatus>> {
        let ledger = self.ledger();
        ledger.ensure_table().await?;

        let mut statuses: BTreeMap<i64, MigrationStatus> = self
            .units()
            .map(|unit| {
                (
                    unit.version(),
                    MigrationStatus {
                        version: unit.version(),
                        name: unit.name().to_string(),
                        applied_at: None,
                        registered: true,
                    },
                )
            })
            .collect();

        for row in ledger.applied().await? {
            statuses
                .entry(row.version)
                .or_insert_with(|| MigrationStatus {
                    version: row.version,
                    name: row.name.clone(),
                    applied_at: None,
                    registered: false,
                })
                .applied_at = Some(row.applied_at);
        }
        Ok(statuses.into_values().collect())
    }

    /// Applies every pending unit in ascending version order.
    ///
    /// Stops at the first failure with [`StoreError::MigrationFailed`]; units
    /// before it stay applied, the failing unit and everything after it stay
    /// pending.
    pub async fn migrate_to_latest(&self) -> Result<MigrationReport> {
        let pending = self.pending().await?;
        let mut report = MigrationReport::new(Direction::Up);
        if pending.is_empty() {
            info!("database schema is up to date");
            return Ok(report);
        }

        info!(count = pending.len(), "applying pending migrations");
        for unit in &pending {
            report.plan(*unit);
        }

        for (index, unit) in pending.into_iter().enumerate() {
            report.set(index, UnitState::Running);
            info!(version = unit.version(), name = unit.name(), "applying migration");
            if let Err(err) = self.apply(unit).await {
                report.set(index, UnitState::Failed);
                warn!(
                    version = unit.version(),
                    name = unit.name(),
                    applied = ?report.versions_in(UnitState::Applied),
                    "migration run halted"
                );
                return Err(failed(unit, Direction::Up, err));
            }
            report.set(index, UnitState::Applied);
            info!(version = unit.version(), name = unit.name(), "migration applied");
        }
        Ok(report)
    }

    /// Rolls back the `n` most recently applied units, newest first.
    ///
    /// Stops at the first failure; older units are left untouched. A ledger
    /// row whose version has no registered unit fails with
    /// [`StoreError::UnknownMigration`].
    pub async fn rollback_last(&self, n: usize) -> Result<MigrationReport> {
        let ledger = self.ledger();
        ledger.ensure_table().await?;
        let targets = ledger.last_applied(n).await?;
        let mut report = MigrationReport::new(Direction::Down);
        if targets.is_empty() {
            info!("nothing to roll back");
            return Ok(report);
        }

        for (index, row) in targets.iter().enumerate() {
            let unit = self.find(row.version).ok_or_else(|| StoreError::UnknownMigration {
                version: row.version,
                name: row.name.clone(),
            })?;
            if unit.name() != row.name {
                warn!(
                    version = row.version,
                    recorded = %row.name,
                    registered = unit.name(),
                    "ledger name differs from the registered unit"
                );
            }

            report.plan(unit);
            report.set(index, UnitState::Running);
            info!(version = unit.version(), name = unit.name(), "rolling back migration");
            if let Err(err) = self.revert(unit).await {
                report.set(index, UnitState::Failed);
                return Err(failed(unit, Direction::Down, err));
            }
            report.set(index, UnitState::RolledBack);
            info!(version = unit.version(), name = unit.name(), "migration rolled back");
        }
        Ok(report)
    }

    async fn apply(&self, unit: &dyn Migration) -> Result<()> {
        self.run_unit(unit, Direction::Up).await
    }

    async fn revert(&self, unit: &dyn Migration) -> Result<()> {
        self.run_unit(unit, Direction::Down).await
    }

    /// Runs one procedure and its ledger write.
    ///
    /// With transactional DDL both share one transaction. On SQLite foreign
    /// key enforcement is suspended around that transaction, since table
    /// rebuilds would otherwise fire `ON DELETE` actions, and the integrity
    /// check runs before commit instead.
    async fn run_unit(&self, unit: &dyn Migration, direction: Direction) -> Result<()> {
        let adapter = self.adapter.as_ref();

        if !adapter.capabilities().transactional_ddl {
            debug!(
                engine = %adapter.engine(),
                "running migration without a transaction; structural statements commit individually"
            );
            step(adapter, unit, direction).await?;
            return record(adapter, unit, direction).await;
        }

        let suspended = suspend_foreign_keys(adapter).await?;
        let result = with_transaction(adapter, |tx| {
            Box::pin(async move {
                step(tx, unit, direction).await?;
                check_foreign_keys(tx).await?;
                record(tx, unit, direction).await
            })
        })
        .await;

        if suspended {
            if let Err(err) = restore_foreign_keys(adapter).await {
                if result.is_ok() {
                    return Err(err);
                }
                warn!(error = %err, "could not restore foreign key enforcement");
            }
        }
        result
    }
}

async fn step(adapter: &dyn ConnectionAdapter, unit: &dyn Migration, direction: Direction) -> Result<()> {
    match direction {
        Direction::Up => unit.up(adapter).await,
        Direction::Down => unit.down(adapter).await,
    }
}

async fn record(adapter: &dyn ConnectionAdapter, unit: &dyn Migration, direction: Direction) -> Result<()> {
    let ledger = Ledger::new(adapter);
    match direction {
        Direction::Up => ledger.record_applied(unit.version(), unit.name()).await,
        Direction::Down => ledger.record_unapplied(unit.version(), unit.name()).await,
    }
}

fn failed(unit: &dyn Migration, direction: Direction, source: StoreError) -> StoreError {
    StoreError::MigrationFailed {
        version: unit.version(),
        name: unit.name().to_string(),
        direction,
        source: Box::new(source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::SqliteAdapter;
    use crate::ddl::{ObjectKind, SafeDdl};
    use ctxdb_schema::schema::{ColumnSchema, ForeignKeyAction, SqlType, TableSchema};

    /// Creates one table on `up`, drops it on `down`.
    struct CreateTable {
        version: i64,
        name: &'static str,
        table: &'static str,
    }

    #[async_trait]
    impl Migration for CreateTable {
        fn version(&self) -> i64 {
            self.version
        }

        fn name(&self) -> &str {
            self.name
        }

        async fn up(&self, adapter: &dyn ConnectionAdapter) -> Result<()> {
            let table = TableSchema::new(self.table)
                .column(ColumnSchema::id("id"))
                .column(ColumnSchema::new("label", SqlType::Text));
            SafeDdl::new(adapter).create_table_if_absent(&table).await?;
            Ok(())
        }

        async fn down(&self, adapter: &dyn ConnectionAdapter) -> Result<()> {
            SafeDdl::new(adapter)
                .drop_if_exists(ObjectKind::Table, self.table)
                .await?;
            Ok(())
        }
    }

    /// Creates a table, then fails.
    struct Broken {
        version: i64,
    }

    #[async_trait]
    impl Migration for Broken {
        fn version(&self) -> i64 {
            self.version
        }

        fn name(&self) -> &str {
            "broken"
        }

        async fn up(&self, adapter: &dyn ConnectionAdapter) -> Result<()> {
            adapter
                .execute("CREATE TABLE half_done (id INTEGER)", &[])
                .await?;
            adapter.execute("INSERT INTO missing_table VALUES (1)", &[]).await?;
            Ok(())
        }

        async fn down(&self, _adapter: &dyn ConnectionAdapter) -> Result<()> {
            Ok(())
        }
    }

    /// Leaves a child row pointing at a missing parent.
    struct Dangling;

    #[async_trait]
    impl Migration for Dangling {
        fn version(&self) -> i64 {
            5
        }

        fn name(&self) -> &str {
            "dangling"
        }

        async fn up(&self, adapter: &dyn ConnectionAdapter) -> Result<()> {
            let ddl = SafeDdl::new(adapter);
            ddl.create_table_if_absent(&TableSchema::new("parents").column(ColumnSchema::id("id")))
                .await?;
            ddl.create_table_if_absent(
                &TableSchema::new("children").column(ColumnSchema::id("id")).column(
                    ColumnSchema::new("parent_id", SqlType::BigInt).references(
                        "parents",
                        "id",
                        ForeignKeyAction::Cascade,
                    ),
                ),
            )
            .await?;
            adapter
                .execute("INSERT INTO children (parent_id) VALUES (42)", &[])
                .await?;
            Ok(())
        }

        async fn down(&self, _adapter: &dyn ConnectionAdapter) -> Result<()> {
            Ok(())
        }
    }

    fn unit(version: i64, table: &'static str) -> Box<dyn Migration> {
        Box::new(CreateTable {
            version,
            name: table,
            table,
        })
    }

    async fn create_test_adapter() -> Arc<dyn ConnectionAdapter> {
        Arc::new(
            SqliteAdapter::in_memory()
                .await
                .expect("Failed to open in-memory SQLite database"),
        )
    }

    async fn ledger_versions(adapter: &Arc<dyn ConnectionAdapter>) -> Vec<i64> {
        Ledger::new(adapter.as_ref())
            .applied()
            .await
            .unwrap()
            .iter()
            .map(|m| m.version)
            .collect()
    }

    #[tokio::test]
    async fn test_migrate_applies_in_version_order() {
        let db = create_test_adapter().await;
        let runner = MigrationRunner::new(
            db.clone(),
            vec![unit(3, "gamma"), unit(1, "alpha"), unit(2, "beta")],
        )
        .unwrap();

        let report = runner.migrate_to_latest().await.unwrap();
        assert_eq!(report.direction, Direction::Up);
        assert_eq!(report.versions_in(UnitState::Applied), vec![1, 2, 3]);
        assert_eq!(ledger_versions(&db).await, vec![1, 2, 3]);
        assert!(db.has_table("gamma").await.unwrap());
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let db = create_test_adapter().await;
        let runner = MigrationRunner::new(db.clone(), vec![unit(1, "alpha")]).unwrap();

        runner.migrate_to_latest().await.unwrap();
        let before = db.snapshot().await.unwrap();
        let second = runner.migrate_to_latest().await.unwrap();

        assert!(second.is_empty());
        assert_eq!(db.snapshot().await.unwrap(), before);
        assert_eq!(ledger_versions(&db).await, vec![1]);
    }

    #[tokio::test]
    async fn test_duplicate_versions_rejected() {
        let db = create_test_adapter().await;
        let result = MigrationRunner::new(db, vec![unit(1, "alpha"), unit(1, "beta")]);
        assert!(matches!(result, Err(StoreError::Config(_))));
    }

    #[tokio::test]
    async fn test_partial_failure_containment() {
        let db = create_test_adapter().await;
        let runner = MigrationRunner::new(
            db.clone(),
            vec![unit(1, "alpha"), Box::new(Broken { version: 2 }), unit(3, "gamma")],
        )
        .unwrap();

        let err = runner.migrate_to_latest().await.unwrap_err();
        assert_eq!(err.failed_unit(), Some((2, "broken")));
        assert!(matches!(
            err,
            StoreError::MigrationFailed {
                direction: Direction::Up,
                ..
            }
        ));

        assert_eq!(ledger_versions(&db).await, vec![1]);
        assert!(db.has_table("alpha").await.unwrap());
        // The failing unit's own statements were rolled back with it.
        assert!(!db.has_table("half_done").await.unwrap());
        assert!(!db.has_table("gamma").await.unwrap());

        let pending: Vec<i64> = runner
            .pending()
            .await
            .unwrap()
            .iter()
            .map(|u| u.version())
            .collect();
        assert_eq!(pending, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_rollback_symmetry() {
        let db = create_test_adapter().await;
        let runner = MigrationRunner::new(db.clone(), vec![unit(1, "alpha")]).unwrap();
        Ledger::new(db.as_ref()).ensure_table().await.unwrap();
        let before = db.list_tables().await.unwrap();

        runner.migrate_to_latest().await.unwrap();
        let report = runner.rollback_last(1).await.unwrap();

        assert_eq!(report.versions_in(UnitState::RolledBack), vec![1]);
        assert_eq!(db.list_tables().await.unwrap(), before);
        assert!(ledger_versions(&db).await.is_empty());
    }

    #[tokio::test]
    async fn test_rollback_newest_first() {
        let db = create_test_adapter().await;
        let runner = MigrationRunner::new(
            db.clone(),
            vec![unit(1, "alpha"), unit(2, "beta"), unit(3, "gamma")],
        )
        .unwrap();
        runner.migrate_to_latest().await.unwrap();

        let report = runner.rollback_last(2).await.unwrap();
        assert_eq!(report.versions_in(UnitState::RolledBack), vec![3, 2]);
        assert_eq!(ledger_versions(&db).await, vec![1]);

        // Asking for more than is applied rolls back what there is.
        let report = runner.rollback_last(5).await.unwrap();
        assert_eq!(report.versions_in(UnitState::RolledBack), vec![1]);
        assert!(runner.rollback_last(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rollback_unknown_ledger_row() {
        let db = create_test_adapter().await;
        let runner = MigrationRunner::new(db.clone(), vec![unit(1, "alpha")]).unwrap();
        runner.migrate_to_latest().await.unwrap();
        Ledger::new(db.as_ref())
            .record_applied(99, "from_the_future")
            .await
            .unwrap();

        let err = runner.rollback_last(2).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownMigration { version: 99, .. }));
        assert_eq!(ledger_versions(&db).await, vec![1, 99]);
    }

    #[tokio::test]
    async fn test_status_lists_registered_and_recorded() {
        let db = create_test_adapter().await;
        let runner =
            MigrationRunner::new(db.clone(), vec![unit(1, "alpha"), unit(2, "beta")]).unwrap();
        runner.migrate_to_latest().await.unwrap();
        runner.rollback_last(1).await.unwrap();
        Ledger::new(db.as_ref())
            .record_applied(7, "orphan")
            .await
            .unwrap();

        let status = runner.status().await.unwrap();
        assert_eq!(status.len(), 3);
        assert!(status[0].is_applied() && status[0].registered);
        assert!(!status[1].is_applied());
        assert_eq!(status[2].name, "orphan");
        assert!(status[2].is_applied() && !status[2].registered);
    }

    #[tokio::test]
    async fn test_dangling_foreign_key_fails_unit() {
        let db = create_test_adapter().await;
        let runner = MigrationRunner::new(db.clone(), vec![Box::new(Dangling)]).unwrap();

        let err = runner.migrate_to_latest().await.unwrap_err();
        match err {
            StoreError::MigrationFailed { source, .. } => {
                assert!(matches!(*source, StoreError::ForeignKeyViolation { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(ledger_versions(&db).await.is_empty());
        assert!(!db.has_table("children").await.unwrap());

        let row = db.query_one("PRAGMA foreign_keys", &[]).await.unwrap().unwrap();
        assert!(row.get_bool("foreign_keys").unwrap());
    }
}
