//! Pool plus optional open transaction, shared by the sqlx-backed adapters.

use std::sync::atomic::{AtomicBool, Ordering};

use sqlx::{Database, Pool, Transaction};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use ctxdb_schema::EngineKind;

use crate::error::{Result, StoreError};

pub(crate) struct Session<DB: Database> {
    engine: EngineKind,
    pool: Pool<DB>,
    tx: Mutex<Option<Transaction<'static, DB>>>,
    closed: AtomicBool,
}

impl<DB: Database> Session<DB> {
    pub(crate) fn new(engine: EngineKind, pool: Pool<DB>) -> Self {
        Self {
            engine,
            pool,
            tx: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) const fn pool(&self) -> &Pool<DB> {
        &self.pool
    }

    /// Locks the transaction slot after checking the session is still open.
    pub(crate) async fn lock(&self) -> Result<MutexGuard<'_, Option<Transaction<'static, DB>>>> {
        self.ensure_open()?;
        Ok(self.tx.lock().await)
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(StoreError::connection(
                format!("{} connection is closed", self.engine),
                None,
            ));
        }
        Ok(())
    }

    pub(crate) async fn begin(&self) -> Result<()> {
        let mut slot = self.lock().await?;
        if slot.is_some() {
            return Err(StoreError::NestedTransaction);
        }
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::query("begin a transaction", e))?;
        *slot = Some(tx);
        debug!(engine = %self.engine, "transaction opened");
        Ok(())
    }

    pub(crate) async fn commit(&self) -> Result<()> {
        let tx = self.lock().await?.take().ok_or(StoreError::NoTransaction)?;
        tx.commit()
            .await
            .map_err(|e| StoreError::query("commit the transaction", e))?;
        debug!(engine = %self.engine, "transaction committed");
        Ok(())
    }

    pub(crate) async fn rollback(&self) -> Result<()> {
        let tx = self.lock().await?.take().ok_or(StoreError::NoTransaction)?;
        tx.rollback()
            .await
            .map_err(|e| StoreError::query("roll back the transaction", e))?;
        debug!(engine = %self.engine, "transaction rolled back");
        Ok(())
    }

    pub(crate) async fn in_transaction(&self) -> bool {
        self.tx.lock().await.is_some()
    }

    pub(crate) async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(tx) = self.tx.lock().await.take() {
            warn!(engine = %self.engine, "closing with an open transaction; rolling it back");
            if let Err(err) = tx.rollback().await {
                warn!(engine = %self.engine, error = %err, "rollback on close failed");
            }
        }
        self.pool.close().await;
        debug!(engine = %self.engine, "connection pool closed");
        Ok(())
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
