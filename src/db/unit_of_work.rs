//! Transaction batching for the reconciler.
//!
//! Every mutation made while reconciling a page goes through one open SQLite
//! transaction. The transaction is started lazily on first use and committed
//! by [`UnitOfWork::flush`]. Dropping an unflushed unit of work rolls back.
//!
//! Units of work sharing a [`WriteGate`] never hold transactions at the same
//! time: the gate is taken when a transaction begins and released when it
//! ends. Transactions begin `IMMEDIATE` so the write lock is taken up front
//! instead of upgraded from a read lock.

use super::pool::DbPool;
use sqlx::{Sqlite, SqliteConnection, Transaction};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Serializes store writers within one process.
pub type WriteGate = Arc<Mutex<()>>;

pub fn write_gate() -> WriteGate {
    Arc::new(Mutex::new(()))
}

pub struct UnitOfWork {
    pool: DbPool,
    gate: WriteGate,
    // Declared before `held` so a dropped transaction rolls back before the gate opens
    tx: Option<Transaction<'static, Sqlite>>,
    held: Option<OwnedMutexGuard<()>>,
    flushes: u64,
}

impl UnitOfWork {
    pub fn new(pool: DbPool, gate: WriteGate) -> Self {
        Self {
            pool,
            gate,
            tx: None,
            held: None,
            flushes: 0,
        }
    }

    /// Connection inside the open transaction, beginning one if needed.
    pub async fn conn(&mut self) -> Result<&mut SqliteConnection, sqlx::Error> {
        let tx = match self.tx.take() {
            Some(tx) => tx,
            None => {
                if self.held.is_none() {
                    self.held = Some(self.gate.clone().lock_owned().await);
                }
                log::trace!("Beginning unit of work");
                match self.pool.begin_with("BEGIN IMMEDIATE").await {
                    Ok(tx) => tx,
                    Err(e) => {
                        self.held = None;
                        return Err(e);
                    }
                }
            }
        };
        let tx = self.tx.insert(tx);
        Ok(&mut **tx)
    }

    /// Whether uncommitted work is pending.
    pub fn is_dirty(&self) -> bool {
        self.tx.is_some()
    }

    /// Commit pending work. A no-op when nothing was written.
    pub async fn flush(&mut self) -> Result<(), sqlx::Error> {
        let result = match self.tx.take() {
            Some(tx) => tx.commit().await.map(|()| {
                self.flushes += 1;
                log::trace!("Unit of work committed (flush #{})", self.flushes);
            }),
            None => Ok(()),
        };
        self.held = None;
        result
    }

    /// Discard pending work.
    pub async fn rollback(&mut self) -> Result<(), sqlx::Error> {
        let result = match self.tx.take() {
            Some(tx) => tx.rollback().await,
            None => Ok(()),
        };
        self.held = None;
        result
    }
}
