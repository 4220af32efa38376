//! Per-database transaction slot.
//!
//! Each database holds at most one open transaction:
//!
//! ```text
//! NoActiveTxn --begin--> TxnOpen --commit/rollback--> NoActiveTxn
//! ```
//!
//! Statements carrying a handle must match the open transaction.
//! Statements without a handle run autocommitted, and are refused while
//! a transaction is open so they cannot land inside someone else's work.

use crate::error::{CoreError, CoreResult};
use crate::registry::{OpenDatabase, Registry};
use crate::sink::{CommitRecord, LoggedStatement};
use crate::types::TxnHandle;
use std::path::Path;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Transaction state of a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    /// No transaction is open; statements autocommit.
    NoActiveTxn,
    /// A transaction is open.
    TxnOpen,
}

/// The open transaction of a database.
#[derive(Debug)]
pub(crate) struct ActiveTransaction {
    pub(crate) handle: TxnHandle,
    pub(crate) pending: Vec<LoggedStatement>,
    started: Instant,
}

impl ActiveTransaction {
    fn new(handle: TxnHandle) -> Self {
        Self {
            handle,
            pending: Vec::new(),
            started: Instant::now(),
        }
    }
}

impl Registry {
    /// Starts a transaction on a database and returns its handle.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `TxnAlreadyOpen`, or the backend's error.
    pub fn begin(&self, path: &Path) -> CoreResult<TxnHandle> {
        self.with_database(path, OpenDatabase::begin)
    }

    /// Like [`Registry::begin`], but asks `proceed` once the database is
    /// locked and starts nothing if it returns false.
    ///
    /// `proceed` runs at most once, under the database lock, so a caller
    /// that gave up on the request can never end up owning a transaction
    /// it does not know about.
    ///
    /// # Errors
    ///
    /// As [`Registry::begin`], plus an execution error when `proceed`
    /// declines.
    pub fn begin_if(&self, path: &Path, proceed: impl FnOnce() -> bool) -> CoreResult<TxnHandle> {
        self.with_database(path, |db| {
            if !proceed() {
                return Err(CoreError::execution(
                    "request abandoned before the transaction started",
                ));
            }
            db.begin()
        })
    }

    /// Commits the open transaction identified by `handle`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `InvalidTxnHandle`, or an execution error if
    /// the backend commit or the commit log append fails.
    pub fn commit(&self, path: &Path, handle: &TxnHandle) -> CoreResult<()> {
        self.with_database(path, |db| db.commit(handle))
    }

    /// Rolls back the open transaction identified by `handle`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `InvalidTxnHandle`, or the backend's error.
    pub fn rollback(&self, path: &Path, handle: &TxnHandle) -> CoreResult<()> {
        self.with_database(path, |db| db.rollback(handle))
    }

    /// Returns the transaction state of a database.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the path is not registered.
    pub fn txn_state(&self, path: &Path) -> CoreResult<TxnState> {
        self.with_database(path, |db| {
            Ok(if db.txn.is_some() {
                TxnState::TxnOpen
            } else {
                TxnState::NoActiveTxn
            })
        })
    }
}

impl OpenDatabase {
    fn begin(&mut self) -> CoreResult<TxnHandle> {
        if self.txn.is_some() {
            return Err(CoreError::TxnAlreadyOpen {
                path: self.path.clone(),
            });
        }
        self.backend.begin()?;
        let handle = TxnHandle::generate();
        tracing::info!(path = %self.path.display(), txn = %handle, "transaction started");
        self.txn = Some(ActiveTransaction::new(handle.clone()));
        Ok(handle)
    }

    fn commit(&mut self, handle: &TxnHandle) -> CoreResult<()> {
        self.ensure_handle(handle)?;
        if let Err(e) = self.backend.commit() {
            self.reconcile_with_backend();
            return Err(e);
        }
        let Some(txn) = self.txn.take() else {
            return Err(CoreError::invalid_txn_handle("transaction vanished during commit"));
        };
        tracing::info!(
            path = %self.path.display(),
            txn = %txn.handle,
            statements = txn.pending.len(),
            elapsed_ms = txn.started.elapsed().as_millis() as u64,
            "transaction committed"
        );
        self.publish(txn.pending).map_err(|e| {
            CoreError::execution(format!("committed, but commit log append failed: {e}"))
        })
    }

    fn rollback(&mut self, handle: &TxnHandle) -> CoreResult<()> {
        self.ensure_handle(handle)?;
        let result = self.backend.rollback();
        if result.is_ok() || !self.backend.in_transaction() {
            self.txn = None;
            tracing::info!(path = %self.path.display(), txn = %handle, "transaction rolled back");
        }
        result
    }

    fn ensure_handle(&self, handle: &TxnHandle) -> CoreResult<()> {
        match &self.txn {
            Some(open) if open.handle == *handle => Ok(()),
            Some(_) => Err(CoreError::invalid_txn_handle(format!(
                "{handle} is not the open transaction on {}",
                self.path.display()
            ))),
            None => Err(CoreError::invalid_txn_handle(format!(
                "{handle}: no transaction is open on {}",
                self.path.display()
            ))),
        }
    }

    /// Validates the handle a statement was submitted with.
    pub(crate) fn check_binding(&self, handle: Option<&TxnHandle>) -> CoreResult<()> {
        match handle {
            Some(h) => self.ensure_handle(h),
            None if self.txn.is_some() => Err(CoreError::invalid_txn_handle(format!(
                "a transaction is open on {}; statements must carry its txn-handle",
                self.path.display()
            ))),
            None => Ok(()),
        }
    }

    /// Drops the transaction slot if the backend ended the native
    /// transaction on its own. Returns the lost handle.
    pub(crate) fn reconcile_with_backend(&mut self) -> Option<TxnHandle> {
        if self.txn.is_some() && !self.backend.in_transaction() {
            let lost = self.txn.take().map(|t| t.handle);
            tracing::warn!(path = %self.path.display(), "backend ended the open transaction");
            return lost;
        }
        None
    }

    /// Rolls back any open transaction, discarding its pending log.
    pub(crate) fn abort_open_transaction(&mut self) -> Option<TxnHandle> {
        let txn = self.txn.take()?;
        if let Err(e) = self.backend.rollback() {
            tracing::warn!(path = %self.path.display(), txn = %txn.handle, error = %e, "implicit rollback failed");
        } else {
            tracing::info!(path = %self.path.display(), txn = %txn.handle, "open transaction rolled back on close");
        }
        Some(txn.handle)
    }

    /// Records a successful mutating statement: buffered while a
    /// transaction is open, published immediately otherwise.
    pub(crate) fn log_statement(&mut self, statement: LoggedStatement) -> CoreResult<()> {
        match &mut self.txn {
            Some(txn) => {
                txn.pending.push(statement);
                Ok(())
            }
            None => self.publish(vec![statement]).map_err(|e| {
                CoreError::execution(format!("applied, but commit log append failed: {e}"))
            }),
        }
    }

    fn publish(&mut self, statements: Vec<LoggedStatement>) -> CoreResult<()> {
        if statements.is_empty() {
            return Ok(());
        }
        self.commit_seq += 1;
        let committed_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let record = CommitRecord {
            db_path: self.path.clone(),
            device: self.device.clone(),
            sequence: self.commit_seq,
            committed_at_ms,
            statements,
        };
        self.sink.append(&record).inspect_err(|e| {
            tracing::warn!(path = %self.path.display(), seq = record.sequence, error = %e, "commit log append failed");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrokerConfig;
    use crate::registry::InitializeOptions;
    use crate::types::DbType;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::thread;
    use tempfile::{tempdir, TempDir};

    fn setup() -> (TempDir, Registry, PathBuf) {
        let dir = tempdir().unwrap();
        let reg = Registry::new(BrokerConfig::new().stage_dir(dir.path().join("stage")));
        let path = reg
            .initialize(
                &dir.path().join("t.db"),
                InitializeOptions::new(DbType::Sqlite),
            )
            .unwrap();
        reg.execute(&path, None, "CREATE TABLE t(a INT)", None)
            .unwrap();
        (dir, reg, path)
    }

    fn log_lines(dir: &TempDir) -> Vec<serde_json::Value> {
        let text =
            std::fs::read_to_string(dir.path().join("stage").join("t.db.synclite.log")).unwrap();
        text.lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn declined_begin_starts_nothing() {
        let (_dir, reg, path) = setup();
        let err = reg.begin_if(&path, || false).unwrap_err();
        assert!(err.to_string().contains("abandoned"), "{err}");
        assert_eq!(reg.txn_state(&path).unwrap(), TxnState::NoActiveTxn);

        let h = reg.begin_if(&path, || true).unwrap();
        assert_eq!(reg.txn_state(&path).unwrap(), TxnState::TxnOpen);
        reg.rollback(&path, &h).unwrap();
    }

    #[test]
    fn begin_commit_cycle() {
        let (_dir, reg, path) = setup();
        assert_eq!(reg.txn_state(&path).unwrap(), TxnState::NoActiveTxn);

        let h = reg.begin(&path).unwrap();
        assert_eq!(reg.txn_state(&path).unwrap(), TxnState::TxnOpen);
        reg.commit(&path, &h).unwrap();
        assert_eq!(reg.txn_state(&path).unwrap(), TxnState::NoActiveTxn);

        let err = reg.commit(&path, &h).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTxnHandle { .. }));
    }

    #[test]
    fn second_begin_is_rejected() {
        let (_dir, reg, path) = setup();
        let _h = reg.begin(&path).unwrap();
        let err = reg.begin(&path).unwrap_err();
        assert!(matches!(err, CoreError::TxnAlreadyOpen { .. }));
    }

    #[test]
    fn foreign_handle_is_rejected() {
        let (_dir, reg, path) = setup();
        let h = reg.begin(&path).unwrap();
        let bogus = TxnHandle::from_client("not-a-handle");

        assert!(matches!(
            reg.commit(&path, &bogus).unwrap_err(),
            CoreError::InvalidTxnHandle { .. }
        ));
        assert!(matches!(
            reg.rollback(&path, &bogus).unwrap_err(),
            CoreError::InvalidTxnHandle { .. }
        ));
        // The real transaction is untouched.
        reg.commit(&path, &h).unwrap();
    }

    #[test]
    fn begin_on_unknown_database() {
        let dir = tempdir().unwrap();
        let reg = Registry::new(BrokerConfig::default());
        let err = reg.begin(&dir.path().join("none.db")).unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[test]
    fn rollback_discards_work() {
        let (dir, reg, path) = setup();
        let h = reg.begin(&path).unwrap();
        reg.execute(&path, Some(&h), "INSERT INTO t VALUES (1)", None)
            .unwrap();
        reg.rollback(&path, &h).unwrap();

        let out = reg.execute(&path, None, "SELECT a FROM t", None).unwrap();
        assert!(out.result_set.unwrap().is_empty());
        // Only the CREATE TABLE reached the log.
        assert_eq!(log_lines(&dir).len(), 1);
    }

    #[test]
    fn commit_publishes_transaction_as_one_record() {
        let (dir, reg, path) = setup();
        let h = reg.begin(&path).unwrap();
        reg.execute(&path, Some(&h), "INSERT INTO t VALUES (1)", None)
            .unwrap();
        reg.execute(&path, Some(&h), "INSERT INTO t VALUES (2)", None)
            .unwrap();
        reg.execute(&path, Some(&h), "SELECT a FROM t", None)
            .unwrap();
        assert_eq!(log_lines(&dir).len(), 1);

        reg.commit(&path, &h).unwrap();
        let lines = log_lines(&dir);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["sequence"], 2);
        assert_eq!(lines[1]["statements"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn statements_without_handle_refused_while_open() {
        let (_dir, reg, path) = setup();
        let h = reg.begin(&path).unwrap();
        let err = reg
            .execute(&path, None, "INSERT INTO t VALUES (1)", None)
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTxnHandle { .. }));
        reg.rollback(&path, &h).unwrap();
    }

    #[test]
    fn handle_without_open_transaction_refused() {
        let (_dir, reg, path) = setup();
        let stale = TxnHandle::generate();
        let err = reg
            .execute(&path, Some(&stale), "INSERT INTO t VALUES (1)", None)
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTxnHandle { .. }));
    }

    #[test]
    fn close_rolls_back_and_invalidates_handle() {
        let (_dir, reg, path) = setup();
        let h = reg.begin(&path).unwrap();
        reg.execute(&path, Some(&h), "INSERT INTO t VALUES (9)", None)
            .unwrap();

        let outcome = reg.close(&path).unwrap();
        assert_eq!(outcome.rolled_back, Some(h.clone()));

        let err = reg.commit(&path, &h).unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));

        reg.initialize(&path, InitializeOptions::new(DbType::Sqlite))
            .unwrap();
        let out = reg.execute(&path, None, "SELECT a FROM t", None).unwrap();
        assert!(out.result_set.unwrap().is_empty());
    }

    #[test]
    fn concurrent_begin_admits_one() {
        let (_dir, reg, path) = setup();
        let reg = Arc::new(reg);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = Arc::clone(&reg);
                let path = path.clone();
                thread::spawn(move || reg.begin(&path).is_ok())
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(wins, 1);
    }
}
