//! Backend trait definitions.
//!
//! Backends are the embedded SQL engines a registered database wraps.
//! The broker owns transaction bookkeeping and capability checks; a
//! backend only runs statements and native transaction control.

mod sqlite;

pub use sqlite::{SqliteBackend, SqliteConnector};

use crate::error::CoreResult;
use crate::types::DbType;
use crate::value::{ResultSet, SqlValue};
use std::path::Path;

/// Outcome of running one statement (or one batch) on a backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementOutcome {
    /// Rows changed by mutating statements.
    pub rows_affected: usize,
    /// Materialized rows for row-producing statements.
    pub result_set: Option<ResultSet>,
}

impl StatementOutcome {
    /// Outcome of a statement that produced no rows.
    #[must_use]
    pub fn affected(rows_affected: usize) -> Self {
        Self {
            rows_affected,
            result_set: None,
        }
    }

    /// Outcome of a row-producing statement.
    #[must_use]
    pub fn rows(result_set: ResultSet) -> Self {
        Self {
            rows_affected: 0,
            result_set: Some(result_set),
        }
    }

    /// Folds the outcome of the next batch tuple into this one.
    pub fn merge(&mut self, next: StatementOutcome) {
        self.rows_affected += next.rows_affected;
        if let Some(rs) = next.result_set {
            match &mut self.result_set {
                Some(acc) => acc.extend(rs),
                None => self.result_set = Some(rs),
            }
        }
    }
}

/// A native connection to one embedded database.
///
/// # Invariants
///
/// - a request holds exactly one statement; trailing statements are
///   rejected, never silently dropped
/// - `execute_batch` prepares `sql` once and executes it once per tuple,
///   in order, stopping at the first failure, which is reported as
///   [`crate::CoreError::PartialBatchFailure`] carrying the tuple index
/// - with `atomic` set, a failed batch leaves no tuple applied
/// - `in_transaction` reflects the native connection state, which may
///   end a transaction on its own after certain errors
pub trait Backend: Send {
    /// Runs one statement with positional parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects or fails the statement.
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> CoreResult<StatementOutcome>;

    /// Runs one prepared statement per argument tuple.
    ///
    /// # Errors
    ///
    /// Returns `PartialBatchFailure` for a failing tuple, or an execution
    /// error if the statement cannot be prepared.
    fn execute_batch(
        &mut self,
        sql: &str,
        tuples: &[Vec<SqlValue>],
        atomic: bool,
    ) -> CoreResult<StatementOutcome>;

    /// Starts a native transaction (disables autocommit).
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot start a transaction.
    fn begin(&mut self) -> CoreResult<()>;

    /// Commits the native transaction and restores autocommit.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    fn commit(&mut self) -> CoreResult<()>;

    /// Rolls back the native transaction and restores autocommit.
    ///
    /// # Errors
    ///
    /// Returns an error if the rollback fails.
    fn rollback(&mut self) -> CoreResult<()>;

    /// Returns true while a native transaction is open.
    fn in_transaction(&self) -> bool;

    /// Returns true if `sql` cannot modify the database.
    ///
    /// Backends that cannot tell report `true` and rely on the
    /// classifier alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement cannot be prepared.
    fn is_read_only(&self, sql: &str) -> CoreResult<bool> {
        let _ = sql;
        Ok(true)
    }

    /// Releases the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to shut down cleanly.
    fn close(self: Box<Self>) -> CoreResult<()>;
}

/// Opens backends for the registry.
pub trait Connector: Send + Sync {
    /// Opens (creating if needed) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    fn open(&self, path: &Path, db_type: DbType) -> CoreResult<Box<dyn Backend>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rs(values: &[i64]) -> ResultSet {
        let mut rs = ResultSet::new(vec!["a".into()]);
        for v in values {
            rs.push_row(vec![SqlValue::Integer(*v)]);
        }
        rs
    }

    #[test]
    fn merge_sums_affected_rows() {
        let mut acc = StatementOutcome::affected(1);
        acc.merge(StatementOutcome::affected(2));
        assert_eq!(acc.rows_affected, 3);
        assert!(acc.result_set.is_none());
    }

    #[test]
    fn merge_concatenates_rows() {
        let mut acc = StatementOutcome::default();
        acc.merge(StatementOutcome::rows(rs(&[1])));
        acc.merge(StatementOutcome::rows(rs(&[2, 3])));
        assert_eq!(acc.result_set.unwrap().len(), 3);
    }
}
