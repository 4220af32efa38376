//! SQL statement execution.

use crate::backend::StatementOutcome;
use crate::classify::classify;
use crate::error::{CoreError, CoreResult};
use crate::registry::{OpenDatabase, Registry};
use crate::sink::LoggedStatement;
use crate::types::{StatementKind, TxnHandle};
use crate::value::SqlValue;
use std::path::Path;

impl Registry {
    /// Executes a SQL statement, or a batch when `arguments` is non-empty.
    ///
    /// A batch prepares `sql` once and runs it once per argument tuple, in
    /// order, stopping at the first failing tuple. Row-producing
    /// statements are materialized in full.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `InvalidTxnHandle`, `UnsupportedOperation`,
    /// `PartialBatchFailure`, or an execution error from the backend.
    pub fn execute(
        &self,
        path: &Path,
        txn: Option<&TxnHandle>,
        sql: &str,
        arguments: Option<&[Vec<SqlValue>]>,
    ) -> CoreResult<StatementOutcome> {
        let atomic = self.config().atomic_batches;
        self.with_database(path, |db| db.execute(txn, sql, arguments, atomic))
    }
}

impl OpenDatabase {
    fn execute(
        &mut self,
        txn: Option<&TxnHandle>,
        sql: &str,
        arguments: Option<&[Vec<SqlValue>]>,
        atomic: bool,
    ) -> CoreResult<StatementOutcome> {
        self.check_binding(txn)?;

        let kind = classify(sql);
        let capabilities = self.db_type.capabilities();
        if !capabilities.permits(kind) {
            return Err(CoreError::UnsupportedOperation {
                backend: self.db_type,
                kind,
            });
        }
        // A query-shaped statement that writes is a mutation.
        if kind == StatementKind::Select
            && !capabilities.update_delete
            && !self.backend.is_read_only(sql)?
        {
            return Err(CoreError::UnsupportedOperation {
                backend: self.db_type,
                kind: StatementKind::UpdateDelete,
            });
        }

        let batch = arguments.filter(|tuples| !tuples.is_empty());
        tracing::debug!(
            path = %self.path.display(),
            %kind,
            tuples = batch.map_or(0, <[_]>::len),
            "executing statement"
        );

        let result = match batch {
            Some(tuples) => self.backend.execute_batch(sql, tuples, atomic),
            None => self.backend.execute(sql, &[]),
        };

        match result {
            Ok(outcome) => {
                if kind.is_logged() {
                    self.log_statement(LoggedStatement {
                        sql: sql.to_string(),
                        arguments: batch.map(<[_]>::to_vec),
                    })?;
                }
                Ok(outcome)
            }
            Err(err) => Err(self.handle_failure(err, kind, sql, batch, atomic)),
        }
    }

    fn handle_failure(
        &mut self,
        err: CoreError,
        kind: StatementKind,
        sql: &str,
        batch: Option<&[Vec<SqlValue>]>,
        atomic: bool,
    ) -> CoreError {
        tracing::warn!(path = %self.path.display(), %kind, error = %err, "statement failed");

        // Without a savepoint, tuples ahead of the failing one stay applied.
        if let (CoreError::PartialBatchFailure { index, .. }, Some(tuples), false) =
            (&err, batch, atomic)
        {
            if kind.is_logged() && *index > 0 {
                let applied = LoggedStatement {
                    sql: sql.to_string(),
                    arguments: Some(tuples[..*index].to_vec()),
                };
                if let Err(e) = self.log_statement(applied) {
                    tracing::warn!(path = %self.path.display(), error = %e, "partial batch not logged");
                }
            }
        }

        match self.reconcile_with_backend() {
            Some(lost) => annotate(err, &format!("backend rolled back transaction {lost}")),
            None => err,
        }
    }
}

fn annotate(err: CoreError, note: &str) -> CoreError {
    match err {
        CoreError::PartialBatchFailure { index, cause } => CoreError::PartialBatchFailure {
            index,
            cause: format!("{cause}; {note}"),
        },
        other => CoreError::execution(format!("{other}; {note}")),
    }
}
