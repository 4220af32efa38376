//! SQLite backend built on `rusqlite`.

use super::{Backend, Connector, StatementOutcome};
use crate::error::{CoreError, CoreResult};
use crate::types::DbType;
use crate::value::{ResultSet, SqlValue};
use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};
use rusqlite::{params_from_iter, Batch, Connection, Statement};
use std::path::{Path, PathBuf};
use std::time::Duration;

const BATCH_SAVEPOINT: &str = "synclitedb_batch";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Integer(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            SqlValue::Real(v) => ToSqlOutput::Owned(Value::Real(*v)),
            SqlValue::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            SqlValue::Blob(v) => ToSqlOutput::Borrowed(ValueRef::Blob(v)),
        })
    }
}

impl From<ValueRef<'_>> for SqlValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => SqlValue::Null,
            ValueRef::Integer(v) => SqlValue::Integer(v),
            ValueRef::Real(v) => SqlValue::Real(v),
            ValueRef::Text(v) => SqlValue::Text(String::from_utf8_lossy(v).into_owned()),
            ValueRef::Blob(v) => SqlValue::Blob(v.to_vec()),
        }
    }
}

/// Opens every backend type on the bundled SQLite engine.
///
/// The capability set of the requested type is enforced by the executor,
/// so an appender or streaming database still behaves as one.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteConnector;

impl Connector for SqliteConnector {
    fn open(&self, path: &Path, db_type: DbType) -> CoreResult<Box<dyn Backend>> {
        tracing::debug!(path = %path.display(), %db_type, "opening sqlite backend");
        Ok(Box::new(SqliteBackend::open(path)?))
    }
}

/// A single SQLite connection.
pub struct SqliteBackend {
    conn: Connection,
    path: PathBuf,
}

impl SqliteBackend {
    /// Opens or creates the database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot open the file.
    pub fn open(path: &Path) -> CoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot allocate the database.
    pub fn open_in_memory() -> CoreResult<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
            path: PathBuf::from(":memory:"),
        })
    }

    /// Returns the database file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Prepares `sql`, refusing anything after the first statement.
    /// Trailing whitespace, comments and `;` are allowed.
    fn prepare_single<'c>(conn: &'c Connection, sql: &str) -> CoreResult<Statement<'c>> {
        let mut statements = Batch::new(conn, sql);
        let first = statements
            .next()?
            .ok_or_else(|| CoreError::execution("empty SQL statement"))?;
        match statements.next() {
            Ok(None) => Ok(first),
            Ok(Some(_)) | Err(_) => Err(CoreError::execution(
                "multiple SQL statements in one request are not supported",
            )),
        }
    }

    /// Undoes the batch savepoint. A savepoint opened outside a native
    /// transaction must not leave one behind.
    fn undo_savepoint(&self, outer_txn: bool) {
        if let Err(e) = self.conn.execute_batch(&format!(
            "ROLLBACK TO {BATCH_SAVEPOINT}; RELEASE {BATCH_SAVEPOINT}"
        )) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to undo batch savepoint");
        }
        if !outer_txn && !self.conn.is_autocommit() {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to roll back batch");
            }
        }
    }

    fn run(stmt: &mut Statement<'_>, params: &[SqlValue]) -> CoreResult<StatementOutcome> {
        let expected = stmt.parameter_count();
        if params.len() != expected {
            return Err(CoreError::execution(format!(
                "statement expects {expected} parameter(s), got {}",
                params.len()
            )));
        }

        if stmt.column_count() == 0 {
            let changed = stmt.execute(params_from_iter(params))?;
            return Ok(StatementOutcome::affected(changed));
        }

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();
        let mut result = ResultSet::new(columns);
        let mut rows = stmt.query(params_from_iter(params))?;
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for idx in 0..width {
                values.push(SqlValue::from(row.get_ref(idx)?));
            }
            result.push_row(values);
        }
        Ok(StatementOutcome::rows(result))
    }

    fn run_batch(&self, sql: &str, tuples: &[Vec<SqlValue>]) -> CoreResult<StatementOutcome> {
        let mut stmt = Self::prepare_single(&self.conn, sql)?;
        let mut outcome = StatementOutcome::default();
        for (index, tuple) in tuples.iter().enumerate() {
            let next =
                Self::run(&mut stmt, tuple).map_err(|e| CoreError::batch_failure(index, e))?;
            outcome.merge(next);
        }
        Ok(outcome)
    }
}

impl Backend for SqliteBackend {
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> CoreResult<StatementOutcome> {
        let mut stmt = Self::prepare_single(&self.conn, sql)?;
        Self::run(&mut stmt, params)
    }

    fn execute_batch(
        &mut self,
        sql: &str,
        tuples: &[Vec<SqlValue>],
        atomic: bool,
    ) -> CoreResult<StatementOutcome> {
        if !atomic {
            return self.run_batch(sql, tuples);
        }

        let outer_txn = !self.conn.is_autocommit();
        self.conn
            .execute_batch(&format!("SAVEPOINT {BATCH_SAVEPOINT}"))?;
        match self.run_batch(sql, tuples) {
            Ok(outcome) => match self
                .conn
                .execute_batch(&format!("RELEASE {BATCH_SAVEPOINT}"))
            {
                Ok(()) => Ok(outcome),
                Err(e) => {
                    self.undo_savepoint(outer_txn);
                    Err(e.into())
                }
            },
            Err(e) => {
                self.undo_savepoint(outer_txn);
                Err(e)
            }
        }
    }

    fn begin(&mut self) -> CoreResult<()> {
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    fn commit(&mut self) -> CoreResult<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> CoreResult<()> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    fn is_read_only(&self, sql: &str) -> CoreResult<bool> {
        Ok(Self::prepare_single(&self.conn, sql)?.readonly())
    }

    fn close(self: Box<Self>) -> CoreResult<()> {
        self.conn.close().map_err(|(_, e)| CoreError::from(e))
    }
}
