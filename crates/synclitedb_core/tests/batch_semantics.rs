//! Batch execution semantics observed through a recording backend.

use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use synclitedb_core::{
    Backend, BrokerConfig, Connector, CoreError, CoreResult, DbType, InitializeOptions, Registry,
    SqlValue, StatementOutcome,
};
use tempfile::tempdir;

/// Every backend call, in order.
type Journal = Arc<Mutex<Vec<String>>>;

/// A backend that records calls and fails any tuple containing `"fail"`.
struct RecordingBackend {
    journal: Journal,
    in_txn: bool,
    fail_close: bool,
}

impl RecordingBackend {
    fn run(&self, params: &[SqlValue]) -> CoreResult<StatementOutcome> {
        self.journal.lock().push(format!("exec {params:?}"));
        if params.iter().any(|p| *p == SqlValue::from("fail")) {
            return Err(CoreError::execution("scripted failure"));
        }
        Ok(StatementOutcome::affected(1))
    }
}

impl Backend for RecordingBackend {
    fn execute(&mut self, _sql: &str, params: &[SqlValue]) -> CoreResult<StatementOutcome> {
        self.run(params)
    }

    fn execute_batch(
        &mut self,
        _sql: &str,
        tuples: &[Vec<SqlValue>],
        atomic: bool,
    ) -> CoreResult<StatementOutcome> {
        self.journal.lock().push(format!("prepare atomic={atomic}"));
        let mut outcome = StatementOutcome::default();
        for (index, tuple) in tuples.iter().enumerate() {
            let next = self
                .run(tuple)
                .map_err(|e| CoreError::batch_failure(index, e))?;
            outcome.merge(next);
        }
        Ok(outcome)
    }

    fn begin(&mut self) -> CoreResult<()> {
        self.in_txn = true;
        self.journal.lock().push("begin".into());
        Ok(())
    }

    fn commit(&mut self) -> CoreResult<()> {
        self.in_txn = false;
        self.journal.lock().push("commit".into());
        Ok(())
    }

    fn rollback(&mut self) -> CoreResult<()> {
        self.in_txn = false;
        self.journal.lock().push("rollback".into());
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_txn
    }

    fn close(self: Box<Self>) -> CoreResult<()> {
        self.journal.lock().push("close".into());
        if self.fail_close {
            return Err(CoreError::execution("scripted close failure"));
        }
        Ok(())
    }
}

struct RecordingConnector {
    journal: Journal,
    /// File name whose backend fails to close.
    failing_close: Option<&'static str>,
}

impl Connector for RecordingConnector {
    fn open(&self, path: &Path, _db_type: DbType) -> CoreResult<Box<dyn Backend>> {
        let fail_close = self
            .failing_close
            .is_some_and(|name| path.file_name().is_some_and(|f| f == name));
        Ok(Box::new(RecordingBackend {
            journal: Arc::clone(&self.journal),
            in_txn: false,
            fail_close,
        }))
    }
}

fn setup(config: BrokerConfig) -> (tempfile::TempDir, Registry, std::path::PathBuf, Journal) {
    let dir = tempdir().unwrap();
    let journal: Journal = Arc::default();
    let reg = Registry::with_connector(
        config,
        Arc::new(RecordingConnector {
            journal: Arc::clone(&journal),
            failing_close: None,
        }),
    );
    let path = reg
        .initialize(&dir.path().join("rec.db"), InitializeOptions::new(DbType::Sqlite))
        .unwrap();
    (dir, reg, path, journal)
}

fn tuple(n: i64) -> Vec<SqlValue> {
    vec![SqlValue::Integer(n)]
}

#[test]
fn batch_runs_each_tuple_once_in_order() {
    let (_dir, reg, path, journal) = setup(BrokerConfig::default());
    let args: Vec<_> = (0..5).map(tuple).collect();
    let out = reg
        .execute(&path, None, "INSERT INTO t VALUES (?)", Some(&args))
        .unwrap();
    assert_eq!(out.rows_affected, 5);

    let calls = journal.lock().clone();
    assert_eq!(calls[0], "prepare atomic=true");
    let execs: Vec<_> = calls.iter().filter(|c| c.starts_with("exec")).collect();
    assert_eq!(execs.len(), 5);
    for (i, call) in execs.iter().enumerate() {
        assert_eq!(**call, format!("exec [Integer({i})]"));
    }
}

#[test]
fn batch_stops_at_first_failing_tuple() {
    let (_dir, reg, path, journal) = setup(BrokerConfig::default());
    let args = vec![tuple(0), tuple(1), vec![SqlValue::from("fail")], tuple(3)];
    let err = reg
        .execute(&path, None, "INSERT INTO t VALUES (?)", Some(&args))
        .unwrap_err();
    match err {
        CoreError::PartialBatchFailure { index, cause } => {
            assert_eq!(index, 2);
            assert!(cause.contains("scripted failure"));
        }
        other => panic!("unexpected error: {other}"),
    }
    let execs = journal
        .lock()
        .iter()
        .filter(|c| c.starts_with("exec"))
        .count();
    assert_eq!(execs, 3);
}

#[test]
fn atomicity_flag_reaches_backend() {
    let (_dir, reg, path, journal) = setup(BrokerConfig::new().atomic_batches(false));
    reg.execute(&path, None, "INSERT INTO t VALUES (?)", Some(&[tuple(1)]))
        .unwrap();
    assert_eq!(journal.lock()[0], "prepare atomic=false");
}

#[test]
fn close_rolls_back_before_releasing() {
    let (_dir, reg, path, journal) = setup(BrokerConfig::default());
    let _h = reg.begin(&path).unwrap();
    reg.close(&path).unwrap();
    let calls = journal.lock().clone();
    assert_eq!(calls, vec!["begin", "rollback", "close"]);
}

#[test]
fn close_all_reports_failures_and_closes_the_rest() {
    let dir = tempdir().unwrap();
    let journal: Journal = Arc::default();
    let reg = Registry::with_connector(
        BrokerConfig::default(),
        Arc::new(RecordingConnector {
            journal: Arc::clone(&journal),
            failing_close: Some("b.db"),
        }),
    );
    for name in ["a.db", "b.db", "c.db"] {
        reg.initialize(&dir.path().join(name), InitializeOptions::new(DbType::Sqlite))
            .unwrap();
    }

    match reg.close_all().unwrap_err() {
        CoreError::CloseAllFailed { failures } => {
            assert_eq!(failures.len(), 1, "{failures:?}");
            assert!(failures[0].contains("b.db"), "{failures:?}");
            assert!(failures[0].contains("scripted close failure"), "{failures:?}");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(reg.is_empty());
    assert_eq!(journal.lock().iter().filter(|c| *c == "close").count(), 3);
    assert_eq!(reg.close_all().unwrap(), 0);
}
