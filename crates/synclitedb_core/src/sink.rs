//! Commit log sinks.
//!
//! Every committed unit of work on a database (an explicit transaction
//! or a single autocommitted statement) is handed to the database's
//! sink in commit order. Rolled-back work never reaches the sink.

use crate::error::CoreResult;
use crate::value::SqlValue;
use parking_lot::Mutex;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// File name suffix of a database's commit log.
pub const COMMIT_LOG_SUFFIX: &str = ".synclite.log";

/// A statement recorded in the commit log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoggedStatement {
    /// SQL text as submitted.
    pub sql: String,
    /// Batch arguments, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<Vec<SqlValue>>>,
}

/// One committed unit of work.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitRecord {
    /// Normalized database path.
    pub db_path: PathBuf,
    /// Device name of the database.
    pub device: String,
    /// Per-database commit sequence, starting at 1.
    pub sequence: u64,
    /// Commit time in milliseconds since the Unix epoch.
    pub committed_at_ms: u64,
    /// Statements in execution order.
    pub statements: Vec<LoggedStatement>,
}

/// Receives committed work for replication.
pub trait CommitSink: Send + Sync {
    /// Appends one committed unit of work.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be persisted.
    fn append(&self, record: &CommitRecord) -> CoreResult<()>;
}

/// Discards all records.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl CommitSink for NullSink {
    fn append(&self, record: &CommitRecord) -> CoreResult<()> {
        tracing::trace!(db = %record.db_path.display(), seq = record.sequence, "commit not logged");
        Ok(())
    }
}

/// Appends one JSON object per commit to a log file.
pub struct JsonLinesSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    /// Opens (creating if needed) the commit log for `db_path` under `stage_dir`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory or file cannot be created.
    pub fn open(stage_dir: &Path, db_path: &Path) -> CoreResult<Self> {
        fs::create_dir_all(stage_dir)?;
        let file_name = db_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "database".to_string());
        let path = stage_dir.join(format!("{file_name}{COMMIT_LOG_SUFFIX}"));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Returns the log file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CommitSink for JsonLinesSink {
    fn append(&self, record: &CommitRecord) -> CoreResult<()> {
        let mut writer = self.writer.lock();
        serde_json::to_writer(&mut *writer, record)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}
