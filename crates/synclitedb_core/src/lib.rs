//! # SyncLiteDB Core
//!
//! Database registry, transaction manager and SQL executor for the
//! SyncLiteDB request broker.
//!
//! This crate provides:
//! - A process-wide [`Registry`] of open databases, keyed by normalized path
//! - A single-writer transaction slot per database
//! - Statement classification and per-backend capability checks
//! - Batch execution with positional binding
//! - A commit log hook ([`CommitSink`]) fed in commit order
//!
//! # Concurrency
//!
//! Every database has its own lock. Operations on different databases
//! never contend; operations on the same database are serialized.
//!
//! # Example
//!
//! ```rust,no_run
//! use synclitedb_core::{BrokerConfig, DbType, InitializeOptions, Registry, SqlValue};
//! use std::path::Path;
//!
//! let registry = Registry::new(BrokerConfig::default());
//! let path = registry
//!     .initialize(Path::new("data/app.db"), InitializeOptions::new(DbType::Sqlite))
//!     .unwrap();
//!
//! let txn = registry.begin(&path).unwrap();
//! registry
//!     .execute(&path, Some(&txn), "CREATE TABLE t(a INT, b TEXT)", None)
//!     .unwrap();
//! let rows = vec![vec![SqlValue::Integer(1), SqlValue::from("one")]];
//! registry
//!     .execute(&path, Some(&txn), "INSERT INTO t VALUES (?, ?)", Some(&rows))
//!     .unwrap();
//! registry.commit(&path, &txn).unwrap();
//! registry.close(&path).unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod classify;
mod config;
mod error;
mod executor;
mod registry;
mod sink;
mod transaction;
mod types;
mod value;

pub use backend::{Backend, Connector, SqliteBackend, SqliteConnector, StatementOutcome};
pub use classify::classify;
pub use config::{BrokerConfig, LoggerConfig, DEVICE_NAME_KEY, STAGE_DIRECTORY_KEY};
pub use error::{CoreError, CoreResult};
pub use registry::{normalize_path, CloseOutcome, DatabaseInfo, InitializeOptions, Registry};
pub use sink::{
    CommitRecord, CommitSink, JsonLinesSink, LoggedStatement, NullSink, COMMIT_LOG_SUFFIX,
};
pub use transaction::TxnState;
pub use types::{BackendFamily, Capabilities, DbType, StatementKind, TxnHandle, UnknownDbType};
pub use value::{ResultSet, SqlValue};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
