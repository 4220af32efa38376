//! Core type definitions for SyncLiteDB.

use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Backend type of a database, as named by the `db-type` request field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbType {
    /// SQLite.
    Sqlite,
    /// DuckDB.
    Duckdb,
    /// Apache Derby.
    Derby,
    /// H2.
    H2,
    /// HyperSQL.
    Hypersql,
    /// Append-only SQLite device.
    SqliteAppender,
    /// Append-only DuckDB device.
    DuckdbAppender,
    /// Append-only Derby device.
    DerbyAppender,
    /// Append-only H2 device.
    H2Appender,
    /// Append-only HyperSQL device.
    HypersqlAppender,
    /// Ingestion-only streaming device.
    Streaming,
}

/// Broad grouping of backend types sharing a capability set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendFamily {
    /// Full SQL: DDL, DML, queries.
    Standard,
    /// DDL, INSERT and SELECT only.
    Appender,
    /// DDL and INSERT only.
    Streaming,
}

impl DbType {
    /// All supported backend types.
    pub const ALL: [DbType; 11] = [
        DbType::Sqlite,
        DbType::Duckdb,
        DbType::Derby,
        DbType::H2,
        DbType::Hypersql,
        DbType::SqliteAppender,
        DbType::DuckdbAppender,
        DbType::DerbyAppender,
        DbType::H2Appender,
        DbType::HypersqlAppender,
        DbType::Streaming,
    ];

    /// Returns the wire name of this backend type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            DbType::Sqlite => "SQLITE",
            DbType::Duckdb => "DUCKDB",
            DbType::Derby => "DERBY",
            DbType::H2 => "H2",
            DbType::Hypersql => "HYPERSQL",
            DbType::SqliteAppender => "SQLITE_APPENDER",
            DbType::DuckdbAppender => "DUCKDB_APPENDER",
            DbType::DerbyAppender => "DERBY_APPENDER",
            DbType::H2Appender => "H2_APPENDER",
            DbType::HypersqlAppender => "HYPERSQL_APPENDER",
            DbType::Streaming => "STREAMING",
        }
    }

    /// Returns the family this backend type belongs to.
    #[must_use]
    pub const fn family(self) -> BackendFamily {
        match self {
            DbType::Sqlite | DbType::Duckdb | DbType::Derby | DbType::H2 | DbType::Hypersql => {
                BackendFamily::Standard
            }
            DbType::SqliteAppender
            | DbType::DuckdbAppender
            | DbType::DerbyAppender
            | DbType::H2Appender
            | DbType::HypersqlAppender => BackendFamily::Appender,
            DbType::Streaming => BackendFamily::Streaming,
        }
    }

    /// Returns the capability set checked by the executor.
    #[must_use]
    pub const fn capabilities(self) -> Capabilities {
        match self.family() {
            BackendFamily::Standard => Capabilities {
                update_delete: true,
                select: true,
                unrecognized: true,
            },
            BackendFamily::Appender => Capabilities {
                update_delete: false,
                select: true,
                unrecognized: false,
            },
            BackendFamily::Streaming => Capabilities {
                update_delete: false,
                select: false,
                unrecognized: false,
            },
        }
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown backend type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDbType(pub String);

impl fmt::Display for UnknownDbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown db-type '{}'", self.0)
    }
}

impl std::error::Error for UnknownDbType {}

impl FromStr for DbType {
    type Err = UnknownDbType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        DbType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownDbType(s.to_string()))
    }
}

/// What a backend type permits beyond DDL and INSERT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// UPDATE / DELETE style mutations.
    pub update_delete: bool,
    /// Row-returning queries.
    pub select: bool,
    /// Statements the classifier does not recognize.
    pub unrecognized: bool,
}

impl Capabilities {
    /// Checks whether a statement kind may run.
    #[must_use]
    pub const fn permits(self, kind: StatementKind) -> bool {
        match kind {
            StatementKind::Ddl | StatementKind::Insert => true,
            StatementKind::UpdateDelete => self.update_delete,
            StatementKind::Select => self.select,
            StatementKind::Unrecognized => self.unrecognized,
            StatementKind::TransactionControl => false,
        }
    }
}

/// Classification of a SQL statement by its leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// CREATE / DROP / ALTER / RENAME.
    Ddl,
    /// INSERT.
    Insert,
    /// UPDATE / DELETE and other in-place mutations.
    UpdateDelete,
    /// Row-returning query.
    Select,
    /// BEGIN / COMMIT / ROLLBACK / SAVEPOINT written as literal SQL.
    TransactionControl,
    /// Anything else.
    Unrecognized,
}

impl StatementKind {
    /// Returns true if successful statements of this kind go to the commit log.
    #[must_use]
    pub const fn is_logged(self) -> bool {
        matches!(
            self,
            StatementKind::Ddl
                | StatementKind::Insert
                | StatementKind::UpdateDelete
                | StatementKind::Unrecognized
        )
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StatementKind::Ddl => "DDL",
            StatementKind::Insert => "INSERT",
            StatementKind::UpdateDelete => "UPDATE/DELETE",
            StatementKind::Select => "SELECT",
            StatementKind::TransactionControl => "transaction control",
            StatementKind::Unrecognized => "unrecognized",
        })
    }
}

/// Opaque handle identifying one open transaction.
///
/// Handles are random v4 UUIDs and are never reused within a process.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TxnHandle(String);

impl TxnHandle {
    /// Mints a fresh handle.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wraps a handle received from a client.
    #[must_use]
    pub fn from_client(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the handle text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxnHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
