//! Request decoding.
//!
//! A request is a JSON object. `sql` doubles as the operation selector:
//! the keywords `initialize`, `begin`, `commit`, `rollback` and `close`
//! (matched case-insensitively) select those operations, as do the
//! commands `close database <path>` and `close all databases`. Anything
//! else is literal SQL for `execute`.

use crate::error::{ProtocolError, ProtocolResult};
use crate::value::sql_value_from_json;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use synclitedb_core::{DbType, InitializeOptions, SqlValue, TxnHandle};

/// Request body exactly as it appears on the wire.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawRequest {
    /// Target database path.
    pub db_path: Option<String>,
    /// Operation keyword or literal SQL.
    pub sql: Option<String>,
    /// Backend type for `initialize`.
    pub db_type: Option<String>,
    /// Descriptive database name.
    pub db_name: Option<String>,
    /// Logger config file path.
    #[serde(rename = "synclite-logger-config")]
    pub logger_config: Option<String>,
    /// Transaction handle.
    pub txn_handle: Option<String>,
    /// Batch bind parameters.
    pub arguments: Option<Value>,
}

/// A decoded, validated operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Open or create a database.
    Initialize {
        /// Database path as given by the client.
        path: PathBuf,
        /// Backend type, name and logger config.
        options: InitializeOptions,
    },
    /// Open a transaction.
    Begin {
        /// Database path.
        path: PathBuf,
    },
    /// Commit the open transaction.
    Commit {
        /// Database path.
        path: PathBuf,
        /// Handle returned by `begin`.
        txn: TxnHandle,
    },
    /// Roll back the open transaction.
    Rollback {
        /// Database path.
        path: PathBuf,
        /// Handle returned by `begin`.
        txn: TxnHandle,
    },
    /// Close one database.
    Close {
        /// Database path.
        path: PathBuf,
    },
    /// Close every open database.
    CloseAll,
    /// Run a SQL statement or batch.
    Execute {
        /// Database path.
        path: PathBuf,
        /// Transaction the statement belongs to.
        txn: Option<TxnHandle>,
        /// Statement text.
        sql: String,
        /// Argument tuples; `None` runs the statement once unbound.
        arguments: Option<Vec<Vec<SqlValue>>>,
    },
}

impl Operation {
    /// Decodes a request body.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not a JSON object or a field the
    /// operation needs is missing or invalid.
    pub fn decode(body: &[u8]) -> ProtocolResult<Self> {
        let raw: RawRequest = serde_json::from_slice(body)?;
        Self::from_raw(raw)
    }

    /// Validates a raw request.
    ///
    /// # Errors
    ///
    /// See [`Operation::decode`].
    pub fn from_raw(raw: RawRequest) -> ProtocolResult<Self> {
        let path = raw
            .db_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .ok_or(ProtocolError::MissingField("db-path"))?;
        let sql = raw.sql.ok_or(ProtocolError::MissingField("sql"))?;
        let keyword = sql.trim();

        if keyword.eq_ignore_ascii_case("initialize") {
            let db_type: DbType = raw
                .db_type
                .ok_or(ProtocolError::MissingField("db-type"))?
                .parse()
                .map_err(|e| ProtocolError::invalid("db-type", format!("{e}")))?;
            let mut options = InitializeOptions::new(db_type);
            if let Some(name) = raw.db_name.filter(|n| !n.is_empty()) {
                options = options.name(name);
            }
            if let Some(config) = raw.logger_config.filter(|c| !c.is_empty()) {
                options = options.logger_config(config);
            }
            return Ok(Self::Initialize { path, options });
        }
        if keyword.eq_ignore_ascii_case("begin") {
            return Ok(Self::Begin { path });
        }
        if keyword.eq_ignore_ascii_case("commit") {
            let txn = required_handle(raw.txn_handle)?;
            return Ok(Self::Commit { path, txn });
        }
        if keyword.eq_ignore_ascii_case("rollback") {
            let txn = required_handle(raw.txn_handle)?;
            return Ok(Self::Rollback { path, txn });
        }
        if keyword.eq_ignore_ascii_case("close") {
            return Ok(Self::Close { path });
        }
        if strip_keywords(keyword, &["close", "all", "databases"]).is_some_and(str::is_empty) {
            return Ok(Self::CloseAll);
        }
        if let Some(target) = strip_keywords(keyword, &["close", "database"]) {
            if target.is_empty() {
                return Err(ProtocolError::invalid("sql", "close database needs a path"));
            }
            return Ok(Self::Close {
                path: PathBuf::from(target),
            });
        }

        let txn = raw
            .txn_handle
            .filter(|h| !h.is_empty())
            .map(TxnHandle::from_client);
        let arguments = raw.arguments.map(|v| decode_arguments(&v)).transpose()?.flatten();
        Ok(Self::Execute {
            path,
            txn,
            sql,
            arguments,
        })
    }

    /// Short operation name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Initialize { .. } => "initialize",
            Self::Begin { .. } => "begin",
            Self::Commit { .. } => "commit",
            Self::Rollback { .. } => "rollback",
            Self::Close { .. } => "close",
            Self::CloseAll => "closeAll",
            Self::Execute { .. } => "execute",
        }
    }

    /// Database path the operation targets, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Initialize { path, .. }
            | Self::Begin { path }
            | Self::Commit { path, .. }
            | Self::Rollback { path, .. }
            | Self::Close { path }
            | Self::Execute { path, .. } => Some(path),
            Self::CloseAll => None,
        }
    }
}

fn required_handle(raw: Option<String>) -> ProtocolResult<TxnHandle> {
    raw.filter(|h| !h.is_empty())
        .map(TxnHandle::from_client)
        .ok_or(ProtocolError::MissingField("txn-handle"))
}

/// Strips a sequence of whitespace-separated keywords from the front of
/// `sql`, returning the trimmed remainder. A trailing `;` is dropped.
fn strip_keywords<'a>(sql: &'a str, words: &[&str]) -> Option<&'a str> {
    let mut rest = sql.trim_start();
    for word in words {
        let head = rest.get(..word.len())?;
        if !head.eq_ignore_ascii_case(word) {
            return None;
        }
        rest = &rest[word.len()..];
        if !(rest.is_empty() || rest.starts_with(char::is_whitespace) || rest.starts_with(';')) {
            return None;
        }
        rest = rest.trim_start();
    }
    Some(rest.trim_end_matches(';').trim_end())
}

/// Decodes `arguments`. JSON null means no arguments.
fn decode_arguments(value: &Value) -> ProtocolResult<Option<Vec<Vec<SqlValue>>>> {
    let tuples = match value {
        Value::Null => return Ok(None),
        Value::Array(tuples) => tuples,
        _ => return Err(ProtocolError::invalid("arguments", "expected an array of arrays")),
    };
    tuples
        .iter()
        .enumerate()
        .map(|(i, tuple)| {
            let items = tuple.as_array().ok_or_else(|| {
                ProtocolError::invalid("arguments", format!("element {i} is not an array"))
            })?;
            items
                .iter()
                .enumerate()
                .map(|(j, item)| {
                    sql_value_from_json(item).map_err(|e| {
                        ProtocolError::invalid("arguments", format!("[{i}][{j}]: {e}"))
                    })
                })
                .collect()
        })
        .collect::<ProtocolResult<Vec<_>>>()
        .map(Some)
}
