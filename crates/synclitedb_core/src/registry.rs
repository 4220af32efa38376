//! Process-wide registry of open databases.
//!
//! Each normalized path maps to its own slot guarded by its own mutex, so
//! operations on unrelated databases never contend. Lock order is always
//! slot first, then the path map.

use crate::backend::{Backend, Connector, SqliteConnector};
use crate::config::{BrokerConfig, LoggerConfig};
use crate::error::{CoreError, CoreResult};
use crate::sink::{CommitSink, JsonLinesSink, NullSink};
use crate::transaction::ActiveTransaction;
use crate::types::{DbType, TxnHandle};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

type Slot = Arc<Mutex<Option<OpenDatabase>>>;

/// Options for [`Registry::initialize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializeOptions {
    /// Backend type.
    pub db_type: DbType,
    /// Descriptive database name.
    pub name: Option<String>,
    /// Path of a logger config file.
    pub logger_config: Option<PathBuf>,
}

impl InitializeOptions {
    /// Creates options for the given backend type.
    #[must_use]
    pub fn new(db_type: DbType) -> Self {
        Self {
            db_type,
            name: None,
            logger_config: None,
        }
    }

    /// Sets the descriptive name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the logger config path.
    #[must_use]
    pub fn logger_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.logger_config = Some(path.into());
        self
    }
}

/// Snapshot of a registered database.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseInfo {
    /// Normalized path.
    pub path: PathBuf,
    /// Backend type.
    pub db_type: DbType,
    /// Descriptive name.
    pub name: Option<String>,
    /// Device name used in the commit log.
    pub device: String,
    /// When the database was initialized.
    pub created_at: SystemTime,
    /// Whether a transaction is open.
    pub open_txn: bool,
}

/// Result of closing a database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseOutcome {
    /// Normalized path that was closed.
    pub path: PathBuf,
    /// Handle of a transaction that was implicitly rolled back.
    pub rolled_back: Option<TxnHandle>,
}

/// State of one open database, owned by its registry slot.
pub(crate) struct OpenDatabase {
    pub(crate) path: PathBuf,
    pub(crate) db_type: DbType,
    pub(crate) name: Option<String>,
    pub(crate) device: String,
    pub(crate) created_at: SystemTime,
    pub(crate) backend: Box<dyn Backend>,
    pub(crate) sink: Arc<dyn CommitSink>,
    pub(crate) txn: Option<ActiveTransaction>,
    pub(crate) commit_seq: u64,
}

impl OpenDatabase {
    fn info(&self) -> DatabaseInfo {
        DatabaseInfo {
            path: self.path.clone(),
            db_type: self.db_type,
            name: self.name.clone(),
            device: self.device.clone(),
            created_at: self.created_at,
            open_txn: self.txn.is_some(),
        }
    }

    fn shutdown(mut self) -> CoreResult<CloseOutcome> {
        let rolled_back = self.abort_open_transaction();
        let path = self.path;
        self.backend.close()?;
        Ok(CloseOutcome { path, rolled_back })
    }
}

/// Mapping from normalized database path to its open backend.
pub struct Registry {
    slots: RwLock<HashMap<PathBuf, Slot>>,
    connector: Arc<dyn Connector>,
    config: BrokerConfig,
}

impl Registry {
    /// Creates a registry that opens databases on SQLite.
    #[must_use]
    pub fn new(config: BrokerConfig) -> Self {
        Self::with_connector(config, Arc::new(SqliteConnector))
    }

    /// Creates a registry with a custom backend connector.
    #[must_use]
    pub fn with_connector(config: BrokerConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            connector,
            config,
        }
    }

    /// Returns the broker configuration.
    #[must_use]
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Opens or creates a database and registers it.
    ///
    /// Returns the normalized path the database was registered under.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyOpen` if the path is registered, a config error if
    /// the logger config cannot be loaded, or the backend's open error.
    pub fn initialize(&self, path: &Path, options: InitializeOptions) -> CoreResult<PathBuf> {
        let lexical = lexical_absolute(path)?;
        if let Some(parent) = lexical.parent() {
            fs::create_dir_all(parent)?;
        }
        let path = normalize_path(&lexical)?;

        let logger = options
            .logger_config
            .as_deref()
            .map(LoggerConfig::load)
            .transpose()?;

        loop {
            let slot = self.slot_for_insert(&path);
            let mut guard = slot.lock();
            if !self.is_current(&path, &slot) {
                continue;
            }
            if guard.is_some() {
                return Err(CoreError::AlreadyOpen { path });
            }

            match self.open_database(&path, &options, logger.as_ref()) {
                Ok(db) => {
                    tracing::info!(
                        path = %path.display(),
                        db_type = %options.db_type,
                        device = %db.device,
                        "database initialized"
                    );
                    *guard = Some(db);
                    return Ok(path);
                }
                Err(e) => {
                    self.remove_slot(&path, &slot);
                    return Err(e);
                }
            }
        }
    }

    fn open_database(
        &self,
        path: &Path,
        options: &InitializeOptions,
        logger: Option<&LoggerConfig>,
    ) -> CoreResult<OpenDatabase> {
        let stage_dir = logger
            .and_then(LoggerConfig::stage_dir)
            .or_else(|| self.config.stage_dir.clone());
        let sink: Arc<dyn CommitSink> = match stage_dir {
            Some(dir) => Arc::new(JsonLinesSink::open(&dir, path)?),
            None => Arc::new(NullSink),
        };
        let device = logger
            .and_then(LoggerConfig::device_name)
            .map(str::to_string)
            .or_else(|| options.name.clone())
            .or_else(|| {
                path.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
            })
            .unwrap_or_default();

        let backend = self.connector.open(path, options.db_type)?;
        Ok(OpenDatabase {
            path: path.to_path_buf(),
            db_type: options.db_type,
            name: options.name.clone(),
            device,
            created_at: SystemTime::now(),
            backend,
            sink,
            txn: None,
            commit_seq: 0,
        })
    }

    /// Closes a database, rolling back any open transaction first.
    ///
    /// The registry entry is removed even if the backend fails to close.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the path is not registered, or the backend's
    /// close error.
    pub fn close(&self, path: &Path) -> CoreResult<CloseOutcome> {
        let path = normalize_path(path)?;
        let slot = self.slot(&path)?;
        let mut guard = slot.lock();
        let db = guard.take().ok_or_else(|| CoreError::not_found(&path))?;
        self.remove_slot(&path, &slot);
        drop(guard);

        let outcome = db.shutdown()?;
        tracing::info!(
            path = %outcome.path.display(),
            rolled_back = outcome.rolled_back.is_some(),
            "database closed"
        );
        Ok(outcome)
    }

    /// Closes every registered database.
    ///
    /// All databases are attempted; failures are aggregated.
    ///
    /// # Errors
    ///
    /// Returns `CloseAllFailed` listing each path that failed to close.
    pub fn close_all(&self) -> CoreResult<usize> {
        let mut closed = 0;
        let mut failures = Vec::new();
        for path in self.paths() {
            match self.close(&path) {
                Ok(_) => closed += 1,
                Err(CoreError::NotFound { .. }) => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "close failed");
                    failures.push(format!("{}: {e}", path.display()));
                }
            }
        }
        if failures.is_empty() {
            Ok(closed)
        } else {
            Err(CoreError::CloseAllFailed { failures })
        }
    }

    /// Resolves a path to a snapshot of its registered database.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the path is not registered.
    pub fn resolve(&self, path: &Path) -> CoreResult<DatabaseInfo> {
        self.with_database(path, |db| Ok(db.info()))
    }

    /// Returns true if the path is registered.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.resolve(path).is_ok()
    }

    /// Returns the paths of all registered databases.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.slots.read().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Returns the number of registered databases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// Returns true if no database is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    /// Runs `f` with exclusive access to the database at `path`.
    pub(crate) fn with_database<R>(
        &self,
        path: &Path,
        f: impl FnOnce(&mut OpenDatabase) -> CoreResult<R>,
    ) -> CoreResult<R> {
        let path = normalize_path(path)?;
        let slot = self.slot(&path)?;
        let mut guard = slot.lock();
        let db = guard.as_mut().ok_or_else(|| CoreError::not_found(&path))?;
        f(db)
    }

    fn slot(&self, path: &Path) -> CoreResult<Slot> {
        self.slots
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| CoreError::not_found(path))
    }

    fn slot_for_insert(&self, path: &Path) -> Slot {
        let mut slots = self.slots.write();
        Arc::clone(
            slots
                .entry(path.to_path_buf())
                .or_insert_with(|| Arc::new(Mutex::new(None))),
        )
    }

    fn is_current(&self, path: &Path, slot: &Slot) -> bool {
        self.slots
            .read()
            .get(path)
            .is_some_and(|s| Arc::ptr_eq(s, slot))
    }

    /// Removes the map entry for `path` if it still points at `slot`.
    /// The caller must hold the slot's lock.
    fn remove_slot(&self, path: &Path, slot: &Slot) {
        let mut slots = self.slots.write();
        if slots.get(path).is_some_and(|s| Arc::ptr_eq(s, slot)) {
            slots.remove(path);
        }
    }
}

/// Normalizes a database path: absolute, `.`/`..` resolved, and the
/// parent directory canonicalized when it exists.
///
/// # Errors
///
/// Returns an invalid-argument error for an empty path.
pub fn normalize_path(path: &Path) -> CoreResult<PathBuf> {
    let lexical = lexical_absolute(path)?;
    if let (Some(parent), Some(file)) = (lexical.parent(), lexical.file_name()) {
        if let Ok(canonical) = parent.canonicalize() {
            return Ok(canonical.join(file));
        }
    }
    Ok(lexical)
}

fn lexical_absolute(path: &Path) -> CoreResult<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(CoreError::invalid_argument("database path is empty"));
    }
    let absolute = std::path::absolute(path)?;
    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    Ok(out)
}
