//! Broker and logger configuration.

use crate::error::{CoreError, CoreResult};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Logger config key naming the commit log directory.
pub const STAGE_DIRECTORY_KEY: &str = "local-data-stage-directory";
/// Logger config key naming the device.
pub const DEVICE_NAME_KEY: &str = "device-name";

/// Configuration shared by every registered database.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Run every batch under a savepoint so a failed batch leaves no
    /// tuple applied.
    pub atomic_batches: bool,
    /// Commit log directory for databases whose logger config names none.
    pub stage_dir: Option<PathBuf>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            atomic_batches: true,
            stage_dir: None,
        }
    }
}

impl BrokerConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether batches are atomic.
    #[must_use]
    pub const fn atomic_batches(mut self, value: bool) -> Self {
        self.atomic_batches = value;
        self
    }

    /// Sets the default commit log directory.
    #[must_use]
    pub fn stage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.stage_dir = Some(dir.into());
        self
    }
}

/// Per-database logger settings read from a `key = value` file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggerConfig {
    entries: BTreeMap<String, String>,
}

impl LoggerConfig {
    /// Loads a logger config file.
    ///
    /// # Errors
    ///
    /// Returns a config error if the file cannot be read or a
    /// non-comment line has no `=`.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            CoreError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&text)
            .map_err(|e| CoreError::config(format!("{}: {e}", path.display())))
    }

    /// Parses logger config text.
    ///
    /// # Errors
    ///
    /// Returns a description of the first malformed line.
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut entries = BTreeMap::new();
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| format!("line {}: expected key = value", lineno + 1))?;
            entries.insert(key.trim().to_string(), value.trim().to_string());
        }
        Ok(Self { entries })
    }

    /// Returns a raw entry.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Returns the configured commit log directory.
    #[must_use]
    pub fn stage_dir(&self) -> Option<PathBuf> {
        self.get(STAGE_DIRECTORY_KEY).map(PathBuf::from)
    }

    /// Returns the configured device name.
    #[must_use]
    pub fn device_name(&self) -> Option<&str> {
        self.get(DEVICE_NAME_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = BrokerConfig::default();
        assert!(config.atomic_batches);
        assert!(config.stage_dir.is_none());
    }

    #[test]
    fn builder_pattern() {
        let config = BrokerConfig::new()
            .atomic_batches(false)
            .stage_dir("/tmp/stage");
        assert!(!config.atomic_batches);
        assert_eq!(config.stage_dir, Some(PathBuf::from("/tmp/stage")));
    }

    #[test]
    fn parses_properties() {
        let cfg = LoggerConfig::parse(
            "# comment\n! also comment\n\nlocal-data-stage-directory = /data/stage\ndevice-name=dev1\nunknown = x\n",
        )
        .unwrap();
        assert_eq!(cfg.stage_dir(), Some(PathBuf::from("/data/stage")));
        assert_eq!(cfg.device_name(), Some("dev1"));
        assert_eq!(cfg.get("unknown"), Some("x"));
    }

    #[test]
    fn empty_values_are_absent() {
        let cfg = LoggerConfig::parse("device-name =\n").unwrap();
        assert_eq!(cfg.device_name(), None);
    }

    #[test]
    fn rejects_line_without_separator() {
        let err = LoggerConfig::parse("ok = 1\nbroken\n").unwrap_err();
        assert!(err.contains("line 2"));
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = LoggerConfig::load(Path::new("/definitely/not/here.conf")).unwrap_err();
        assert_eq!(err.kind(), "ConfigError");
    }
}
