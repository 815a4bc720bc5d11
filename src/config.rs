//! Store configuration.
//!
//! Settings are resolved in tiers: built-in defaults, then an optional YAML
//! file, then environment variables. Later tiers win field-by-field.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Default page size for timeline reads when the caller passes no limit.
pub const DEFAULT_TIMELINE_PAGE_SIZE: usize = 50;

/// Default SQLite busy timeout in milliseconds.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Tunables for the store layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the SQLite database file. `None` means the per-user default
    /// under the home directory.
    pub db_path: Option<PathBuf>,
    /// SQLite busy timeout applied at open.
    pub busy_timeout_ms: u64,
    /// Page size for timeline reads when the caller passes no limit.
    pub timeline_page_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            timeline_page_size: DEFAULT_TIMELINE_PAGE_SIZE,
        }
    }
}

impl StoreConfig {
    /// Load configuration: defaults, then the config file (if any), then
    /// environment overrides.
    pub fn load() -> Self {
        let mut config = match Self::config_file_path() {
            Some(path) if path.exists() => match Self::load_from_file(&path) {
                Ok(config) => config,
                Err(e) => {
                    warn!("Failed to load config from {}: {}", path.display(), e);
                    Self::default()
                }
            },
            _ => Self::default(),
        };
        config.apply_env();
        config
    }

    /// Parse a config file as YAML.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config = serde_yaml::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }

    /// Location of the user config file: `$OPSGRAPH_CONFIG` or
    /// `~/.opsgraph/config.yaml`.
    pub fn config_file_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("OPSGRAPH_CONFIG") {
            return Some(PathBuf::from(path));
        }
        dirs::home_dir().map(|home| home.join(".opsgraph").join("config.yaml"))
    }

    /// Resolve the database path: explicit config, or
    /// `~/.opsgraph/opsgraph.db`.
    pub fn resolve_db_path(&self) -> Option<PathBuf> {
        if let Some(ref path) = self.db_path {
            return Some(path.clone());
        }
        dirs::home_dir().map(|home| home.join(".opsgraph").join("opsgraph.db"))
    }

    fn apply_env(&mut self) {
        if let Ok(path) = std::env::var("OPSGRAPH_DB_PATH") {
            self.db_path = Some(PathBuf::from(path));
        }
        if let Ok(val) = std::env::var("OPSGRAPH_BUSY_TIMEOUT_MS") {
            match val.parse() {
                Ok(ms) => self.busy_timeout_ms = ms,
                Err(_) => warn!("Ignoring invalid OPSGRAPH_BUSY_TIMEOUT_MS: {}", val),
            }
        }
        if let Ok(val) = std::env::var("OPSGRAPH_TIMELINE_PAGE_SIZE") {
            match val.parse() {
                Ok(n) => self.timeline_page_size = n,
                Err(_) => warn!("Ignoring invalid OPSGRAPH_TIMELINE_PAGE_SIZE: {}", val),
            }
        }
    }
}

/// Install a `tracing` subscriber reading `RUST_LOG`, for binaries and
/// tests. Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = StoreConfig::default();
        assert_eq!(config.busy_timeout_ms, DEFAULT_BUSY_TIMEOUT_MS);
        assert_eq!(config.timeline_page_size, DEFAULT_TIMELINE_PAGE_SIZE);
        assert!(config.db_path.is_none());
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config: StoreConfig = serde_yaml::from_str("timeline_page_size: 25\n").unwrap();
        assert_eq!(config.timeline_page_size, 25);
        assert_eq!(config.busy_timeout_ms, DEFAULT_BUSY_TIMEOUT_MS);
    }
}
