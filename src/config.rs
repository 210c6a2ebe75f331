// Runtime configuration

use crate::blob::{BlobStore, MemoryBlobStore};
use crate::jsonl::JsonlBlobStore;
use crate::store::SqliteBlobStore;
use crate::ticker::DEFAULT_TICK_MS;
use eyre::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Config file name, looked up in the store directory
pub const CONFIG_FILE: &str = "tasktally.yml";

/// Storage medium behind the persistent store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sqlite,
    Jsonl,
    /// Nothing survives the process
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub backend: Backend,
    /// Nominal tick period in milliseconds
    pub tick_ms: u64,
    /// Upper bound on the time credited by a single tick. `None` credits
    /// the whole gap, including time spent suspended.
    pub max_tick_delta_ms: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            tick_ms: DEFAULT_TICK_MS,
            max_tick_delta_ms: None,
        }
    }
}

impl Config {
    /// Load `tasktally.yml` from `dir`, or defaults if there is none
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            debug!(path = ?path, "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).with_context(|| format!("Failed to read config file {:?}", path))?;
        let config = Self::from_yaml(&content).with_context(|| format!("Failed to parse config file {:?}", path))?;
        info!(path = ?path, ?config, "Loaded config");
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Open the configured backend under `dir`
    pub fn open_blob_store(&self, dir: &Path) -> Result<Box<dyn BlobStore>> {
        let blob: Box<dyn BlobStore> = match self.backend {
            Backend::Sqlite => Box::new(SqliteBlobStore::open(dir)?),
            Backend::Jsonl => Box::new(JsonlBlobStore::open(dir)?),
            Backend::Memory => Box::new(MemoryBlobStore::new()),
        };
        Ok(blob)
    }
}

/// Platform data directory for tasktally, falling back to the current directory
pub fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("tasktally"))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = Config::load(temp.path()).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.tick_ms, 1000);
        assert_eq!(config.backend, Backend::Sqlite);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(CONFIG_FILE), "backend: jsonl\nmax_tick_delta_ms: 300000\n").unwrap();

        let config = Config::load(temp.path()).unwrap();
        assert_eq!(config.backend, Backend::Jsonl);
        assert_eq!(config.tick_ms, 1000);
        assert_eq!(config.max_tick_delta_ms, Some(300_000));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(CONFIG_FILE), "tick_ms: [oops\n").unwrap();
        assert!(Config::load(temp.path()).is_err());

        fs::write(temp.path().join(CONFIG_FILE), "tick_msec: 5\n").unwrap();
        assert!(Config::load(temp.path()).is_err());
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        assert_eq!(Config::from_yaml("\n").unwrap(), Config::default());
    }

    #[test]
    fn test_open_each_backend() {
        let temp = TempDir::new().unwrap();
        for backend in [Backend::Sqlite, Backend::Jsonl, Backend::Memory] {
            let config = Config {
                backend,
                ..Config::default()
            };
            let mut blob = config.open_blob_store(temp.path()).unwrap();
            blob.set("display-mode-flag", "true").unwrap();
            assert_eq!(blob.get("display-mode-flag").unwrap().as_deref(), Some("true"));
        }
    }
}
