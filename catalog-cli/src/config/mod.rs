//! Application configuration
//!
//! Loaded from `<config_dir>/catalog-cli/config.toml` (or an explicit path),
//! then overridden by `CATALOG_*` environment variables. Every field has a
//! default, so a missing file is not an error.

pub mod repository;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::import::ingest::DEFAULT_CHUNK_SIZE;
use crate::import::queue::{DEFAULT_MAX_ATTEMPTS, DEFAULT_STALE_AFTER};
use crate::import::upload::DEFAULT_MAX_UPLOAD_BYTES;

const APP_DIR: &str = "catalog-cli";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// sqlx SQLite URL, e.g. `sqlite:///var/lib/catalog/catalog.db`
    pub database_url: String,
    /// Root directory for uploaded workbooks
    pub storage_root: PathBuf,
    pub import: ImportConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Data rows per reconciled chunk
    pub chunk_size: usize,
    pub max_upload_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub poll_interval_ms: u64,
    /// Deliveries before a retriable failure becomes final
    pub max_attempts: u32,
    /// Seconds a running job may go without progress before another worker
    /// requeues it
    pub stale_after_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            database_url: format!("sqlite://{}", data_dir.join("catalog.db").display()),
            storage_root: data_dir.join("storage"),
            import: ImportConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            stale_after_secs: DEFAULT_STALE_AFTER.as_secs(),
        }
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

/// `<data_local_dir>/catalog-cli`
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// `<config_dir>/catalog-cli/config.toml`
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("config.toml")
}

impl Config {
    /// Load from `path` (or the default location), then apply env overrides.
    /// An explicit path must exist; the default one may be absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = default_path();
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    log::debug!("No config file at {}, using defaults", path.display());
                    Self::default()
                }
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::from_toml(&raw)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("Invalid configuration")
    }

    /// Apply `CATALOG_*` overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("CATALOG_DATABASE_URL") {
            self.database_url = url;
        }
        if let Some(root) = lookup("CATALOG_STORAGE_ROOT") {
            self.storage_root = PathBuf::from(root);
        }
        if let Some(raw) = lookup("CATALOG_CHUNK_SIZE") {
            self.import.chunk_size = raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid CATALOG_CHUNK_SIZE: {}", raw))?;
        }
        if let Some(raw) = lookup("CATALOG_MAX_ATTEMPTS") {
            self.worker.max_attempts = raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid CATALOG_MAX_ATTEMPTS: {}", raw))?;
        }
        if let Some(raw) = lookup("CATALOG_STALE_AFTER_SECS") {
            self.worker.stale_after_secs = raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid CATALOG_STALE_AFTER_SECS: {}", raw))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.import.chunk_size, 100);
        assert_eq!(config.import.max_upload_bytes, 5 * 1024 * 1024);
        assert_eq!(config.worker.max_attempts, 3);
        assert_eq!(config.worker.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.worker.stale_after(), Duration::from_secs(600));
        assert!(config.database_url.starts_with("sqlite://"));
        assert!(config.database_url.ends_with("catalog.db"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            database_url = "sqlite://catalog.db"

            [worker]
            poll_interval_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.database_url, "sqlite://catalog.db");
        assert_eq!(config.worker.poll_interval_ms, 250);
        assert_eq!(config.worker.max_attempts, 3);
        assert_eq!(config.import, ImportConfig::default());
    }

    #[test]
    fn test_invalid_toml() {
        assert!(Config::from_toml("import = 5").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("CATALOG_DATABASE_URL", "sqlite://other.db"),
            ("CATALOG_STORAGE_ROOT", "/tmp/uploads"),
            ("CATALOG_CHUNK_SIZE", " 25 "),
            ("CATALOG_MAX_ATTEMPTS", "5"),
            ("CATALOG_STALE_AFTER_SECS", "90"),
        ]);

        let mut config = Config::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.database_url, "sqlite://other.db");
        assert_eq!(config.storage_root, PathBuf::from("/tmp/uploads"));
        assert_eq!(config.import.chunk_size, 25);
        assert_eq!(config.worker.max_attempts, 5);
        assert_eq!(config.worker.stale_after(), Duration::from_secs(90));
    }

    #[test]
    fn test_bad_override_is_an_error() {
        let mut config = Config::default();
        let result = config.apply_overrides(|key| {
            (key == "CATALOG_CHUNK_SIZE").then(|| "lots".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[import]\nchunk_size = 10\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.import.chunk_size, 10);

        assert!(Config::from_file(&dir.path().join("missing.toml")).is_err());
    }
}
