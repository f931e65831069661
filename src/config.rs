use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the storage database path.
pub const STORAGE_PATH_ENV: &str = "DASHKEEP_STORAGE_PATH";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub retry: RetryConfig,
  #[serde(default)]
  pub ttl_cache: TtlCacheConfig,
  #[serde(default)]
  pub history: HistoryConfig,
  #[serde(default)]
  pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
  /// First backoff delay; doubled on every further attempt
  pub base_delay_ms: u64,
  /// Upper bound for any single backoff delay
  pub max_delay_ms: u64,
  /// Retry budget for server errors, rate limiting and unclassified failures
  pub max_retries: u32,
  /// Retry budget for timeouts and connection failures
  pub max_network_retries: u32,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      base_delay_ms: 1000,
      max_delay_ms: 30_000,
      max_retries: 3,
      max_network_retries: 1,
    }
  }
}

impl RetryConfig {
  pub fn base_delay(&self) -> Duration {
    Duration::from_millis(self.base_delay_ms)
  }

  pub fn max_delay(&self) -> Duration {
    Duration::from_millis(self.max_delay_ms)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TtlCacheConfig {
  pub ttl_secs: u64,
  /// How often the background sweep removes expired records
  pub sweep_interval_secs: u64,
}

impl Default for TtlCacheConfig {
  fn default() -> Self {
    Self {
      ttl_secs: 5 * 60,
      sweep_interval_secs: 60,
    }
  }
}

impl TtlCacheConfig {
  pub fn ttl(&self) -> Duration {
    Duration::from_secs(self.ttl_secs)
  }

  pub fn sweep_interval(&self) -> Duration {
    Duration::from_secs(self.sweep_interval_secs)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
  /// Maximum number of actions kept for undo
  pub capacity: usize,
}

impl Default for HistoryConfig {
  fn default() -> Self {
    Self { capacity: 50 }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
  /// SQLite database file; defaults to the platform data directory
  pub path: Option<PathBuf>,
  /// Record holding the query cache snapshot
  pub snapshot_key: String,
  /// Prefix of every cache metadata record
  pub metadata_prefix: String,
}

impl Default for StorageConfig {
  fn default() -> Self {
    Self {
      path: None,
      snapshot_key: "react-query-cache".to_string(),
      metadata_prefix: "cache_metadata_".to_string(),
    }
  }
}

impl StorageConfig {
  /// Resolve the database path.
  ///
  /// `DASHKEEP_STORAGE_PATH` wins over the configured path, which wins over
  /// `$XDG_DATA_HOME/dashkeep/storage.db`.
  pub fn resolve_path(&self) -> Result<PathBuf> {
    if let Ok(path) = std::env::var(STORAGE_PATH_ENV) {
      return Ok(PathBuf::from(path));
    }
    if let Some(path) = &self.path {
      return Ok(path.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("dashkeep").join("storage.db"))
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided (must exist)
  /// 2. ./dashkeep.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/dashkeep/config.yaml
  ///
  /// Falls back to defaults when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => {
        tracing::debug!("no config file found, using defaults");
        Ok(Self::default())
      }
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("dashkeep.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("dashkeep").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }
}
