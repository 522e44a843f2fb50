use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_AI_API_URL: &str = "http://localhost:5000/ai";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  pub storage: StorageConfig,
  pub retry: RetryConfig,
  pub queue: QueueConfig,
  pub cache: CacheConfig,
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  /// General API base (VITE_API_URL)
  pub url: String,
  /// AI/chat API base (VITE_AI_API_URL)
  pub ai_url: String,
  pub timeout_ms: u64,
  /// Generation calls get a longer budget
  pub ai_timeout_ms: u64,
  pub probe_timeout_ms: u64,
  /// Sent with chat messages
  pub locale: String,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      url: DEFAULT_API_URL.to_string(),
      ai_url: DEFAULT_AI_API_URL.to_string(),
      timeout_ms: 30_000,
      ai_timeout_ms: 60_000,
      probe_timeout_ms: 5_000,
      locale: "en-KE".to_string(),
    }
  }
}

impl ApiConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_millis(self.timeout_ms)
  }

  pub fn ai_timeout(&self) -> Duration {
    Duration::from_millis(self.ai_timeout_ms)
  }

  pub fn probe_timeout(&self) -> Duration {
    Duration::from_millis(self.probe_timeout_ms)
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
  /// SQLite file for persisted state (default: $XDG_DATA_HOME/civic-navigator/state.db)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
  pub max_attempts: u32,
  pub initial_delay_ms: u64,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      initial_delay_ms: 1_000,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
  /// Failed replays before an entry is dead-lettered
  pub max_attempts: u32,
  /// How often the connectivity watch probes the backend
  pub watch_interval_secs: u64,
}

impl Default for QueueConfig {
  fn default() -> Self {
    Self {
      max_attempts: 5,
      watch_interval_secs: 30,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub default_ttl_secs: u64,
  pub kb_ttl_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      default_ttl_secs: 3_600,
      kb_ttl_secs: 300,
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Directory for the rolling log file (default: $XDG_DATA_HOME/civic-navigator/logs)
  pub dir: Option<PathBuf>,
}

impl Config {
  /// Load configuration from file, then apply environment overrides.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./civic.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/civic-navigator/config.yaml
  ///
  /// Every field has a default, so running without a file is fine.
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

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };

    Ok(config.apply_env_with(|key| std::env::var(key).ok()))
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("civic.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("civic-navigator").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  pub fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Apply `VITE_API_URL`, `VITE_AI_API_URL` and `CIVIC_STATE_PATH`.
  /// Empty values are ignored.
  pub fn apply_env_with<F>(mut self, lookup: F) -> Self
  where
    F: Fn(&str) -> Option<String>,
  {
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(url) = get("VITE_API_URL") {
      self.api.url = url;
    }
    if let Some(url) = get("VITE_AI_API_URL") {
      self.api.ai_url = url;
    }
    if let Some(path) = get("CIVIC_STATE_PATH") {
      self.storage.path = Some(PathBuf::from(path));
    }
    self
  }

  pub fn retry_policy(&self) -> crate::http::RetryPolicy {
    crate::http::RetryPolicy {
      max_attempts: self.retry.max_attempts.max(1),
      initial_delay: Duration::from_millis(self.retry.initial_delay_ms),
    }
  }

  /// Directory for log files.
  pub fn log_dir(&self) -> Option<PathBuf> {
    self
      .log
      .dir
      .clone()
      .or_else(|| dirs::data_dir().map(|d| d.join("civic-navigator").join("logs")))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.api.url, DEFAULT_API_URL);
    assert_eq!(config.api.ai_url, DEFAULT_AI_API_URL);
    assert_eq!(config.api.timeout(), Duration::from_secs(30));
    assert_eq!(config.api.ai_timeout(), Duration::from_secs(60));
    assert_eq!(config.queue.max_attempts, 5);
    assert_eq!(config.retry_policy().max_attempts, 3);
  }

  #[test]
  fn test_partial_file_keeps_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
      file,
      "api:\n  url: https://civic.example.go.ke/api\n  timeout_ms: 10000\nqueue:\n  max_attempts: 2"
    )
    .unwrap();

    let config = Config::load_from_path(file.path()).unwrap();
    assert_eq!(config.api.url, "https://civic.example.go.ke/api");
    assert_eq!(config.api.timeout_ms, 10_000);
    assert_eq!(config.api.ai_url, DEFAULT_AI_API_URL);
    assert_eq!(config.queue.max_attempts, 2);
    assert_eq!(config.cache.kb_ttl_secs, 300);
  }

  #[test]
  fn test_env_overrides() {
    let config = Config::default().apply_env_with(|key| match key {
      "VITE_API_URL" => Some("http://10.0.0.5/api".to_string()),
      "VITE_AI_API_URL" => Some("  ".to_string()),
      "CIVIC_STATE_PATH" => Some("/tmp/civic.db".to_string()),
      _ => None,
    });
    assert_eq!(config.api.url, "http://10.0.0.5/api");
    assert_eq!(config.api.ai_url, DEFAULT_AI_API_URL);
    assert_eq!(config.storage.path, Some(PathBuf::from("/tmp/civic.db")));
  }

  #[test]
  fn test_missing_explicit_file_is_an_error() {
    assert!(Config::load(Some(Path::new("/definitely/not/here.yaml"))).is_err());
  }
}
