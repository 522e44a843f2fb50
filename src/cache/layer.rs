//! TTL cache over the persistent store.

use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::traits::CacheResult;
use crate::clock::Clock;
use crate::store::{keys, Storage};

/// Stored form of a cache entry.
#[derive(Debug, Serialize, Deserialize)]
struct CachedEntry {
  value: Value,
  /// Epoch milliseconds after which the entry is stale
  expires: i64,
}

/// Key/value cache with per-entry expiration.
///
/// Keys are stored under the `cache_` prefix so they never collide with
/// other persisted state. There is no size bound; expired entries are
/// deleted when read.
#[derive(Clone)]
pub struct LocalCache {
  storage: Arc<dyn Storage>,
  clock: Arc<dyn Clock>,
  default_ttl: Duration,
}

impl LocalCache {
  /// Create a cache with a one hour default TTL.
  pub fn new(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>) -> Self {
    Self {
      storage,
      clock,
      default_ttl: Duration::from_secs(3600),
    }
  }

  pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
    self.default_ttl = ttl;
    self
  }

  pub fn default_ttl(&self) -> Duration {
    self.default_ttl
  }

  fn storage_key(key: &str) -> String {
    format!("{}{}", keys::CACHE_PREFIX, key)
  }

  pub fn set<V: Serialize + ?Sized>(&self, key: &str, value: &V, ttl: Duration) -> Result<()> {
    let entry = CachedEntry {
      value: serde_json::to_value(value)
        .map_err(|e| eyre!("Failed to serialize cache value for {}: {}", key, e))?,
      expires: self.clock.now_ms() + ttl.as_millis() as i64,
    };
    let data = serde_json::to_string(&entry)
      .map_err(|e| eyre!("Failed to serialize cache entry for {}: {}", key, e))?;
    self.storage.set(&Self::storage_key(key), &data)
  }

  /// Look up `key`; expired or unreadable entries are removed and miss.
  pub fn get<V: DeserializeOwned>(&self, key: &str) -> Result<Option<V>> {
    let storage_key = Self::storage_key(key);
    let Some(data) = self.storage.get(&storage_key)? else {
      return Ok(None);
    };

    let entry: CachedEntry = match serde_json::from_str(&data) {
      Ok(entry) => entry,
      Err(e) => {
        warn!("Discarding corrupt cache entry {}: {}", key, e);
        self.storage.remove(&storage_key)?;
        return Ok(None);
      }
    };

    if self.clock.now_ms() > entry.expires {
      debug!(key, "cache entry expired");
      self.storage.remove(&storage_key)?;
      return Ok(None);
    }

    match serde_json::from_value(entry.value) {
      Ok(value) => Ok(Some(value)),
      Err(e) => {
        warn!("Discarding cache entry {} of unexpected shape: {}", key, e);
        self.storage.remove(&storage_key)?;
        Ok(None)
      }
    }
  }

  pub fn remove(&self, key: &str) -> Result<()> {
    self.storage.remove(&Self::storage_key(key))
  }

  /// Remove every entry whose key starts with `prefix`.
  pub fn remove_prefix(&self, prefix: &str) -> Result<usize> {
    let keys = self
      .storage
      .keys_with_prefix(&Self::storage_key(prefix))?;
    for key in &keys {
      self.storage.remove(key)?;
    }
    Ok(keys.len())
  }

  /// Remove every cache entry, leaving other persisted state alone.
  pub fn clear(&self) -> Result<usize> {
    self.remove_prefix("")
  }

  /// Read-through lookup.
  ///
  /// 1. Return the cached value if present and unexpired
  /// 2. Otherwise fetch, store with `ttl`, and return the fresh value
  ///
  /// Cache read/write failures are logged and treated as misses; only the
  /// fetcher's error is returned.
  pub async fn get_or_fetch<T, E, F, Fut>(
    &self,
    key: &str,
    ttl: Duration,
    fetcher: F,
  ) -> std::result::Result<CacheResult<T>, E>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
  {
    match self.get::<T>(key) {
      Ok(Some(cached)) => return Ok(CacheResult::from_cache(cached)),
      Ok(None) => {}
      Err(e) => warn!("Cache read failed for {}: {}", key, e),
    }

    let data = fetcher().await?;
    if let Err(e) = self.set(key, &data, ttl) {
      warn!("Cache write failed for {}: {}", key, e);
    }
    Ok(CacheResult::from_network(data))
  }
}
