//! Core traits and types for the caching system.

use sha2::{Digest, Sha256};

/// Trait for parameterized lookups that map to a cache key.
pub trait QueryKey {
  /// Namespace shared by every key of this kind (e.g., "kb_articles").
  /// Used to invalidate the whole family after a mutation.
  fn namespace(&self) -> &'static str;

  /// Canonical text of the parameters.
  fn canonical(&self) -> String;

  /// Stable, fixed-length key: `<namespace>_<sha256 hex of canonical form>`.
  fn cache_key(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.canonical().as_bytes());
    format!("{}_{}", self.namespace(), hex::encode(hasher.finalize()))
  }
}

/// Result from a cache operation, including data and where it came from.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  pub data: T,
  pub source: CacheSource,
}

impl<T> CacheResult<T> {
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
    }
  }

  pub fn from_cache(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
    }
  }
}

/// Indicates where returned data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Unexpired cache entry
  Cache,
}
