//! Persistent key/value state.
//!
//! This is the local stand-in for browser storage: the stored credential,
//! the TTL cache and the offline request queue all live here under fixed,
//! namespaced keys.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use color_eyre::Result;

/// Storage keys shared across the client core.
pub mod keys {
  pub const AUTH_TOKEN: &str = "authToken";
  pub const USER: &str = "user";
  pub const TOKEN_EXPIRATION: &str = "tokenExpiration";
  pub const REQUEST_QUEUE: &str = "requestQueue";
  pub const DEAD_LETTER_QUEUE: &str = "requestQueue_deadLetter";
  pub const CACHE_PREFIX: &str = "cache_";
}

/// Trait for string key/value storage backends.
pub trait Storage: Send + Sync {
  /// Read a value.
  fn get(&self, key: &str) -> Result<Option<String>>;

  /// Insert or replace a value.
  fn set(&self, key: &str, value: &str) -> Result<()>;

  /// Delete a value. Deleting a missing key is not an error.
  fn remove(&self, key: &str) -> Result<()>;

  /// All keys beginning with `prefix`, in ascending order.
  fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}
