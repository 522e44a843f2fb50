//! Local caching for read-heavy, low-volatility resources.
//!
//! This module provides a small TTL cache that:
//! - Stores JSON values under namespaced keys in the persistent store
//! - Evicts expired or corrupt entries lazily, on read
//! - Derives stable keys for parameterized queries
//! - Supports read-through fetching for the domain modules

mod layer;
mod traits;

pub use layer::LocalCache;
pub use traits::{CacheResult, CacheSource, QueryKey};
