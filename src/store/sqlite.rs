//! SQLite-backed key/value storage.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::Storage;

/// Durable storage in a single SQLite table.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open (or create) the store at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      if !parent.as_os_str().is_empty() {
        std::fs::create_dir_all(parent)
          .map_err(|e| eyre!("Failed to create state directory: {}", e))?;
      }
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open state database at {}: {}", path.display(), e))?;

    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;

    Ok(store)
  }

  /// Open the store at the default location.
  pub fn open_default() -> Result<Self> {
    Self::open(&Self::default_path()?)
  }

  /// A store that is discarded when dropped.
  pub fn in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;

    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;

    Ok(store)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("civic-navigator").join("state.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    self
      .lock()?
      .execute_batch(SCHEMA)
      .map_err(|e| eyre!("Failed to run state migrations: {}", e))?;
    Ok(())
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl Storage for SqliteStore {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let conn = self.lock()?;
    conn
      .query_row(
        "SELECT value FROM kv_store WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read key {}: {}", key, e))
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute(
        "INSERT OR REPLACE INTO kv_store (key, value, updated_at) VALUES (?, ?, datetime('now'))",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to write key {}: {}", key, e))?;
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute("DELETE FROM kv_store WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to delete key {}: {}", key, e))?;
    Ok(())
  }

  fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
    let conn = self.lock()?;
    // substr() instead of LIKE so '_' and '%' in prefixes match literally
    let mut stmt = conn
      .prepare("SELECT key FROM kv_store WHERE substr(key, 1, ?) = ? ORDER BY key")
      .map_err(|e| eyre!("Failed to prepare key scan: {}", e))?;

    let keys: Vec<String> = stmt
      .query_map(params![prefix.chars().count() as i64, prefix], |row| {
        row.get::<_, String>(0)
      })
      .map_err(|e| eyre!("Failed to scan keys: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(keys)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_set_get_remove() {
    let store = SqliteStore::in_memory().unwrap();
    assert_eq!(store.get("authToken").unwrap(), None);

    store.set("authToken", "abc").unwrap();
    assert_eq!(store.get("authToken").unwrap().as_deref(), Some("abc"));

    store.set("authToken", "def").unwrap();
    assert_eq!(store.get("authToken").unwrap().as_deref(), Some("def"));

    store.remove("authToken").unwrap();
    assert_eq!(store.get("authToken").unwrap(), None);
    store.remove("authToken").unwrap();
  }

  #[test]
  fn test_prefix_scan_is_literal() {
    let store = SqliteStore::in_memory().unwrap();
    store.set("cache_a", "1").unwrap();
    store.set("cache_b", "2").unwrap();
    store.set("cacheXc", "3").unwrap();
    store.set("user", "4").unwrap();

    let keys = store.keys_with_prefix("cache_").unwrap();
    assert_eq!(keys, vec!["cache_a".to_string(), "cache_b".to_string()]);
  }

  #[test]
  fn test_values_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("state.db");

    {
      let store = SqliteStore::open(&path).unwrap();
      store.set("requestQueue", "[]").unwrap();
    }

    let store = SqliteStore::open(&path).unwrap();
    assert_eq!(store.get("requestQueue").unwrap().as_deref(), Some("[]"));
  }
}
