//! Cache storage trait and SQLite implementation.
//!
//! Entries live in a single key/value table keyed by a namespaced prefix
//! (`cache:<function>:<payload>`), plus one fixed key holding the last-known
//! lookup snapshot for offline starts. The layout survives process restarts.

use chrono::{DateTime, TimeZone, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::sync::Mutex;

/// Key prefix for request cache entries; the sweep only touches these.
const CACHE_PREFIX: &str = "cache:";

/// Fixed key for the persisted lookup-set snapshot.
const SNAPSHOT_KEY: &str = "lookups:snapshot";

/// A single persisted cache entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
  pub key: String,
  pub stored_at: DateTime<Utc>,
  pub value: Value,
}

/// Trait for cache storage backends.
pub trait CacheStorage: Send + Sync {
  /// Look up an entry by key. Entries whose stored payload no longer parses
  /// are reported as absent; the sweep deletes them.
  fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

  /// Store or overwrite an entry. Entries are never partially updated.
  fn put(&self, key: &str, value: &Value, stored_at: DateTime<Utc>) -> Result<()>;

  /// Delete every cache entry older than `max_age` or unparseable,
  /// regardless of its originating TTL. Returns the number removed.
  fn sweep(&self, max_age: chrono::Duration) -> Result<usize>;

  /// Load the persisted lookup snapshot, if any.
  fn load_snapshot(&self) -> Result<Option<Value>>;

  /// Persist the lookup snapshot under its fixed key.
  fn store_snapshot(&self, value: &Value) -> Result<()>;
}

/// Storage implementation that doesn't persist anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn get(&self, _key: &str) -> Result<Option<CacheEntry>> {
    Ok(None) // Always miss
  }

  fn put(&self, _key: &str, _value: &Value, _stored_at: DateTime<Utc>) -> Result<()> {
    Ok(()) // Discard
  }

  fn sweep(&self, _max_age: chrono::Duration) -> Result<usize> {
    Ok(0)
  }

  fn load_snapshot(&self) -> Result<Option<Value>> {
    Ok(None)
  }

  fn store_snapshot(&self, _value: &Value) -> Result<()> {
    Ok(()) // Discard
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

/// Schema for the key/value store.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_cache (
    key TEXT PRIMARY KEY,
    stored_at INTEGER NOT NULL,
    data TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_kv_cache_stored_at ON kv_cache(stored_at);
"#;

impl SqliteStorage {
  /// Open the storage at the given path, creating parent directories.
  pub fn open(path: &std::path::Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// Open the storage at the default location.
  pub fn open_default() -> Result<Self> {
    Self::open(&Self::default_path()?)
  }

  /// In-memory storage for tests.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// Get the default database path.
  fn default_path() -> Result<std::path::PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("stockctl").join("cache.db"))
  }

  fn get_raw(&self, key: &str) -> Result<Option<(i64, String)>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .query_row(
        "SELECT stored_at, data FROM kv_cache WHERE key = ?",
        params![key],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read cache entry: {}", e))
  }

  fn put_raw(&self, key: &str, data: &str, stored_at: DateTime<Utc>) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO kv_cache (key, stored_at, data) VALUES (?, ?, ?)",
        params![key, stored_at.timestamp_millis(), data],
      )
      .map_err(|e| eyre!("Failed to store cache entry: {}", e))?;

    Ok(())
  }
}

impl CacheStorage for SqliteStorage {
  fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
    let row = match self.get_raw(key)? {
      Some(row) => row,
      None => return Ok(None),
    };

    let (stored_at_ms, data) = row;
    let value: Value = match serde_json::from_str(&data) {
      Ok(v) => v,
      // Unparseable payload: treat as a miss, leave deletion to the sweep.
      Err(_) => return Ok(None),
    };

    let stored_at = Utc
      .timestamp_millis_opt(stored_at_ms)
      .single()
      .ok_or_else(|| eyre!("Invalid stored_at timestamp {} for {}", stored_at_ms, key))?;

    Ok(Some(CacheEntry {
      key: key.to_string(),
      stored_at,
      value,
    }))
  }

  fn put(&self, key: &str, value: &Value, stored_at: DateTime<Utc>) -> Result<()> {
    self.put_raw(key, &value.to_string(), stored_at)
  }

  fn sweep(&self, max_age: chrono::Duration) -> Result<usize> {
    let cutoff = (Utc::now() - max_age).timestamp_millis();
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    // Collect, then delete: expired by age, or payload no longer parses.
    let mut stmt = conn
      .prepare("SELECT key, stored_at, data FROM kv_cache WHERE key LIKE ?")
      .map_err(|e| eyre!("Failed to prepare sweep query: {}", e))?;

    let pattern = format!("{}%", CACHE_PREFIX);
    let rows: Vec<(String, i64, String)> = stmt
      .query_map(params![pattern], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
      })
      .map_err(|e| eyre!("Failed to scan cache entries: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    let to_remove: Vec<String> = rows
      .into_iter()
      .filter(|(_, stored_at, data)| {
        *stored_at < cutoff || serde_json::from_str::<Value>(data).is_err()
      })
      .map(|(key, _, _)| key)
      .collect();

    for key in &to_remove {
      conn
        .execute("DELETE FROM kv_cache WHERE key = ?", params![key])
        .map_err(|e| eyre!("Failed to delete cache entry {}: {}", key, e))?;
    }

    Ok(to_remove.len())
  }

  fn load_snapshot(&self) -> Result<Option<Value>> {
    match self.get_raw(SNAPSHOT_KEY)? {
      Some((_, data)) => Ok(serde_json::from_str(&data).ok()),
      None => Ok(None),
    }
  }

  fn store_snapshot(&self, value: &Value) -> Result<()> {
    self.put_raw(SNAPSHOT_KEY, &value.to_string(), Utc::now())
  }
}
