//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, SecondsFormat, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::traits::Cacheable;

/// Result of a cached query lookup.
#[derive(Debug, Clone)]
pub struct CachedQueryResult<T> {
  /// The cached entities in order
  pub entities: Vec<T>,
  /// When the query result was cached
  pub cached_at: DateTime<Utc>,
}

/// A cached opaque value (paginated pages, statistics).
#[derive(Debug, Clone)]
pub struct CachedSnapshot<T> {
  pub value: T,
  pub cached_at: DateTime<Utc>,
}

/// Trait for cache storage backends.
pub trait CacheStorage: Send + Sync {
  /// Store entities from a query result, replacing any previous result for `key`.
  fn store_query_result<T: Cacheable>(&self, key: &str, description: &str, entities: &[T])
    -> Result<()>;

  /// Get cached entities for a query.
  fn get_query_result<T: Cacheable>(&self, key: &str) -> Result<Option<CachedQueryResult<T>>>;

  /// Store a whole serialized value under `key`.
  fn store_snapshot<T: Serialize>(&self, key: &str, description: &str, value: &T) -> Result<()>;

  /// Get a value stored with `store_snapshot`.
  fn get_snapshot<T: DeserializeOwned>(&self, key: &str) -> Result<Option<CachedSnapshot<T>>>;

  /// Drop every cached query whose description contains `pattern`.
  /// Returns the number of dropped entries.
  fn invalidate(&self, pattern: &str) -> Result<usize>;

  /// Drop everything cached before `cutoff`.
  fn remove_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the cache at the default location in the user data directory.
  pub fn open_default() -> Result<Self> {
    Self::open(&Self::default_path()?)
  }

  /// Open (or create) the cache database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// A cache that lives only as long as the process.
  pub fn in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    Ok(crate::config::data_dir()?.join("cache.db"))
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    self
      .lock()?
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;
    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- Generic entity cache (stores serialized JSON)
CREATE TABLE IF NOT EXISTS entity_cache (
    entity_type TEXT NOT NULL,
    entity_key TEXT NOT NULL,
    data BLOB NOT NULL,
    updated_at TEXT,
    cached_at TEXT NOT NULL,
    PRIMARY KEY (entity_type, entity_key)
);

-- Query result tracking
CREATE TABLE IF NOT EXISTS query_cache (
    query_hash TEXT PRIMARY KEY,
    query_description TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    cached_at TEXT NOT NULL,
    result_count INTEGER NOT NULL
);

-- Query to entity mapping (preserves order)
CREATE TABLE IF NOT EXISTS query_results (
    query_hash TEXT NOT NULL,
    entity_key TEXT NOT NULL,
    position INTEGER NOT NULL,
    PRIMARY KEY (query_hash, entity_key),
    FOREIGN KEY (query_hash) REFERENCES query_cache(query_hash) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_query_results_hash ON query_results(query_hash);

-- Whole-value snapshots (paginated pages, statistics)
CREATE TABLE IF NOT EXISTS snapshot_cache (
    query_hash TEXT PRIMARY KEY,
    query_description TEXT NOT NULL,
    data BLOB NOT NULL,
    cached_at TEXT NOT NULL
);
"#;

impl CacheStorage for SqliteStorage {
  fn store_query_result<T: Cacheable>(
    &self,
    key: &str,
    description: &str,
    entities: &[T],
  ) -> Result<()> {
    let mut conn = self.lock()?;
    let entity_type = T::entity_type();
    let now = format_datetime(Utc::now());

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "DELETE FROM query_results WHERE query_hash = ?",
      params![key],
    )
    .map_err(|e| eyre!("Failed to delete old query results: {}", e))?;

    tx.execute(
      "INSERT OR REPLACE INTO query_cache (query_hash, query_description, entity_type, cached_at, result_count)
       VALUES (?, ?, ?, ?, ?)",
      params![key, description, entity_type, now, entities.len()],
    )
    .map_err(|e| eyre!("Failed to update query cache: {}", e))?;

    for (position, entity) in entities.iter().enumerate() {
      let entity_key = entity.cache_key();
      let data =
        serde_json::to_vec(entity).map_err(|e| eyre!("Failed to serialize entity: {}", e))?;

      tx.execute(
        "INSERT OR REPLACE INTO entity_cache (entity_type, entity_key, data, updated_at, cached_at)
         VALUES (?, ?, ?, ?, ?)",
        params![entity_type, entity_key, data, entity.updated_at(), now],
      )
      .map_err(|e| eyre!("Failed to store entity: {}", e))?;

      tx.execute(
        "INSERT OR REPLACE INTO query_results (query_hash, entity_key, position)
         VALUES (?, ?, ?)",
        params![key, entity_key, position],
      )
      .map_err(|e| eyre!("Failed to store query result: {}", e))?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn get_query_result<T: Cacheable>(&self, key: &str) -> Result<Option<CachedQueryResult<T>>> {
    let conn = self.lock()?;
    let entity_type = T::entity_type();

    let cached_at: Option<String> = conn
      .query_row(
        "SELECT cached_at FROM query_cache WHERE query_hash = ? AND entity_type = ?",
        params![key, entity_type],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read query cache: {}", e))?;

    let Some(cached_at) = cached_at else {
      return Ok(None);
    };
    let cached_at = parse_datetime(&cached_at)?;

    let mut stmt = conn
      .prepare(
        "SELECT ec.data FROM entity_cache ec
         INNER JOIN query_results qr ON ec.entity_type = ? AND ec.entity_key = qr.entity_key
         WHERE qr.query_hash = ?
         ORDER BY qr.position",
      )
      .map_err(|e| eyre!("Failed to prepare entity query: {}", e))?;

    let entities: Vec<T> = stmt
      .query_map(params![entity_type, key], |row| row.get::<_, Vec<u8>>(0))
      .map_err(|e| eyre!("Failed to query entities: {}", e))?
      .filter_map(|r| r.ok())
      .filter_map(|data| serde_json::from_slice(&data).ok())
      .collect();

    Ok(Some(CachedQueryResult {
      entities,
      cached_at,
    }))
  }

  fn store_snapshot<T: Serialize>(&self, key: &str, description: &str, value: &T) -> Result<()> {
    let conn = self.lock()?;
    let data =
      serde_json::to_vec(value).map_err(|e| eyre!("Failed to serialize snapshot: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO snapshot_cache (query_hash, query_description, data, cached_at)
         VALUES (?, ?, ?, ?)",
        params![key, description, data, format_datetime(Utc::now())],
      )
      .map_err(|e| eyre!("Failed to store snapshot: {}", e))?;
    Ok(())
  }

  fn get_snapshot<T: DeserializeOwned>(&self, key: &str) -> Result<Option<CachedSnapshot<T>>> {
    let conn = self.lock()?;
    let row: Option<(Vec<u8>, String)> = conn
      .query_row(
        "SELECT data, cached_at FROM snapshot_cache WHERE query_hash = ?",
        params![key],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read snapshot: {}", e))?;

    match row {
      Some((data, cached_at)) => {
        let value: T = serde_json::from_slice(&data)
          .map_err(|e| eyre!("Failed to deserialize snapshot: {}", e))?;
        Ok(Some(CachedSnapshot {
          value,
          cached_at: parse_datetime(&cached_at)?,
        }))
      }
      None => Ok(None),
    }
  }

  fn invalidate(&self, pattern: &str) -> Result<usize> {
    let conn = self.lock()?;
    let like = format!("%{}%", pattern);

    let queries = conn
      .execute(
        "DELETE FROM query_cache WHERE query_description LIKE ?",
        params![like],
      )
      .map_err(|e| eyre!("Failed to invalidate queries: {}", e))?;
    let snapshots = conn
      .execute(
        "DELETE FROM snapshot_cache WHERE query_description LIKE ?",
        params![like],
      )
      .map_err(|e| eyre!("Failed to invalidate snapshots: {}", e))?;

    Ok(queries + snapshots)
  }

  fn remove_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
    let conn = self.lock()?;
    let cutoff = format_datetime(cutoff);

    let queries = conn
      .execute(
        "DELETE FROM query_cache WHERE cached_at < ?",
        params![cutoff],
      )
      .map_err(|e| eyre!("Failed to expire queries: {}", e))?;
    let snapshots = conn
      .execute(
        "DELETE FROM snapshot_cache WHERE cached_at < ?",
        params![cutoff],
      )
      .map_err(|e| eyre!("Failed to expire snapshots: {}", e))?;
    conn
      .execute(
        "DELETE FROM entity_cache WHERE cached_at < ?",
        params![cutoff],
      )
      .map_err(|e| eyre!("Failed to expire entities: {}", e))?;

    Ok(queries + snapshots)
  }
}

/// Timestamps are stored as fixed-width RFC 3339 so that text comparison orders them.
fn format_datetime(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::inventory::types::Maquina;

  fn maquinas() -> Vec<Maquina> {
    vec![
      Maquina {
        id: "m2".to_string(),
        nombre: "Plasma".to_string(),
      },
      Maquina {
        id: "m1".to_string(),
        nombre: "Laser".to_string(),
      },
    ]
  }

  #[test]
  fn test_query_result_roundtrip_keeps_order() {
    let storage = SqliteStorage::in_memory().expect("storage");
    storage
      .store_query_result("k", "maquinas", &maquinas())
      .expect("store");

    let cached = storage
      .get_query_result::<Maquina>("k")
      .expect("get")
      .expect("present");
    assert_eq!(cached.entities, maquinas());
  }

  #[test]
  fn test_restore_replaces_previous_result() {
    let storage = SqliteStorage::in_memory().expect("storage");
    storage
      .store_query_result("k", "maquinas", &maquinas())
      .expect("store");
    storage
      .store_query_result("k", "maquinas", &maquinas()[..1])
      .expect("store again");

    let cached = storage
      .get_query_result::<Maquina>("k")
      .expect("get")
      .expect("present");
    assert_eq!(cached.entities.len(), 1);
    assert_eq!(cached.entities[0].id, "m2");
  }

  #[test]
  fn test_missing_query_is_none() {
    let storage = SqliteStorage::in_memory().expect("storage");
    assert!(storage
      .get_query_result::<Maquina>("nope")
      .expect("get")
      .is_none());
  }

  #[test]
  fn test_invalidate_by_pattern() {
    let storage = SqliteStorage::in_memory().expect("storage");
    storage
      .store_snapshot("a", "recortes maquina m1 estado true page 1", &1)
      .expect("store");
    storage
      .store_snapshot("b", "recortes maquina m2 estado true page 1", &2)
      .expect("store");

    assert_eq!(storage.invalidate("maquina m1").expect("invalidate"), 1);
    assert!(storage.get_snapshot::<i32>("a").expect("get").is_none());
    assert_eq!(
      storage.get_snapshot::<i32>("b").expect("get").map(|s| s.value),
      Some(2)
    );
  }

  #[test]
  fn test_remove_older_than() {
    let storage = SqliteStorage::in_memory().expect("storage");
    storage.store_snapshot("a", "x", &1).expect("store");

    let past = Utc::now() - chrono::Duration::hours(1);
    assert_eq!(storage.remove_older_than(past).expect("expire"), 0);

    let future = Utc::now() + chrono::Duration::hours(1);
    assert_eq!(storage.remove_older_than(future).expect("expire"), 1);
  }

  #[test]
  fn test_file_backed_storage_persists() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("nested").join("cache.db");
    {
      let storage = SqliteStorage::open(&path).expect("open");
      storage
        .store_query_result("k", "maquinas", &maquinas())
        .expect("store");
    }
    let storage = SqliteStorage::open(&path).expect("reopen");
    assert!(storage
      .get_query_result::<Maquina>("k")
      .expect("get")
      .is_some());
  }
}
