//! Cache layer that orchestrates caching logic with network fetching.

use chrono::{Duration, Utc};
use color_eyre::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;

use super::storage::CacheStorage;
use super::traits::{CacheResult, Cacheable, QueryKey};

/// Cache layer that manages caching logic and network fetching.
///
/// This layer sits between the application and the REST client,
/// providing transparent caching with offline support.
pub struct CacheLayer<S: CacheStorage> {
  storage: Arc<S>,
  /// How long before cached data is considered stale
  stale_time: Duration,
}

impl<S: CacheStorage> CacheLayer<S> {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: S) -> Self {
    Self {
      storage: Arc::new(storage),
      stale_time: Duration::minutes(5),
    }
  }

  /// Set the stale time for cached data.
  pub fn with_stale_time(mut self, stale_time: std::time::Duration) -> Self {
    self.stale_time = Duration::from_std(stale_time).unwrap_or(Duration::MAX);
    self
  }

  /// Check if cached data is stale based on cached_at timestamp.
  fn is_stale(&self, cached_at: chrono::DateTime<Utc>) -> bool {
    Utc::now() - cached_at > self.stale_time
  }

  /// Fetch a list with cache-first strategy.
  ///
  /// 1. Check cache - if fresh, return immediately
  /// 2. If stale/missing, fetch from network
  /// 3. On network failure, return stale cache (offline mode)
  /// 4. Update cache with new data
  pub async fn fetch_list<T, K, F, Fut, E>(&self, key: &K, fetcher: F) -> Result<CacheResult<Vec<T>>>
  where
    T: Cacheable,
    K: QueryKey,
    F: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<Vec<T>, E>>,
    E: Into<color_eyre::Report>,
  {
    let hash = key.cache_hash();
    let cached = self.storage.get_query_result::<T>(&hash)?;

    if let Some(cached) = &cached {
      if !self.is_stale(cached.cached_at) {
        return Ok(CacheResult::from_cache(cached.entities.clone(), cached.cached_at));
      }
    }

    match fetcher().await {
      Ok(data) => {
        self
          .storage
          .store_query_result(&hash, &key.description(), &data)?;
        Ok(CacheResult::from_network(data))
      }
      Err(e) => match cached {
        Some(cached) => {
          let report: color_eyre::Report = e.into();
          tracing::warn!(query = %key.description(), error = %report, "serving stale cache");
          Ok(CacheResult::offline(cached.entities, cached.cached_at))
        }
        None => Err(e.into()),
      },
    }
  }

  /// Fetch a whole value (a page, a statistics payload) with the same
  /// cache-first strategy as [`CacheLayer::fetch_list`].
  pub async fn fetch_snapshot<T, K, F, Fut, E>(&self, key: &K, fetcher: F) -> Result<CacheResult<T>>
  where
    T: Serialize + DeserializeOwned,
    K: QueryKey,
    F: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Into<color_eyre::Report>,
  {
    let hash = key.cache_hash();
    let cached = self.storage.get_snapshot::<T>(&hash)?;

    if let Some(cached) = cached {
      if !self.is_stale(cached.cached_at) {
        return Ok(CacheResult::from_cache(cached.value, cached.cached_at));
      }

      return match fetcher().await {
        Ok(data) => {
          self.storage.store_snapshot(&hash, &key.description(), &data)?;
          Ok(CacheResult::from_network(data))
        }
        Err(e) => {
          let report: color_eyre::Report = e.into();
          tracing::warn!(query = %key.description(), error = %report, "serving stale snapshot");
          Ok(CacheResult::offline(cached.value, cached.cached_at))
        }
      };
    }

    let data = fetcher().await.map_err(Into::into)?;
    self.storage.store_snapshot(&hash, &key.description(), &data)?;
    Ok(CacheResult::from_network(data))
  }

  /// Drop cached queries whose description contains `pattern`.
  pub fn invalidate(&self, pattern: &str) -> Result<usize> {
    let removed = self.storage.invalidate(pattern)?;
    tracing::debug!(pattern, removed, "invalidated cache entries");
    Ok(removed)
  }

  /// Drop entries that have been stale for longer than `max_age`.
  pub fn clean_expired(&self, max_age: std::time::Duration) -> Result<usize> {
    let max_age = Duration::from_std(max_age).unwrap_or(Duration::MAX);
    let cutoff = Utc::now()
      .checked_sub_signed(self.stale_time)
      .and_then(|t| t.checked_sub_signed(max_age));
    match cutoff {
      Some(cutoff) => self.storage.remove_older_than(cutoff),
      None => Ok(0),
    }
  }
}

impl<S: CacheStorage> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      stale_time: self.stale_time,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheSource, SqliteStorage};
  use crate::inventory::types::Maquina;
  use color_eyre::eyre::eyre;

  struct Key(&'static str);

  impl QueryKey for Key {
    fn description(&self) -> String {
      self.0.to_string()
    }
  }

  fn maquina(id: &str) -> Maquina {
    Maquina {
      id: id.to_string(),
      nombre: format!("Maquina {}", id),
    }
  }

  #[tokio::test]
  async fn test_first_fetch_goes_to_network() {
    let layer = CacheLayer::new(SqliteStorage::in_memory().expect("storage"));
    let result = layer
      .fetch_list(&Key("maquinas"), || async {
        Ok::<_, color_eyre::Report>(vec![maquina("m1")])
      })
      .await
      .expect("fetch");
    assert_eq!(result.source, CacheSource::Network);
  }

  #[tokio::test]
  async fn test_fresh_cache_skips_fetcher() {
    let layer = CacheLayer::new(SqliteStorage::in_memory().expect("storage"));
    layer
      .fetch_list(&Key("maquinas"), || async {
        Ok::<_, color_eyre::Report>(vec![maquina("m1")])
      })
      .await
      .expect("prime");

    let result = layer
      .fetch_list(&Key("maquinas"), || async {
        Err::<Vec<Maquina>, _>(eyre!("must not be called"))
      })
      .await
      .expect("cached");
    assert_eq!(result.source, CacheSource::CacheFresh);
    assert_eq!(result.data[0].id, "m1");
  }

  #[tokio::test]
  async fn test_stale_cache_served_when_offline() {
    let layer = CacheLayer::new(SqliteStorage::in_memory().expect("storage"))
      .with_stale_time(std::time::Duration::ZERO);
    layer
      .fetch_list(&Key("maquinas"), || async {
        Ok::<_, color_eyre::Report>(vec![maquina("m1")])
      })
      .await
      .expect("prime");
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    let result = layer
      .fetch_list(&Key("maquinas"), || async {
        Err::<Vec<Maquina>, _>(eyre!("connection refused"))
      })
      .await
      .expect("offline");
    assert!(result.source.is_offline());
    assert_eq!(result.data.len(), 1);
  }

  #[tokio::test]
  async fn test_no_cache_and_no_network_is_an_error() {
    let layer = CacheLayer::new(SqliteStorage::in_memory().expect("storage"));
    let result = layer
      .fetch_snapshot(&Key("stats"), || async {
        Err::<serde_json::Value, _>(eyre!("connection refused"))
      })
      .await;
    assert!(result.is_err());
  }

  #[tokio::test]
  async fn test_snapshot_refreshes_when_stale() {
    let layer = CacheLayer::new(SqliteStorage::in_memory().expect("storage"))
      .with_stale_time(std::time::Duration::ZERO);
    layer
      .fetch_snapshot(&Key("page"), || async { Ok::<_, color_eyre::Report>(1u32) })
      .await
      .expect("prime");
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    let result = layer
      .fetch_snapshot(&Key("page"), || async { Ok::<_, color_eyre::Report>(2u32) })
      .await
      .expect("refresh");
    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(result.data, 2);
  }

  #[tokio::test]
  async fn test_invalidate_forces_refetch() {
    let layer = CacheLayer::new(SqliteStorage::in_memory().expect("storage"));
    layer
      .fetch_snapshot(&Key("recortes maquina m1"), || async {
        Ok::<_, color_eyre::Report>(1u32)
      })
      .await
      .expect("prime");

    assert_eq!(layer.invalidate("m1").expect("invalidate"), 1);

    let result = layer
      .fetch_snapshot(&Key("recortes maquina m1"), || async {
        Ok::<_, color_eyre::Report>(7u32)
      })
      .await
      .expect("refetch");
    assert_eq!(result.data, 7);
  }
}
