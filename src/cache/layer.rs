//! Cache layer that orchestrates caching logic with network fetching.

use chrono::Duration;
use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::marker::PhantomData;
use tracing::{debug, warn};

use super::coalesce::{RequestCoalescer, SharedFetch};
use super::manager::PortalCache;
use super::traits::CacheResult;

/// A value returned by [`CacheLayer::read_through`], plus the background
/// refresh started for it if it was stale.
pub struct Fetched<T> {
  pub result: CacheResult<T>,
  pub revalidation: Option<Revalidation<T>>,
}

impl<T: DeserializeOwned> Fetched<T> {
  /// Wait for any background refresh and return the best available value:
  /// the refreshed one, or the cached one marked offline if the refresh
  /// failed.
  pub async fn settle(self) -> CacheResult<T> {
    let Some(revalidation) = self.revalidation else {
      return self.result;
    };

    match revalidation.finish().await {
      Ok(fresh) => CacheResult::from_network(fresh),
      Err(e) => {
        debug!(error = %e, "refresh failed, keeping cached value");
        match self.result.cached_at {
          Some(cached_at) => CacheResult::offline(self.result.data, cached_at),
          None => self.result,
        }
      }
    }
  }
}

/// Handle to a background refresh.
///
/// Dropping it does not cancel the refresh; the cache is still updated when
/// the fetch succeeds.
pub struct Revalidation<T> {
  fetch: SharedFetch,
  _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Revalidation<T> {
  fn new(fetch: SharedFetch) -> Self {
    Self {
      fetch,
      _marker: PhantomData,
    }
  }

  /// The refreshed value, or why the refresh failed.
  pub async fn finish(self) -> Result<T> {
    let value = self.fetch.await.map_err(|e| eyre!("Refresh failed: {}", e))?;
    serde_json::from_value(value).map_err(|e| eyre!("Failed to decode refreshed data: {}", e))
  }
}

/// Cache layer that manages caching logic and network fetching.
///
/// This layer sits between the application and the network client,
/// providing transparent caching with offline support.
#[derive(Clone)]
pub struct CacheLayer {
  cache: PortalCache,
  coalescer: RequestCoalescer,
}

impl CacheLayer {
  pub fn new(cache: PortalCache) -> Self {
    Self {
      cache,
      coalescer: RequestCoalescer::new(),
    }
  }

  pub fn cache(&self) -> &PortalCache {
    &self.cache
  }

  /// Stale-while-revalidate read.
  ///
  /// 1. Cached and younger than `stale_after` - return it
  /// 2. Cached but older - return it and refresh in the background
  /// 3. Not cached - fetch, store and return, or fail
  ///
  /// Concurrent calls for the same key share one fetch.
  pub async fn read_through<T, F, Fut>(
    &self,
    key: &str,
    ttl: Duration,
    stale_after: Duration,
    fetcher: F,
  ) -> Result<Fetched<T>>
  where
    T: Serialize + DeserializeOwned + Send + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    if let Some(entry) = self.cache.get_entry::<T>(key) {
      if entry.age(self.cache.now()) <= stale_after {
        debug!(key, "serving fresh cache");
        return Ok(Fetched {
          result: CacheResult::from_cache(entry.data, entry.timestamp, false),
          revalidation: None,
        });
      }

      let (fetch, started) = self.start_fetch(key, ttl, fetcher);
      debug!(key, started, "serving stale cache, refreshing");
      return Ok(Fetched {
        result: CacheResult::from_cache(entry.data, entry.timestamp, true),
        revalidation: Some(Revalidation::new(fetch)),
      });
    }

    let (fetch, _) = self.start_fetch(key, ttl, fetcher);
    let value = fetch.await.map_err(|e| eyre!("{}", e))?;
    let data = serde_json::from_value(value)
      .map_err(|e| eyre!("Failed to decode fetched data for {}: {}", key, e))?;

    Ok(Fetched {
      result: CacheResult::from_network(data),
      revalidation: None,
    })
  }

  /// Fetch and store regardless of what is cached.
  pub async fn refresh<T, F, Fut>(&self, key: &str, ttl: Duration, fetcher: F) -> Result<T>
  where
    T: Serialize + DeserializeOwned + Send + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    let (fetch, _) = self.start_fetch(key, ttl, fetcher);
    let value = fetch.await.map_err(|e| eyre!("{}", e))?;
    serde_json::from_value(value)
      .map_err(|e| eyre!("Failed to decode fetched data for {}: {}", key, e))
  }

  fn start_fetch<T, F, Fut>(&self, key: &str, ttl: Duration, fetcher: F) -> (SharedFetch, bool)
  where
    T: Serialize + Send + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    let cache = self.cache.clone();
    let owned_key = key.to_string();

    self.coalescer.join_or_start(key, move || {
      let pending = fetcher();
      async move {
        let data = pending.await.map_err(|e| format!("{:#}", e))?;
        let value = serde_json::to_value(&data)
          .map_err(|e| format!("Failed to serialize fetched data: {}", e))?;

        // A failed write only costs a re-fetch next time
        if let Err(e) = cache.save_with_ttl(&owned_key, &value, ttl) {
          warn!(key = %owned_key, error = %e, "failed to cache fetched data");
        }
        Ok(value)
      }
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::clock::{Clock, ManualClock};
  use crate::cache::storage::{MemoryStore, Store};
  use crate::cache::traits::CacheSource;
  use serde_json::{json, Value};
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;

  fn create_test_layer() -> (CacheLayer, Arc<ManualClock>) {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::starting_now());
    let cache = PortalCache::with_clock(store, clock.clone());
    (CacheLayer::new(cache), clock)
  }

  fn ttl() -> Duration {
    Duration::hours(48)
  }

  fn stale() -> Duration {
    Duration::hours(4)
  }

  #[tokio::test]
  async fn test_miss_fetches_and_stores() {
    let (layer, _clock) = create_test_layer();

    let fetched: Fetched<Value> = layer
      .read_through("attendance-alice-S1", ttl(), stale(), || async {
        Ok(json!({"pct": 90}))
      })
      .await
      .unwrap();

    assert_eq!(fetched.result.source, CacheSource::Network);
    assert_eq!(fetched.result.data, json!({"pct": 90}));
    assert!(fetched.revalidation.is_none());
    assert_eq!(
      layer.cache().get::<Value>("attendance-alice-S1"),
      Some(json!({"pct": 90}))
    );
  }

  #[tokio::test]
  async fn test_miss_with_failing_fetch_surfaces_error() {
    let (layer, _clock) = create_test_layer();

    let result: Result<Fetched<Value>> = layer
      .read_through("k", ttl(), stale(), || async { Err(eyre!("network down")) })
      .await;

    let err = result.err().unwrap();
    assert!(err.to_string().contains("network down"));
  }

  #[tokio::test]
  async fn test_fresh_cache_skips_fetch() {
    let (layer, clock) = create_test_layer();
    layer.cache().save_with_ttl("k", &json!(1), ttl()).unwrap();
    clock.advance(Duration::hours(1));

    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();

    let fetched: Fetched<Value> = layer
      .read_through("k", ttl(), stale(), move || async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(json!(2))
      })
      .await
      .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(fetched.result.source, CacheSource::CacheFresh);
    assert_eq!(fetched.result.data, json!(1));
    assert!(fetched.revalidation.is_none());
  }

  #[tokio::test]
  async fn test_stale_cache_served_then_refreshed() {
    let (layer, clock) = create_test_layer();
    layer.cache().save_with_ttl("k", &json!("old"), ttl()).unwrap();
    let written_at = clock.now();
    clock.advance(Duration::hours(5));

    let fetched: Fetched<Value> = layer
      .read_through("k", ttl(), stale(), || async { Ok(json!("new")) })
      .await
      .unwrap();

    assert_eq!(fetched.result.source, CacheSource::CacheStale);
    assert_eq!(fetched.result.data, json!("old"));
    assert_eq!(fetched.result.cached_at, Some(written_at));

    let settled = fetched.settle().await;
    assert_eq!(settled.source, CacheSource::Network);
    assert_eq!(settled.data, json!("new"));

    let entry = layer.cache().get_entry::<Value>("k").unwrap();
    assert_eq!(entry.data, json!("new"));
    assert_eq!(entry.timestamp, clock.now());
  }

  #[tokio::test]
  async fn test_stale_cache_kept_when_refresh_fails() {
    let (layer, clock) = create_test_layer();
    layer.cache().save_with_ttl("k", &json!("old"), ttl()).unwrap();
    clock.advance(Duration::hours(5));

    let fetched: Fetched<Value> = layer
      .read_through("k", ttl(), stale(), || async { Err(eyre!("offline")) })
      .await
      .unwrap();

    let settled = fetched.settle().await;
    assert_eq!(settled.source, CacheSource::Offline);
    assert_eq!(settled.data, json!("old"));
    assert_eq!(layer.cache().get::<Value>("k"), Some(json!("old")));
  }

  #[tokio::test]
  async fn test_concurrent_misses_fetch_once() {
    let (layer, _clock) = create_test_layer();
    let calls = Arc::new(AtomicU32::new(0));

    let fetcher = |calls: Arc<AtomicU32>| {
      move || async move {
        calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        Ok(json!([1, 2, 3]))
      }
    };

    let (a, b) = tokio::join!(
      layer.read_through::<Value, _, _>("marks-alice-S1", ttl(), stale(), fetcher(calls.clone())),
      layer.read_through::<Value, _, _>("marks-alice-S1", ttl(), stale(), fetcher(calls.clone())),
    );

    assert_eq!(a.unwrap().result.data, json!([1, 2, 3]));
    assert_eq!(b.unwrap().result.data, json!([1, 2, 3]));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_refresh_overwrites_fresh_cache() {
    let (layer, _clock) = create_test_layer();
    layer.cache().save_with_ttl("k", &json!(1), ttl()).unwrap();

    let value: Value = layer
      .refresh("k", ttl(), || async { Ok(json!(2)) })
      .await
      .unwrap();

    assert_eq!(value, json!(2));
    assert_eq!(layer.cache().get::<Value>("k"), Some(json!(2)));
  }

  struct FailingStore;

  impl Store for FailingStore {
    fn get(&self, _key: &str) -> Result<Option<String>> {
      Err(eyre!("storage unavailable"))
    }
    fn set(&self, _key: &str, _value: &str) -> Result<()> {
      Err(eyre!("quota exceeded"))
    }
    fn delete(&self, _key: &str) -> Result<()> {
      Err(eyre!("storage unavailable"))
    }
    fn keys(&self) -> Result<Vec<String>> {
      Err(eyre!("storage unavailable"))
    }
  }

  #[tokio::test]
  async fn test_broken_store_degrades_to_fetch() {
    let layer = CacheLayer::new(PortalCache::new(Arc::new(FailingStore)));

    let fetched: Fetched<Value> = layer
      .read_through("k", ttl(), stale(), || async { Ok(json!("live")) })
      .await
      .unwrap();

    assert_eq!(fetched.result.source, CacheSource::Network);
    assert_eq!(fetched.result.data, json!("live"));
    assert!(!layer.cache().has_cached_data());
  }
}
