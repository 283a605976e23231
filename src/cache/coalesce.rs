//! De-duplication of concurrent fetches for the same cache key.

use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

/// Outcome of a fetch, shareable between waiters.
pub type FetchOutcome = Result<Value, String>;

/// A fetch that any number of callers can await.
pub type SharedFetch = Shared<BoxFuture<'static, FetchOutcome>>;

/// Hands concurrent callers for one key the same in-flight fetch.
///
/// Every started fetch is spawned onto the runtime, so it completes (and
/// leaves the map) even if nobody awaits it.
#[derive(Clone, Default)]
pub struct RequestCoalescer {
  inflight: Arc<Mutex<HashMap<String, SharedFetch>>>,
}

impl RequestCoalescer {
  pub fn new() -> Self {
    Self::default()
  }

  /// Join the fetch in flight for `key`, or start one with `start`.
  ///
  /// Returns the shared fetch and whether this call started it. Must be
  /// called within a tokio runtime.
  pub fn join_or_start<F, Fut>(&self, key: &str, start: F) -> (SharedFetch, bool)
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = FetchOutcome> + Send + 'static,
  {
    let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(existing) = inflight.get(key) {
      return (existing.clone(), false);
    }

    let registry = Arc::clone(&self.inflight);
    let owned_key = key.to_string();
    let fetch = start();
    let shared = async move {
      let outcome = fetch.await;
      registry
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .remove(&owned_key);
      outcome
    }
    .boxed()
    .shared();

    inflight.insert(key.to_string(), shared.clone());
    drop(inflight);

    tokio::spawn(shared.clone());
    (shared, true)
  }

  /// Whether a fetch for `key` is currently running.
  pub fn is_in_flight(&self, key: &str) -> bool {
    self
      .inflight
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .contains_key(key)
  }
}
