//! Core types for the caching system.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A stored value together with when it was written and when it expires.
///
/// Serialized as `{"data": .., "timestamp": ms, "expiration": ms}` with
/// epoch-millisecond timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
  pub data: T,
  #[serde(with = "chrono::serde::ts_milliseconds")]
  pub timestamp: DateTime<Utc>,
  #[serde(with = "chrono::serde::ts_milliseconds")]
  pub expiration: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
  /// Wrap `data` written at `now`, valid for `ttl`.
  ///
  /// `expiration` is always strictly after `timestamp`; a non-positive
  /// TTL is clamped to one millisecond.
  pub fn new(data: T, now: DateTime<Utc>, ttl: Duration) -> Self {
    let ttl = ttl.max(Duration::milliseconds(1));
    Self {
      data,
      timestamp: now,
      expiration: now + ttl,
    }
  }

  pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
    now > self.expiration
  }

  /// Time elapsed since the entry was written.
  pub fn age(&self, now: DateTime<Utc>) -> Duration {
    now - self.timestamp
  }
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result from cached data.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>, is_stale: bool) -> Self {
    Self {
      data,
      source: if is_stale {
        CacheSource::CacheStale
      } else {
        CacheSource::CacheFresh
      },
      cached_at: Some(cached_at),
    }
  }

  /// Create a new cache result for offline mode.
  pub fn offline(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at: Some(cached_at),
    }
  }

  /// Whether a view should mark this value as "from cache".
  pub fn is_from_cache(&self) -> bool {
    self.source != CacheSource::Network
  }
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, still considered fresh
  CacheFresh,
  /// Data from cache, past its freshness window; a refresh is in flight
  CacheStale,
  /// Offline mode - network unavailable, serving cached data
  Offline,
}
