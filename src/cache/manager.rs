//! TTL cache over a string store.
//!
//! Values are stored as JSON `CacheEntry` documents. Reads fail soft: a
//! corrupt, expired or unreadable entry is reported as a miss, never as an
//! error, so a broken cache degrades to a re-fetch.

use chrono::{DateTime, Duration, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::keys::{derive_key, CacheKind, SemesterId};
use super::storage::Store;
use super::traits::CacheEntry;

/// TTL used by [`PortalCache::save`].
pub const DEFAULT_TTL_HOURS: i64 = 24;

/// Window given to entries written before expirations were recorded.
pub const LEGACY_TTL_HOURS: i64 = 48;

/// Per-kind cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KindStats {
  pub items: usize,
  /// Approximate size of the stored values (UTF-16 code units x 2)
  pub bytes: usize,
  pub last_updated: Option<DateTime<Utc>>,
}

/// Aggregate statistics for a diagnostics view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
  pub kinds: BTreeMap<CacheKind, KindStats>,
  pub total_items: usize,
  pub total_bytes: usize,
}

/// Cache of JSON values with per-entry expiration.
///
/// Cheap to clone; clones share the store.
#[derive(Clone)]
pub struct PortalCache {
  store: Arc<dyn Store>,
  clock: Arc<dyn Clock>,
  ttl_overrides: HashMap<CacheKind, Duration>,
}

impl PortalCache {
  pub fn new(store: Arc<dyn Store>) -> Self {
    Self::with_clock(store, Arc::new(SystemClock))
  }

  pub fn with_clock(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
    Self {
      store,
      clock,
      ttl_overrides: HashMap::new(),
    }
  }

  /// Replace the default TTL of some kinds.
  pub fn with_ttl_overrides(mut self, overrides: HashMap<CacheKind, Duration>) -> Self {
    self.ttl_overrides = overrides;
    self
  }

  pub fn now(&self) -> DateTime<Utc> {
    self.clock.now()
  }

  /// TTL for a kind, honoring configuration overrides.
  pub fn ttl_for(&self, kind: CacheKind) -> Duration {
    self
      .ttl_overrides
      .get(&kind)
      .copied()
      .unwrap_or_else(|| kind.default_ttl())
  }

  /// Store `data` for the default 24 hours.
  pub fn save<T: Serialize + ?Sized>(&self, key: &str, data: &T) -> Result<()> {
    self.save_with_ttl(key, data, Duration::hours(DEFAULT_TTL_HOURS))
  }

  /// Store `data`, expiring `ttl` from now.
  pub fn save_with_ttl<T: Serialize + ?Sized>(
    &self,
    key: &str,
    data: &T,
    ttl: Duration,
  ) -> Result<()> {
    let entry = CacheEntry::new(data, self.now(), ttl);
    let json =
      serde_json::to_string(&entry).map_err(|e| eyre!("Failed to serialize {}: {}", key, e))?;

    self.store.set(key, &json)?;
    debug!(key, ttl_secs = ttl.num_seconds(), "cached");
    Ok(())
  }

  /// Read the full entry for `key`, or `None` on a miss.
  ///
  /// Legacy entries without an expiration are upgraded in place. Corrupt and
  /// expired entries are deleted. An entry whose data does not decode as `T`
  /// is a miss but stays in the store.
  pub fn get_entry<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
    let raw = self.get_raw_entry(key)?;

    match serde_json::from_value(raw.data) {
      Ok(data) => Some(CacheEntry {
        data,
        timestamp: raw.timestamp,
        expiration: raw.expiration,
      }),
      Err(e) => {
        debug!(key, error = %e, "cached data has unexpected shape");
        None
      }
    }
  }

  /// Read only the data for `key`.
  pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
    self.get_entry(key).map(|entry| entry.data)
  }

  fn get_raw_entry(&self, key: &str) -> Option<CacheEntry<Value>> {
    let raw = match self.store.get(key) {
      Ok(Some(raw)) => raw,
      Ok(None) => {
        debug!(key, "cache miss");
        return None;
      }
      Err(e) => {
        warn!(key, error = %e, "cache read failed, removing");
        self.delete_quietly(key);
        return None;
      }
    };

    let now = self.now();
    let entry = match parse_entry(&raw) {
      Parsed::Current(entry) => entry,
      Parsed::Legacy(data) => {
        let entry = CacheEntry::new(data, now, Duration::hours(LEGACY_TTL_HOURS));
        info!(key, "migrating legacy cache entry");
        if let Err(e) = self.write_entry(key, &entry) {
          warn!(key, error = %e, "failed to rewrite legacy cache entry");
        }
        return Some(entry);
      }
      Parsed::Corrupt => {
        warn!(key, "corrupt cache entry, removing");
        self.delete_quietly(key);
        return None;
      }
    };

    if entry.is_expired(now) {
      debug!(key, "cache entry expired, removing");
      self.delete_quietly(key);
      return None;
    }

    Some(entry)
  }

  fn write_entry(&self, key: &str, entry: &CacheEntry<Value>) -> Result<()> {
    let json =
      serde_json::to_string(entry).map_err(|e| eyre!("Failed to serialize {}: {}", key, e))?;
    self.store.set(key, &json)
  }

  fn delete_quietly(&self, key: &str) {
    if let Err(e) = self.store.delete(key) {
      warn!(key, error = %e, "failed to delete cache entry");
    }
  }

  /// Remove one key.
  pub fn remove(&self, key: &str) -> Result<()> {
    self.store.delete(key)
  }

  /// All store keys belonging to a known kind.
  pub fn cached_keys(&self) -> Vec<String> {
    match self.store.keys() {
      Ok(keys) => keys
        .into_iter()
        .filter(|key| CacheKind::from_key(key).is_some())
        .collect(),
      Err(e) => {
        warn!(error = %e, "failed to list cache keys");
        Vec::new()
      }
    }
  }

  /// Whether any key of a known kind is present.
  pub fn has_cached_data(&self) -> bool {
    !self.cached_keys().is_empty()
  }

  /// Keys of `kind` that belong to `username`.
  pub fn keys_for_user(&self, kind: CacheKind, username: &str) -> Vec<String> {
    self
      .cached_keys()
      .into_iter()
      .filter(|key| kind.owns(key, username))
      .collect()
  }

  fn remove_where(&self, pred: impl Fn(&str) -> bool) -> Result<usize> {
    let keys: Vec<String> = self
      .store
      .keys()?
      .into_iter()
      .filter(|key| pred(key))
      .collect();

    for key in &keys {
      self.store.delete(key)?;
    }
    Ok(keys.len())
  }

  /// Remove every key of a known kind. Unrelated keys are kept.
  pub fn clear_all(&self) -> Result<usize> {
    let removed = self.remove_where(|key| CacheKind::from_key(key).is_some())?;
    info!(removed, "cleared cache");
    Ok(removed)
  }

  /// Remove every key of one kind.
  pub fn clear_kind(&self, kind: CacheKind) -> Result<usize> {
    let removed = self.remove_where(|key| CacheKind::from_key(key) == Some(kind))?;
    info!(%kind, removed, "cleared cache kind");
    Ok(removed)
  }

  /// Drop a user's attendance for one semester so the next read re-fetches.
  pub fn force_refresh_attendance(&self, username: &str, semester: &SemesterId) -> Result<()> {
    self.remove(&derive_key(
      CacheKind::Attendance,
      username,
      Some(semester),
    ))
  }

  /// Drop a user's per-subject attendance for every subject of one semester.
  pub fn force_refresh_subject_data(
    &self,
    username: &str,
    semester: &SemesterId,
  ) -> Result<usize> {
    let prefix = format!(
      "{}-",
      derive_key(CacheKind::SubjectData, username, Some(semester))
    );
    self.remove_where(|key| key.starts_with(&prefix))
  }

  /// Drop everything cached for a user.
  pub fn force_refresh_all(&self, username: &str) -> Result<usize> {
    let removed = self.remove_where(|key| {
      CacheKind::from_key(key).is_some_and(|kind| kind.owns(key, username))
    })?;
    info!(username, removed, "cleared cache for user");
    Ok(removed)
  }

  /// Aggregate counts, sizes and last write time per kind.
  ///
  /// Read-only: does not evict or migrate anything.
  pub fn stats(&self) -> CacheStats {
    let mut stats = CacheStats::default();

    for key in self.cached_keys() {
      let Some(kind) = CacheKind::from_key(&key) else {
        continue;
      };
      let raw = match self.store.get(&key) {
        Ok(Some(raw)) => raw,
        _ => continue,
      };

      let kind_stats = stats.kinds.entry(kind).or_default();
      let bytes = raw.encode_utf16().count() * 2;
      kind_stats.items += 1;
      kind_stats.bytes += bytes;
      stats.total_items += 1;
      stats.total_bytes += bytes;

      if let Parsed::Current(entry) = parse_entry(&raw) {
        kind_stats.last_updated = kind_stats.last_updated.max(Some(entry.timestamp));
      }
    }

    stats
  }
}

enum Parsed {
  Current(CacheEntry<Value>),
  Legacy(Value),
  Corrupt,
}

fn parse_entry(raw: &str) -> Parsed {
  let Ok(Value::Object(mut map)) = serde_json::from_str::<Value>(raw) else {
    return Parsed::Corrupt;
  };
  if !map.contains_key("data") {
    return Parsed::Corrupt;
  }
  if !map.contains_key("expiration") {
    return Parsed::Legacy(map.remove("data").unwrap_or(Value::Null));
  }
  match serde_json::from_value(Value::Object(map)) {
    Ok(entry) => Parsed::Current(entry),
    Err(_) => Parsed::Corrupt,
  }
}
