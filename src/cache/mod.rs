//! Local caching and offline support.
//!
//! This module provides:
//! - A string key-value `Store` abstraction (SQLite, in-memory, no-op)
//! - `PortalCache`: JSON entries with per-entry expiration over a store
//! - Namespaced key derivation per (data kind, user, semester)
//! - `CacheLayer`: stale-while-revalidate reads with request coalescing

mod clock;
mod coalesce;
mod domain;
mod keys;
mod layer;
mod manager;
mod storage;
mod traits;

pub use clock::{Clock, ManualClock, SystemClock};
pub use coalesce::RequestCoalescer;
pub use keys::{derive_key, CacheKey, CacheKind, SemesterId, SemesterScope};
pub use layer::{CacheLayer, Fetched, Revalidation};
pub use manager::{CacheStats, KindStats, PortalCache, DEFAULT_TTL_HOURS, LEGACY_TTL_HOURS};
pub use storage::{MemoryStore, NoopStore, SqliteStore, Store};
pub use traits::{CacheEntry, CacheResult, CacheSource};
