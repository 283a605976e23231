//! Offline cache and fallback data source for a student portal client.
//!
//! [`cache`] holds portal records with per-kind expirations over a pluggable
//! store and serves them stale-while-revalidate. [`portal`] defines the data
//! source interface, wraps a live source with the cache, and provides the
//! cache-only source used when the live portal is unreachable.

pub mod cache;
pub mod config;
pub mod logging;
pub mod portal;
