use chrono::Duration;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::{CacheKind, MemoryStore, NoopStore, PortalCache, SqliteStore, Store};
use crate::portal::{CachedPortal, DataSource};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub store: StoreConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub logging: LoggingConfig,
  /// User whose data `offline` and `forget` act on when none is given
  pub default_username: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
  /// SQLite file under the user data directory
  #[default]
  Sqlite,
  /// Process memory, lost on exit
  Memory,
  /// Caching turned off; every read misses
  Disabled,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
  #[serde(default)]
  pub backend: StoreBackend,
  /// Database file (default: $XDG_DATA_HOME/portal-cache/cache.db)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
  /// Per-kind time to live, in hours
  #[serde(default)]
  pub ttl_hours: HashMap<CacheKind, u32>,
  /// Per-kind freshness window, in minutes
  #[serde(default)]
  pub stale_minutes: HashMap<CacheKind, u32>,
}

impl CacheConfig {
  pub fn ttl_overrides(&self) -> HashMap<CacheKind, Duration> {
    self
      .ttl_hours
      .iter()
      .map(|(kind, hours)| (*kind, Duration::hours(i64::from(*hours))))
      .collect()
  }

  pub fn stale_overrides(&self) -> HashMap<CacheKind, Duration> {
    self
      .stale_minutes
      .iter()
      .map(|(kind, minutes)| (*kind, Duration::minutes(i64::from(*minutes))))
      .collect()
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
  /// Write daily log files here instead of stderr
  pub directory: Option<PathBuf>,
  /// Default filter directive, overridden by PORTAL_CACHE_LOG
  #[serde(default = "default_filter")]
  pub filter: String,
}

fn default_filter() -> String {
  "portal_cache=info".to_string()
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      directory: None,
      filter: default_filter(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./portal-cache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/portal-cache/config.yaml
  ///
  /// Without a file every setting takes its default.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("portal-cache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("portal-cache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn parse(contents: &str) -> Result<Self> {
    // An empty file is an empty mapping
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  /// Build the configured store.
  pub fn open_store(&self) -> Result<Arc<dyn Store>> {
    let store: Arc<dyn Store> = match self.store.backend {
      StoreBackend::Sqlite => match &self.store.path {
        Some(path) => Arc::new(SqliteStore::open_at(path)?),
        None => Arc::new(SqliteStore::open()?),
      },
      StoreBackend::Memory => Arc::new(MemoryStore::new()),
      StoreBackend::Disabled => Arc::new(NoopStore),
    };
    Ok(store)
  }

  /// Build the cache over the configured store with the configured TTLs.
  pub fn open_cache(&self) -> Result<PortalCache> {
    Ok(PortalCache::new(self.open_store()?).with_ttl_overrides(self.cache.ttl_overrides()))
  }

  /// Wrap a live source with the configured cache and freshness windows.
  pub fn open_portal<D: DataSource + 'static>(&self, live: D) -> Result<CachedPortal<D>> {
    Ok(self.portal_over(live, self.open_cache()?))
  }

  /// Wrap a live source with `cache`, applying the configured freshness
  /// windows.
  pub fn portal_over<D: DataSource + 'static>(
    &self,
    live: D,
    cache: PortalCache,
  ) -> CachedPortal<D> {
    CachedPortal::new(live, cache).with_stale_overrides(self.cache.stale_overrides())
  }
}
