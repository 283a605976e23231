use color_eyre::Result;
use tracing::{info, warn};

use crate::cache::PortalCache;

use super::artificial::ArtificialPortal;
use super::cached_client::CachedPortal;
use super::source::DataSource;
use super::types::{Session, SourceKind};

/// A logged-in data source.
pub struct Connected {
  pub source: Box<dyn DataSource>,
  pub session: Session,
}

impl Connected {
  pub fn kind(&self) -> SourceKind {
    self.source.kind()
  }

  pub fn is_offline(&self) -> bool {
    self.kind() == SourceKind::Artificial
  }
}

/// Log in to the live portal, falling back to cached data when it fails.
///
/// The fallback is only taken when the cache holds something; with an empty
/// cache the live login error is returned as is.
pub async fn connect<D: DataSource + 'static>(
  live: D,
  cache: PortalCache,
  username: &str,
  password: &str,
) -> Result<Connected> {
  connect_with(CachedPortal::new(live, cache), username, password).await
}

/// [`connect`] with an already configured cached portal.
pub async fn connect_with<D: DataSource + 'static>(
  portal: CachedPortal<D>,
  username: &str,
  password: &str,
) -> Result<Connected> {
  let cache = portal.cache().clone();

  match portal.student_login(username, password).await {
    Ok(session) => Ok(Connected {
      source: Box::new(portal),
      session,
    }),
    Err(e) if cache.has_cached_data() => {
      warn!(username, error = %format!("{:#}", e), "live login failed");
      info!(username, "serving cached data through the offline portal");
      let offline = ArtificialPortal::new(cache, username);
      let session = offline.student_login(username, password).await?;
      Ok(Connected {
        source: Box::new(offline),
        session,
      })
    }
    Err(e) => Err(e),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{MemoryStore, SemesterId};
  use crate::portal::fake::FakeLive;
  use crate::portal::types::Semester;
  use serde_json::json;
  use std::sync::atomic::Ordering;
  use std::sync::Arc;

  fn unreachable() -> FakeLive {
    let live = FakeLive::default();
    live.offline.store(true, Ordering::SeqCst);
    live
  }

  #[tokio::test]
  async fn test_live_login_selects_cached_portal() {
    let cache = PortalCache::new(Arc::new(MemoryStore::new()));

    let connected = connect(FakeLive::default(), cache, "alice", "secret")
      .await
      .unwrap();

    assert_eq!(connected.kind(), SourceKind::Live);
    assert!(!connected.session.is_artificial());
  }

  #[tokio::test]
  async fn test_empty_cache_surfaces_login_error() {
    let cache = PortalCache::new(Arc::new(MemoryStore::new()));

    let err = connect(unreachable(), cache, "alice", "secret")
      .await
      .err()
      .unwrap();

    assert!(err.to_string().contains("portal unreachable"));
  }

  #[tokio::test]
  async fn test_cached_data_selects_offline_portal() {
    let cache = PortalCache::new(Arc::new(MemoryStore::new()));
    cache
      .save_attendance("alice", &SemesterId::from("2024A"), &json!({"total": 42}))
      .unwrap();

    let connected = connect(unreachable(), cache, "alice", "secret")
      .await
      .unwrap();

    assert!(connected.is_offline());
    assert!(connected.session.is_artificial());
    assert_eq!(connected.session.username, "alice");
    let attendance = connected
      .source
      .get_attendance(&Semester::from_id("2024A"))
      .await
      .unwrap();
    assert_eq!(attendance, Some(json!({"total": 42})));
  }
}
