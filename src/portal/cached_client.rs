//! Portal client that wraps a live data source with transparent caching.

use async_trait::async_trait;
use chrono::Duration;
use color_eyre::{eyre::eyre, Result};
use futures::future::join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

use crate::cache::{CacheKey, CacheKind, CacheLayer, Fetched, PortalCache, SemesterScope};

use super::request::PortalRequest;
use super::source::DataSource;
use super::types::{Semester, Session, SourceKind};

/// Live data source with stale-while-revalidate caching.
///
/// This wraps the underlying client and provides the same API, but serves
/// cached results immediately and refreshes them in the background once
/// they pass the kind's freshness window.
pub struct CachedPortal<D> {
  inner: Arc<D>,
  layer: CacheLayer,
  username: RwLock<Option<String>>,
  stale_overrides: HashMap<CacheKind, Duration>,
}

impl<D: DataSource + 'static> CachedPortal<D> {
  pub fn new(inner: D, cache: PortalCache) -> Self {
    Self {
      inner: Arc::new(inner),
      layer: CacheLayer::new(cache),
      username: RwLock::new(None),
      stale_overrides: HashMap::new(),
    }
  }

  /// Treat the client as already logged in as `username`.
  pub fn with_username(self, username: impl Into<String>) -> Self {
    self.set_username(username.into());
    self
  }

  /// Replace the default freshness window of some kinds.
  pub fn with_stale_overrides(mut self, overrides: HashMap<CacheKind, Duration>) -> Self {
    self.stale_overrides = overrides;
    self
  }

  pub fn cache(&self) -> &PortalCache {
    self.layer.cache()
  }

  pub fn inner(&self) -> &D {
    &self.inner
  }

  fn set_username(&self, username: String) {
    match self.username.write() {
      Ok(mut current) => *current = Some(username),
      Err(e) => *e.into_inner() = Some(username),
    }
  }

  fn username(&self) -> Result<String> {
    let current = self
      .username
      .read()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    current
      .clone()
      .ok_or_else(|| eyre!("Not logged in: no username to key the cache by"))
  }

  fn stale_after(&self, kind: CacheKind) -> Duration {
    self
      .stale_overrides
      .get(&kind)
      .copied()
      .unwrap_or_else(|| kind.default_stale_after())
  }

  /// Read one record, reporting whether it came from cache.
  pub async fn fetch(&self, request: &PortalRequest) -> Result<Fetched<Option<Value>>> {
    let key = request.cache_key(&self.username()?);
    let kind = key.kind();
    let inner = Arc::clone(&self.inner);
    let request = request.clone();

    self
      .layer
      .read_through(
        &key.render(),
        self.cache().ttl_for(kind),
        self.stale_after(kind),
        move || async move { request.send(inner.as_ref()).await },
      )
      .await
  }

  /// Read a semester list, reporting whether it came from cache.
  pub async fn fetch_semesters(&self, scope: SemesterScope) -> Result<Fetched<Vec<Semester>>> {
    let key = CacheKey::Semesters {
      username: self.username()?,
      scope,
    };
    let inner = Arc::clone(&self.inner);

    self
      .layer
      .read_through(
        &key.render(),
        self.cache().ttl_for(CacheKind::Semesters),
        self.stale_after(CacheKind::Semesters),
        move || async move {
          match scope {
            SemesterScope::Attendance => inner.get_attendance_semesters().await,
            SemesterScope::Registration => inner.get_registered_semesters().await,
            SemesterScope::Grades => inner.get_grade_semesters().await,
          }
        },
      )
      .await
  }

  /// Fetch one record from the live source and overwrite the cache.
  pub async fn refresh(&self, request: &PortalRequest) -> Result<Option<Value>> {
    let key = request.cache_key(&self.username()?);
    let inner = Arc::clone(&self.inner);
    let request = request.clone();

    self
      .layer
      .refresh(
        &key.render(),
        self.cache().ttl_for(key.kind()),
        move || async move { request.send(inner.as_ref()).await },
      )
      .await
  }

  /// Fetch day-by-day attendance for many subjects at once and cache each.
  ///
  /// Requests are issued concurrently; results come back in input order.
  pub async fn prefetch_subject_attendance(
    &self,
    semester: &Semester,
    subject_ids: &[String],
  ) -> Vec<(String, Result<Option<Value>>)> {
    let requests: Vec<PortalRequest> = subject_ids
      .iter()
      .map(|subject_id| PortalRequest::SubjectAttendance {
        semester: semester.clone(),
        subject_id: subject_id.clone(),
      })
      .collect();

    let results = join_all(requests.iter().map(|request| self.refresh(request))).await;

    let failed = results.iter().filter(|r| r.is_err()).count();
    debug!(subjects = subject_ids.len(), failed, "prefetched subject attendance");

    subject_ids.iter().cloned().zip(results).collect()
  }

  async fn read(&self, request: PortalRequest) -> Result<Option<Value>> {
    Ok(self.fetch(&request).await?.result.data)
  }

  async fn read_semesters(&self, scope: SemesterScope) -> Result<Vec<Semester>> {
    Ok(self.fetch_semesters(scope).await?.result.data)
  }
}

#[async_trait]
impl<D: DataSource + 'static> DataSource for CachedPortal<D> {
  fn kind(&self) -> SourceKind {
    SourceKind::Live
  }

  async fn student_login(&self, username: &str, password: &str) -> Result<Session> {
    let session = self.inner.student_login(username, password).await?;
    self.set_username(username.to_string());
    info!(username, "logged in to live portal");
    Ok(session)
  }

  async fn get_attendance_semesters(&self) -> Result<Vec<Semester>> {
    self.read_semesters(SemesterScope::Attendance).await
  }

  async fn get_registered_semesters(&self) -> Result<Vec<Semester>> {
    self.read_semesters(SemesterScope::Registration).await
  }

  async fn get_grade_semesters(&self) -> Result<Vec<Semester>> {
    self.read_semesters(SemesterScope::Grades).await
  }

  async fn get_attendance(&self, semester: &Semester) -> Result<Option<Value>> {
    self.read(PortalRequest::Attendance(semester.clone())).await
  }

  async fn get_subject_daily_attendance(
    &self,
    semester: &Semester,
    subject_id: &str,
  ) -> Result<Option<Value>> {
    self
      .read(PortalRequest::SubjectAttendance {
        semester: semester.clone(),
        subject_id: subject_id.to_string(),
      })
      .await
  }

  async fn get_registered_subjects_and_faculties(
    &self,
    semester: &Semester,
  ) -> Result<Option<Value>> {
    self
      .read(PortalRequest::RegisteredSubjects(semester.clone()))
      .await
  }

  async fn get_subject_choices(&self, semester: &Semester) -> Result<Option<Value>> {
    self.read(PortalRequest::SubjectChoices(semester.clone())).await
  }

  async fn get_grade_card(&self, semester: &Semester) -> Result<Option<Value>> {
    self.read(PortalRequest::GradeCard(semester.clone())).await
  }

  async fn get_marks(&self, semester: &Semester) -> Result<Option<Value>> {
    self.read(PortalRequest::Marks(semester.clone())).await
  }

  async fn get_exam_events(&self, semester: &Semester) -> Result<Option<Value>> {
    self.read(PortalRequest::ExamEvents(semester.clone())).await
  }

  async fn get_sgpa_cgpa(&self) -> Result<Option<Value>> {
    self.read(PortalRequest::SgpaCgpa).await
  }

  async fn get_personal_info(&self) -> Result<Option<Value>> {
    self.read(PortalRequest::PersonalInfo).await
  }

  async fn get_hostel_details(&self) -> Result<Option<Value>> {
    self.read(PortalRequest::HostelDetails).await
  }

  async fn get_fee_summary(&self) -> Result<Option<Value>> {
    self.read(PortalRequest::FeeSummary).await
  }
}
