//! Offline data source that answers from the cache only.

use async_trait::async_trait;
use color_eyre::Result;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::RwLock;
use tracing::debug;

use crate::cache::{CacheKind, PortalCache, SemesterScope};

use super::request::PortalRequest;
use super::source::DataSource;
use super::types::{Semester, Session, SourceKind};

/// Data source used when the live portal is unreachable.
///
/// Every answer comes from previously cached data. Lookups try the
/// semester's registration code, then its id, then the newest entry of the
/// same record for that user, then the pre-namespacing key (the bare kind
/// prefix). Semester lists fall back to the semesters that have cached
/// records. Cached `null`s count as absent. Nothing found is `None` or an
/// empty list, never an error.
pub struct ArtificialPortal {
  cache: PortalCache,
  username: RwLock<String>,
}

impl ArtificialPortal {
  /// No credentials needed; `username` selects whose cached data to serve.
  pub fn new(cache: PortalCache, username: impl Into<String>) -> Self {
    Self {
      cache,
      username: RwLock::new(username.into()),
    }
  }

  pub fn username(&self) -> String {
    self
      .username
      .read()
      .map(|u| u.clone())
      .unwrap_or_else(|e| e.into_inner().clone())
  }

  /// Cached answer to `request`, if any.
  pub fn lookup(&self, request: &PortalRequest) -> Option<Value> {
    let username = self.username();
    let found = request
      .cache_keys(&username)
      .iter()
      .find_map(|key| {
        self
          .cache
          .get_keyed::<Option<Value>>(key)
          .and_then(|entry| entry.data)
      })
      .or_else(|| self.scan(request, &username));

    if found.is_none() {
      debug!(?request, username = %username, "no cached data for offline request");
    }
    found
  }

  /// Newest non-null entry of the same record under any other key.
  fn scan(&self, request: &PortalRequest, username: &str) -> Option<Value> {
    let kind = request.cache_key(username).kind();
    let mut candidates: Vec<String> = self
      .cache
      .keys_for_user(kind, username)
      .into_iter()
      .filter(|key| {
        kind
          .parts(key, username)
          .is_some_and(|parts| request.matches_parts(&parts))
      })
      .collect();
    candidates.push(kind.prefix().to_string());

    let (key, entry) = candidates
      .into_iter()
      .filter_map(|key| {
        let entry = self.cache.get_entry::<Option<Value>>(&key)?;
        entry.data.is_some().then_some((key, entry))
      })
      .max_by_key(|(_, entry)| entry.timestamp)?;

    debug!(?request, key = %key, "serving scanned cache entry");
    entry.data
  }

  fn semesters(&self, scope: SemesterScope, derived_from: CacheKind) -> Vec<Semester> {
    let username = self.username();
    if let Some(entry) = self.cache.get_semesters::<Vec<Semester>>(&username, scope) {
      return entry.data;
    }

    // Reconstruct from the semesters that have cached records
    let ids: BTreeSet<String> = self
      .cache
      .keys_for_user(derived_from, &username)
      .iter()
      .filter_map(|key| derived_from.first_part(key, &username))
      .filter(|id| !id.is_empty())
      .collect();

    ids.into_iter().rev().map(Semester::from_id).collect()
  }
}

#[async_trait]
impl DataSource for ArtificialPortal {
  fn kind(&self) -> SourceKind {
    SourceKind::Artificial
  }

  async fn student_login(&self, username: &str, _password: &str) -> Result<Session> {
    match self.username.write() {
      Ok(mut current) => *current = username.to_string(),
      Err(e) => *e.into_inner() = username.to_string(),
    }
    Ok(Session::artificial(username))
  }

  async fn get_attendance_semesters(&self) -> Result<Vec<Semester>> {
    Ok(self.semesters(SemesterScope::Attendance, CacheKind::Attendance))
  }

  async fn get_registered_semesters(&self) -> Result<Vec<Semester>> {
    Ok(self.semesters(
      SemesterScope::Registration,
      CacheKind::RegisteredSubjects,
    ))
  }

  async fn get_grade_semesters(&self) -> Result<Vec<Semester>> {
    Ok(self.semesters(SemesterScope::Grades, CacheKind::Grades))
  }

  async fn get_attendance(&self, semester: &Semester) -> Result<Option<Value>> {
    Ok(self.lookup(&PortalRequest::Attendance(semester.clone())))
  }

  async fn get_subject_daily_attendance(
    &self,
    semester: &Semester,
    subject_id: &str,
  ) -> Result<Option<Value>> {
    Ok(self.lookup(&PortalRequest::SubjectAttendance {
      semester: semester.clone(),
      subject_id: subject_id.to_string(),
    }))
  }

  async fn get_registered_subjects_and_faculties(
    &self,
    semester: &Semester,
  ) -> Result<Option<Value>> {
    Ok(self.lookup(&PortalRequest::RegisteredSubjects(semester.clone())))
  }

  async fn get_subject_choices(&self, semester: &Semester) -> Result<Option<Value>> {
    Ok(self.lookup(&PortalRequest::SubjectChoices(semester.clone())))
  }

  async fn get_grade_card(&self, semester: &Semester) -> Result<Option<Value>> {
    Ok(self.lookup(&PortalRequest::GradeCard(semester.clone())))
  }

  async fn get_marks(&self, semester: &Semester) -> Result<Option<Value>> {
    Ok(self.lookup(&PortalRequest::Marks(semester.clone())))
  }

  async fn get_exam_events(&self, semester: &Semester) -> Result<Option<Value>> {
    Ok(self.lookup(&PortalRequest::ExamEvents(semester.clone())))
  }

  async fn get_sgpa_cgpa(&self) -> Result<Option<Value>> {
    Ok(self.lookup(&PortalRequest::SgpaCgpa))
  }

  async fn get_personal_info(&self) -> Result<Option<Value>> {
    Ok(self.lookup(&PortalRequest::PersonalInfo))
  }

  async fn get_hostel_details(&self) -> Result<Option<Value>> {
    Ok(self.lookup(&PortalRequest::HostelDetails))
  }

  async fn get_fee_summary(&self) -> Result<Option<Value>> {
    Ok(self.lookup(&PortalRequest::FeeSummary))
  }
}
