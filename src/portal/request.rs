//! Record requests, their cache keys, and how to ask a data source for them.

use color_eyre::Result;
use serde_json::Value;

use crate::cache::{CacheKey, SemesterId};

use super::source::DataSource;
use super::types::Semester;

/// One record a view can ask for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortalRequest {
  Attendance(Semester),
  SubjectAttendance { semester: Semester, subject_id: String },
  RegisteredSubjects(Semester),
  SubjectChoices(Semester),
  GradeCard(Semester),
  Marks(Semester),
  ExamEvents(Semester),
  SgpaCgpa,
  PersonalInfo,
  HostelDetails,
  FeeSummary,
}

impl PortalRequest {
  pub fn semester(&self) -> Option<&Semester> {
    match self {
      Self::Attendance(semester)
      | Self::SubjectAttendance { semester, .. }
      | Self::RegisteredSubjects(semester)
      | Self::SubjectChoices(semester)
      | Self::GradeCard(semester)
      | Self::Marks(semester)
      | Self::ExamEvents(semester) => Some(semester),
      Self::SgpaCgpa | Self::PersonalInfo | Self::HostelDetails | Self::FeeSummary => None,
    }
  }

  /// Canonical cache key for `username`.
  pub fn cache_key(&self, username: &str) -> CacheKey {
    self.key_with(username, self.semester().map(Semester::id))
  }

  /// Keys this record may be stored under, canonical first. A semester
  /// cached under its registration id as well as its code yields two.
  pub fn cache_keys(&self, username: &str) -> Vec<CacheKey> {
    match self.semester() {
      Some(semester) => semester
        .ids()
        .into_iter()
        .map(|id| self.key_with(username, Some(id)))
        .collect(),
      None => vec![self.cache_key(username)],
    }
  }

  /// Whether a key of the same kind with these components (see
  /// [`crate::cache::CacheKind::parts`]) holds this record for some form of the semester.
  pub fn matches_parts(&self, parts: &[String]) -> bool {
    match self {
      Self::SubjectAttendance { subject_id, .. } => {
        parts.len() == 2 && parts[1] == *subject_id
      }
      Self::Attendance(_)
      | Self::RegisteredSubjects(_)
      | Self::SubjectChoices(_)
      | Self::GradeCard(_)
      | Self::Marks(_)
      | Self::ExamEvents(_) => parts.len() == 1,
      Self::SgpaCgpa | Self::PersonalInfo | Self::HostelDetails | Self::FeeSummary => {
        parts.is_empty()
      }
    }
  }

  fn key_with(&self, username: &str, semester: Option<SemesterId>) -> CacheKey {
    let username = username.to_string();
    let semester_or_empty = || semester.clone().unwrap_or_else(|| SemesterId::new(""));

    match self {
      Self::Attendance(_) => CacheKey::Attendance {
        username,
        semester: semester_or_empty(),
      },
      Self::SubjectAttendance { subject_id, .. } => CacheKey::SubjectData {
        username,
        semester: semester_or_empty(),
        subject: subject_id.clone(),
      },
      Self::RegisteredSubjects(_) => CacheKey::RegisteredSubjects {
        username,
        semester: semester_or_empty(),
      },
      Self::SubjectChoices(_) => CacheKey::SubjectChoices {
        username,
        semester: semester_or_empty(),
      },
      Self::GradeCard(_) => CacheKey::Grades {
        username,
        semester: semester.clone(),
      },
      Self::Marks(_) => CacheKey::Marks {
        username,
        semester: semester_or_empty(),
      },
      Self::ExamEvents(_) => CacheKey::Exams {
        username,
        semester: semester_or_empty(),
      },
      Self::SgpaCgpa => CacheKey::Grades {
        username,
        semester: None,
      },
      Self::PersonalInfo => CacheKey::Profile { username },
      Self::HostelDetails => CacheKey::Hostel { username },
      Self::FeeSummary => CacheKey::Fees { username },
    }
  }

  /// Ask `source` for this record.
  pub async fn send<S: DataSource + ?Sized>(&self, source: &S) -> Result<Option<Value>> {
    match self {
      Self::Attendance(semester) => source.get_attendance(semester).await,
      Self::SubjectAttendance {
        semester,
        subject_id,
      } => {
        source
          .get_subject_daily_attendance(semester, subject_id)
          .await
      }
      Self::RegisteredSubjects(semester) => {
        source
          .get_registered_subjects_and_faculties(semester)
          .await
      }
      Self::SubjectChoices(semester) => source.get_subject_choices(semester).await,
      Self::GradeCard(semester) => source.get_grade_card(semester).await,
      Self::Marks(semester) => source.get_marks(semester).await,
      Self::ExamEvents(semester) => source.get_exam_events(semester).await,
      Self::SgpaCgpa => source.get_sgpa_cgpa().await,
      Self::PersonalInfo => source.get_personal_info().await,
      Self::HostelDetails => source.get_hostel_details().await,
      Self::FeeSummary => source.get_fee_summary().await,
    }
  }
}
