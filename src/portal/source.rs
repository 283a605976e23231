//! The data-access interface shared by the live client and the offline
//! fallback.

use async_trait::async_trait;
use color_eyre::Result;
use serde_json::Value;

use super::types::{Semester, Session, SourceKind};

/// Portal data access.
///
/// Record getters return the backend's JSON payload, or `None` when there is
/// nothing to show. Semester lists are empty when unknown. Implementations
/// must not error for "not found".
#[async_trait]
pub trait DataSource: Send + Sync {
  fn kind(&self) -> SourceKind;

  /// Forward credentials to the portal login.
  async fn student_login(&self, username: &str, password: &str) -> Result<Session>;

  async fn get_attendance_semesters(&self) -> Result<Vec<Semester>>;

  async fn get_registered_semesters(&self) -> Result<Vec<Semester>>;

  async fn get_grade_semesters(&self) -> Result<Vec<Semester>>;

  async fn get_attendance(&self, semester: &Semester) -> Result<Option<Value>>;

  /// Day-by-day attendance for one subject.
  async fn get_subject_daily_attendance(
    &self,
    semester: &Semester,
    subject_id: &str,
  ) -> Result<Option<Value>>;

  async fn get_registered_subjects_and_faculties(
    &self,
    semester: &Semester,
  ) -> Result<Option<Value>>;

  async fn get_subject_choices(&self, semester: &Semester) -> Result<Option<Value>>;

  async fn get_grade_card(&self, semester: &Semester) -> Result<Option<Value>>;

  async fn get_marks(&self, semester: &Semester) -> Result<Option<Value>>;

  async fn get_exam_events(&self, semester: &Semester) -> Result<Option<Value>>;

  async fn get_sgpa_cgpa(&self) -> Result<Option<Value>>;

  async fn get_personal_info(&self) -> Result<Option<Value>>;

  async fn get_hostel_details(&self) -> Result<Option<Value>>;

  async fn get_fee_summary(&self) -> Result<Option<Value>>;
}
