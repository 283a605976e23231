//! Live data source double shared by unit tests.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use super::source::DataSource;
use super::types::{Semester, Session, SourceKind};

/// Live source double: answers every record with a counter-stamped
/// payload, or fails when `offline` is set. Login wants the password
/// `secret`; there is never a hostel record.
#[derive(Default)]
pub struct FakeLive {
  pub calls: AtomicU32,
  pub offline: AtomicBool,
}

impl FakeLive {
  fn answer(&self, what: &str) -> Result<Option<Value>> {
    if self.offline.load(Ordering::SeqCst) {
      return Err(eyre!("portal unreachable"));
    }
    let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
    Ok(Some(json!({"what": what, "call": n})))
  }
}

#[async_trait]
impl DataSource for FakeLive {
  fn kind(&self) -> SourceKind {
    SourceKind::Live
  }
  async fn student_login(&self, username: &str, password: &str) -> Result<Session> {
    if self.offline.load(Ordering::SeqCst) {
      return Err(eyre!("portal unreachable"));
    }
    if password != "secret" {
      return Err(eyre!("invalid credentials"));
    }
    Ok(Session {
      username: username.into(),
      institute_id: "INST".into(),
      member_id: "M1".into(),
      token: "t".into(),
      expires_at: chrono::Utc::now(),
    })
  }
  async fn get_attendance_semesters(&self) -> Result<Vec<Semester>> {
    self.answer("semesters")?;
    Ok(vec![Semester::new("R1", "2024A")])
  }
  async fn get_registered_semesters(&self) -> Result<Vec<Semester>> {
    Ok(Vec::new())
  }
  async fn get_grade_semesters(&self) -> Result<Vec<Semester>> {
    Ok(Vec::new())
  }
  async fn get_attendance(&self, _semester: &Semester) -> Result<Option<Value>> {
    self.answer("attendance")
  }
  async fn get_subject_daily_attendance(
    &self,
    _semester: &Semester,
    subject_id: &str,
  ) -> Result<Option<Value>> {
    self.answer(subject_id)
  }
  async fn get_registered_subjects_and_faculties(
    &self,
    _semester: &Semester,
  ) -> Result<Option<Value>> {
    self.answer("registered")
  }
  async fn get_subject_choices(&self, _semester: &Semester) -> Result<Option<Value>> {
    self.answer("choices")
  }
  async fn get_grade_card(&self, _semester: &Semester) -> Result<Option<Value>> {
    self.answer("grade_card")
  }
  async fn get_marks(&self, _semester: &Semester) -> Result<Option<Value>> {
    self.answer("marks")
  }
  async fn get_exam_events(&self, _semester: &Semester) -> Result<Option<Value>> {
    self.answer("exams")
  }
  async fn get_sgpa_cgpa(&self) -> Result<Option<Value>> {
    self.answer("sgpa")
  }
  async fn get_personal_info(&self) -> Result<Option<Value>> {
    self.answer("profile")
  }
  async fn get_hostel_details(&self) -> Result<Option<Value>> {
    Ok(None)
  }
  async fn get_fee_summary(&self) -> Result<Option<Value>> {
    self.answer("fees")
  }
}
