use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::cache::SemesterId;

/// An academic semester as listed by the portal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Semester {
  #[serde(default, alias = "registrationid", deserialize_with = "deserialize_id")]
  pub registration_id: String,
  #[serde(default, alias = "registrationcode", deserialize_with = "deserialize_id")]
  pub registration_code: String,
}

/// Portals send ids as strings or numbers; null and blanks become empty.
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  let value = Value::deserialize(deserializer)?;
  Ok(
    SemesterId::from_value(&value)
      .map(|id| id.as_str().to_string())
      .unwrap_or_default(),
  )
}

impl Semester {
  pub fn new(registration_id: impl Into<String>, registration_code: impl Into<String>) -> Self {
    Self {
      registration_id: registration_id.into(),
      registration_code: registration_code.into(),
    }
  }

  /// A semester known only by one identifier, used for both fields.
  pub fn from_id(id: impl Into<String>) -> Self {
    let id = id.into();
    Self {
      registration_id: id.clone(),
      registration_code: id,
    }
  }

  /// Canonical key: the registration code, or the id when there is no code.
  pub fn id(&self) -> SemesterId {
    SemesterId::from(self)
  }

  /// Every distinct identifier this semester may have been cached under.
  pub fn ids(&self) -> Vec<SemesterId> {
    let mut ids = vec![self.id()];
    let by_id = SemesterId::from(self.registration_id.as_str());
    if !by_id.as_str().is_empty() && !ids.contains(&by_id) {
      ids.push(by_id);
    }
    ids
  }
}

impl From<&Semester> for SemesterId {
  fn from(semester: &Semester) -> Self {
    if semester.registration_code.trim().is_empty() {
      SemesterId::from(semester.registration_id.as_str())
    } else {
      SemesterId::from(semester.registration_code.as_str())
    }
  }
}

/// An authenticated portal session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
  pub username: String,
  pub institute_id: String,
  pub member_id: String,
  pub token: String,
  pub expires_at: DateTime<Utc>,
}

/// Institute id carried by the synthetic offline session.
pub const ARTIFICIAL_INSTITUTE_ID: &str = "offline";

/// Token carried by the synthetic offline session.
pub const ARTIFICIAL_TOKEN: &str = "offline-session";

impl Session {
  /// Synthetic session handed out by the offline fallback.
  pub fn artificial(username: &str) -> Self {
    Self {
      username: username.to_string(),
      institute_id: ARTIFICIAL_INSTITUTE_ID.to_string(),
      member_id: username.to_string(),
      token: ARTIFICIAL_TOKEN.to_string(),
      expires_at: DateTime::<Utc>::MAX_UTC,
    }
  }

  pub fn is_artificial(&self) -> bool {
    self.token == ARTIFICIAL_TOKEN && self.institute_id == ARTIFICIAL_INSTITUTE_ID
  }
}

/// Which implementation a data source is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
  /// Talks to the remote portal
  Live,
  /// Answers from cache only
  Artificial,
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_semester_accepts_legacy_field_names() {
    let semester: Semester =
      serde_json::from_value(json!({"registrationid": "R1", "registrationcode": "2024A"})).unwrap();

    assert_eq!(semester, Semester::new("R1", "2024A"));
    assert_eq!(semester.id(), SemesterId::from("2024A"));
  }

  #[test]
  fn test_semester_accepts_numeric_ids() {
    let semester: Semester =
      serde_json::from_value(json!({"registrationid": 1042, "registration_code": null})).unwrap();

    assert_eq!(semester, Semester::new("1042", ""));
    assert_eq!(semester.id(), SemesterId::from_value(&json!(1042)).unwrap());
  }

  #[test]
  fn test_semester_id_falls_back_to_registration_id() {
    let semester = Semester::new("R1", "");

    assert_eq!(semester.id(), SemesterId::from("R1"));
    assert_eq!(semester.ids(), vec![SemesterId::from("R1")]);
  }

  #[test]
  fn test_semester_ids_lists_code_then_id() {
    let semester = Semester::new("R1", "2024A");

    assert_eq!(
      semester.ids(),
      vec![SemesterId::from("2024A"), SemesterId::from("R1")]
    );
  }

  #[test]
  fn test_artificial_session() {
    let session = Session::artificial("alice");

    assert!(session.is_artificial());
    assert_eq!(session.username, "alice");
  }
}
