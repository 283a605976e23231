//! Cache key derivation.
//!
//! Every key is `{prefix}-{user}[-{part}...]`. Components after the prefix
//! are escaped so that a `-` inside a username or semester code can never
//! make two different (user, semester) pairs render to the same key.

use chrono::Duration;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// The kinds of data kept in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum CacheKind {
  Attendance,
  Grades,
  SubjectData,
  RegisteredSubjects,
  SubjectChoices,
  Semesters,
  Marks,
  Exams,
  Fees,
  Profile,
  Hostel,
}

impl CacheKind {
  pub const ALL: [CacheKind; 11] = [
    CacheKind::Attendance,
    CacheKind::Grades,
    CacheKind::SubjectData,
    CacheKind::RegisteredSubjects,
    CacheKind::SubjectChoices,
    CacheKind::Semesters,
    CacheKind::Marks,
    CacheKind::Exams,
    CacheKind::Fees,
    CacheKind::Profile,
    CacheKind::Hostel,
  ];

  /// Key prefix. No `"{prefix}-"` is a prefix of another kind's.
  pub fn prefix(self) -> &'static str {
    match self {
      Self::Attendance => "attendance",
      Self::Grades => "grades",
      Self::SubjectData => "subject-data",
      Self::RegisteredSubjects => "registered-subjects",
      Self::SubjectChoices => "subject-choices",
      Self::Semesters => "semesters",
      Self::Marks => "marks",
      Self::Exams => "exams",
      Self::Fees => "fees",
      Self::Profile => "profile",
      Self::Hostel => "hostel",
    }
  }

  /// How long an entry of this kind lives before it is evicted.
  pub fn default_ttl(self) -> Duration {
    match self {
      Self::Attendance | Self::RegisteredSubjects | Self::SubjectChoices | Self::Semesters => {
        Duration::hours(48)
      }
      Self::Grades => Duration::hours(12),
      Self::SubjectData => Duration::hours(10),
      Self::Marks | Self::Exams | Self::Fees | Self::Profile | Self::Hostel => Duration::hours(24),
    }
  }

  /// Age after which a cached value is served but refreshed in the background.
  pub fn default_stale_after(self) -> Duration {
    match self {
      Self::Marks => Duration::minutes(10),
      _ => Duration::hours(4),
    }
  }

  /// Classify a raw store key.
  pub fn from_key(key: &str) -> Option<CacheKind> {
    Self::ALL.into_iter().find(|kind| {
      key
        .strip_prefix(kind.prefix())
        .is_some_and(|rest| rest.starts_with('-'))
    })
  }

  /// `{prefix}-{user}`: every key of this kind for `username` equals this or
  /// starts with it followed by `-`.
  pub fn user_prefix(self, username: &str) -> String {
    format!("{}-{}", self.prefix(), escape(username))
  }

  /// Whether `key` belongs to `username` under this kind.
  pub fn owns(self, key: &str, username: &str) -> bool {
    let user_prefix = self.user_prefix(username);
    match key.strip_prefix(&user_prefix) {
      Some("") => true,
      Some(rest) => rest.starts_with('-'),
      None => false,
    }
  }

  /// First component after the username in a key owned by `username`,
  /// unescaped. For semester-scoped kinds this is the semester.
  pub fn first_part(self, key: &str, username: &str) -> Option<String> {
    self.parts(key, username)?.into_iter().next()
  }

  /// Unescaped components after the username in a key owned by `username`:
  /// empty for `{prefix}-{user}`, `[semester]`, `[semester, subject]`...
  pub fn parts(self, key: &str, username: &str) -> Option<Vec<String>> {
    match key.strip_prefix(&self.user_prefix(username))? {
      "" => Some(Vec::new()),
      rest => Some(rest.strip_prefix('-')?.split('-').map(unescape).collect()),
    }
  }
}

impl fmt::Display for CacheKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.prefix())
  }
}

/// Canonical semester identifier used in keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SemesterId(String);

/// Field names a semester object may carry, in lookup order.
const SEMESTER_FIELDS: [&str; 4] = [
  "registration_code",
  "registrationcode",
  "registration_id",
  "registrationid",
];

impl SemesterId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Normalize any accepted JSON shape: a string, a number, or an object
  /// with one of the registration code/id fields.
  pub fn from_value(value: &Value) -> Option<Self> {
    match value {
      Value::Object(map) => SEMESTER_FIELDS
        .iter()
        .filter_map(|field| map.get(*field))
        .find_map(scalar_id),
      other => scalar_id(other),
    }
  }
}

fn scalar_id(value: &Value) -> Option<SemesterId> {
  match value {
    Value::String(s) if !s.trim().is_empty() => Some(SemesterId(s.trim().to_string())),
    Value::Number(n) => Some(SemesterId(n.to_string())),
    _ => None,
  }
}

impl From<&str> for SemesterId {
  fn from(s: &str) -> Self {
    Self(s.trim().to_string())
  }
}

impl From<String> for SemesterId {
  fn from(s: String) -> Self {
    Self::from(s.as_str())
  }
}

impl From<&SemesterId> for SemesterId {
  fn from(id: &SemesterId) -> Self {
    id.clone()
  }
}

impl fmt::Display for SemesterId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Which semester list a `Semesters` entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemesterScope {
  Attendance,
  Registration,
  Grades,
}

impl SemesterScope {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Attendance => "attendance",
      Self::Registration => "registration",
      Self::Grades => "grades",
    }
  }
}

/// Key for one cached item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheKey {
  Attendance { username: String, semester: SemesterId },
  /// Overall SGPA/CGPA when `semester` is `None`, a grade card otherwise
  Grades { username: String, semester: Option<SemesterId> },
  SubjectData { username: String, semester: SemesterId, subject: String },
  RegisteredSubjects { username: String, semester: SemesterId },
  SubjectChoices { username: String, semester: SemesterId },
  Semesters { username: String, scope: SemesterScope },
  Marks { username: String, semester: SemesterId },
  Exams { username: String, semester: SemesterId },
  Fees { username: String },
  Profile { username: String },
  Hostel { username: String },
}

impl CacheKey {
  pub fn kind(&self) -> CacheKind {
    match self {
      Self::Attendance { .. } => CacheKind::Attendance,
      Self::Grades { .. } => CacheKind::Grades,
      Self::SubjectData { .. } => CacheKind::SubjectData,
      Self::RegisteredSubjects { .. } => CacheKind::RegisteredSubjects,
      Self::SubjectChoices { .. } => CacheKind::SubjectChoices,
      Self::Semesters { .. } => CacheKind::Semesters,
      Self::Marks { .. } => CacheKind::Marks,
      Self::Exams { .. } => CacheKind::Exams,
      Self::Fees { .. } => CacheKind::Fees,
      Self::Profile { .. } => CacheKind::Profile,
      Self::Hostel { .. } => CacheKind::Hostel,
    }
  }

  pub fn username(&self) -> &str {
    match self {
      Self::Attendance { username, .. }
      | Self::Grades { username, .. }
      | Self::SubjectData { username, .. }
      | Self::RegisteredSubjects { username, .. }
      | Self::SubjectChoices { username, .. }
      | Self::Semesters { username, .. }
      | Self::Marks { username, .. }
      | Self::Exams { username, .. }
      | Self::Fees { username }
      | Self::Profile { username }
      | Self::Hostel { username } => username,
    }
  }

  /// The store key string.
  pub fn render(&self) -> String {
    let mut key = self.kind().user_prefix(self.username());
    let mut push = |part: &str| {
      key.push('-');
      key.push_str(&escape(part));
    };

    match self {
      Self::Attendance { semester, .. }
      | Self::RegisteredSubjects { semester, .. }
      | Self::SubjectChoices { semester, .. }
      | Self::Marks { semester, .. }
      | Self::Exams { semester, .. } => push(semester.as_str()),
      Self::Grades { semester, .. } => {
        if let Some(semester) = semester {
          push(semester.as_str());
        }
      }
      Self::SubjectData {
        semester, subject, ..
      } => {
        push(semester.as_str());
        push(subject);
      }
      Self::Semesters { scope, .. } => push(scope.as_str()),
      Self::Fees { .. } | Self::Profile { .. } | Self::Hostel { .. } => {}
    }

    key
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.render())
  }
}

/// Derive the key for a (kind, user, semester) triple.
///
/// Kinds that are not semester-scoped ignore `semester`; `SubjectData` and
/// `Semesters` need extra parts and are built through [`CacheKey`].
pub fn derive_key(kind: CacheKind, username: &str, semester: Option<&SemesterId>) -> String {
  let mut key = kind.user_prefix(username);
  let semester_scoped = !matches!(
    kind,
    CacheKind::Fees | CacheKind::Profile | CacheKind::Hostel
  );
  if let (true, Some(semester)) = (semester_scoped, semester) {
    key.push('-');
    key.push_str(&escape(semester.as_str()));
  }
  key
}

fn escape(component: &str) -> String {
  component.replace('%', "%25").replace('-', "%2D")
}

fn unescape(component: &str) -> String {
  component.replace("%2D", "-").replace("%25", "%")
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_derive_key_is_deterministic() {
    let sem = SemesterId::from("2024A");
    let a = derive_key(CacheKind::Attendance, "alice", Some(&sem));
    let b = derive_key(CacheKind::Attendance, "alice", Some(&sem));

    assert_eq!(a, b);
    assert_eq!(a, "attendance-alice-2024A");
  }

  #[test]
  fn test_semester_object_matches_plain_string() {
    let from_object =
      SemesterId::from_value(&json!({"registration_code": "2024A", "registration_id": "R1"}))
        .unwrap();
    let from_string = SemesterId::from("2024A");

    assert_eq!(
      derive_key(CacheKind::Attendance, "alice", Some(&from_object)),
      derive_key(CacheKind::Attendance, "alice", Some(&from_string))
    );
  }

  #[test]
  fn test_semester_field_lookup_order() {
    assert_eq!(
      SemesterId::from_value(&json!({"registrationcode": "X"})).unwrap(),
      SemesterId::from("X")
    );
    assert_eq!(
      SemesterId::from_value(&json!({"registration_id": "R1", "registrationid": "R2"})).unwrap(),
      SemesterId::from("R1")
    );
    assert_eq!(
      SemesterId::from_value(&json!({"registration_code": "", "registrationid": 42})).unwrap(),
      SemesterId::from("42")
    );
    assert_eq!(SemesterId::from_value(&json!({"name": "x"})), None);
    assert_eq!(SemesterId::from_value(&json!(null)), None);
  }

  #[test]
  fn test_different_semesters_and_users_differ() {
    let a = SemesterId::from("2024A");
    let b = SemesterId::from("2024B");

    assert_ne!(
      derive_key(CacheKind::Attendance, "alice", Some(&a)),
      derive_key(CacheKind::Attendance, "alice", Some(&b))
    );
    assert_ne!(
      derive_key(CacheKind::Attendance, "alice", Some(&a)),
      derive_key(CacheKind::Attendance, "bob", Some(&a))
    );
  }

  #[test]
  fn test_dashes_in_components_do_not_collide() {
    let k1 = derive_key(CacheKind::Attendance, "a-b", Some(&SemesterId::from("c")));
    let k2 = derive_key(CacheKind::Attendance, "a", Some(&SemesterId::from("b-c")));

    assert_ne!(k1, k2);
  }

  #[test]
  fn test_prefixes_classify_uniquely() {
    for kind in CacheKind::ALL {
      let key = derive_key(kind, "alice", Some(&SemesterId::from("2024A")));
      assert_eq!(CacheKind::from_key(&key), Some(kind), "key {}", key);
    }

    let choices = CacheKey::SubjectChoices {
      username: "choices".into(),
      semester: SemesterId::from("A"),
    };
    assert_eq!(CacheKind::from_key(&choices.render()), Some(CacheKind::SubjectChoices));
    assert_eq!(CacheKind::from_key("theme"), None);
    assert_eq!(CacheKind::from_key("attendance"), None);
  }

  #[test]
  fn test_cache_key_render() {
    let key = CacheKey::SubjectData {
      username: "alice".into(),
      semester: SemesterId::from("2024A"),
      subject: "CS-101".into(),
    };
    assert_eq!(key.render(), "subject-data-alice-2024A-CS%2D101");

    let overall = CacheKey::Grades {
      username: "alice".into(),
      semester: None,
    };
    assert_eq!(overall.render(), "grades-alice");

    let semesters = CacheKey::Semesters {
      username: "alice".into(),
      scope: SemesterScope::Registration,
    };
    assert_eq!(semesters.render(), "semesters-alice-registration");
  }

  #[test]
  fn test_owns_matches_only_that_user() {
    let key = derive_key(CacheKind::Attendance, "al", Some(&SemesterId::from("S1")));

    assert!(CacheKind::Attendance.owns(&key, "al"));
    assert!(!CacheKind::Attendance.owns(&key, "a"));
    assert!(!CacheKind::Grades.owns(&key, "al"));
    assert!(CacheKind::Profile.owns("profile-al", "al"));
  }

  #[test]
  fn test_first_part_recovers_semester() {
    let key = CacheKey::SubjectData {
      username: "al".into(),
      semester: SemesterId::from("2024-A"),
      subject: "X".into(),
    }
    .render();

    assert_eq!(
      CacheKind::SubjectData.first_part(&key, "al").as_deref(),
      Some("2024-A")
    );
    assert_eq!(CacheKind::SubjectData.first_part(&key, "bob"), None);
    assert_eq!(CacheKind::Profile.first_part("profile-al", "al"), None);
  }

  #[test]
  fn test_parts_split_escaped_components() {
    assert_eq!(
      CacheKind::SubjectData.parts("subject-data-al-2024%2DA-CS101", "al"),
      Some(vec!["2024-A".to_string(), "CS101".to_string()])
    );
    assert_eq!(CacheKind::Grades.parts("grades-al", "al"), Some(Vec::new()));
    assert_eq!(CacheKind::Grades.parts("grades-alice-2024A", "al"), None);
  }
}
