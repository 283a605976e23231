//! Per-kind wrappers over the generic cache primitives.
//!
//! Each wrapper derives the namespaced key and applies the kind's TTL.

use color_eyre::Result;
use serde::{de::DeserializeOwned, Serialize};

use super::keys::{CacheKey, SemesterId, SemesterScope};
use super::manager::PortalCache;
use super::traits::CacheEntry;

impl PortalCache {
  /// Store `data` under `key` with the TTL of the key's kind.
  pub fn save_keyed<T: Serialize + ?Sized>(&self, key: &CacheKey, data: &T) -> Result<()> {
    self.save_with_ttl(&key.render(), data, self.ttl_for(key.kind()))
  }

  pub fn get_keyed<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<CacheEntry<T>> {
    self.get_entry(&key.render())
  }

  // Attendance

  pub fn save_attendance<T: Serialize + ?Sized>(
    &self,
    username: &str,
    semester: &SemesterId,
    data: &T,
  ) -> Result<()> {
    self.save_keyed(&attendance_key(username, semester), data)
  }

  pub fn get_attendance<T: DeserializeOwned>(
    &self,
    username: &str,
    semester: &SemesterId,
  ) -> Option<CacheEntry<T>> {
    self.get_keyed(&attendance_key(username, semester))
  }

  // Per-subject daily attendance

  pub fn save_subject_data<T: Serialize + ?Sized>(
    &self,
    username: &str,
    semester: &SemesterId,
    subject: &str,
    data: &T,
  ) -> Result<()> {
    self.save_keyed(&subject_data_key(username, semester, subject), data)
  }

  pub fn get_subject_data<T: DeserializeOwned>(
    &self,
    username: &str,
    semester: &SemesterId,
    subject: &str,
  ) -> Option<CacheEntry<T>> {
    self.get_keyed(&subject_data_key(username, semester, subject))
  }

  // Grades: overall SGPA/CGPA, or the grade card of one semester

  pub fn save_grades<T: Serialize + ?Sized>(
    &self,
    username: &str,
    semester: Option<&SemesterId>,
    data: &T,
  ) -> Result<()> {
    self.save_keyed(&grades_key(username, semester), data)
  }

  pub fn get_grades<T: DeserializeOwned>(
    &self,
    username: &str,
    semester: Option<&SemesterId>,
  ) -> Option<CacheEntry<T>> {
    self.get_keyed(&grades_key(username, semester))
  }

  // Registered subjects and faculties

  pub fn save_registered_subjects<T: Serialize + ?Sized>(
    &self,
    username: &str,
    semester: &SemesterId,
    data: &T,
  ) -> Result<()> {
    self.save_keyed(
      &CacheKey::RegisteredSubjects {
        username: username.to_string(),
        semester: semester.clone(),
      },
      data,
    )
  }

  pub fn get_registered_subjects<T: DeserializeOwned>(
    &self,
    username: &str,
    semester: &SemesterId,
  ) -> Option<CacheEntry<T>> {
    self.get_keyed(&CacheKey::RegisteredSubjects {
      username: username.to_string(),
      semester: semester.clone(),
    })
  }

  // Subject choices

  pub fn save_subject_choices<T: Serialize + ?Sized>(
    &self,
    username: &str,
    semester: &SemesterId,
    data: &T,
  ) -> Result<()> {
    self.save_keyed(
      &CacheKey::SubjectChoices {
        username: username.to_string(),
        semester: semester.clone(),
      },
      data,
    )
  }

  pub fn get_subject_choices<T: DeserializeOwned>(
    &self,
    username: &str,
    semester: &SemesterId,
  ) -> Option<CacheEntry<T>> {
    self.get_keyed(&CacheKey::SubjectChoices {
      username: username.to_string(),
      semester: semester.clone(),
    })
  }

  // Semester lists

  pub fn save_semesters<T: Serialize + ?Sized>(
    &self,
    username: &str,
    scope: SemesterScope,
    data: &T,
  ) -> Result<()> {
    self.save_keyed(
      &CacheKey::Semesters {
        username: username.to_string(),
        scope,
      },
      data,
    )
  }

  pub fn get_semesters<T: DeserializeOwned>(
    &self,
    username: &str,
    scope: SemesterScope,
  ) -> Option<CacheEntry<T>> {
    self.get_keyed(&CacheKey::Semesters {
      username: username.to_string(),
      scope,
    })
  }

  // Marks

  pub fn save_marks<T: Serialize + ?Sized>(
    &self,
    username: &str,
    semester: &SemesterId,
    data: &T,
  ) -> Result<()> {
    self.save_keyed(
      &CacheKey::Marks {
        username: username.to_string(),
        semester: semester.clone(),
      },
      data,
    )
  }

  pub fn get_marks<T: DeserializeOwned>(
    &self,
    username: &str,
    semester: &SemesterId,
  ) -> Option<CacheEntry<T>> {
    self.get_keyed(&CacheKey::Marks {
      username: username.to_string(),
      semester: semester.clone(),
    })
  }

  // Exam events

  pub fn save_exams<T: Serialize + ?Sized>(
    &self,
    username: &str,
    semester: &SemesterId,
    data: &T,
  ) -> Result<()> {
    self.save_keyed(
      &CacheKey::Exams {
        username: username.to_string(),
        semester: semester.clone(),
      },
      data,
    )
  }

  pub fn get_exams<T: DeserializeOwned>(
    &self,
    username: &str,
    semester: &SemesterId,
  ) -> Option<CacheEntry<T>> {
    self.get_keyed(&CacheKey::Exams {
      username: username.to_string(),
      semester: semester.clone(),
    })
  }

  // Per-user records

  pub fn save_fees<T: Serialize + ?Sized>(&self, username: &str, data: &T) -> Result<()> {
    self.save_keyed(
      &CacheKey::Fees {
        username: username.to_string(),
      },
      data,
    )
  }

  pub fn get_fees<T: DeserializeOwned>(&self, username: &str) -> Option<CacheEntry<T>> {
    self.get_keyed(&CacheKey::Fees {
      username: username.to_string(),
    })
  }

  pub fn save_profile<T: Serialize + ?Sized>(&self, username: &str, data: &T) -> Result<()> {
    self.save_keyed(
      &CacheKey::Profile {
        username: username.to_string(),
      },
      data,
    )
  }

  pub fn get_profile<T: DeserializeOwned>(&self, username: &str) -> Option<CacheEntry<T>> {
    self.get_keyed(&CacheKey::Profile {
      username: username.to_string(),
    })
  }

  pub fn save_hostel<T: Serialize + ?Sized>(&self, username: &str, data: &T) -> Result<()> {
    self.save_keyed(
      &CacheKey::Hostel {
        username: username.to_string(),
      },
      data,
    )
  }

  pub fn get_hostel<T: DeserializeOwned>(&self, username: &str) -> Option<CacheEntry<T>> {
    self.get_keyed(&CacheKey::Hostel {
      username: username.to_string(),
    })
  }
}

fn attendance_key(username: &str, semester: &SemesterId) -> CacheKey {
  CacheKey::Attendance {
    username: username.to_string(),
    semester: semester.clone(),
  }
}

fn subject_data_key(username: &str, semester: &SemesterId, subject: &str) -> CacheKey {
  CacheKey::SubjectData {
    username: username.to_string(),
    semester: semester.clone(),
    subject: subject.to_string(),
  }
}

fn grades_key(username: &str, semester: Option<&SemesterId>) -> CacheKey {
  CacheKey::Grades {
    username: username.to_string(),
    semester: semester.cloned(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::clock::ManualClock;
  use crate::cache::keys::CacheKind;
  use crate::cache::storage::{MemoryStore, Store};
  use chrono::Duration;
  use serde_json::{json, Value};
  use std::collections::HashMap;
  use std::sync::Arc;

  fn create_test_cache() -> (PortalCache, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let cache = PortalCache::with_clock(store.clone(), Arc::new(ManualClock::starting_now()));
    (cache, store)
  }

  fn ttl_of(store: &MemoryStore, key: &str) -> Duration {
    let raw: Value = serde_json::from_str(&store.get(key).unwrap().unwrap()).unwrap();
    Duration::milliseconds(
      raw["expiration"].as_i64().unwrap() - raw["timestamp"].as_i64().unwrap(),
    )
  }

  #[test]
  fn test_wrappers_apply_kind_ttl() {
    let (cache, store) = create_test_cache();
    let sem = SemesterId::from("2024A");

    cache.save_attendance("alice", &sem, &json!({})).unwrap();
    cache.save_grades("alice", None, &json!({})).unwrap();
    cache.save_subject_data("alice", &sem, "CS101", &json!([])).unwrap();
    cache.save_registered_subjects("alice", &sem, &json!({})).unwrap();
    cache.save_subject_choices("alice", &sem, &json!({})).unwrap();

    assert_eq!(ttl_of(&store, "attendance-alice-2024A"), Duration::hours(48));
    assert_eq!(ttl_of(&store, "grades-alice"), Duration::hours(12));
    assert_eq!(ttl_of(&store, "subject-data-alice-2024A-CS101"), Duration::hours(10));
    assert_eq!(ttl_of(&store, "registered-subjects-alice-2024A"), Duration::hours(48));
    assert_eq!(ttl_of(&store, "subject-choices-alice-2024A"), Duration::hours(48));
  }

  #[test]
  fn test_ttl_override() {
    let (cache, store) = create_test_cache();
    let cache =
      cache.with_ttl_overrides(HashMap::from([(CacheKind::Profile, Duration::hours(2))]));

    cache.save_profile("alice", &json!({"name": "A"})).unwrap();

    assert_eq!(ttl_of(&store, "profile-alice"), Duration::hours(2));
  }

  #[test]
  fn test_wrappers_round_trip_by_user_and_semester() {
    let (cache, _store) = create_test_cache();
    let a = SemesterId::from("2024A");
    let b = SemesterId::from("2024B");

    cache.save_attendance("alice", &a, &json!({"pct": 80})).unwrap();
    cache.save_semesters("alice", SemesterScope::Attendance, &json!([{"registration_code": "2024A"}])).unwrap();

    let entry: CacheEntry<Value> = cache.get_attendance("alice", &a).unwrap();
    assert_eq!(entry.data, json!({"pct": 80}));
    assert!(cache.get_attendance::<Value>("alice", &b).is_none());
    assert!(cache.get_attendance::<Value>("bob", &a).is_none());
    assert!(cache
      .get_semesters::<Value>("alice", SemesterScope::Registration)
      .is_none());
    assert!(cache
      .get_semesters::<Value>("alice", SemesterScope::Attendance)
      .is_some());
  }
}
