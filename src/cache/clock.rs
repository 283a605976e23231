//! Time source for cache timestamps.

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// Source of the current time.
///
/// The cache never calls `Utc::now()` directly so that expiry and staleness
/// can be exercised in tests without sleeping.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
  now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
  pub fn new(start: DateTime<Utc>) -> Self {
    Self {
      now: Mutex::new(start),
    }
  }

  /// Start at the current wall-clock time, truncated to whole milliseconds
  /// so that values read back from a stored entry compare equal.
  pub fn starting_now() -> Self {
    let now = Utc::now();
    Self::new(DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now))
  }

  pub fn advance(&self, by: Duration) {
    let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
    *now += by;
  }

  pub fn set(&self, to: DateTime<Utc>) {
    let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
    *now = to;
  }
}

impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> {
    *self.now.lock().unwrap_or_else(|e| e.into_inner())
  }
}
