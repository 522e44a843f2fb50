use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// Source of wall-clock time in epoch milliseconds.
pub trait Clock: Send + Sync {
  fn now_ms(&self) -> i64;

  fn now(&self) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(self.now_ms()).unwrap_or_default()
  }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now_ms(&self) -> i64 {
    Utc::now().timestamp_millis()
  }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
  now_ms: AtomicI64,
}

impl ManualClock {
  pub fn new(start_ms: i64) -> Self {
    Self {
      now_ms: AtomicI64::new(start_ms),
    }
  }

  pub fn advance(&self, ms: i64) {
    self.now_ms.fetch_add(ms, Ordering::SeqCst);
  }
}

impl Clock for ManualClock {
  fn now_ms(&self) -> i64 {
    self.now_ms.load(Ordering::SeqCst)
  }
}
