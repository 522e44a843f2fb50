use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Last known reachability of the backend.
///
/// Starts online. Flips offline when a request fails at the transport level
/// or a probe fails; flips back when a probe succeeds.
#[derive(Debug)]
pub struct ConnectivityMonitor {
  online: AtomicBool,
}

impl Default for ConnectivityMonitor {
  fn default() -> Self {
    Self::new()
  }
}

impl ConnectivityMonitor {
  pub fn new() -> Self {
    Self {
      online: AtomicBool::new(true),
    }
  }

  pub fn is_online(&self) -> bool {
    self.online.load(Ordering::SeqCst)
  }

  pub fn mark_offline(&self) {
    if self.online.swap(false, Ordering::SeqCst) {
      info!("backend unreachable, switching to offline mode");
    }
  }

  /// Record a probe result. Returns true on an offline to online transition.
  pub fn record(&self, reachable: bool) -> bool {
    let was_online = self.online.swap(reachable, Ordering::SeqCst);
    match (was_online, reachable) {
      (false, true) => {
        info!("backend reachable again");
        true
      }
      (true, false) => {
        info!("backend unreachable, switching to offline mode");
        false
      }
      _ => false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_transitions() {
    let monitor = ConnectivityMonitor::new();
    assert!(monitor.is_online());
    assert!(!monitor.record(true));

    monitor.mark_offline();
    assert!(!monitor.is_online());
    assert!(!monitor.record(false));

    assert!(monitor.record(true));
    assert!(monitor.is_online());
    assert!(!monitor.record(true));
  }
}
