//! Network-state signal consumed by the retry policy.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Reports whether the client currently believes it is offline.
pub trait NetworkState: Send + Sync {
  fn is_offline(&self) -> bool;
}

/// Signal for environments without connectivity detection.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl NetworkState for AlwaysOnline {
  fn is_offline(&self) -> bool {
    false
  }
}

/// Shared offline flag, flipped by whatever watches connectivity in the app.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct NetworkMonitor {
  offline: Arc<AtomicBool>,
}

impl NetworkMonitor {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set_offline(&self, offline: bool) {
    let previous = self.offline.swap(offline, Ordering::SeqCst);
    if previous != offline {
      tracing::info!(offline, "network state changed");
    }
  }
}

impl NetworkState for NetworkMonitor {
  fn is_offline(&self) -> bool {
    self.offline.load(Ordering::SeqCst)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_monitor_clones_share_state() {
    let monitor = NetworkMonitor::new();
    let watcher = monitor.clone();
    assert!(!watcher.is_offline());

    monitor.set_offline(true);
    assert!(watcher.is_offline());

    monitor.set_offline(false);
    assert!(!watcher.is_offline());
  }
}
