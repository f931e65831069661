//! Short-lived cache for one expensive derived number (a computed score).
//!
//! Records expire lazily on read and eagerly through a periodic sweep started
//! with [`spawn_sweeper`]. Time comes from the tokio clock, so tests can pause
//! it and advance it by hand.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
struct TtlRecord {
  value: f64,
  inserted_at: Instant,
}

#[derive(Debug)]
pub struct TtlCache {
  ttl: Duration,
  records: Mutex<HashMap<String, TtlRecord>>,
}

impl Default for TtlCache {
  fn default() -> Self {
    Self::new(DEFAULT_TTL)
  }
}

impl TtlCache {
  pub fn new(ttl: Duration) -> Self {
    Self {
      ttl,
      records: Mutex::new(HashMap::new()),
    }
  }

  pub fn ttl(&self) -> Duration {
    self.ttl
  }

  fn records(&self) -> MutexGuard<'_, HashMap<String, TtlRecord>> {
    self.records.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn is_expired(&self, record: &TtlRecord, now: Instant) -> bool {
    now.duration_since(record.inserted_at) > self.ttl
  }

  /// Value for `key`, evicting it if it has expired.
  pub fn get(&self, key: &str) -> Option<f64> {
    let mut records = self.records();
    let record = *records.get(key)?;

    if self.is_expired(&record, Instant::now()) {
      records.remove(key);
      return None;
    }
    Some(record.value)
  }

  /// Store `value` unless it is zero, negative or NaN; those are error
  /// sentinels and are dropped silently.
  pub fn set(&self, key: impl Into<String>, value: f64) {
    if value.is_nan() || value <= 0.0 {
      tracing::trace!(value, "dropping non-positive value");
      return;
    }

    self.records().insert(
      key.into(),
      TtlRecord {
        value,
        inserted_at: Instant::now(),
      },
    );
  }

  pub fn has(&self, key: &str) -> bool {
    self.get(key).is_some()
  }

  /// `set` for every pair; no atomicity across the batch.
  pub fn batch_set<I, K>(&self, values: I)
  where
    I: IntoIterator<Item = (K, f64)>,
    K: Into<String>,
  {
    for (key, value) in values {
      self.set(key, value);
    }
  }

  /// Remove every expired record. Returns how many were removed.
  pub fn cleanup(&self) -> usize {
    let now = Instant::now();
    let mut records = self.records();
    let before = records.len();
    records.retain(|_, record| !self.is_expired(record, now));
    before - records.len()
  }

  /// Keys that are still valid; expired ones are evicted along the way.
  pub fn valid_keys(&self) -> Vec<String> {
    self.cleanup();
    self.records().keys().cloned().collect()
  }

  pub fn delete(&self, key: &str) -> bool {
    self.records().remove(key).is_some()
  }

  pub fn clear(&self) {
    self.records().clear();
  }

  /// Records physically stored, including expired ones not yet swept.
  pub fn len(&self) -> usize {
    self.records().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// Owner's handle on a running sweep task. Dropping it stops the sweep.
#[derive(Debug)]
pub struct SweepHandle {
  task: Option<JoinHandle<()>>,
  shutdown_tx: Option<oneshot::Sender<()>>,
}

impl SweepHandle {
  /// Stop the sweep and wait for the task to finish.
  pub async fn cancel(mut self) {
    if let Some(tx) = self.shutdown_tx.take() {
      let _ = tx.send(());
    }
    if let Some(task) = self.task.take() {
      let _ = task.await;
    }
  }

  pub fn is_running(&self) -> bool {
    self.task.as_ref().is_some_and(|t| !t.is_finished())
  }
}

impl Drop for SweepHandle {
  fn drop(&mut self) {
    if let Some(task) = self.task.take() {
      task.abort();
    }
  }
}

/// Start sweeping expired records from `cache` every `interval`.
///
/// Must be called from within a tokio runtime.
pub fn spawn_sweeper(cache: Arc<TtlCache>, interval: Duration) -> SweepHandle {
  let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

  let task = tokio::spawn(async move {
    let mut ticker = tokio::time::interval(interval);
    // Skip the first tick (immediate)
    ticker.tick().await;

    loop {
      tokio::select! {
        _ = ticker.tick() => {
          let removed = cache.cleanup();
          if removed > 0 {
            tracing::debug!(removed, "swept expired ttl cache records");
          }
        }
        _ = &mut shutdown_rx => {
          break;
        }
      }
    }
  });

  SweepHandle {
    task: Some(task),
    shutdown_tx: Some(shutdown_tx),
  }
}
