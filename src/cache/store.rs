//! The live, in-memory query result cache.
//!
//! The application owns this cache; the persistence layer only mirrors it.
//! [`MemoryQueryStore`] is the bundled implementation.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::key::CacheKey;

/// One live query result.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
  pub key: CacheKey,
  pub data: Value,
  pub updated_at: DateTime<Utc>,
}

/// Keyed store of query results the UI reads from.
pub trait QueryStore: Send + Sync {
  fn get(&self, key: &CacheKey) -> Option<CacheEntry>;

  /// Insert or overwrite; latest write wins.
  fn set(&self, key: CacheKey, data: Value, updated_at: DateTime<Utc>);

  /// Returns whether an entry was removed.
  fn remove(&self, key: &CacheKey) -> bool;

  /// Consistent copy of every entry.
  fn entries(&self) -> Vec<CacheEntry>;

  fn clear(&self);
}

#[derive(Debug, Default)]
pub struct MemoryQueryStore {
  entries: Mutex<BTreeMap<CacheKey, (Value, DateTime<Utc>)>>,
}

impl MemoryQueryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().is_empty()
  }

  fn lock(&self) -> MutexGuard<'_, BTreeMap<CacheKey, (Value, DateTime<Utc>)>> {
    // Entries are plain values, so a panicked writer cannot leave them half-updated
    self.entries.lock().unwrap_or_else(|e| e.into_inner())
  }
}

impl QueryStore for MemoryQueryStore {
  fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
    self.lock().get(key).map(|(data, updated_at)| CacheEntry {
      key: key.clone(),
      data: data.clone(),
      updated_at: *updated_at,
    })
  }

  fn set(&self, key: CacheKey, data: Value, updated_at: DateTime<Utc>) {
    self.lock().insert(key, (data, updated_at));
  }

  fn remove(&self, key: &CacheKey) -> bool {
    self.lock().remove(key).is_some()
  }

  fn entries(&self) -> Vec<CacheEntry> {
    self
      .lock()
      .iter()
      .map(|(key, (data, updated_at))| CacheEntry {
        key: key.clone(),
        data: data.clone(),
        updated_at: *updated_at,
      })
      .collect()
  }

  fn clear(&self) {
    self.lock().clear();
  }
}
