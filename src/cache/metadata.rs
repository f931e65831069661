//! Per-key freshness annotations shown next to cached data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::storage::DurableStorage;

/// Responses slower than this get a warning badge.
pub const SLOW_RESPONSE_MS: u64 = 5000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetadataRecord {
  pub last_updated: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub correlation_id: Option<String>,
  /// Milliseconds the request took
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub response_time: Option<u64>,
}

impl CacheMetadataRecord {
  pub fn is_slow(&self) -> bool {
    self.response_time.is_some_and(|ms| ms > SLOW_RESPONSE_MS)
  }
}

/// Fields supplied when writing a record. `last_updated` defaults to now.
#[derive(Debug, Clone, Default)]
pub struct MetadataUpdate {
  pub last_updated: Option<DateTime<Utc>>,
  pub correlation_id: Option<String>,
  pub response_time: Option<u64>,
}

/// Metadata records in durable storage, named `<prefix><key>`.
pub struct CacheMetadataStore<S: DurableStorage> {
  storage: Arc<S>,
  prefix: String,
}

impl<S: DurableStorage> CacheMetadataStore<S> {
  pub fn new(storage: Arc<S>, prefix: impl Into<String>) -> Self {
    Self {
      storage,
      prefix: prefix.into(),
    }
  }

  pub fn prefix(&self) -> &str {
    &self.prefix
  }

  fn record_key(&self, key: &str) -> String {
    format!("{}{}", self.prefix, key)
  }

  /// Read a record; unreadable records count as absent.
  pub fn get(&self, key: &str) -> Option<CacheMetadataRecord> {
    let raw = match self.storage.get_item(&self.record_key(key)) {
      Ok(raw) => raw?,
      Err(e) => {
        tracing::warn!(key, error = %e, "failed to read cache metadata");
        return None;
      }
    };

    match serde_json::from_str(&raw) {
      Ok(record) => Some(record),
      Err(e) => {
        tracing::warn!(key, error = %e, "ignoring malformed cache metadata");
        None
      }
    }
  }

  /// Write a record, replacing the previous one. Returns whether it was stored.
  pub fn set(&self, key: &str, update: MetadataUpdate) -> bool {
    let record = CacheMetadataRecord {
      last_updated: update.last_updated.unwrap_or_else(Utc::now),
      correlation_id: update.correlation_id,
      response_time: update.response_time,
    };

    let result = serde_json::to_string(&record)
      .map_err(|e| color_eyre::eyre::eyre!("Failed to serialize cache metadata: {}", e))
      .and_then(|json| self.storage.set_item(&self.record_key(key), &json));

    match result {
      Ok(()) => true,
      Err(e) => {
        tracing::warn!(key, error = %e, "failed to write cache metadata");
        false
      }
    }
  }

  pub fn remove(&self, key: &str) {
    if let Err(e) = self.storage.remove_item(&self.record_key(key)) {
      tracing::warn!(key, error = %e, "failed to remove cache metadata");
    }
  }
}

/// Relative age of `timestamp` as seen at `now`, e.g. "3 minutes ago".
pub fn format_age(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
  let seconds = (now - timestamp).num_seconds();
  if seconds <= 0 {
    return "just now".to_string();
  }

  let (amount, unit) = if seconds < 60 {
    (seconds, "second")
  } else if seconds < 60 * 60 {
    (seconds / 60, "minute")
  } else if seconds < 24 * 60 * 60 {
    (seconds / (60 * 60), "hour")
  } else {
    (seconds / (24 * 60 * 60), "day")
  };

  if amount == 1 {
    format!("1 {} ago", unit)
  } else {
    format!("{} {}s ago", amount, unit)
  }
}
