//! Snapshots the live query cache into durable storage and restores it.
//!
//! The manager never owns query results itself: it binds to the
//! application's [`QueryStore`] in [`QueryCacheManager::initialize`] and
//! mirrors it on demand. Every storage or parse failure is logged and counted
//! in [`CacheStats::errors`]; none of them reach the caller, since losing a
//! snapshot must never take the dashboard down.

use chrono::{DateTime, Utc};
use color_eyre::eyre::eyre;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

use crate::config::StorageConfig;
use crate::error::RequestError;
use crate::normalize::normalize_response;

use super::key::CacheKey;
use super::metadata::{CacheMetadataRecord, CacheMetadataStore, MetadataUpdate};
use super::storage::DurableStorage;
use super::store::QueryStore;

/// Snapshot element as written to storage.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedEntry {
  #[serde(rename = "queryKey")]
  key: CacheKey,
  #[serde(default)]
  data: Value,
  /// Epoch milliseconds
  #[serde(rename = "dataUpdatedAt", default)]
  updated_at: Option<i64>,
}

/// Counters for cache activity since creation or the last reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
  pub hits: u64,
  pub misses: u64,
  pub sets: u64,
  pub invalidations: u64,
  pub errors: u64,
}

/// Options for [`QueryCacheManager::set_cached_data`].
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
  /// Write the snapshot right after storing
  pub persist: bool,
  pub correlation_id: Option<String>,
  /// Milliseconds the request took
  pub response_time: Option<u64>,
}

/// A live cache lookup together with its metadata record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CachedQuery {
  pub data: Option<Value>,
  pub updated_at: Option<DateTime<Utc>>,
  pub metadata: Option<CacheMetadataRecord>,
}

/// Where a refreshed value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Network failed, serving the last cached value
  Offline,
}

#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  pub data: T,
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  pub fn offline(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at: Some(cached_at),
    }
  }
}

pub struct QueryCacheManager<S: DurableStorage> {
  storage: Arc<S>,
  metadata: CacheMetadataStore<S>,
  store: Option<Arc<dyn QueryStore>>,
  snapshot_key: String,
  stats: CacheStats,
}

impl<S: DurableStorage> QueryCacheManager<S> {
  pub fn new(storage: Arc<S>, config: &StorageConfig) -> Self {
    Self {
      metadata: CacheMetadataStore::new(storage.clone(), config.metadata_prefix.clone()),
      storage,
      store: None,
      snapshot_key: config.snapshot_key.clone(),
      stats: CacheStats::default(),
    }
  }

  pub fn metadata(&self) -> &CacheMetadataStore<S> {
    &self.metadata
  }

  pub fn is_bound(&self) -> bool {
    self.store.is_some()
  }

  /// Bind to the live store and restore the persisted snapshot into it.
  /// Returns how many entries were restored.
  pub fn initialize(&mut self, store: Arc<dyn QueryStore>) -> usize {
    self.store = Some(store);
    self.load_persisted_cache()
  }

  /// Restore the snapshot into the live store. Malformed entries are skipped;
  /// this never fails.
  pub fn load_persisted_cache(&mut self) -> usize {
    let Some(store) = self.store.clone() else {
      return 0;
    };

    let raw = match self.storage.get_item(&self.snapshot_key) {
      Ok(Some(raw)) => raw,
      Ok(None) => return 0,
      Err(e) => {
        tracing::warn!(error = %e, "failed to read persisted query cache");
        self.stats.errors += 1;
        return 0;
      }
    };

    let elements: Vec<Value> = match serde_json::from_str(&raw) {
      Ok(elements) => elements,
      Err(e) => {
        tracing::warn!(error = %e, "failed to parse persisted query cache");
        self.stats.errors += 1;
        return 0;
      }
    };

    let mut restored = 0;
    let mut skipped = 0;
    for element in elements {
      match serde_json::from_value::<PersistedEntry>(element) {
        Ok(entry) if !entry.key.is_empty() => {
          let updated_at = entry
            .updated_at
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_else(Utc::now);
          store.set(entry.key, entry.data, updated_at);
          restored += 1;
        }
        _ => skipped += 1,
      }
    }

    if skipped > 0 {
      tracing::debug!(skipped, "skipped malformed persisted cache entries");
    }
    tracing::info!(restored, "restored persisted query cache");
    restored
  }

  /// Write the live store to durable storage as one snapshot record.
  /// Returns whether the snapshot was written.
  pub fn persist_now(&mut self) -> bool {
    let Some(store) = &self.store else {
      return false;
    };

    let entries: Vec<PersistedEntry> = store
      .entries()
      .into_iter()
      .map(|entry| PersistedEntry {
        key: entry.key,
        data: entry.data,
        updated_at: Some(entry.updated_at.timestamp_millis()),
      })
      .collect();

    let result = serde_json::to_string(&entries)
      .map_err(|e| eyre!("Failed to serialize query cache: {}", e))
      .and_then(|json| self.storage.set_item(&self.snapshot_key, &json));

    match result {
      Ok(()) => {
        tracing::debug!(entries = entries.len(), "persisted query cache");
        true
      }
      Err(e) => {
        tracing::warn!(error = %e, "failed to persist query cache");
        self.stats.errors += 1;
        false
      }
    }
  }

  /// Clear the live store, the snapshot, and every metadata record.
  pub fn clear_all(&mut self) {
    let Some(store) = &self.store else {
      return;
    };
    store.clear();
    self.stats.invalidations += 1;

    if let Err(e) = self.storage.remove_item(&self.snapshot_key) {
      tracing::warn!(error = %e, "failed to remove persisted query cache");
      self.stats.errors += 1;
    }

    let keys = match self.storage.keys() {
      Ok(keys) => keys,
      Err(e) => {
        tracing::warn!(error = %e, "failed to scan storage for cache metadata");
        self.stats.errors += 1;
        return;
      }
    };

    let prefix = self.metadata.prefix();
    let mut removed = 0;
    for key in keys.iter().filter(|k| k.starts_with(prefix)) {
      match self.storage.remove_item(key) {
        Ok(()) => removed += 1,
        Err(e) => {
          tracing::warn!(key = %key, error = %e, "failed to remove cache metadata");
          self.stats.errors += 1;
        }
      }
    }
    tracing::info!(metadata_records = removed, "cleared query cache");
  }

  /// Store a result in the live store and annotate it with metadata.
  pub fn set_cached_data(&mut self, key: CacheKey, data: Value, options: SetOptions) {
    let Some(store) = &self.store else {
      return;
    };

    let metadata_key = key.to_string();
    store.set(key, data, Utc::now());
    self.stats.sets += 1;

    self.metadata.set(
      &metadata_key,
      MetadataUpdate {
        last_updated: None,
        correlation_id: options.correlation_id,
        response_time: options.response_time,
      },
    );

    if options.persist {
      self.persist_now();
    }
  }

  pub fn get_cached_data(&mut self, key: &CacheKey) -> CachedQuery {
    let Some(store) = &self.store else {
      return CachedQuery::default();
    };

    let entry = store.get(key);
    if entry.is_some() {
      self.stats.hits += 1;
    } else {
      self.stats.misses += 1;
    }

    CachedQuery {
      metadata: self.metadata.get(&key.to_string()),
      updated_at: entry.as_ref().map(|e| e.updated_at),
      data: entry.map(|e| e.data),
    }
  }

  /// Drop one live entry and its metadata record. Returns whether an entry
  /// existed.
  pub fn invalidate(&mut self, key: &CacheKey) -> bool {
    let Some(store) = &self.store else {
      return false;
    };

    let removed = store.remove(key);
    self.metadata.remove(&key.to_string());
    self.stats.invalidations += 1;
    removed
  }

  /// Invalidate every live key whose `:`-joined form contains `pattern`.
  pub fn invalidate_matching(&mut self, pattern: &str) -> usize {
    let Some(store) = &self.store else {
      return 0;
    };

    let matching: Vec<CacheKey> = store
      .entries()
      .into_iter()
      .map(|e| e.key)
      .filter(|k| k.to_string().contains(pattern))
      .collect();

    for key in &matching {
      self.invalidate(key);
    }
    matching.len()
  }

  /// Fetch fresh data for `key`, falling back to the cached value when the
  /// fetch fails.
  ///
  /// The fetched body is normalized before it is stored; a body without a
  /// payload (e.g. `success: false`) counts as a failed fetch. The last
  /// failure is returned when nothing is cached. `correlation_id` is stamped
  /// into the metadata record of a fresh value.
  pub async fn background_refresh<F, Fut>(
    &mut self,
    key: &CacheKey,
    correlation_id: Option<String>,
    fetch: F,
  ) -> Result<CacheResult<Value>, RequestError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value, RequestError>>,
  {
    let started = tokio::time::Instant::now();
    let fetched = fetch().await.and_then(|body| {
      normalize_response(Some(body))
        .ok_or_else(|| RequestError::Other("response carried no payload".to_string()))
    });

    match fetched {
      Ok(data) => {
        let response_time = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.set_cached_data(
          key.clone(),
          data.clone(),
          SetOptions {
            persist: true,
            correlation_id,
            response_time: Some(response_time),
          },
        );
        Ok(CacheResult::from_network(data))
      }
      Err(e) => {
        tracing::warn!(key = %key, error = %e, "background refresh failed");
        self.stats.errors += 1;
        match self.store.as_ref().and_then(|s| s.get(key)) {
          Some(entry) => Ok(CacheResult::offline(entry.data, entry.updated_at)),
          None => Err(e),
        }
      }
    }
  }

  /// Show `optimistic` under `key` right away, then replace it with what
  /// `fetch` returns.
  ///
  /// When `fetch` fails the previous value is put back, or the key is
  /// invalidated if there was none, and the failure is returned. An unbound
  /// manager refuses without calling `fetch`.
  pub async fn optimistic_update<F, Fut>(
    &mut self,
    key: &CacheKey,
    optimistic: Value,
    fetch: F,
  ) -> Result<Value, RequestError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value, RequestError>>,
  {
    let Some(store) = self.store.clone() else {
      return Err(RequestError::Other("query cache is not initialized".to_string()));
    };

    let previous = store.get(key);
    self.set_cached_data(key.clone(), optimistic, SetOptions::default());

    match fetch().await {
      Ok(actual) => {
        self.set_cached_data(key.clone(), actual.clone(), SetOptions::default());
        Ok(actual)
      }
      Err(e) => {
        tracing::warn!(key = %key, error = %e, "optimistic update failed, rolling back");
        match previous {
          Some(entry) => self.set_cached_data(key.clone(), entry.data, SetOptions::default()),
          None => {
            self.invalidate(key);
          }
        }
        Err(e)
      }
    }
  }

  pub fn stats(&self) -> CacheStats {
    self.stats
  }

  pub fn reset_stats(&mut self) {
    self.stats = CacheStats::default();
  }

  /// Hits as a percentage of lookups; 0 before any lookup.
  pub fn hit_rate(&self) -> f64 {
    let total = self.stats.hits + self.stats.misses;
    if total == 0 {
      return 0.0;
    }
    self.stats.hits as f64 / total as f64 * 100.0
  }

  /// Persist once more and release the live store.
  pub fn dispose(&mut self) {
    self.persist_now();
    self.store = None;
  }
}
