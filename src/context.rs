//! Application-scoped owner of the resilience pieces.
//!
//! Built once at start-up and passed by reference to whatever needs it.

use color_eyre::Result;
use std::sync::Arc;

use crate::cache::{
  spawn_sweeper, QueryCacheManager, QueryStore, SqliteStorage, SweepHandle, TtlCache,
  DurableStorage,
};
use crate::config::Config;
use crate::history::ActionHistory;
use crate::retry::{NetworkState, RetryPolicy};

pub struct Resilience<S: DurableStorage> {
  config: Config,
  policy: RetryPolicy,
  ttl_cache: Arc<TtlCache>,
  cache: QueryCacheManager<S>,
  history: ActionHistory,
  sweeper: Option<SweepHandle>,
}

impl Resilience<SqliteStorage> {
  /// Open the SQLite storage at the configured location.
  pub fn open(config: Config, network: Arc<dyn NetworkState>) -> Result<Self> {
    let path = config.storage.resolve_path()?;
    tracing::info!(path = %path.display(), "opening durable storage");
    let storage = SqliteStorage::open(&path)?;
    Ok(Self::new(config, Arc::new(storage), network))
  }
}

impl<S: DurableStorage> Resilience<S> {
  pub fn new(config: Config, storage: Arc<S>, network: Arc<dyn NetworkState>) -> Self {
    Self {
      policy: RetryPolicy::new(config.retry.clone(), network),
      ttl_cache: Arc::new(TtlCache::new(config.ttl_cache.ttl())),
      cache: QueryCacheManager::new(storage, &config.storage),
      history: ActionHistory::new(config.history.capacity),
      sweeper: None,
      config,
    }
  }

  /// Bind the live query store, restore the persisted snapshot and start the
  /// TTL sweep. Returns how many cache entries were restored.
  ///
  /// Must be called from within a tokio runtime.
  pub fn init(&mut self, store: Arc<dyn QueryStore>) -> usize {
    let restored = self.cache.initialize(store);

    if self.sweeper.is_none() {
      self.sweeper = Some(spawn_sweeper(
        self.ttl_cache.clone(),
        self.config.ttl_cache.sweep_interval(),
      ));
    }

    tracing::info!(restored, "resilience layer initialized");
    restored
  }

  /// Stop the sweep and write the final snapshot.
  pub async fn dispose(&mut self) {
    if let Some(sweeper) = self.sweeper.take() {
      sweeper.cancel().await;
    }
    self.cache.dispose();
    tracing::info!("resilience layer disposed");
  }

  pub fn is_running(&self) -> bool {
    self.sweeper.as_ref().is_some_and(SweepHandle::is_running)
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn policy(&self) -> &RetryPolicy {
    &self.policy
  }

  pub fn ttl_cache(&self) -> &Arc<TtlCache> {
    &self.ttl_cache
  }

  pub fn cache(&self) -> &QueryCacheManager<S> {
    &self.cache
  }

  pub fn cache_mut(&mut self) -> &mut QueryCacheManager<S> {
    &mut self.cache
  }

  pub fn history(&self) -> &ActionHistory {
    &self.history
  }

  pub fn history_mut(&mut self) -> &mut ActionHistory {
    &mut self.history
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheKey, MemoryQueryStore, MemoryStorage, SetOptions};
  use crate::config::TtlCacheConfig;
  use crate::error::RequestError;
  use crate::retry::{AlwaysOnline, NetworkMonitor};
  use serde_json::json;
  use std::time::Duration;

  fn layer(config: Config) -> (Resilience<MemoryStorage>, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    (
      Resilience::new(config, storage.clone(), Arc::new(AlwaysOnline)),
      storage,
    )
  }

  #[tokio::test(start_paused = true)]
  async fn test_init_starts_sweeper_and_dispose_persists() {
    let (mut layer, storage) = layer(Config::default());
    let store = Arc::new(MemoryQueryStore::new());

    assert_eq!(layer.init(store.clone()), 0);
    assert!(layer.is_running());

    layer.cache_mut().set_cached_data(
      CacheKey::new(["customers"]),
      json!([{"id": "c-1"}]),
      SetOptions::default(),
    );
    layer.dispose().await;

    assert!(!layer.is_running());
    assert!(storage.get_item("react-query-cache").unwrap().is_some());
  }

  #[tokio::test(start_paused = true)]
  async fn test_snapshot_survives_new_layer() {
    let storage = Arc::new(MemoryStorage::new());
    {
      let mut first = Resilience::new(Config::default(), storage.clone(), Arc::new(AlwaysOnline));
      first.init(Arc::new(MemoryQueryStore::new()));
      first.cache_mut().set_cached_data(
        CacheKey::new(["dashboard"]),
        json!({"total": 12}),
        SetOptions::default(),
      );
      first.dispose().await;
    }

    let mut second = Resilience::new(Config::default(), storage, Arc::new(AlwaysOnline));
    let store = Arc::new(MemoryQueryStore::new());
    assert_eq!(second.init(store.clone()), 1);
    assert_eq!(store.len(), 1);
    second.dispose().await;
  }

  #[tokio::test(start_paused = true)]
  async fn test_ttl_sweep_uses_configured_interval() {
    let config = Config {
      ttl_cache: TtlCacheConfig {
        ttl_secs: 5,
        sweep_interval_secs: 10,
      },
      ..Default::default()
    };
    let (mut layer, _) = layer(config);
    layer.init(Arc::new(MemoryQueryStore::new()));

    layer.ttl_cache().set("c-1", 712.0);
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert!(layer.ttl_cache().is_empty());

    layer.dispose().await;
  }

  #[test]
  fn test_policy_follows_network_state() {
    let monitor = Arc::new(NetworkMonitor::new());
    let layer = Resilience::new(
      Config::default(),
      Arc::new(MemoryStorage::new()),
      monitor.clone(),
    );
    let error = RequestError::Network("connection refused".into());

    assert!(layer.policy().should_retry(0, &error));
    monitor.set_offline(true);
    assert!(!layer.policy().should_retry(0, &error));
  }

  #[test]
  fn test_history_capacity_from_config() {
    let mut config = Config::default();
    config.history.capacity = 7;
    let (layer, _) = layer(config);
    assert_eq!(layer.history().capacity(), 7);
  }

  // The only test that touches the storage path variable.
  #[tokio::test]
  async fn test_open_uses_configured_path_then_env_override() {
    use crate::config::STORAGE_PATH_ENV;

    let dir = tempfile::tempdir().unwrap();
    let configured = dir.path().join("nested").join("storage.db");
    let overridden = dir.path().join("override").join("storage.db");
    let mut config = Config::default();
    config.storage.path = Some(configured.clone());

    std::env::remove_var(STORAGE_PATH_ENV);
    let mut layer = Resilience::open(config.clone(), Arc::new(AlwaysOnline)).unwrap();
    layer.init(Arc::new(MemoryQueryStore::new()));
    layer.dispose().await;
    assert!(configured.exists());
    assert!(!overridden.exists());

    std::env::set_var(STORAGE_PATH_ENV, &overridden);
    let opened = Resilience::open(config, Arc::new(AlwaysOnline));
    std::env::remove_var(STORAGE_PATH_ENV);

    let mut layer = opened.unwrap();
    layer.init(Arc::new(MemoryQueryStore::new()));
    layer.dispose().await;
    assert!(overridden.exists());
  }
}
