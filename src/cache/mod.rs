//! Caching for query results and derived values.
//!
//! This module provides:
//! - a mirror of the live query cache into durable storage, restored at startup
//! - per-key freshness metadata for "last updated" badges
//! - a short-lived TTL cache for one expensive derived number
//! - the durable storage backends (SQLite, in-memory)

mod key;
mod metadata;
mod persist;
mod storage;
mod store;
mod ttl;

pub use key::{CacheKey, KeySegment};
pub use metadata::{format_age, CacheMetadataRecord, CacheMetadataStore, MetadataUpdate};
pub use persist::{CacheResult, CacheSource, CacheStats, CachedQuery, QueryCacheManager, SetOptions};
pub use storage::{DurableStorage, MemoryStorage, SqliteStorage};
pub use store::{CacheEntry, MemoryQueryStore, QueryStore};
pub use ttl::{spawn_sweeper, SweepHandle, TtlCache, DEFAULT_SWEEP_INTERVAL, DEFAULT_TTL};
