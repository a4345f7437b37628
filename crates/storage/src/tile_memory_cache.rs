//! Write-through LRU layer over another tile backend.
//!
//! Reads are served from memory when possible; writes go to the inner
//! backend first and only then replace the cached copy, so the cache never
//! holds bytes the backend refused.
//!
//! ## Memory-Based Eviction
//!
//! The cache is bounded by encoded tile bytes rather than entry count. When
//! an insert would exceed the limit, ~5% of the limit is freed in one batch,
//! oldest entries first.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use coverage_common::TileKey;
use lru::LruCache;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::StorageResult;
use crate::tile_store::{CatalogStore, TileStore};

/// Entry limit handed to `LruCache`; eviction is driven by bytes instead.
const LRU_CAPACITY: usize = 1_000_000;

/// Counters for the tile cache.
#[derive(Debug, Default)]
pub struct TileCacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    /// Entries removed by batch eviction
    pub evictions: AtomicU64,
    pub eviction_runs: AtomicU64,
    /// Current cached bytes
    pub size_bytes: AtomicU64,
    pub entry_count: AtomicU64,
}

impl TileCacheStats {
    /// Hit rate as a percentage (0-100).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            (hits as f64 / total as f64) * 100.0
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes.load(Ordering::Relaxed)
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count.load(Ordering::Relaxed)
    }

    pub fn eviction_runs(&self) -> u64 {
        self.eviction_runs.load(Ordering::Relaxed)
    }
}

/// Caching wrapper around a tile backend `S`.
pub struct CachedTileStore<S> {
    inner: S,
    cache: Mutex<LruCache<TileKey, Bytes>>,
    max_bytes: u64,
    /// Bumped under the cache lock by every put. A fill started before a
    /// put may hold older bytes and is dropped.
    generation: AtomicU64,
    stats: TileCacheStats,
}

impl<S: TileStore> CachedTileStore<S> {
    /// Wrap `inner` with a cache holding at most `max_size_mb` megabytes.
    pub fn new(inner: S, max_size_mb: usize) -> Self {
        let capacity = NonZeroUsize::new(LRU_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
            max_bytes: (max_size_mb as u64) * 1024 * 1024,
            generation: AtomicU64::new(0),
            stats: TileCacheStats::default(),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn stats(&self) -> &TileCacheStats {
        &self.stats
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Drop every cached tile. The inner backend is untouched.
    pub async fn clear(&self) {
        let mut cache = self.cache.lock().await;
        cache.clear();
        self.stats.size_bytes.store(0, Ordering::Relaxed);
        self.stats.entry_count.store(0, Ordering::Relaxed);
    }

    /// Cache `data` after a put. The previous entry is always dropped, even
    /// when `data` itself is too large to keep.
    async fn remember(&self, key: &TileKey, data: Bytes) {
        let mut cache = self.cache.lock().await;
        self.generation.fetch_add(1, Ordering::Relaxed);
        self.forget_locked(&mut cache, key);
        self.insert_locked(&mut cache, key, data);
    }

    /// Cache bytes read from the inner backend, unless a put landed since
    /// `generation` was taken.
    async fn fill(&self, key: &TileKey, data: Bytes, generation: u64) {
        let mut cache = self.cache.lock().await;
        if self.generation.load(Ordering::Relaxed) != generation || cache.contains(key) {
            debug!(key = %key, "Tile cache fill superseded by a put");
            return;
        }
        self.insert_locked(&mut cache, key, data);
    }

    fn forget_locked(&self, cache: &mut LruCache<TileKey, Bytes>, key: &TileKey) {
        if let Some(old) = cache.pop(key) {
            self.stats
                .size_bytes
                .fetch_sub(old.len() as u64, Ordering::Relaxed);
            self.stats.entry_count.fetch_sub(1, Ordering::Relaxed);
        }
    }

    fn insert_locked(&self, cache: &mut LruCache<TileKey, Bytes>, key: &TileKey, data: Bytes) {
        let size = data.len() as u64;
        if size > self.max_bytes {
            return;
        }

        if self.stats.size_bytes.load(Ordering::Relaxed) + size > self.max_bytes {
            self.evict_batch_locked(cache, size);
        }

        cache.put(key.clone(), data);
        self.stats.size_bytes.fetch_add(size, Ordering::Relaxed);
        self.stats.entry_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Free ~5% of the limit (at least `needed` bytes) in LRU order.
    fn evict_batch_locked(&self, cache: &mut LruCache<TileKey, Bytes>, needed: u64) {
        let target_free = (self.max_bytes / 20).max(needed);
        let mut bytes_freed = 0u64;
        let mut entries_evicted = 0u64;

        while bytes_freed < target_free {
            match cache.pop_lru() {
                Some((_, evicted)) => {
                    bytes_freed += evicted.len() as u64;
                    entries_evicted += 1;
                }
                None => break,
            }
        }

        self.stats
            .size_bytes
            .fetch_sub(bytes_freed, Ordering::Relaxed);
        self.stats
            .entry_count
            .fetch_sub(entries_evicted, Ordering::Relaxed);
        self.stats
            .evictions
            .fetch_add(entries_evicted, Ordering::Relaxed);
        self.stats.eviction_runs.fetch_add(1, Ordering::Relaxed);

        info!(
            entries_evicted = entries_evicted,
            bytes_freed_mb = format!("{:.2}", bytes_freed as f64 / (1024.0 * 1024.0)),
            max_size_mb = format!("{:.2}", self.max_bytes as f64 / (1024.0 * 1024.0)),
            "Tile cache batch eviction completed"
        );
    }
}

#[async_trait]
impl<S: TileStore> TileStore for CachedTileStore<S> {
    async fn get(&self, key: &TileKey) -> StorageResult<Option<Bytes>> {
        let generation = {
            let mut cache = self.cache.lock().await;
            if let Some(data) = cache.get(key).cloned() {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(data));
            }
            self.generation.load(Ordering::Relaxed)
        };
        self.stats.misses.fetch_add(1, Ordering::Relaxed);

        let loaded = self.inner.get(key).await?;
        if let Some(data) = &loaded {
            debug!(key = %key, "Tile cache fill");
            self.fill(key, data.clone(), generation).await;
        }
        Ok(loaded)
    }

    async fn put(&self, key: &TileKey, data: Bytes) -> StorageResult<()> {
        self.inner.put(key, data.clone()).await?;
        self.remember(key, data).await;
        Ok(())
    }

    async fn exists(&self, key: &TileKey) -> StorageResult<bool> {
        if self.cache.lock().await.contains(key) {
            return Ok(true);
        }
        self.inner.exists(key).await
    }
}

#[async_trait]
impl<S: TileStore + CatalogStore> CatalogStore for CachedTileStore<S> {
    async fn load_catalog(&self, dataset: &str) -> StorageResult<Option<Bytes>> {
        self.inner.load_catalog(dataset).await
    }

    async fn save_catalog(&self, dataset: &str, data: Bytes) -> StorageResult<()> {
        self.inner.save_catalog(dataset, data).await
    }
}
