//! Process-local tile backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use coverage_common::TileKey;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::StorageResult;
use crate::tile_store::{CatalogStore, TileStore};

/// Tiles and catalogs kept in hash maps.
#[derive(Default)]
pub struct MemoryTileStore {
    tiles: RwLock<HashMap<TileKey, Bytes>>,
    catalogs: RwLock<HashMap<String, Bytes>>,
    puts: AtomicU64,
    gets: AtomicU64,
}

impl MemoryTileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tiles.
    pub async fn len(&self) -> usize {
        self.tiles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tiles.read().await.is_empty()
    }

    /// Copy of every stored tile, for before/after comparisons.
    pub async fn snapshot(&self) -> HashMap<TileKey, Bytes> {
        self.tiles.read().await.clone()
    }

    /// Total `put` calls served.
    pub fn put_count(&self) -> u64 {
        self.puts.load(Ordering::Relaxed)
    }

    /// Total `get` calls served.
    pub fn get_count(&self) -> u64 {
        self.gets.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl TileStore for MemoryTileStore {
    async fn get(&self, key: &TileKey) -> StorageResult<Option<Bytes>> {
        self.gets.fetch_add(1, Ordering::Relaxed);
        Ok(self.tiles.read().await.get(key).cloned())
    }

    async fn put(&self, key: &TileKey, data: Bytes) -> StorageResult<()> {
        debug!(key = %key, size = data.len(), "Storing tile in memory");
        self.puts.fetch_add(1, Ordering::Relaxed);
        self.tiles.write().await.insert(key.clone(), data);
        Ok(())
    }

    async fn exists(&self, key: &TileKey) -> StorageResult<bool> {
        Ok(self.tiles.read().await.contains_key(key))
    }
}

#[async_trait]
impl CatalogStore for MemoryTileStore {
    async fn load_catalog(&self, dataset: &str) -> StorageResult<Option<Bytes>> {
        Ok(self.catalogs.read().await.get(dataset).cloned())
    }

    async fn save_catalog(&self, dataset: &str, data: Bytes) -> StorageResult<()> {
        self.catalogs
            .write()
            .await
            .insert(dataset.to_string(), data);
        Ok(())
    }
}
