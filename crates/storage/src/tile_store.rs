//! Backend capability traits.

use async_trait::async_trait;
use bytes::Bytes;
use coverage_common::TileKey;

use crate::error::StorageResult;

/// Persists and loads encoded tiles.
///
/// A missing tile is `Ok(None)`, never an error. Each call is atomic for the
/// one tile it touches; nothing spans several keys.
#[async_trait]
pub trait TileStore: Send + Sync {
    async fn get(&self, key: &TileKey) -> StorageResult<Option<Bytes>>;

    /// Create or overwrite a tile.
    async fn put(&self, key: &TileKey, data: Bytes) -> StorageResult<()>;

    async fn exists(&self, key: &TileKey) -> StorageResult<bool>;
}

/// Persists the serialized pyramid metadata of a dataset.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn load_catalog(&self, dataset: &str) -> StorageResult<Option<Bytes>>;

    async fn save_catalog(&self, dataset: &str, data: Bytes) -> StorageResult<()>;
}

/// A backend holding both tiles and catalogs.
pub trait TileBackend: TileStore + CatalogStore {}

impl<T: TileStore + CatalogStore> TileBackend for T {}

/// Storage path of a dataset catalog.
pub(crate) fn catalog_path(dataset: &str) -> String {
    format!("{}/catalog.json", dataset)
}
