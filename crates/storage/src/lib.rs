//! Tile backends for the pyramid store.
//!
//! Every backend exposes the same capability: [`TileStore`] for encoded
//! tiles keyed by (dataset, pyramid, mosaic, col, row) and [`CatalogStore`]
//! for the dataset's pyramid metadata. Provided implementations:
//! - [`MemoryTileStore`]: process-local maps, for tests and scratch datasets
//! - [`ObjectTileStore`]: any `object_store` backend (in-memory, local
//!   filesystem, S3/MinIO)
//! - [`CachedTileStore`]: write-through LRU layer over another backend

pub mod error;
pub mod memory;
pub mod object_store;
pub mod tile_memory_cache;
pub mod tile_store;

pub use self::object_store::{ObjectStorageConfig, ObjectTileStore};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryTileStore;
pub use tile_memory_cache::{CachedTileStore, TileCacheStats};
pub use tile_store::{CatalogStore, TileBackend, TileStore};
