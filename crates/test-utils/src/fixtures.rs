//! Common fixtures: bounding boxes and ready-to-use tile backends.

use std::sync::Arc;

use storage::{MemoryTileStore, ObjectTileStore};
use tempfile::TempDir;

/// Common bounding box definitions for testing, as (west, south, east, north).
pub mod bbox {
    /// Global bounding box (-180 to 180, -90 to 90)
    pub const GLOBAL: (f64, f64, f64, f64) = (-180.0, -90.0, 180.0, 90.0);

    /// Europe bounding box
    pub const EUROPE: (f64, f64, f64, f64) = (-15.0, 35.0, 45.0, 72.0);

    /// A 100 x 100 unit square at the origin
    pub const UNIT_100: (f64, f64, f64, f64) = (0.0, 0.0, 100.0, 100.0);
}

/// Fresh in-memory backend, shared so tests can inspect it after the
/// coverage took its own handle.
pub fn memory_backend() -> Arc<MemoryTileStore> {
    Arc::new(MemoryTileStore::new())
}

/// Backend over a temporary directory. Keep the `TempDir` alive for the
/// duration of the test.
pub fn local_backend() -> (TempDir, ObjectTileStore) {
    let dir = TempDir::new().expect("create temp dir");
    let store = ObjectTileStore::local(dir.path()).expect("local object store");
    (dir, store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_starts_empty() {
        let backend = memory_backend();
        assert!(backend.is_empty().await);
    }

    #[test]
    fn test_local_backend_uses_temp_dir() {
        let (dir, _store) = local_backend();
        assert!(dir.path().exists());
    }
}
