//! Tile backend over any `object_store` implementation (MinIO/S3 compatible,
//! local filesystem, in-memory).

use std::path::Path as FsPath;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use coverage_common::TileKey;
use object_store::{
    aws::AmazonS3Builder, local::LocalFileSystem, memory::InMemory, path::Path, ObjectStore,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{StorageError, StorageResult};
use crate::tile_store::{catalog_path, CatalogStore, TileStore};

/// Configuration for an S3/MinIO connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStorageConfig {
    /// S3/MinIO endpoint URL
    pub endpoint: String,
    /// Bucket name
    pub bucket: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// AWS region (use "us-east-1" for MinIO)
    pub region: String,
    /// Allow HTTP (for local MinIO)
    pub allow_http: bool,
}

impl Default for ObjectStorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://minio:9000".to_string(),
            bucket: "pyramids".to_string(),
            access_key_id: "minioadmin".to_string(),
            secret_access_key: "minioadmin".to_string(),
            region: "us-east-1".to_string(),
            allow_http: true,
        }
    }
}

impl ObjectStorageConfig {
    /// Load configuration from environment variables, keeping defaults for
    /// anything unset.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("S3_ENDPOINT") {
            config.endpoint = val;
        }
        if let Ok(val) = std::env::var("S3_BUCKET") {
            config.bucket = val;
        }
        if let Ok(val) = std::env::var("S3_ACCESS_KEY") {
            config.access_key_id = val;
        }
        if let Ok(val) = std::env::var("S3_SECRET_KEY") {
            config.secret_access_key = val;
        }
        if let Ok(val) = std::env::var("S3_REGION") {
            config.region = val;
        }
        if let Ok(val) = std::env::var("S3_ALLOW_HTTP") {
            config.allow_http = val.to_lowercase() == "true" || val == "1";
        }

        config
    }
}

/// Tile backend storing one object per tile.
pub struct ObjectTileStore {
    store: Arc<dyn ObjectStore>,
    label: String,
}

impl ObjectTileStore {
    /// Wrap an existing object store. `label` only appears in logs.
    pub fn new(store: Arc<dyn ObjectStore>, label: impl Into<String>) -> Self {
        Self {
            store,
            label: label.into(),
        }
    }

    /// Volatile in-memory object store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()), "memory")
    }

    /// Objects stored as files under `root`, which is created if missing.
    pub fn local(root: impl AsRef<FsPath>) -> StorageResult<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root).map_err(|e| {
            StorageError::Unavailable(format!("Failed to create {}: {}", root.display(), e))
        })?;
        let store = LocalFileSystem::new_with_prefix(root).map_err(|e| {
            StorageError::Unavailable(format!("Failed to open {}: {}", root.display(), e))
        })?;
        Ok(Self::new(Arc::new(store), root.display().to_string()))
    }

    /// S3/MinIO bucket from config.
    pub fn s3(config: &ObjectStorageConfig) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_endpoint(&config.endpoint)
            .with_bucket_name(&config.bucket)
            .with_access_key_id(&config.access_key_id)
            .with_secret_access_key(&config.secret_access_key)
            .with_region(&config.region);

        if config.allow_http {
            builder = builder.with_allow_http(true);
        }

        let store = builder.build().map_err(|e| {
            StorageError::Unavailable(format!("Failed to create S3 client: {}", e))
        })?;

        Ok(Self::new(Arc::new(store), config.bucket.clone()))
    }

    async fn read(&self, path: &str) -> StorageResult<Option<Bytes>> {
        let location = Path::from(path);

        let result = match self.store.get(&location).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(e) => {
                return Err(StorageError::Read {
                    path: path.to_string(),
                    message: e.to_string(),
                })
            }
        };

        let bytes = result.bytes().await.map_err(|e| StorageError::Read {
            path: path.to_string(),
            message: e.to_string(),
        })?;

        debug!(size = bytes.len(), "Read object");
        Ok(Some(bytes))
    }

    async fn write(&self, path: &str, data: Bytes) -> StorageResult<()> {
        let location = Path::from(path);
        debug!(size = data.len(), "Writing object");

        self.store
            .put(&location, data.into())
            .await
            .map_err(|e| StorageError::Write {
                path: path.to_string(),
                message: e.to_string(),
            })?;

        Ok(())
    }
}

#[async_trait]
impl TileStore for ObjectTileStore {
    #[instrument(skip(self), fields(store = %self.label, path = %key.path()))]
    async fn get(&self, key: &TileKey) -> StorageResult<Option<Bytes>> {
        self.read(&key.path()).await
    }

    #[instrument(skip(self, data), fields(store = %self.label, path = %key.path()))]
    async fn put(&self, key: &TileKey, data: Bytes) -> StorageResult<()> {
        self.write(&key.path(), data).await
    }

    async fn exists(&self, key: &TileKey) -> StorageResult<bool> {
        let path = key.path();
        let location = Path::from(path.as_str());

        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::Read {
                path,
                message: e.to_string(),
            }),
        }
    }
}

#[async_trait]
impl CatalogStore for ObjectTileStore {
    #[instrument(skip(self), fields(store = %self.label))]
    async fn load_catalog(&self, dataset: &str) -> StorageResult<Option<Bytes>> {
        self.read(&catalog_path(dataset)).await
    }

    #[instrument(skip(self, data), fields(store = %self.label))]
    async fn save_catalog(&self, dataset: &str, data: Bytes) -> StorageResult<()> {
        self.write(&catalog_path(dataset), data).await
    }
}
