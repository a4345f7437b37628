//! A pyramidal dataset: metadata, backend, and the handles that read and
//! write it.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use coverage_common::{
    Crs, CoverageError, Envelope, Raster, Result, TileCoord, TileKey,
};
use projection::{OperationFactory, TransformProvider};
use storage::{CachedTileStore, TileBackend};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::builder::PyramidCoverageBuilder;
use crate::codec::TileCodec;
use crate::config::{PyramidBuildConfig, PyramidStoreConfig};
use crate::interpolation::Interpolator;
use crate::mosaic::{GridSize, TileFormat, TileSize};
use crate::pool::{Handle, HandlePool};
use crate::pyramid::{Pyramid, PyramidSet};
use crate::reader::CoverageReader;
use crate::resolution::ResolutionPolicy;
use crate::writer::CoverageWriter;

/// External collaborators of a coverage.
#[derive(Clone)]
pub struct Collaborators {
    pub transforms: Arc<dyn TransformProvider>,
    /// Overrides the configured interpolation method.
    pub interpolator: Option<Arc<dyn Interpolator>>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            transforms: Arc::new(OperationFactory::new()),
            interpolator: None,
        }
    }
}

/// State shared by a coverage and every handle it hands out.
pub(crate) struct CoverageInner {
    pub(crate) name: String,
    pub(crate) set: RwLock<PyramidSet>,
    pub(crate) backend: Arc<dyn TileBackend>,
    pub(crate) transforms: Arc<dyn TransformProvider>,
    pub(crate) interpolator: Arc<dyn Interpolator>,
    pub(crate) codec: TileCodec,
    pub(crate) policy: ResolutionPolicy,
    pub(crate) config: PyramidStoreConfig,
}

impl fmt::Debug for CoverageInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoverageInner")
            .field("name", &self.name)
            .field("interpolator", &self.interpolator.name())
            .field("config", &self.config)
            .finish()
    }
}

impl CoverageInner {
    pub(crate) fn tile_key(&self, pyramid_id: &str, mosaic_id: &str, coord: TileCoord) -> TileKey {
        TileKey::new(self.name.as_str(), pyramid_id, mosaic_id, coord)
    }

    pub(crate) async fn snapshot(&self) -> PyramidSet {
        self.set.read().await.clone()
    }

    pub(crate) async fn pyramid(&self, id: &str) -> Result<Pyramid> {
        self.set.read().await.pyramid(id).cloned()
    }

    /// Fetch and decode one tile. Absent tiles are `None`.
    pub(crate) async fn load_tile(&self, key: &TileKey) -> Result<Option<Raster>> {
        match self.backend.get(key).await? {
            Some(bytes) => Ok(Some(self.codec.decode(&bytes)?)),
            None => {
                debug!(key = %key, "Tile absent");
                Ok(None)
            }
        }
    }

    /// Encode and persist a tile unless `previous` already holds the same
    /// bytes. Returns true when the backend was written.
    pub(crate) async fn store_tile(
        &self,
        key: &TileKey,
        tile: &Raster,
        previous: Option<&Bytes>,
    ) -> Result<bool> {
        let encoded = self.codec.encode(tile)?;
        if previous == Some(&encoded) {
            debug!(key = %key, "Tile unchanged");
            return Ok(false);
        }
        debug!(key = %key, size = encoded.len(), "Persisting tile");
        self.backend.put(key, encoded).await?;
        Ok(true)
    }

    /// Persist `set`. Callers swap it in only after this succeeds.
    async fn save_catalog(&self, set: &PyramidSet) -> Result<()> {
        let json = set.to_json()?;
        self.backend
            .save_catalog(&self.name, Bytes::from(json))
            .await?;
        Ok(())
    }

    pub(crate) async fn create_pyramid(&self, crs: &Crs) -> Result<String> {
        let mut set = self.set.write().await;
        let mut next = set.clone();
        let (id, created) = next.create_pyramid(crs);
        if created {
            self.save_catalog(&next).await?;
            *set = next;
            info!(dataset = %self.name, pyramid = %id, crs = %crs, "Created pyramid");
        }
        Ok(id)
    }

    pub(crate) async fn create_mosaic(
        &self,
        pyramid_id: &str,
        grid_size: GridSize,
        tile_size: TileSize,
        upper_left: Vec<f64>,
        scale: f64,
    ) -> Result<String> {
        let mut set = self.set.write().await;
        let mut next = set.clone();
        let (id, created) =
            next.create_mosaic(pyramid_id, grid_size, tile_size, upper_left, scale)?;
        if created {
            self.save_catalog(&next).await?;
            *set = next;
            info!(
                dataset = %self.name,
                pyramid = %pyramid_id,
                mosaic = %id,
                cols = grid_size.cols,
                rows = grid_size.rows,
                tile_width = tile_size.width,
                tile_height = tile_size.height,
                scale = scale,
                "Created mosaic"
            );
        }
        Ok(id)
    }

    pub(crate) async fn declare_format(
        &self,
        pyramid_id: &str,
        mosaic_id: &str,
        format: TileFormat,
    ) -> Result<()> {
        let mut set = self.set.write().await;
        let mut next = set.clone();
        if next.declare_format(pyramid_id, mosaic_id, format)? {
            self.save_catalog(&next).await?;
            *set = next;
            info!(
                dataset = %self.name,
                pyramid = %pyramid_id,
                mosaic = %mosaic_id,
                sample_model = %format.sample_model,
                "Declared tile format"
            );
        }
        Ok(())
    }
}

/// A pyramidal raster dataset.
pub struct PyramidalCoverage {
    inner: Arc<CoverageInner>,
    readers: HandlePool<CoverageReader>,
    writers: HandlePool<CoverageWriter>,
}

impl PyramidalCoverage {
    /// Open dataset `name`, restoring its catalog when the backend has one.
    pub async fn open(
        name: impl Into<String>,
        backend: Arc<dyn TileBackend>,
        config: PyramidStoreConfig,
    ) -> Result<Self> {
        Self::open_with(name, backend, config, Collaborators::default()).await
    }

    /// Open over `backend` wrapped in a tile cache sized by the config.
    pub async fn open_cached<B: TileBackend + 'static>(
        name: impl Into<String>,
        backend: B,
        config: PyramidStoreConfig,
    ) -> Result<Self> {
        let backend: Arc<dyn TileBackend> = if config.tile_cache_size_mb > 0 {
            Arc::new(CachedTileStore::new(backend, config.tile_cache_size_mb))
        } else {
            Arc::new(backend)
        };
        Self::open(name, backend, config).await
    }

    #[instrument(skip(name, backend, config, collaborators), fields(dataset))]
    pub async fn open_with(
        name: impl Into<String>,
        backend: Arc<dyn TileBackend>,
        config: PyramidStoreConfig,
        collaborators: Collaborators,
    ) -> Result<Self> {
        let name = name.into();
        tracing::Span::current().record("dataset", name.as_str());
        config.validate().map_err(CoverageError::Configuration)?;

        let set = match backend.load_catalog(&name).await? {
            Some(bytes) => PyramidSet::from_json(&bytes)?,
            None => PyramidSet::new(),
        };
        info!(
            pyramids = set.pyramids.len(),
            mosaics = set.pyramids.iter().map(|p| p.mosaics.len()).sum::<usize>(),
            "Opened pyramidal coverage"
        );

        let interpolator = collaborators
            .interpolator
            .unwrap_or_else(|| config.interpolation.interpolator());

        let inner = CoverageInner {
            name,
            set: RwLock::new(set),
            backend,
            transforms: collaborators.transforms,
            interpolator,
            codec: TileCodec::new(config.compression),
            policy: ResolutionPolicy::new(config.resolution_tolerance),
            config: config.clone(),
        };

        Ok(Self {
            inner: Arc::new(inner),
            readers: HandlePool::new(config.max_pooled_handles),
            writers: HandlePool::new(config.max_pooled_handles),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &PyramidStoreConfig {
        &self.inner.config
    }

    /// Snapshot of the pyramid metadata.
    pub async fn pyramids(&self) -> PyramidSet {
        self.inner.snapshot().await
    }

    pub async fn pyramid(&self, id: &str) -> Result<Pyramid> {
        self.inner.pyramid(id).await
    }

    /// Envelope of the dataset in the CRS of its first pyramid.
    pub async fn envelope(&self) -> Option<Envelope> {
        self.inner.set.read().await.envelope()
    }

    /// Id of the pyramid for `crs`, created when no pyramid has an equal CRS.
    pub async fn create_pyramid(&self, crs: &Crs) -> Result<String> {
        self.inner.create_pyramid(crs).await
    }

    /// Add a resolution level. Creating a level with the geometry of an
    /// existing one returns the existing id.
    pub async fn create_mosaic(
        &self,
        pyramid_id: &str,
        grid_size: GridSize,
        tile_size: TileSize,
        upper_left: Vec<f64>,
        scale: f64,
    ) -> Result<String> {
        self.inner
            .create_mosaic(pyramid_id, grid_size, tile_size, upper_left, scale)
            .await
    }

    /// Fix the pixel layout of a mosaic before any tile is written.
    pub async fn declare_format(
        &self,
        pyramid_id: &str,
        mosaic_id: &str,
        format: TileFormat,
    ) -> Result<()> {
        self.inner
            .declare_format(pyramid_id, mosaic_id, format)
            .await
    }

    /// Store a whole tile as is.
    #[instrument(skip(self, tile), fields(dataset = %self.inner.name, tile = %coord))]
    pub async fn write_tile(
        &self,
        pyramid_id: &str,
        mosaic_id: &str,
        coord: TileCoord,
        tile: &Raster,
    ) -> Result<()> {
        let pyramid = self.inner.pyramid(pyramid_id).await?;
        let mosaic = pyramid.mosaic(mosaic_id)?;

        if coord.col >= mosaic.grid_size.cols || coord.row >= mosaic.grid_size.rows {
            return Err(CoverageError::InvalidParameter(format!(
                "tile {} outside {}x{} grid of {}",
                coord, mosaic.grid_size.cols, mosaic.grid_size.rows, mosaic_id
            )));
        }
        if tile.width() != mosaic.tile_size.width as usize
            || tile.height() != mosaic.tile_size.height as usize
        {
            return Err(CoverageError::InvalidParameter(format!(
                "tile is {}x{}, mosaic {} uses {}x{}",
                tile.width(),
                tile.height(),
                mosaic_id,
                mosaic.tile_size.width,
                mosaic.tile_size.height
            )));
        }

        self.inner
            .declare_format(
                pyramid_id,
                mosaic_id,
                TileFormat::new(tile.sample_model(), tile.color_model()),
            )
            .await?;

        let key = self.inner.tile_key(pyramid_id, mosaic_id, coord);
        let previous = self.inner.backend.get(&key).await?;
        self.inner.store_tile(&key, tile, previous.as_ref()).await?;
        Ok(())
    }

    /// Decoded tile, `None` when never written.
    pub async fn read_tile(
        &self,
        pyramid_id: &str,
        mosaic_id: &str,
        coord: TileCoord,
    ) -> Result<Option<Raster>> {
        let pyramid = self.inner.pyramid(pyramid_id).await?;
        pyramid.mosaic(mosaic_id)?;
        let key = self.inner.tile_key(pyramid_id, mosaic_id, coord);
        self.inner.load_tile(&key).await
    }

    /// A reader for this coverage, reused from the pool when one is idle.
    pub fn acquire_reader(&self) -> CoverageReader {
        self.readers
            .take()
            .unwrap_or_else(|| CoverageReader::new(self.inner.clone()))
    }

    /// A writer for this coverage, reused from the pool when one is idle.
    pub fn acquire_writer(&self) -> CoverageWriter {
        self.writers
            .take()
            .unwrap_or_else(|| CoverageWriter::new(self.inner.clone()))
    }

    /// Return a handle for reuse. Handles of other coverages are dropped.
    pub fn recycle(&self, handle: impl Into<Handle>) {
        match handle.into() {
            Handle::Reader(mut reader) if reader.belongs_to(&self.inner) => {
                reader.reset();
                self.readers.give_back(reader);
            }
            Handle::Writer(mut writer) if writer.belongs_to(&self.inner) => {
                writer.reset();
                self.writers.give_back(writer);
            }
            _ => debug!(dataset = %self.inner.name, "Dropping foreign handle"),
        }
    }

    /// Idle (readers, writers) in the pools.
    pub fn pooled_handles(&self) -> (usize, usize) {
        (self.readers.idle(), self.writers.idle())
    }

    /// Builder producing one mosaic per scale.
    pub fn builder(&self, config: PyramidBuildConfig) -> Result<PyramidCoverageBuilder> {
        config.validate().map_err(CoverageError::Configuration)?;
        Ok(PyramidCoverageBuilder::new(self.inner.clone(), config))
    }
}

impl fmt::Debug for PyramidalCoverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PyramidalCoverage")
            .field("inner", &self.inner)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coverage_common::{ColorModel, SampleModel, SampleType};
    use storage::{CatalogStore, MemoryTileStore};

    fn open(config: PyramidStoreConfig) -> PyramidalCoverage {
        tokio_test::block_on(PyramidalCoverage::open_cached(
            "unit",
            MemoryTileStore::new(),
            config,
        ))
        .unwrap()
    }

    #[test]
    fn test_open_without_cache() {
        let coverage = open(PyramidStoreConfig {
            tile_cache_size_mb: 0,
            ..Default::default()
        });
        assert_eq!(coverage.name(), "unit");
        assert!(tokio_test::block_on(coverage.pyramids()).is_empty());
        assert!(tokio_test::block_on(coverage.envelope()).is_none());
    }

    #[test]
    fn test_pool_capacity_follows_config() {
        let coverage = open(PyramidStoreConfig {
            max_pooled_handles: 1,
            ..Default::default()
        });
        let first = coverage.acquire_reader();
        let second = coverage.acquire_reader();
        coverage.recycle(first);
        coverage.recycle(second);
        assert_eq!(coverage.pooled_handles(), (1, 0));
    }

    #[test]
    fn test_declared_format_is_persisted() {
        let backend = Arc::new(MemoryTileStore::new());
        let coverage = tokio_test::block_on(PyramidalCoverage::open(
            "unit",
            backend.clone(),
            PyramidStoreConfig::default(),
        ))
        .unwrap();

        tokio_test::block_on(async {
            let p = coverage.create_pyramid(&Crs::crs_84()).await.unwrap();
            let m = coverage
                .create_mosaic(&p, GridSize::new(1, 1), TileSize::square(4), vec![0.0, 4.0], 1.0)
                .await
                .unwrap();
            let format = TileFormat::new(SampleModel::new(SampleType::F32, 1), ColorModel::Data);
            coverage.declare_format(&p, &m, format).await.unwrap();

            let catalog = backend.load_catalog("unit").await.unwrap().unwrap();
            let restored = PyramidSet::from_json(&catalog).unwrap();
            let mosaic = restored.pyramid(&p).unwrap().mosaic(&m).unwrap().clone();
            assert_eq!(mosaic.format, Some(format));
        });
    }
}
