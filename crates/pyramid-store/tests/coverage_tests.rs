//! Coverage lifecycle: catalogs, backends, handles, builders, reprojection
//! and error reporting.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use coverage_common::{Crs, CoverageError, Envelope, TileCoord, TileKey};
use pyramid_store::{
    GridCoverage, GridSize, InterpolationMethod, PyramidBuildConfig, PyramidStoreConfig,
    PyramidalCoverage, ReadParam, TileSize, WriteParam,
};
use storage::{
    CachedTileStore, CatalogStore, MemoryTileStore, StorageError, StorageResult, TileBackend,
    TileStore,
};
use test_utils::{
    assert_approx_eq, assert_region_eq, gradient_u8, local_backend, memory_backend, solid_rgba, xy_transform, BLUE,
    RED,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn open(backend: Arc<dyn TileBackend>) -> PyramidalCoverage {
    init_tracing();
    PyramidalCoverage::open("dataset", backend, PyramidStoreConfig::default())
        .await
        .unwrap()
}

/// Pyramid in the engineering CRS with one 2 x 2 mosaic of 10 x 10 tiles.
async fn single_mosaic(coverage: &PyramidalCoverage) -> (String, String) {
    let p = coverage.create_pyramid(&Crs::engineering()).await.unwrap();
    let m = coverage
        .create_mosaic(&p, GridSize::new(2, 2), TileSize::square(10), vec![0.0, 20.0], 1.0)
        .await
        .unwrap();
    (p, m)
}

#[tokio::test]
async fn test_catalog_survives_reopen() {
    let backend = memory_backend();
    let coverage = open(backend.clone()).await;
    let (p, m) = single_mosaic(&coverage).await;
    coverage
        .write_tile(&p, &m, TileCoord::new(1, 1), &solid_rgba(10, 10, RED))
        .await
        .unwrap();

    let reopened = open(backend.clone()).await;
    assert_eq!(reopened.pyramids().await, coverage.pyramids().await);
    let tile = reopened
        .read_tile(&p, &m, TileCoord::new(1, 1))
        .await
        .unwrap()
        .unwrap();
    assert_region_eq!(tile, (0, 0, 10, 10), &RED);
}

#[tokio::test]
async fn test_local_backend_roundtrip() {
    let (_dir, store) = local_backend();
    let coverage = PyramidalCoverage::open_cached("local", store, PyramidStoreConfig::default())
        .await
        .unwrap();
    let (p, m) = single_mosaic(&coverage).await;

    let source = GridCoverage::new(gradient_u8(20, 20), xy_transform(0.0, 20.0, 1.0), Crs::engineering());
    coverage
        .acquire_writer()
        .write(&source, &p, &WriteParam::new())
        .await
        .unwrap();

    let result = coverage
        .acquire_reader()
        .read(0, &ReadParam::new())
        .await
        .unwrap()
        .into_coverage()
        .unwrap();
    assert_eq!(result.mosaic_id, m);
    assert_eq!(result.coverage.raster.data(), source.raster.data());
}

#[tokio::test]
async fn test_cached_backend_serves_repeat_reads() {
    let cached = Arc::new(CachedTileStore::new(MemoryTileStore::new(), 4));
    let coverage = open(cached.clone()).await;
    let (p, m) = single_mosaic(&coverage).await;
    coverage
        .write_tile(&p, &m, TileCoord::new(0, 0), &solid_rgba(10, 10, BLUE))
        .await
        .unwrap();

    let mut reader = coverage.acquire_reader();
    reader.read(0, &ReadParam::new()).await.unwrap();
    let hits = cached.stats().hits();
    reader.read(0, &ReadParam::new()).await.unwrap();
    assert!(cached.stats().hits() > hits);
    assert_eq!(reader.reads(), 2);
}

#[tokio::test]
async fn test_missing_tiles_read_as_fill() {
    let backend = memory_backend();
    let config = PyramidStoreConfig {
        fill_value: 7.0,
        ..Default::default()
    };
    let coverage = PyramidalCoverage::open("dataset", backend, config).await.unwrap();
    let (p, m) = single_mosaic(&coverage).await;
    coverage
        .write_tile(&p, &m, TileCoord::new(0, 0), &solid_rgba(10, 10, RED))
        .await
        .unwrap();

    let result = coverage
        .acquire_reader()
        .read(0, &ReadParam::new())
        .await
        .unwrap()
        .into_coverage()
        .unwrap();
    assert_eq!(result.missing_tiles, 3);
    assert_region_eq!(result.coverage.raster, (0, 0, 10, 10), &RED);
    assert_region_eq!(result.coverage.raster, (10, 10, 10, 10), &[7, 7, 7, 7]);
}

#[tokio::test]
async fn test_read_outside_data_is_empty() {
    let backend = memory_backend();
    let coverage = open(backend).await;
    let mut reader = coverage.acquire_reader();

    // No pyramid at all.
    assert!(reader.read(0, &ReadParam::new()).await.unwrap().is_empty());

    let (p, m) = single_mosaic(&coverage).await;
    // Mosaic never written.
    assert!(reader.read(0, &ReadParam::new()).await.unwrap().is_empty());

    coverage
        .write_tile(&p, &m, TileCoord::new(0, 0), &solid_rgba(10, 10, RED))
        .await
        .unwrap();
    let far = Envelope::new(Crs::engineering(), vec![100.0, 100.0], vec![200.0, 200.0]).unwrap();
    let result = reader
        .read(0, &ReadParam::new().with_envelope(far))
        .await
        .unwrap();
    assert!(result.is_empty());
}

#[tokio::test]
async fn test_builder_creates_levels() {
    let backend = memory_backend();
    let coverage = open(backend).await;
    let source = GridCoverage::new(gradient_u8(40, 40), xy_transform(0.0, 40.0, 1.0), Crs::engineering());

    let builder = coverage
        .builder(PyramidBuildConfig::default().with_tile_size(10, 10))
        .unwrap();
    let report = builder.build(&source, None).await.unwrap();

    assert_eq!(report.scales, vec![1.0, 2.0, 4.0]);
    assert_eq!(report.mosaic_ids.len(), 3);
    assert_eq!(report.write.tiles_written, 16 + 4 + 1);

    let pyramid = coverage.pyramid(&report.pyramid_id).await.unwrap();
    let grids: Vec<_> = pyramid.mosaics.iter().map(|m| m.grid_size).collect();
    assert_eq!(grids, vec![GridSize::new(4, 4), GridSize::new(2, 2), GridSize::new(1, 1)]);

    let mut reader = coverage.acquire_reader();
    let full = reader
        .read(0, &ReadParam::new().with_resolution(1.0))
        .await
        .unwrap()
        .into_coverage()
        .unwrap();
    assert_eq!(full.coverage.raster.data(), source.raster.data());

    let coarse = reader
        .read(0, &ReadParam::new().with_resolution(4.0))
        .await
        .unwrap()
        .into_coverage()
        .unwrap();
    assert_eq!(coarse.coverage.raster.width(), 10);
    // Pixel (1, 2) samples source pixel (6, 10).
    assert_eq!(coarse.coverage.raster.pixel(1, 2), &[16]);

    // Building again reuses every mosaic and rewrites nothing.
    let again = builder.build(&source, None).await.unwrap();
    assert_eq!(again.mosaic_ids, report.mosaic_ids);
    assert_eq!(again.write.tiles_written, 0);
    assert_eq!(again.write.tiles_unchanged, 21);
}

#[tokio::test]
async fn test_builds_at_same_scale_keep_separate_extents() {
    let backend = memory_backend();
    let coverage = open(backend).await;
    let builder = coverage
        .builder(
            PyramidBuildConfig::default()
                .with_tile_size(10, 10)
                .with_scales(vec![1.0]),
        )
        .unwrap();

    let west = GridCoverage::new(gradient_u8(40, 40), xy_transform(0.0, 40.0, 1.0), Crs::engineering());
    let east = GridCoverage::new(solid_rgba(40, 40, BLUE), xy_transform(100.0, 40.0, 1.0), Crs::engineering());
    let first = builder.build(&west, None).await.unwrap();
    let second = builder.build(&east, None).await.unwrap();

    assert_eq!(first.pyramid_id, second.pyramid_id);
    assert_ne!(first.mosaic_ids, second.mosaic_ids);
    assert_eq!(second.write.mosaics, second.mosaic_ids);
    assert_eq!(second.write.tiles_written, 16);

    let mut reader = coverage.acquire_reader();
    let east_area = Envelope::new(Crs::engineering(), vec![100.0, 0.0], vec![140.0, 40.0]).unwrap();
    let read = reader
        .read(0, &ReadParam::new().with_envelope(east_area))
        .await
        .unwrap()
        .into_coverage()
        .unwrap();
    assert_eq!(read.mosaic_id, second.mosaic_ids[0]);
    assert_eq!(read.missing_tiles, 0);
    assert_region_eq!(read.coverage.raster, (0, 0, 40, 40), &BLUE);

    let west_area = Envelope::new(Crs::engineering(), vec![0.0, 0.0], vec![40.0, 40.0]).unwrap();
    let read = reader
        .read(0, &ReadParam::new().with_envelope(west_area).with_resolution(1.0))
        .await
        .unwrap()
        .into_coverage()
        .unwrap();
    assert_eq!(read.mosaic_id, first.mosaic_ids[0]);
    assert_eq!(read.coverage.raster.data(), west.raster.data());
}

#[tokio::test]
async fn test_builder_reprojects_to_mercator() {
    let backend = memory_backend();
    let coverage = open(backend).await;
    let source = GridCoverage::new(solid_rgba(20, 20, RED), xy_transform(-10.0, 10.0, 1.0), Crs::crs_84());

    let report = coverage
        .builder(PyramidBuildConfig::default().with_tile_size(16, 16))
        .unwrap()
        .build(&source, Some(&Crs::web_mercator()))
        .await
        .unwrap();
    assert!(report.write.tiles_written > 0);
    assert_eq!(report.scales.len(), 2);
    assert_approx_eq!(report.scales[1], report.scales[0] * 2.0, 1e-6);

    let pyramid = coverage.pyramid(&report.pyramid_id).await.unwrap();
    assert!(pyramid.crs.equals_ignore_metadata(&Crs::web_mercator()));

    // Request in geographic coordinates, served from the Mercator pyramid.
    let request = Envelope::new(Crs::crs_84(), vec![-5.0, -5.0], vec![5.0, 5.0]).unwrap();
    let result = coverage
        .acquire_reader()
        .read(0, &ReadParam::new().with_envelope(request))
        .await
        .unwrap()
        .into_coverage()
        .unwrap();
    assert_eq!(result.pyramid_id, report.pyramid_id);

    let to_pixel = result.coverage.grid_to_crs.inverse().unwrap();
    let (px, py) = to_pixel.transform(0.0, 0.0);
    assert_eq!(result.coverage.raster.pixel(px as usize, py as usize), &RED);
}

#[tokio::test]
async fn test_interpolation_is_configurable() {
    let backend = memory_backend();
    let config = PyramidStoreConfig {
        interpolation: InterpolationMethod::Bilinear,
        ..Default::default()
    };
    let coverage = PyramidalCoverage::open("dataset", backend, config).await.unwrap();
    let p = coverage.create_pyramid(&Crs::engineering()).await.unwrap();
    let m = coverage
        .create_mosaic(&p, GridSize::new(1, 1), TileSize::square(2), vec![0.0, 2.0], 1.0)
        .await
        .unwrap();

    // Constant source: every method must reproduce it.
    let source = GridCoverage::new(solid_rgba(4, 4, BLUE), xy_transform(0.0, 2.0, 0.5), Crs::engineering());
    coverage
        .acquire_writer()
        .write(&source, &p, &WriteParam::new())
        .await
        .unwrap();
    let tile = coverage.read_tile(&p, &m, TileCoord::new(0, 0)).await.unwrap().unwrap();
    assert_region_eq!(tile, (0, 0, 2, 2), &BLUE);
}

#[tokio::test]
async fn test_handles_are_pooled() {
    let coverage = open(memory_backend()).await;
    let other = open(memory_backend()).await;

    let reader = coverage.acquire_reader();
    let writer = coverage.acquire_writer();
    coverage.recycle(reader);
    coverage.recycle(writer);
    assert_eq!(coverage.pooled_handles(), (1, 1));

    let _reader = coverage.acquire_reader();
    assert_eq!(coverage.pooled_handles(), (0, 1));

    // Handles of another coverage are not adopted.
    coverage.recycle(other.acquire_reader());
    assert_eq!(coverage.pooled_handles(), (0, 1));
}

#[tokio::test]
async fn test_concurrent_creation_is_idempotent() {
    let coverage = open(memory_backend()).await;
    let crs = Crs::engineering();
    let (a, b) = tokio::join!(coverage.create_pyramid(&crs), coverage.create_pyramid(&crs));
    assert_eq!(a.unwrap(), b.unwrap());

    let p = coverage.pyramids().await.pyramids[0].id.clone();
    let (a, b) = tokio::join!(
        coverage.create_mosaic(&p, GridSize::new(1, 1), TileSize::square(8), vec![0.0, 8.0], 1.0),
        coverage.create_mosaic(&p, GridSize::new(1, 1), TileSize::square(8), vec![0.0, 8.0], 1.0)
    );
    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(coverage.pyramids().await.pyramids[0].mosaics.len(), 1);
}

#[tokio::test]
async fn test_error_taxonomy() {
    let backend = memory_backend();
    let coverage = open(backend).await;
    let (p, m) = single_mosaic(&coverage).await;
    let red = solid_rgba(10, 10, RED);

    assert!(matches!(
        coverage.write_tile("missing", &m, TileCoord::new(0, 0), &red).await,
        Err(CoverageError::NoSuchPyramid(_))
    ));
    assert!(matches!(
        coverage.write_tile(&p, "missing", TileCoord::new(0, 0), &red).await,
        Err(CoverageError::NoSuchMosaic(_))
    ));
    assert!(matches!(
        coverage.write_tile(&p, &m, TileCoord::new(2, 0), &red).await,
        Err(CoverageError::InvalidParameter(_))
    ));
    assert!(matches!(
        coverage.write_tile(&p, &m, TileCoord::new(0, 0), &solid_rgba(5, 5, RED)).await,
        Err(CoverageError::InvalidParameter(_))
    ));
    assert!(matches!(
        coverage
            .create_mosaic(&p, GridSize::new(1, 1), TileSize::square(10), vec![0.0, 0.0], 0.0)
            .await,
        Err(CoverageError::Configuration(_))
    ));

    coverage.write_tile(&p, &m, TileCoord::new(0, 0), &red).await.unwrap();
    let gray = GridCoverage::new(gradient_u8(10, 10), xy_transform(0.0, 20.0, 1.0), Crs::engineering());
    let mut writer = coverage.acquire_writer();
    assert!(matches!(
        writer.write(&gray, &p, &WriteParam::new()).await,
        Err(CoverageError::IncompatibleSampleModel { .. })
    ));
    let tile = coverage.read_tile(&p, &m, TileCoord::new(0, 0)).await.unwrap().unwrap();
    assert_eq!(tile, red);

    let rgba = GridCoverage::new(solid_rgba(10, 10, BLUE), xy_transform(0.0, 20.0, 1.0), Crs::engineering());
    assert!(matches!(
        writer.write(&rgba, &p, &WriteParam::new().with_resolution(3.0)).await,
        Err(CoverageError::NoSuchMosaic(_))
    ));

    let mercator = Envelope::new(Crs::web_mercator(), vec![0.0, 0.0], vec![1.0, 1.0]).unwrap();
    let mut reader = coverage.acquire_reader();
    assert!(matches!(
        reader.read(0, &ReadParam::new().with_envelope(mercator)).await,
        Err(CoverageError::UnsupportedCrs(_))
    ));
    assert!(matches!(
        reader.read(1, &ReadParam::new()).await,
        Err(CoverageError::InvalidParameter(_))
    ));
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let config = PyramidStoreConfig {
        resolution_tolerance: 0.5,
        ..Default::default()
    };
    let result = PyramidalCoverage::open("dataset", memory_backend(), config).await;
    assert!(matches!(result, Err(CoverageError::Configuration(_))));

    let coverage = open(memory_backend()).await;
    let bad = PyramidBuildConfig {
        downscale_factor: 1,
        ..Default::default()
    };
    assert!(matches!(coverage.builder(bad), Err(CoverageError::Configuration(_))));
}

/// Backend whose tile operations always fail.
struct UnavailableStore;

#[async_trait]
impl TileStore for UnavailableStore {
    async fn get(&self, _key: &TileKey) -> StorageResult<Option<Bytes>> {
        Err(StorageError::Unavailable("offline".to_string()))
    }

    async fn put(&self, _key: &TileKey, _data: Bytes) -> StorageResult<()> {
        Err(StorageError::Unavailable("offline".to_string()))
    }

    async fn exists(&self, _key: &TileKey) -> StorageResult<bool> {
        Err(StorageError::Unavailable("offline".to_string()))
    }
}

#[async_trait]
impl CatalogStore for UnavailableStore {
    async fn load_catalog(&self, _dataset: &str) -> StorageResult<Option<Bytes>> {
        Ok(None)
    }

    async fn save_catalog(&self, _dataset: &str, _data: Bytes) -> StorageResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_backend_failures_surface_as_io() {
    let coverage = open(Arc::new(UnavailableStore)).await;
    let (p, m) = single_mosaic(&coverage).await;

    assert!(matches!(
        coverage.write_tile(&p, &m, TileCoord::new(0, 0), &solid_rgba(10, 10, RED)).await,
        Err(CoverageError::Io(_))
    ));
    assert!(matches!(
        coverage.read_tile(&p, &m, TileCoord::new(0, 0)).await,
        Err(CoverageError::Io(_))
    ));
}

/// Memory backend whose next catalog save fails.
struct FlakyCatalog {
    inner: MemoryTileStore,
    fail_next_save: AtomicBool,
}

#[async_trait]
impl TileStore for FlakyCatalog {
    async fn get(&self, key: &TileKey) -> StorageResult<Option<Bytes>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &TileKey, data: Bytes) -> StorageResult<()> {
        self.inner.put(key, data).await
    }

    async fn exists(&self, key: &TileKey) -> StorageResult<bool> {
        self.inner.exists(key).await
    }
}

#[async_trait]
impl CatalogStore for FlakyCatalog {
    async fn load_catalog(&self, dataset: &str) -> StorageResult<Option<Bytes>> {
        self.inner.load_catalog(dataset).await
    }

    async fn save_catalog(&self, dataset: &str, data: Bytes) -> StorageResult<()> {
        if self.fail_next_save.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Unavailable("catalog offline".to_string()));
        }
        self.inner.save_catalog(dataset, data).await
    }
}

#[tokio::test]
async fn test_failed_catalog_save_leaves_metadata_unchanged() {
    let backend = Arc::new(FlakyCatalog {
        inner: MemoryTileStore::new(),
        fail_next_save: AtomicBool::new(true),
    });
    let coverage = open(backend.clone()).await;

    assert!(matches!(
        coverage.create_pyramid(&Crs::engineering()).await,
        Err(CoverageError::Io(_))
    ));
    assert!(coverage.pyramids().await.is_empty());

    let p = coverage.create_pyramid(&Crs::engineering()).await.unwrap();
    backend.fail_next_save.store(true, Ordering::SeqCst);
    assert!(coverage
        .create_mosaic(&p, GridSize::new(1, 1), TileSize::square(10), vec![0.0, 10.0], 1.0)
        .await
        .is_err());
    assert!(coverage.pyramid(&p).await.unwrap().mosaics.is_empty());

    let m = coverage
        .create_mosaic(&p, GridSize::new(1, 1), TileSize::square(10), vec![0.0, 10.0], 1.0)
        .await
        .unwrap();
    backend.fail_next_save.store(true, Ordering::SeqCst);
    assert!(coverage
        .write_tile(&p, &m, TileCoord::new(0, 0), &solid_rgba(10, 10, RED))
        .await
        .is_err());
    assert!(coverage.pyramid(&p).await.unwrap().mosaic(&m).unwrap().format.is_none());

    coverage
        .write_tile(&p, &m, TileCoord::new(0, 0), &solid_rgba(10, 10, RED))
        .await
        .unwrap();
    let reopened = open(backend.clone()).await;
    assert_eq!(reopened.pyramids().await, coverage.pyramids().await);
    assert!(reopened.pyramid(&p).await.unwrap().mosaic(&m).unwrap().format.is_some());
}
