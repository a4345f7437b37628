//! Read path: pyramid and mosaic selection, tile fetch, and assembly.

use std::sync::Arc;

use coverage_common::{Crs, CoverageError, Envelope, Raster, Result, TileCoord, TileRange};
use futures::stream::{self, StreamExt};
use projection::transform_envelope;
use tracing::{debug, info, instrument, warn};

use crate::coverage::CoverageInner;
use crate::grid_coverage::GridCoverage;
use crate::mosaic::GridMosaic;
use crate::pyramid::{Pyramid, PyramidSet};

/// What to read.
#[derive(Debug, Clone, Default)]
pub struct ReadParam {
    /// Area of interest. Bounded extra-axis ranges select a slice by their
    /// median. `None` reads the whole pyramid.
    pub envelope: Option<Envelope>,
    /// Requested ground size of a pixel, in units of the request CRS.
    pub resolution: Option<f64>,
    /// CRS of the request when no envelope is given.
    pub crs: Option<Crs>,
}

impl ReadParam {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_envelope(mut self, envelope: Envelope) -> Self {
        self.envelope = Some(envelope);
        self
    }

    pub fn with_resolution(mut self, resolution: f64) -> Self {
        self.resolution = Some(resolution);
        self
    }

    pub fn with_crs(mut self, crs: Crs) -> Self {
        self.crs = Some(crs);
        self
    }

    fn request_crs(&self) -> Option<&Crs> {
        self.envelope.as_ref().map(|e| &e.crs).or(self.crs.as_ref())
    }
}

/// Outcome of a read.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadResult {
    Coverage(ReadCoverage),
    /// The request selects no data.
    Empty,
}

impl ReadResult {
    pub fn is_empty(&self) -> bool {
        matches!(self, ReadResult::Empty)
    }

    pub fn into_coverage(self) -> Option<ReadCoverage> {
        match self {
            ReadResult::Coverage(coverage) => Some(coverage),
            ReadResult::Empty => None,
        }
    }
}

/// Assembled block of tiles at native mosaic resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadCoverage {
    pub coverage: GridCoverage,
    pub pyramid_id: String,
    pub mosaic_id: String,
    pub tiles: TileRange,
    /// Tiles never written, rendered with the fill value.
    pub missing_tiles: usize,
}

/// Read handle. Obtain one from `PyramidalCoverage::acquire_reader`.
#[derive(Debug)]
pub struct CoverageReader {
    inner: Arc<CoverageInner>,
    reads: u64,
}

impl CoverageReader {
    pub(crate) fn new(inner: Arc<CoverageInner>) -> Self {
        Self { inner, reads: 0 }
    }

    pub(crate) fn belongs_to(&self, inner: &Arc<CoverageInner>) -> bool {
        Arc::ptr_eq(&self.inner, inner)
    }

    pub(crate) fn reset(&mut self) {
        self.reads = 0;
    }

    /// Reads served since the handle was acquired.
    pub fn reads(&self) -> u64 {
        self.reads
    }

    /// Read image `slice_index` of the dataset. Only image 0 exists.
    #[instrument(skip(self, param), fields(dataset = %self.inner.name))]
    pub async fn read(&mut self, slice_index: usize, param: &ReadParam) -> Result<ReadResult> {
        if slice_index != 0 {
            return Err(CoverageError::InvalidParameter(format!(
                "image index {} out of range, the dataset has a single image",
                slice_index
            )));
        }
        self.reads += 1;

        let set = self.inner.snapshot().await;
        if set.is_empty() {
            debug!("Dataset has no pyramid");
            return Ok(ReadResult::Empty);
        }

        let pyramid = self.resolve_pyramid(&set, param)?;
        let crs = &pyramid.crs;

        let request = match &param.envelope {
            Some(envelope) => Some(self.to_pyramid_crs(envelope, crs)?),
            None => None,
        };

        let resolution = match (&param.envelope, &request, param.resolution) {
            (Some(source), Some(target), Some(r)) if !source.crs.equals_ignore_metadata(crs) => {
                Some(rescale_resolution(r, source, target))
            }
            (_, _, r) => r,
        };

        let extra_values: Vec<Option<f64>> = (2..crs.dimension())
            .map(|d| {
                request
                    .as_ref()
                    .filter(|e| e.is_bounded(d))
                    .map(|e| e.median(d))
            })
            .collect();

        let request_bbox = request
            .as_ref()
            .filter(|e| e.is_bounded(0) && e.is_bounded(1))
            .map(|e| e.horizontal_bbox());

        let (slice_centers, mosaics): (Vec<f64>, Vec<&GridMosaic>) = match pyramid.stack()? {
            Some(stack) => match stack.resolve(&extra_values) {
                Some((centers, slice)) => (centers, slice.mosaics.clone()),
                None => {
                    debug!(values = ?extra_values, "Request outside every slice");
                    return Ok(ReadResult::Empty);
                }
            },
            None => (Vec::new(), pyramid.mosaics.iter().collect()),
        };

        // Only mosaics holding part of the requested area compete on scale.
        let candidates: Vec<&GridMosaic> = match &request_bbox {
            Some(bbox) => mosaics
                .into_iter()
                .filter(|m| m.bbox(crs).intersects(bbox))
                .collect(),
            None => mosaics,
        };
        let mosaic = match self.inner.policy.select(&candidates, resolution) {
            Some(mosaic) => mosaic.clone(),
            None => {
                debug!(pyramid = %pyramid.id, "No mosaic covers the request");
                return Ok(ReadResult::Empty);
            }
        };

        let bbox = request_bbox.unwrap_or_else(|| mosaic.bbox(crs));
        let range = mosaic.tile_range(crs, &bbox);
        if range.is_empty() {
            debug!(mosaic = %mosaic.id, ?bbox, "No tile intersects the request");
            return Ok(ReadResult::Empty);
        }

        let format = match mosaic.format {
            Some(format) => format,
            None => {
                warn!(mosaic = %mosaic.id, "Mosaic has never been written");
                return Ok(ReadResult::Empty);
            }
        };

        let tile_w = mosaic.tile_size.width as usize;
        let tile_h = mosaic.tile_size.height as usize;
        let mut raster = Raster::filled(
            range.cols() as usize * tile_w,
            range.rows() as usize * tile_h,
            format.sample_model,
            format.color_model,
            &[self.inner.config.fill_value],
        );

        let missing = self.assemble(pyramid, &mosaic, range, &mut raster).await?;

        let grid_to_crs =
            mosaic.tile_grid_to_crs(crs, TileCoord::new(range.col_min, range.row_min));
        info!(
            pyramid = %pyramid.id,
            mosaic = %mosaic.id,
            scale = mosaic.scale,
            tiles = range.len(),
            missing = missing,
            width = raster.width(),
            height = raster.height(),
            "Assembled coverage"
        );

        Ok(ReadResult::Coverage(ReadCoverage {
            coverage: GridCoverage::new(raster, grid_to_crs, crs.clone()).with_slice(slice_centers),
            pyramid_id: pyramid.id.clone(),
            mosaic_id: mosaic.id.clone(),
            tiles: range,
            missing_tiles: missing,
        }))
    }

    /// Pyramid in the request CRS, or the first one reachable through a
    /// coordinate operation.
    fn resolve_pyramid<'a>(&self, set: &'a PyramidSet, param: &ReadParam) -> Result<&'a Pyramid> {
        let crs = match param.request_crs() {
            Some(crs) => crs,
            None => {
                return set
                    .pyramids
                    .first()
                    .ok_or_else(|| CoverageError::NoSuchPyramid("(none)".to_string()))
            }
        };
        if let Some(pyramid) = set.find_by_crs(crs) {
            return Ok(pyramid);
        }
        set.pyramids
            .iter()
            .find(|p| self.inner.transforms.find_operation(crs, &p.crs).is_ok())
            .ok_or_else(|| {
                CoverageError::UnsupportedCrs(format!("no pyramid reachable from {}", crs))
            })
    }

    fn to_pyramid_crs(&self, envelope: &Envelope, crs: &Crs) -> Result<Envelope> {
        if envelope.crs.equals_ignore_metadata(crs) {
            return Ok(envelope.clone());
        }
        let operation = self.inner.transforms.find_operation(&envelope.crs, crs)?;
        Ok(transform_envelope(envelope, crs, operation.as_ref())?)
    }

    /// Copy every tile of `range` into `raster`. Returns the number of tiles
    /// that were absent.
    async fn assemble(
        &self,
        pyramid: &Pyramid,
        mosaic: &GridMosaic,
        range: TileRange,
        raster: &mut Raster,
    ) -> Result<usize> {
        let inner = &self.inner;
        let fetched: Vec<_> = stream::iter(range.iter())
            .map(|coord| {
                let key = inner.tile_key(&pyramid.id, &mosaic.id, coord);
                async move { (coord, inner.load_tile(&key).await) }
            })
            .buffer_unordered(inner.config.io_concurrency)
            .collect()
            .await;

        let tile_w = mosaic.tile_size.width as usize;
        let tile_h = mosaic.tile_size.height as usize;
        let mut missing = 0;
        for (coord, tile) in fetched {
            let tile = match tile? {
                Some(tile) => tile,
                None => {
                    missing += 1;
                    continue;
                }
            };
            if tile.width() != tile_w || tile.height() != tile_h {
                return Err(CoverageError::io(format!(
                    "tile {} of {} is {}x{}, expected {}x{}",
                    coord,
                    mosaic.id,
                    tile.width(),
                    tile.height(),
                    tile_w,
                    tile_h
                )));
            }
            let dst_x = (coord.col - range.col_min) as usize * tile_w;
            let dst_y = (coord.row - range.row_min) as usize * tile_h;
            raster.copy_block(&tile, 0, 0, tile_w, tile_h, dst_x, dst_y)?;
        }
        Ok(missing)
    }
}

/// Express a resolution given in the source CRS in target CRS units, using
/// the ratio of the envelope areas.
fn rescale_resolution(resolution: f64, source: &Envelope, target: &Envelope) -> f64 {
    let source_area = source.span(0) * source.span(1);
    let target_area = target.span(0) * target.span(1);
    if source_area > 0.0 && target_area.is_finite() && target_area > 0.0 {
        resolution * (target_area / source_area).sqrt()
    } else {
        resolution
    }
}
