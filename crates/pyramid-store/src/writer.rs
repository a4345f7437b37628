//! Write path: reprojection into pyramid space and partial tile merges.

use std::sync::Arc;

use coverage_common::{
    AffineTransform, BoundingBox, CoverageError, Crs, Envelope, Raster, Result, TileCoord,
};
use futures::stream::{self, StreamExt};
use projection::{transform_envelope, CoordinateOperation};
use tracing::{debug, info, instrument, warn};

use crate::coverage::CoverageInner;
use crate::grid_coverage::GridCoverage;
use crate::mosaic::{approx_eq, GridMosaic, TileFormat};

/// Snap distance, in pixels, for footprint edges that fall on pixel edges.
const PIXEL_EPSILON: f64 = 1e-6;

/// Restrictions on a write.
#[derive(Debug, Clone, Default)]
pub struct WriteParam {
    /// Only pixels inside this envelope are written.
    pub envelope: Option<Envelope>,
    /// Scale of the single mosaic to write, in pyramid CRS units. Without
    /// it every mosaic of the slice intersecting the source is written.
    pub resolution: Option<f64>,
}

impl WriteParam {
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
}

/// Tiles touched by a write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub pyramid_id: String,
    pub mosaics: Vec<String>,
    /// Tiles created or overwritten.
    pub tiles_written: usize,
    /// Tiles whose merged content matched what was stored.
    pub tiles_unchanged: usize,
    /// Tiles in range that received no source pixel.
    pub tiles_skipped: usize,
}

impl WriteReport {
    fn empty(pyramid_id: &str) -> Self {
        Self {
            pyramid_id: pyramid_id.to_string(),
            ..Default::default()
        }
    }

    pub(crate) fn merge(&mut self, other: WriteReport) {
        self.mosaics.extend(other.mosaics);
        self.tiles_written += other.tiles_written;
        self.tiles_unchanged += other.tiles_unchanged;
        self.tiles_skipped += other.tiles_skipped;
    }
}

enum TileOutcome {
    Written,
    Unchanged,
    Skipped,
}

/// Pyramid CRS ordinates to source pixel positions.
enum SourceMapping {
    Affine(AffineTransform),
    Projected {
        to_source_crs: Box<dyn CoordinateOperation>,
        crs_to_grid: AffineTransform,
    },
}

impl SourceMapping {
    fn new(source: &GridCoverage, operation: &dyn CoordinateOperation) -> Result<Self> {
        let singular = || {
            CoverageError::InvalidParameter("source grid-to-CRS transform is singular".to_string())
        };
        match operation.as_affine() {
            Some(affine) => {
                let grid_to_pyramid = source.grid_to_crs.then(&affine);
                Ok(Self::Affine(grid_to_pyramid.inverse().ok_or_else(singular)?))
            }
            None => Ok(Self::Projected {
                to_source_crs: operation.inverse(),
                crs_to_grid: source.grid_to_crs.inverse().ok_or_else(singular)?,
            }),
        }
    }

    fn source_pixel(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        match self {
            Self::Affine(to_grid) => Some(to_grid.transform(x, y)),
            Self::Projected {
                to_source_crs,
                crs_to_grid,
            } => {
                let (sx, sy) = to_source_crs.transform(x, y).ok()?;
                Some(crs_to_grid.transform(sx, sy))
            }
        }
    }
}

/// Everything a tile merge needs, shared by the concurrent tile tasks.
struct WriteContext<'a> {
    inner: &'a CoverageInner,
    pyramid_id: &'a str,
    crs: &'a Crs,
    source: &'a Raster,
    format: TileFormat,
    mapping: SourceMapping,
    footprint: BoundingBox,
}

impl WriteContext<'_> {
    async fn merge_tile(&self, mosaic: &GridMosaic, coord: TileCoord) -> Result<TileOutcome> {
        let key = self.inner.tile_key(self.pyramid_id, &mosaic.id, coord);
        let tile_w = mosaic.tile_size.width as usize;
        let tile_h = mosaic.tile_size.height as usize;

        let window = match pixel_window(mosaic, self.crs, coord, &self.footprint) {
            Some(window) => window,
            None => return Ok(TileOutcome::Skipped),
        };

        let previous = self.inner.backend.get(&key).await?;
        let mut tile = match &previous {
            Some(bytes) => {
                let existing = self.inner.codec.decode(bytes)?;
                if existing.sample_model() != self.format.sample_model {
                    return Err(CoverageError::incompatible(
                        existing.sample_model(),
                        self.format.sample_model,
                    ));
                }
                if existing.width() != tile_w || existing.height() != tile_h {
                    return Err(CoverageError::io(format!(
                        "stored tile {} is {}x{}, expected {}x{}",
                        key,
                        existing.width(),
                        existing.height(),
                        tile_w,
                        tile_h
                    )));
                }
                existing
            }
            None => Raster::filled(
                tile_w,
                tile_h,
                self.format.sample_model,
                self.format.color_model,
                &[self.inner.config.fill_value],
            ),
        };

        let grid_to_crs = mosaic.tile_grid_to_crs(self.crs, coord);
        let (cols, rows) = window;
        let mut touched = 0usize;
        for py in rows.0..rows.1 {
            for px in cols.0..cols.1 {
                let (x, y) = grid_to_crs.transform(px as f64 + 0.5, py as f64 + 0.5);
                let Some((sx, sy)) = self.mapping.source_pixel(x, y) else {
                    continue;
                };
                if self
                    .inner
                    .interpolator
                    .resample(self.source, sx, sy, &mut tile, px, py)
                {
                    touched += 1;
                }
            }
        }

        if touched == 0 {
            return Ok(TileOutcome::Skipped);
        }
        if self.inner.store_tile(&key, &tile, previous.as_ref()).await? {
            debug!(key = %key, pixels = touched, "Merged tile");
            Ok(TileOutcome::Written)
        } else {
            Ok(TileOutcome::Unchanged)
        }
    }
}

/// Pixel columns and rows of a tile covered by `footprint`, as half-open
/// `((col_start, col_end), (row_start, row_end))`.
#[allow(clippy::type_complexity)]
fn pixel_window(
    mosaic: &GridMosaic,
    crs: &Crs,
    coord: TileCoord,
    footprint: &BoundingBox,
) -> Option<((usize, usize), (usize, usize))> {
    let tile = mosaic.tile_bbox(crs, coord);
    let overlap = tile.intersection(footprint)?;
    let scale = mosaic.scale;

    let clamp = |v: f64, max: u32| v.max(0.0).min(max as f64) as usize;
    let col_start = clamp(
        ((overlap.min_x - tile.min_x) / scale + PIXEL_EPSILON).floor(),
        mosaic.tile_size.width,
    );
    let col_end = clamp(
        ((overlap.max_x - tile.min_x) / scale - PIXEL_EPSILON).ceil(),
        mosaic.tile_size.width,
    );
    let row_start = clamp(
        ((tile.max_y - overlap.max_y) / scale + PIXEL_EPSILON).floor(),
        mosaic.tile_size.height,
    );
    let row_end = clamp(
        ((tile.max_y - overlap.min_y) / scale - PIXEL_EPSILON).ceil(),
        mosaic.tile_size.height,
    );

    if col_start >= col_end || row_start >= row_end {
        return None;
    }
    Some(((col_start, col_end), (row_start, row_end)))
}

/// Write `source` into pyramid `pyramid_id`.
pub(crate) async fn write_coverage(
    inner: &CoverageInner,
    pyramid_id: &str,
    source: &GridCoverage,
    param: &WriteParam,
) -> Result<WriteReport> {
    write_into(inner, pyramid_id, source, param, None).await
}

/// Write `source` into pyramid `pyramid_id`. With `mosaic_ids`, only those
/// mosaics of the source slice are candidates.
pub(crate) async fn write_into(
    inner: &CoverageInner,
    pyramid_id: &str,
    source: &GridCoverage,
    param: &WriteParam,
    mosaic_ids: Option<&[String]>,
) -> Result<WriteReport> {
    let pyramid = inner.pyramid(pyramid_id).await?;
    let crs = &pyramid.crs;

    let operation = inner.transforms.find_operation(&source.crs, crs)?;
    let mapping = SourceMapping::new(source, operation.as_ref())?;

    let mut footprint =
        transform_envelope(&source.envelope()?, crs, operation.as_ref())?.horizontal_bbox();
    if let Some(envelope) = &param.envelope {
        let limit = if envelope.crs.equals_ignore_metadata(crs) {
            envelope.horizontal_bbox()
        } else {
            let to_pyramid = inner.transforms.find_operation(&envelope.crs, crs)?;
            transform_envelope(envelope, crs, to_pyramid.as_ref())?.horizontal_bbox()
        };
        footprint = match footprint.intersection(&limit) {
            Some(bbox) => bbox,
            None => {
                debug!("Write envelope does not overlap the source");
                return Ok(WriteReport::empty(pyramid_id));
            }
        };
    }

    let slice = pyramid.slice_at(&source.slice).ok_or_else(|| {
        CoverageError::NoSuchMosaic(format!(
            "{} has no mosaic at {:?}",
            pyramid_id, source.slice
        ))
    })?;

    let mut candidates: Vec<&GridMosaic> = slice
        .mosaics
        .iter()
        .copied()
        .filter(|m| mosaic_ids.map_or(true, |ids| ids.iter().any(|id| *id == m.id)))
        .collect();
    if let Some(ids) = mosaic_ids {
        if let Some(id) = ids.iter().find(|id| !candidates.iter().any(|m| m.id == **id)) {
            return Err(CoverageError::NoSuchMosaic(format!(
                "{} has no mosaic {} at {:?}",
                pyramid_id, id, source.slice
            )));
        }
    }
    if let Some(resolution) = param.resolution {
        candidates.retain(|m| approx_eq(m.scale, resolution));
        if candidates.is_empty() {
            return Err(CoverageError::NoSuchMosaic(format!(
                "{} has no mosaic at scale {}",
                pyramid_id, resolution
            )));
        }
    }
    // Several mosaics may share a scale; each covers its own extent.
    let targets: Vec<GridMosaic> = candidates
        .into_iter()
        .filter(|m| m.bbox(crs).intersects(&footprint))
        .cloned()
        .collect();

    let format = TileFormat::new(source.raster.sample_model(), source.raster.color_model());
    for mosaic in &targets {
        if let Some(existing) = mosaic.format {
            if existing.sample_model != format.sample_model {
                return Err(CoverageError::incompatible(
                    existing.sample_model,
                    format.sample_model,
                ));
            }
        }
    }
    for mosaic in &targets {
        if mosaic.format.is_none() {
            inner.declare_format(pyramid_id, &mosaic.id, format).await?;
        }
    }

    let ctx = WriteContext {
        inner,
        pyramid_id,
        crs,
        source: &source.raster,
        format,
        mapping,
        footprint,
    };

    let jobs: Vec<(&GridMosaic, TileCoord)> = targets
        .iter()
        .flat_map(|mosaic| {
            mosaic
                .tile_range(crs, &footprint)
                .iter()
                .map(move |coord| (mosaic, coord))
        })
        .collect();

    let ctx = &ctx;
    let outcomes: Vec<Result<TileOutcome>> = stream::iter(jobs)
        .map(|(mosaic, coord)| async move { ctx.merge_tile(mosaic, coord).await })
        .buffer_unordered(inner.config.io_concurrency)
        .collect()
        .await;

    let mut report = WriteReport {
        pyramid_id: pyramid_id.to_string(),
        mosaics: targets.iter().map(|m| m.id.clone()).collect(),
        ..Default::default()
    };
    let mut first_error = None;
    for outcome in outcomes {
        match outcome {
            Ok(TileOutcome::Written) => report.tiles_written += 1,
            Ok(TileOutcome::Unchanged) => report.tiles_unchanged += 1,
            Ok(TileOutcome::Skipped) => report.tiles_skipped += 1,
            Err(err) => {
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
    }
    if let Some(err) = first_error {
        warn!(
            pyramid = %pyramid_id,
            written = report.tiles_written,
            error = %err,
            "Write failed part way, completed tiles are kept"
        );
        return Err(err);
    }

    info!(
        pyramid = %pyramid_id,
        mosaics = report.mosaics.len(),
        written = report.tiles_written,
        unchanged = report.tiles_unchanged,
        skipped = report.tiles_skipped,
        "Wrote coverage"
    );
    Ok(report)
}

/// Write handle. Obtain one from `PyramidalCoverage::acquire_writer`.
#[derive(Debug)]
pub struct CoverageWriter {
    inner: Arc<CoverageInner>,
    writes: u64,
}

impl CoverageWriter {
    pub(crate) fn new(inner: Arc<CoverageInner>) -> Self {
        Self { inner, writes: 0 }
    }

    pub(crate) fn belongs_to(&self, inner: &Arc<CoverageInner>) -> bool {
        Arc::ptr_eq(&self.inner, inner)
    }

    pub(crate) fn reset(&mut self) {
        self.writes = 0;
    }

    /// Writes issued since the handle was acquired.
    pub fn writes(&self) -> u64 {
        self.writes
    }

    /// Merge `source` into the mosaics of `pyramid_id` it overlaps. Pixels
    /// outside the source keep their stored values.
    #[instrument(skip(self, source, param), fields(dataset = %self.inner.name))]
    pub async fn write(
        &mut self,
        source: &GridCoverage,
        pyramid_id: &str,
        param: &WriteParam,
    ) -> Result<WriteReport> {
        self.writes += 1;
        write_coverage(&self.inner, pyramid_id, source, param).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mosaic::{GridSize, TileSize};

    fn mosaic() -> GridMosaic {
        GridMosaic {
            id: "mosaic-0".to_string(),
            pyramid_id: "pyramid-0".to_string(),
            grid_size: GridSize::new(2, 1),
            tile_size: TileSize::square(100),
            upper_left: vec![0.0, 100.0],
            scale: 1.0,
            format: None,
        }
    }

    #[test]
    fn test_pixel_window_covers_overlap() {
        let crs = Crs::crs_84();
        let m = mosaic();
        let footprint = BoundingBox::new(67.0, 67.0, 150.0, 100.0);

        let first = pixel_window(&m, &crs, TileCoord::new(0, 0), &footprint);
        assert_eq!(first, Some(((67, 100), (0, 33))));

        let second = pixel_window(&m, &crs, TileCoord::new(1, 0), &footprint);
        assert_eq!(second, Some(((0, 50), (0, 33))));
    }

    #[test]
    fn test_pixel_window_ignores_touching_edges() {
        let crs = Crs::crs_84();
        let footprint = BoundingBox::new(100.0, 0.0, 200.0, 100.0);
        assert_eq!(
            pixel_window(&mosaic(), &crs, TileCoord::new(0, 0), &footprint),
            None
        );
    }

    #[test]
    fn test_affine_mapping_inverts_source_grid() {
        let raster = Raster::new(
            10,
            10,
            coverage_common::SampleModel::new(coverage_common::SampleType::U8, 1),
            coverage_common::ColorModel::Gray,
        );
        let source = GridCoverage::new(
            raster,
            AffineTransform::new(0.0, -1.0, 50.0, 1.0, 0.0, 10.0),
            Crs::epsg_4326(),
        );
        let swap = projection::AffineOperation::axis_swap();
        let mapping = SourceMapping::new(&source, &swap).unwrap();

        // CRS:84 point (lon 12.5, lat 47.5) is source pixel center (2.5, 2.5).
        let (sx, sy) = mapping.source_pixel(12.5, 47.5).unwrap();
        assert!((sx - 2.5).abs() < 1e-12);
        assert!((sy - 2.5).abs() < 1e-12);
    }
}
