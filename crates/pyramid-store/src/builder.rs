//! Multi-scale pyramid construction from a single source coverage.

use std::sync::Arc;

use coverage_common::{BoundingBox, Crs, Result};
use projection::transform_envelope;
use tracing::{debug, info, instrument};

use crate::config::PyramidBuildConfig;
use crate::coverage::CoverageInner;
use crate::grid_coverage::GridCoverage;
use crate::mosaic::{GridSize, TileSize};
use crate::writer::{write_into, WriteParam, WriteReport};

/// Upper bound on derived levels.
const MAX_LEVELS: usize = 64;

/// Result of a build.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildReport {
    pub pyramid_id: String,
    /// One mosaic per scale, finest first.
    pub mosaic_ids: Vec<String>,
    pub scales: Vec<f64>,
    pub write: WriteReport,
}

/// Creates one mosaic per scale and fills each from the source.
#[derive(Debug)]
pub struct PyramidCoverageBuilder {
    inner: Arc<CoverageInner>,
    config: PyramidBuildConfig,
}

impl PyramidCoverageBuilder {
    pub(crate) fn new(inner: Arc<CoverageInner>, config: PyramidBuildConfig) -> Self {
        Self { inner, config }
    }

    pub fn config(&self) -> &PyramidBuildConfig {
        &self.config
    }

    /// Build a pyramid for `source` in `target_crs`, or in the source CRS
    /// when none is given. Existing mosaics with the same geometry are
    /// reused and their tiles merged.
    #[instrument(skip(self, source, target_crs), fields(dataset = %self.inner.name))]
    pub async fn build(
        &self,
        source: &GridCoverage,
        target_crs: Option<&Crs>,
    ) -> Result<BuildReport> {
        let crs = target_crs.unwrap_or(&source.crs).clone();
        let operation = self.inner.transforms.find_operation(&source.crs, &crs)?;
        let footprint =
            transform_envelope(&source.envelope()?, &crs, operation.as_ref())?.horizontal_bbox();

        let pyramid_id = self.inner.create_pyramid(&crs).await?;

        let (tile_w, tile_h) = self.config.tile_size.unwrap_or((
            self.inner.config.default_tile_size,
            self.inner.config.default_tile_size,
        ));
        let tile_size = TileSize::new(tile_w, tile_h);

        let scales = match &self.config.scales {
            Some(scales) => {
                let mut scales = scales.clone();
                scales.sort_by(|a, b| a.total_cmp(b));
                scales
            }
            None => self.derive_scales(&footprint, source, tile_size),
        };
        debug!(?scales, "Pyramid levels");

        let mut upper_left = vec![0.0; crs.dimension()];
        upper_left[crs.east_axis()] = footprint.min_x;
        upper_left[crs.north_axis()] = footprint.max_y;
        for (i, value) in source.slice.iter().enumerate() {
            if let Some(slot) = upper_left.get_mut(2 + i) {
                *slot = *value;
            }
        }

        let mut mosaic_ids = Vec::with_capacity(scales.len());
        for &scale in &scales {
            let grid_size = GridSize::new(
                tiles_needed(footprint.width(), tile_w, scale),
                tiles_needed(footprint.height(), tile_h, scale),
            );
            let id = self
                .inner
                .create_mosaic(&pyramid_id, grid_size, tile_size, upper_left.clone(), scale)
                .await?;
            mosaic_ids.push(id);
        }

        let mut write = WriteReport {
            pyramid_id: pyramid_id.clone(),
            ..Default::default()
        };
        // Other mosaics may share a scale, so each level targets its own id.
        for mosaic_id in &mosaic_ids {
            let level = write_into(
                &self.inner,
                &pyramid_id,
                source,
                &WriteParam::new(),
                Some(std::slice::from_ref(mosaic_id)),
            )
            .await?;
            write.merge(level);
        }

        info!(
            pyramid = %pyramid_id,
            levels = scales.len(),
            tiles = write.tiles_written,
            "Built pyramid"
        );

        Ok(BuildReport {
            pyramid_id,
            mosaic_ids,
            scales,
            write,
        })
    }

    /// Native scale, then coarser levels by `downscale_factor` until the
    /// extent fits in `min_tile_count` tiles along each axis.
    fn derive_scales(
        &self,
        footprint: &BoundingBox,
        source: &GridCoverage,
        tile_size: TileSize,
    ) -> Vec<f64> {
        let native = (footprint.width() / source.raster.width().max(1) as f64)
            .min(footprint.height() / source.raster.height().max(1) as f64);
        let factor = self.config.downscale_factor as f64;
        let limit = self.config.min_tile_count;

        let mut scale = native;
        let mut scales = vec![scale];
        while scales.len() < MAX_LEVELS
            && (tiles_needed(footprint.width(), tile_size.width, scale) > limit
                || tiles_needed(footprint.height(), tile_size.height, scale) > limit)
        {
            scale *= factor;
            scales.push(scale);
        }
        scales
    }
}

/// Tiles covering `extent` world units at `scale`, at least one.
fn tiles_needed(extent: f64, tile_pixels: u32, scale: f64) -> u32 {
    let tiles = (extent / (tile_pixels as f64 * scale) - 1e-9).ceil();
    if tiles.is_finite() && tiles >= 1.0 {
        tiles.min(u32::MAX as f64) as u32
    } else {
        1
    }
}
