//! One resolution level: a regular grid of fixed-size tiles.
//!
//! Columns advance along the CRS east axis and rows along the north axis,
//! rows increasing southward from the upper-left corner. Pixel coordinates
//! address pixel corners; pixel `(i, j)` has its center at `(i + 0.5, j + 0.5)`.

use coverage_common::{
    AffineTransform, AxisOrder, BoundingBox, ColorModel, Crs, CoverageError, Envelope, Result,
    SampleModel, TileCoord, TileRange,
};
use serde::{Deserialize, Serialize};

/// Snap distance, in tile units, for corners that fall on tile edges.
const EDGE_EPSILON: f64 = 1e-9;

/// Number of tiles along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSize {
    pub cols: u32,
    pub rows: u32,
}

impl GridSize {
    pub fn new(cols: u32, rows: u32) -> Self {
        Self { cols, rows }
    }
}

/// Tile dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileSize {
    pub width: u32,
    pub height: u32,
}

impl TileSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn square(size: u32) -> Self {
        Self::new(size, size)
    }
}

/// Pixel layout shared by every tile of a mosaic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileFormat {
    pub sample_model: SampleModel,
    pub color_model: ColorModel,
}

impl TileFormat {
    pub fn new(sample_model: SampleModel, color_model: ColorModel) -> Self {
        Self {
            sample_model,
            color_model,
        }
    }
}

/// A resolution level of a pyramid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridMosaic {
    pub id: String,
    pub pyramid_id: String,
    pub grid_size: GridSize,
    pub tile_size: TileSize,
    /// Upper-left corner in CRS axis order. Ordinates past the two
    /// horizontal ones locate the mosaic on the extra axes.
    pub upper_left: Vec<f64>,
    /// World units per pixel.
    pub scale: f64,
    /// Pixel layout, fixed by the first write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<TileFormat>,
}

impl GridMosaic {
    /// Check the geometry of a new mosaic.
    pub fn validate(
        crs: &Crs,
        grid_size: GridSize,
        tile_size: TileSize,
        upper_left: &[f64],
        scale: f64,
    ) -> Result<()> {
        if grid_size.cols == 0 || grid_size.rows == 0 {
            return Err(CoverageError::configuration(format!(
                "grid size must be positive, got {}x{}",
                grid_size.cols, grid_size.rows
            )));
        }
        if tile_size.width == 0 || tile_size.height == 0 {
            return Err(CoverageError::configuration(format!(
                "tile size must be positive, got {}x{}",
                tile_size.width, tile_size.height
            )));
        }
        if !(scale > 0.0) || !scale.is_finite() {
            return Err(CoverageError::configuration(format!(
                "scale must be positive, got {}",
                scale
            )));
        }
        if upper_left.len() != crs.dimension() {
            return Err(CoverageError::configuration(format!(
                "upper-left corner has {} ordinates, {} has {}",
                upper_left.len(),
                crs,
                crs.dimension()
            )));
        }
        if upper_left.iter().any(|v| !v.is_finite()) {
            return Err(CoverageError::configuration(
                "upper-left corner must be finite",
            ));
        }
        Ok(())
    }

    /// Corner as (east, north).
    pub fn corner(&self, crs: &Crs) -> (f64, f64) {
        (
            self.upper_left[crs.east_axis()],
            self.upper_left[crs.north_axis()],
        )
    }

    /// Ordinates on the extra axes.
    pub fn slice_coordinates(&self) -> &[f64] {
        self.upper_left.get(2..).unwrap_or(&[])
    }

    /// World extent of one tile as (east span, north span).
    pub fn tile_span(&self) -> (f64, f64) {
        (
            self.tile_size.width as f64 * self.scale,
            self.tile_size.height as f64 * self.scale,
        )
    }

    /// Horizontal extent: the corner plus `grid_size * tile_size * scale`
    /// eastward and southward.
    pub fn bbox(&self, crs: &Crs) -> BoundingBox {
        let (east, north) = self.corner(crs);
        let (tile_w, tile_h) = self.tile_span();
        BoundingBox::new(
            east,
            north - self.grid_size.rows as f64 * tile_h,
            east + self.grid_size.cols as f64 * tile_w,
            north,
        )
    }

    /// Envelope in `crs`; extra axes collapse to the mosaic's coordinates.
    pub fn envelope(&self, crs: &Crs) -> Envelope {
        let mut envelope = Envelope::from_bbox(crs.clone(), &self.bbox(crs));
        for (i, value) in self.slice_coordinates().iter().enumerate() {
            envelope.lower[2 + i] = *value;
            envelope.upper[2 + i] = *value;
        }
        envelope
    }

    /// Tile containing an (east, north) point, without clamping to the grid.
    pub fn world_to_tile(&self, crs: &Crs, east: f64, north: f64) -> (i64, i64) {
        let (corner_e, corner_n) = self.corner(crs);
        let (tile_w, tile_h) = self.tile_span();
        (
            ((east - corner_e) / tile_w).floor() as i64,
            ((corner_n - north) / tile_h).floor() as i64,
        )
    }

    /// Horizontal extent of one tile.
    pub fn tile_bbox(&self, crs: &Crs, coord: TileCoord) -> BoundingBox {
        let (corner_e, corner_n) = self.corner(crs);
        let (tile_w, tile_h) = self.tile_span();
        let min_x = corner_e + coord.col as f64 * tile_w;
        let max_y = corner_n - coord.row as f64 * tile_h;
        BoundingBox::new(min_x, max_y - tile_h, min_x + tile_w, max_y)
    }

    pub fn tile_envelope(&self, crs: &Crs, coord: TileCoord) -> Envelope {
        let mut envelope = self.envelope(crs);
        let bbox = self.tile_bbox(crs, coord);
        let (e, n) = (crs.east_axis(), crs.north_axis());
        envelope.lower[e] = bbox.min_x;
        envelope.upper[e] = bbox.max_x;
        envelope.lower[n] = bbox.min_y;
        envelope.upper[n] = bbox.max_y;
        envelope
    }

    /// Tiles intersecting `bbox`, clamped to the grid.
    ///
    /// Boxes that only touch a tile edge do not select the neighbouring tile.
    pub fn tile_range(&self, crs: &Crs, bbox: &BoundingBox) -> TileRange {
        let (corner_e, corner_n) = self.corner(crs);
        let (tile_w, tile_h) = self.tile_span();

        let col_lo = (bbox.min_x - corner_e) / tile_w;
        let col_hi = (bbox.max_x - corner_e) / tile_w;
        let row_lo = (corner_n - bbox.max_y) / tile_h;
        let row_hi = (corner_n - bbox.min_y) / tile_h;

        let clamp = |v: f64, max: u32| v.max(0.0).min(max as f64) as u32;
        let col_min = clamp((col_lo + EDGE_EPSILON).floor(), self.grid_size.cols);
        let col_max = clamp((col_hi - EDGE_EPSILON).ceil(), self.grid_size.cols);
        let row_min = clamp((row_lo + EDGE_EPSILON).floor(), self.grid_size.rows);
        let row_max = clamp((row_hi - EDGE_EPSILON).ceil(), self.grid_size.rows);

        if col_min >= col_max || row_min >= row_max {
            return TileRange::empty();
        }
        TileRange::new(col_min, row_min, col_max, row_max)
    }

    /// Pixel-to-CRS transform of the whole mosaic, output in CRS axis order.
    pub fn grid_to_crs(&self, crs: &Crs) -> AffineTransform {
        let (east, north) = self.corner(crs);
        pixel_transform(crs.axis_order, east, north, self.scale)
    }

    /// Pixel-to-CRS transform of a block whose upper-left tile is `coord`.
    pub fn tile_grid_to_crs(&self, crs: &Crs, coord: TileCoord) -> AffineTransform {
        let bbox = self.tile_bbox(crs, coord);
        pixel_transform(crs.axis_order, bbox.min_x, bbox.max_y, self.scale)
    }

    /// True when `other` describes the same level geometry.
    pub fn same_geometry(
        &self,
        grid_size: GridSize,
        tile_size: TileSize,
        upper_left: &[f64],
        scale: f64,
    ) -> bool {
        self.grid_size == grid_size
            && self.tile_size == tile_size
            && approx_eq(self.scale, scale)
            && self.upper_left.len() == upper_left.len()
            && self
                .upper_left
                .iter()
                .zip(upper_left)
                .all(|(a, b)| approx_eq(*a, *b))
    }
}

/// Pixel corner to world, with the north axis pointing up the image.
fn pixel_transform(order: AxisOrder, east: f64, north: f64, scale: f64) -> AffineTransform {
    match order {
        AxisOrder::XY => AffineTransform::new(scale, 0.0, east, 0.0, -scale, north),
        AxisOrder::YX => AffineTransform::new(0.0, -scale, north, scale, 0.0, east),
    }
}

pub(crate) fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mosaic(crs: &Crs) -> GridMosaic {
        let (e, n) = (crs.east_axis(), crs.north_axis());
        let mut upper_left = vec![0.0; crs.dimension()];
        upper_left[e] = -180.0;
        upper_left[n] = 90.0;
        GridMosaic {
            id: "m0".to_string(),
            pyramid_id: "p0".to_string(),
            grid_size: GridSize::new(4, 2),
            tile_size: TileSize::new(256, 256),
            upper_left,
            scale: 360.0 / 1024.0,
            format: None,
        }
    }

    #[test]
    fn test_envelope_from_corner_and_grid() {
        for crs in [Crs::crs_84(), Crs::epsg_4326()] {
            let m = mosaic(&crs);
            let bbox = m.bbox(&crs);
            assert_eq!(bbox, BoundingBox::new(-180.0, -90.0, 180.0, 90.0));

            let envelope = m.envelope(&crs);
            assert_eq!(envelope.horizontal_bbox(), bbox);
        }
        let envelope = mosaic(&Crs::epsg_4326()).envelope(&Crs::epsg_4326());
        assert_eq!(envelope.lower, vec![-90.0, -180.0]);
        assert_eq!(envelope.upper, vec![90.0, 180.0]);
    }

    #[test]
    fn test_world_to_tile() {
        let crs = Crs::crs_84();
        let m = mosaic(&crs);
        assert_eq!(m.world_to_tile(&crs, -180.0, 90.0), (0, 0));
        assert_eq!(m.world_to_tile(&crs, -0.1, 0.1), (1, 0));
        assert_eq!(m.world_to_tile(&crs, 0.0, 0.0), (2, 1));
        assert_eq!(m.world_to_tile(&crs, 179.9, -89.9), (3, 1));
        assert_eq!(m.world_to_tile(&crs, 200.0, 100.0), (4, -1));
    }

    #[test]
    fn test_tile_bbox() {
        let crs = Crs::crs_84();
        let m = mosaic(&crs);
        assert_eq!(
            m.tile_bbox(&crs, TileCoord::new(1, 1)),
            BoundingBox::new(-90.0, -90.0, 0.0, 0.0)
        );
    }

    #[test]
    fn test_tile_range_clamps_and_snaps() {
        let crs = Crs::crs_84();
        let m = mosaic(&crs);

        let all = m.tile_range(&crs, &BoundingBox::new(-500.0, -500.0, 500.0, 500.0));
        assert_eq!(all, TileRange::new(0, 0, 4, 2));

        // Exactly one tile; shared edges do not pull in neighbours.
        let one = m.tile_range(&crs, &BoundingBox::new(-90.0, -90.0, 0.0, 0.0));
        assert_eq!(one, TileRange::new(1, 1, 2, 2));

        let none = m.tile_range(&crs, &BoundingBox::new(200.0, 0.0, 300.0, 10.0));
        assert!(none.is_empty());
    }

    #[test]
    fn test_grid_to_crs_axis_orders() {
        let xy = Crs::crs_84();
        let t = mosaic(&xy).grid_to_crs(&xy);
        assert_eq!(t.transform(0.0, 0.0), (-180.0, 90.0));
        assert_eq!(t.transform(1024.0, 512.0), (180.0, -90.0));

        let yx = Crs::epsg_4326();
        let t = mosaic(&yx).grid_to_crs(&yx);
        assert_eq!(t.transform(0.0, 0.0), (90.0, -180.0));
        assert_eq!(t.transform(1024.0, 512.0), (-90.0, 180.0));
    }

    #[test]
    fn test_validate_rejects_bad_geometry() {
        let crs = Crs::crs_84();
        let ok = |g, t, s| GridMosaic::validate(&crs, g, t, &[0.0, 0.0], s);
        assert!(ok(GridSize::new(1, 1), TileSize::square(1), 1.0).is_ok());
        assert!(ok(GridSize::new(0, 1), TileSize::square(1), 1.0).is_err());
        assert!(ok(GridSize::new(1, 1), TileSize::new(1, 0), 1.0).is_err());
        assert!(ok(GridSize::new(1, 1), TileSize::square(1), 0.0).is_err());
        assert!(ok(GridSize::new(1, 1), TileSize::square(1), -2.0).is_err());
        assert!(matches!(
            GridMosaic::validate(&crs, GridSize::new(1, 1), TileSize::square(1), &[0.0], 1.0),
            Err(CoverageError::Configuration(_))
        ));
    }
}
