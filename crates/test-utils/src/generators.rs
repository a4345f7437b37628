//! Raster generators with predictable, verifiable pixel patterns.

use coverage_common::{AffineTransform, ColorModel, Raster, SampleModel, SampleType};

pub const RED: [u8; 4] = [255, 0, 0, 255];
pub const GREEN: [u8; 4] = [0, 255, 0, 255];
pub const BLUE: [u8; 4] = [0, 0, 255, 255];
pub const YELLOW: [u8; 4] = [255, 255, 0, 255];

/// The RGBA layout used by color tests.
pub fn rgba_model() -> SampleModel {
    SampleModel::new(SampleType::U8, 4)
}

/// A raster where every pixel is `color`.
pub fn solid_rgba(width: usize, height: usize, color: [u8; 4]) -> Raster {
    let mut data = Vec::with_capacity(width * height * 4);
    for _ in 0..width * height {
        data.extend_from_slice(&color);
    }
    Raster::from_bytes(width, height, rgba_model(), ColorModel::Rgba, data)
        .expect("solid raster layout")
}

/// Four `half x half` quadrants colored, in row-major order, by `colors`.
pub fn quadrant_rgba(half: usize, colors: [[u8; 4]; 4]) -> Raster {
    let size = half * 2;
    let mut raster = Raster::new(size, size, rgba_model(), ColorModel::Rgba);
    for y in 0..size {
        for x in 0..size {
            let quadrant = (y / half) * 2 + x / half;
            raster.set_pixel(x, y, &colors[quadrant]);
        }
    }
    raster
}

/// Single-band f32 raster where each value is `col * 1000 + row`.
///
/// Any pixel read back at `(col, row)` must equal `col * 1000 + row`.
///
/// ```
/// use test_utils::create_test_grid;
///
/// let grid = create_test_grid(10, 5);
/// assert_eq!(grid.width(), 10);
/// assert_eq!(grid.sample(0, 0, 0), 0.0);
/// assert_eq!(grid.sample(1, 0, 0), 1000.0);
/// assert_eq!(grid.sample(0, 1, 0), 1.0);
/// ```
pub fn create_test_grid(width: usize, height: usize) -> Raster {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f32);
        }
    }
    Raster::from_samples(width, height, 1, ColorModel::Data, &data).expect("test grid layout")
}

/// Single-band u8 gradient, `(x + y) % 256`.
pub fn gradient_u8(width: usize, height: usize) -> Raster {
    let data: Vec<u8> = (0..height)
        .flat_map(|y| (0..width).map(move |x| ((x + y) % 256) as u8))
        .collect();
    Raster::from_samples(width, height, 1, ColorModel::Gray, &data).expect("gradient layout")
}

/// Pixel-to-world transform for an east/north CRS with its upper-left
/// corner at `(west, north)`.
pub fn xy_transform(west: f64, north: f64, scale: f64) -> AffineTransform {
    AffineTransform::new(scale, 0.0, west, 0.0, -scale, north)
}

/// The same grid as [`xy_transform`] for a north/east CRS.
pub fn yx_transform(west: f64, north: f64, scale: f64) -> AffineTransform {
    AffineTransform::new(0.0, -scale, north, scale, 0.0, west)
}
