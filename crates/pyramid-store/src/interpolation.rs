//! Resamplers used when source pixels are mapped onto tile pixels.
//!
//! Source positions are continuous pixel coordinates: pixel `(i, j)` spans
//! `[i, i + 1) x [j, j + 1)` and its center sits at `(i + 0.5, j + 0.5)`.
//! A position outside `[0, width) x [0, height)` yields nothing, whatever
//! the method, so the written footprint never depends on the resampler.

use std::fmt;
use std::sync::Arc;

use coverage_common::Raster;
use serde::{Deserialize, Serialize};

/// Pluggable resampler.
pub trait Interpolator: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Resample `src` at `(x, y)` into pixel `(dst_x, dst_y)` of `dst`.
    ///
    /// Returns false and leaves `dst` untouched when the position lies
    /// outside the source. Both rasters share one sample model.
    fn resample(
        &self,
        src: &Raster,
        x: f64,
        y: f64,
        dst: &mut Raster,
        dst_x: usize,
        dst_y: usize,
    ) -> bool;
}

/// Interpolation method selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InterpolationMethod {
    /// Nearest neighbor (preserves exact values).
    #[default]
    Nearest,
    /// Bilinear interpolation (smooth, slight value changes).
    Bilinear,
    /// Bicubic interpolation (smoothest, more compute).
    Cubic,
}

impl InterpolationMethod {
    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "bilinear" => Self::Bilinear,
            "cubic" | "bicubic" => Self::Cubic,
            _ => Self::Nearest,
        }
    }

    pub fn interpolator(self) -> Arc<dyn Interpolator> {
        match self {
            Self::Nearest => Arc::new(Nearest),
            Self::Bilinear => Arc::new(Bilinear),
            Self::Cubic => Arc::new(Cubic),
        }
    }
}

impl fmt::Display for InterpolationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => write!(f, "nearest"),
            Self::Bilinear => write!(f, "bilinear"),
            Self::Cubic => write!(f, "cubic"),
        }
    }
}

fn inside(src: &Raster, x: f64, y: f64) -> bool {
    x >= 0.0 && y >= 0.0 && x < src.width() as f64 && y < src.height() as f64
}

/// Copies the bytes of the source pixel containing the position.
#[derive(Debug, Clone, Copy, Default)]
pub struct Nearest;

impl Interpolator for Nearest {
    fn name(&self) -> &'static str {
        "nearest"
    }

    fn resample(
        &self,
        src: &Raster,
        x: f64,
        y: f64,
        dst: &mut Raster,
        dst_x: usize,
        dst_y: usize,
    ) -> bool {
        if !inside(src, x, y) {
            return false;
        }
        dst.set_pixel(dst_x, dst_y, src.pixel(x.floor() as usize, y.floor() as usize));
        true
    }
}

/// Weighted mean of the four surrounding pixel centers.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bilinear;

impl Interpolator for Bilinear {
    fn name(&self) -> &'static str {
        "bilinear"
    }

    fn resample(
        &self,
        src: &Raster,
        x: f64,
        y: f64,
        dst: &mut Raster,
        dst_x: usize,
        dst_y: usize,
    ) -> bool {
        if !inside(src, x, y) {
            return false;
        }
        for band in 0..src.sample_model().bands {
            let value = bilinear_sample(src, band, x - 0.5, y - 0.5);
            dst.set_sample(dst_x, dst_y, band, value);
        }
        true
    }
}

/// Bilinear value of one band at center-based coordinates, clamped at edges.
fn bilinear_sample(src: &Raster, band: usize, fx: f64, fy: f64) -> f64 {
    let max_x = src.width() as i64 - 1;
    let max_y = src.height() as i64 - 1;
    let x0 = (fx.floor() as i64).clamp(0, max_x);
    let y0 = (fy.floor() as i64).clamp(0, max_y);
    let x1 = (x0 + 1).min(max_x);
    let y1 = (y0 + 1).min(max_y);

    let xf = (fx - x0 as f64).clamp(0.0, 1.0);
    let yf = (fy - y0 as f64).clamp(0.0, 1.0);

    let v00 = src.sample(x0 as usize, y0 as usize, band);
    let v10 = src.sample(x1 as usize, y0 as usize, band);
    let v01 = src.sample(x0 as usize, y1 as usize, band);
    let v11 = src.sample(x1 as usize, y1 as usize, band);

    // Handle NaN values - if any corner is NaN, return NaN
    if v00.is_nan() || v10.is_nan() || v01.is_nan() || v11.is_nan() {
        return f64::NAN;
    }

    let top = v00 * (1.0 - xf) + v10 * xf;
    let bottom = v01 * (1.0 - xf) + v11 * xf;
    top * (1.0 - yf) + bottom * yf
}

/// Catmull-Rom bicubic over the 4x4 neighborhood.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cubic;

impl Interpolator for Cubic {
    fn name(&self) -> &'static str {
        "cubic"
    }

    fn resample(
        &self,
        src: &Raster,
        x: f64,
        y: f64,
        dst: &mut Raster,
        dst_x: usize,
        dst_y: usize,
    ) -> bool {
        if !inside(src, x, y) {
            return false;
        }
        let (fx, fy) = (x - 0.5, y - 0.5);
        for band in 0..src.sample_model().bands {
            let value = cubic_sample(src, band, fx, fy);
            dst.set_sample(dst_x, dst_y, band, value);
        }
        true
    }
}

fn cubic_sample(src: &Raster, band: usize, fx: f64, fy: f64) -> f64 {
    let xi = fx.floor() as i64;
    let yi = fy.floor() as i64;
    let xf = fx - xi as f64;
    let yf = fy - yi as f64;

    let max_x = src.width() as i64 - 1;
    let max_y = src.height() as i64 - 1;

    let mut values = [[0.0f64; 4]; 4];
    for (j, row) in values.iter_mut().enumerate() {
        for (i, value) in row.iter_mut().enumerate() {
            let px = (xi + i as i64 - 1).clamp(0, max_x) as usize;
            let py = (yi + j as i64 - 1).clamp(0, max_y) as usize;
            *value = src.sample(px, py, band);

            // If any value is NaN, fall back to bilinear
            if value.is_nan() {
                return bilinear_sample(src, band, fx, fy);
            }
        }
    }

    let mut row_values = [0.0f64; 4];
    for (j, row) in values.iter().enumerate() {
        row_values[j] = cubic_1d(row[0], row[1], row[2], row[3], xf);
    }

    cubic_1d(row_values[0], row_values[1], row_values[2], row_values[3], yf)
}

/// 1D cubic interpolation using Catmull-Rom spline.
fn cubic_1d(p0: f64, p1: f64, p2: f64, p3: f64, t: f64) -> f64 {
    let t2 = t * t;
    let t3 = t2 * t;

    let a = -0.5 * p0 + 1.5 * p1 - 1.5 * p2 + 0.5 * p3;
    let b = p0 - 2.5 * p1 + 2.0 * p2 - 0.5 * p3;
    let c = -0.5 * p0 + 0.5 * p2;
    let d = p1;

    a * t3 + b * t2 + c * t + d
}

#[cfg(test)]
mod tests {
    use super::*;
    use coverage_common::{ColorModel, SampleModel, SampleType};

    fn grid_3x3() -> Raster {
        let data: Vec<f32> = vec![
            1.0, 2.0, 3.0,
            4.0, 5.0, 6.0,
            7.0, 8.0, 9.0,
        ];
        Raster::from_samples(3, 3, 1, ColorModel::Data, &data).unwrap()
    }

    fn one_pixel() -> Raster {
        Raster::new(1, 1, SampleModel::new(SampleType::F32, 1), ColorModel::Data)
    }

    #[test]
    fn test_nearest_copies_containing_pixel() {
        let src = grid_3x3();
        let mut dst = one_pixel();

        assert!(Nearest.resample(&src, 0.5, 0.5, &mut dst, 0, 0));
        assert_eq!(dst.sample(0, 0, 0), 1.0);
        assert!(Nearest.resample(&src, 1.99, 1.0, &mut dst, 0, 0));
        assert_eq!(dst.sample(0, 0, 0), 5.0);
        assert!(Nearest.resample(&src, 2.5, 2.5, &mut dst, 0, 0));
        assert_eq!(dst.sample(0, 0, 0), 9.0);
    }

    #[test]
    fn test_outside_source_leaves_destination() {
        let src = grid_3x3();
        let mut dst = one_pixel();
        dst.set_sample(0, 0, 0, 42.0);

        for method in [InterpolationMethod::Nearest, InterpolationMethod::Bilinear, InterpolationMethod::Cubic] {
            let interp = method.interpolator();
            assert!(!interp.resample(&src, -0.1, 1.0, &mut dst, 0, 0));
            assert!(!interp.resample(&src, 1.0, 3.0, &mut dst, 0, 0));
            assert_eq!(dst.sample(0, 0, 0), 42.0);
        }
    }

    #[test]
    fn test_bilinear_between_centers() {
        let data: Vec<f32> = vec![
            1.0, 2.0,
            3.0, 4.0,
        ];
        let src = Raster::from_samples(2, 2, 1, ColorModel::Data, &data).unwrap();
        let mut dst = one_pixel();

        // Pixel centers reproduce the source.
        assert!(Bilinear.resample(&src, 0.5, 0.5, &mut dst, 0, 0));
        assert_eq!(dst.sample(0, 0, 0), 1.0);
        assert!(Bilinear.resample(&src, 1.5, 1.5, &mut dst, 0, 0));
        assert_eq!(dst.sample(0, 0, 0), 4.0);

        // Midpoint between all four centers.
        assert!(Bilinear.resample(&src, 1.0, 1.0, &mut dst, 0, 0));
        assert!((dst.sample(0, 0, 0) - 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_bilinear_with_nan() {
        let data: Vec<f32> = vec![
            1.0, f32::NAN,
            3.0, 4.0,
        ];
        let src = Raster::from_samples(2, 2, 1, ColorModel::Data, &data).unwrap();
        let mut dst = one_pixel();
        assert!(Bilinear.resample(&src, 1.0, 1.0, &mut dst, 0, 0));
        assert!(dst.sample(0, 0, 0).is_nan());
    }

    #[test]
    fn test_cubic_reproduces_linear_ramp() {
        let data: Vec<f32> = (0..16).map(|i| (i % 4) as f32).collect();
        let src = Raster::from_samples(4, 4, 1, ColorModel::Data, &data).unwrap();
        let mut dst = one_pixel();
        assert!(Cubic.resample(&src, 2.0, 2.0, &mut dst, 0, 0));
        assert!((dst.sample(0, 0, 0) - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_method_from_str() {
        assert_eq!(InterpolationMethod::from_str("BILINEAR"), InterpolationMethod::Bilinear);
        assert_eq!(InterpolationMethod::from_str("bicubic"), InterpolationMethod::Cubic);
        assert_eq!(InterpolationMethod::from_str("whatever"), InterpolationMethod::Nearest);
        assert_eq!(InterpolationMethod::Cubic.interpolator().name(), "cubic");
    }
}
