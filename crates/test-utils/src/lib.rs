//! Shared test utilities for the pyramid-store workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Raster generators with verifiable pixel patterns
//! - Grid-to-CRS helpers for both axis orders
//! - Backend fixtures (in-memory and temporary local directories)
//! - Approximate and per-region assertion macros
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{fixtures, solid_rgba};
//! ```

pub mod fixtures;
pub mod generators;

// Re-export commonly used items at the crate root
pub use fixtures::*;
pub use generators::*;

/// Assert two numbers differ by at most `epsilon`.
///
/// ```ignore
/// assert_approx_eq!(scale, 0.5, 1e-12);
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($actual:expr, $expected:expr, $epsilon:expr) => {{
        let (actual, expected) = ($actual as f64, $expected as f64);
        let epsilon = $epsilon as f64;
        assert!(
            (actual - expected).abs() <= epsilon,
            "assertion failed: {} is not within {} of {}",
            actual,
            epsilon,
            expected
        );
    }};
}

/// Assert two world positions agree on both ordinates.
///
/// ```ignore
/// assert_point_approx_eq!(transform.transform(0.0, 0.0), (10.0, 20.0), 1e-9);
/// ```
#[macro_export]
macro_rules! assert_point_approx_eq {
    ($actual:expr, $expected:expr, $epsilon:expr) => {{
        let (ax, ay): (f64, f64) = $actual;
        let (ex, ey): (f64, f64) = $expected;
        $crate::assert_approx_eq!(ax, ex, $epsilon);
        $crate::assert_approx_eq!(ay, ey, $epsilon);
    }};
}

/// Assert that every pixel of a raster region holds `expected` bytes.
///
/// ```ignore
/// assert_region_eq!(raster, (0, 0, 10, 10), &RED);
/// ```
#[macro_export]
macro_rules! assert_region_eq {
    ($raster:expr, ($x:expr, $y:expr, $w:expr, $h:expr), $expected:expr) => {{
        let raster = &$raster;
        let expected: &[u8] = $expected;
        for py in $y..$y + $h {
            for px in $x..$x + $w {
                assert_eq!(
                    raster.pixel(px, py),
                    expected,
                    "pixel ({}, {}) differs",
                    px,
                    py
                );
            }
        }
    }};
}
