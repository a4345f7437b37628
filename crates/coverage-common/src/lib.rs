//! Common types shared across the pyramid tile store crates.

pub mod crs;
pub mod envelope;
pub mod error;
pub mod grid;
pub mod raster;
pub mod tile;

pub use crs::{AxisOrder, Crs, CrsCode, ExtraAxis};
pub use envelope::{BoundingBox, Envelope};
pub use error::{CoverageError, Result};
pub use grid::AffineTransform;
pub use raster::{ColorModel, Raster, Sample, SampleModel, SampleType};
pub use tile::{TileCoord, TileKey, TileRange};
