//! Pyramidal multi-resolution raster tile store.
//!
//! A dataset holds one [`Pyramid`] per CRS. Each pyramid holds
//! [`GridMosaic`] levels, regular grids of fixed-size tiles at one scale.
//! Tiles live in a [`storage::TileBackend`] and are addressed by
//! (dataset, pyramid, mosaic, col, row).
//!
//! - [`PyramidalCoverage`] owns the metadata and hands out handles
//! - [`CoverageReader`] selects a mosaic for a request and assembles tiles
//! - [`CoverageWriter`] reprojects a source raster and merges it into the
//!   tiles it overlaps, leaving other pixels untouched
//! - [`PyramidCoverageBuilder`] creates one mosaic per scale and fills them
//! - [`CoverageStack`] composes slices along extra axes such as elevation
//!   or time

pub mod builder;
pub mod codec;
pub mod config;
pub mod coverage;
pub mod grid_coverage;
pub mod interpolation;
pub mod mosaic;
pub mod pool;
pub mod pyramid;
pub mod reader;
pub mod resolution;
pub mod stack;
pub mod writer;

pub use builder::{BuildReport, PyramidCoverageBuilder};
pub use codec::{CodecError, TileCodec};
pub use config::{PyramidBuildConfig, PyramidStoreConfig, TileCompression};
pub use coverage::{Collaborators, PyramidalCoverage};
pub use grid_coverage::GridCoverage;
pub use interpolation::{Bilinear, Cubic, InterpolationMethod, Interpolator, Nearest};
pub use mosaic::{GridMosaic, GridSize, TileFormat, TileSize};
pub use pool::Handle;
pub use pyramid::{Pyramid, PyramidSet, PyramidSlice};
pub use reader::{CoverageReader, ReadCoverage, ReadParam, ReadResult};
pub use resolution::ResolutionPolicy;
pub use stack::{CoverageStack, StackElement, StackLevel};
pub use writer::{CoverageWriter, WriteParam, WriteReport};

pub use coverage_common::{CoverageError, Result};
