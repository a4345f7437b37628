//! Coordinate reference system transformations.
//!
//! Provides the coordinate operations the pyramid store needs between the
//! systems described by [`coverage_common::Crs`]: pure axis-order changes,
//! WGS84 to Web Mercator, and chains of those. Operations are looked up
//! through a [`TransformProvider`] so callers can inject their own.

pub mod envelope;
pub mod error;
pub mod factory;
pub mod mercator;
pub mod operation;

pub use envelope::transform_envelope;
pub use error::ProjectionError;
pub use factory::{OperationFactory, TransformProvider};
pub use operation::{AffineOperation, ConcatenatedOperation, CoordinateOperation, MercatorOperation};
