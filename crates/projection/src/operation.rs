//! Coordinate operations on the two horizontal ordinates.
//!
//! Input and output ordinates follow the axis order of the source and target
//! systems respectively; extra axes never pass through an operation.

use std::fmt;

use coverage_common::AffineTransform;

use crate::error::ProjectionError;
use crate::mercator::{lon_lat_to_mercator, mercator_to_lon_lat};

/// A point-wise, invertible transform between two 2D systems.
pub trait CoordinateOperation: Send + Sync + fmt::Debug {
    fn transform(&self, x: f64, y: f64) -> Result<(f64, f64), ProjectionError>;

    /// The reverse operation.
    fn inverse(&self) -> Box<dyn CoordinateOperation>;

    /// Linear form of the operation, when it has one.
    fn as_affine(&self) -> Option<AffineTransform> {
        None
    }

    fn is_identity(&self) -> bool {
        self.as_affine()
            .map(|affine| affine.is_identity(0.0))
            .unwrap_or(false)
    }
}

/// Identity, axis swaps, and any other linear change of ordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineOperation {
    transform: AffineTransform,
}

impl AffineOperation {
    pub fn new(transform: AffineTransform) -> Self {
        Self { transform }
    }

    pub fn identity() -> Self {
        Self::new(AffineTransform::identity())
    }

    pub fn axis_swap() -> Self {
        Self::new(AffineTransform::axis_swap())
    }
}

impl CoordinateOperation for AffineOperation {
    fn transform(&self, x: f64, y: f64) -> Result<(f64, f64), ProjectionError> {
        Ok(self.transform.transform(x, y))
    }

    fn inverse(&self) -> Box<dyn CoordinateOperation> {
        // Operations built by the factory are permutations, which are
        // always invertible.
        match self.transform.inverse() {
            Some(inverse) => Box::new(AffineOperation::new(inverse)),
            None => Box::new(AffineOperation::identity()),
        }
    }

    fn as_affine(&self) -> Option<AffineTransform> {
        Some(self.transform)
    }
}

/// WGS84 (longitude, latitude) to Web Mercator (easting, northing), or back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MercatorOperation {
    forward: bool,
}

impl MercatorOperation {
    pub fn forward() -> Self {
        Self { forward: true }
    }

    pub fn reverse() -> Self {
        Self { forward: false }
    }
}

impl CoordinateOperation for MercatorOperation {
    fn transform(&self, x: f64, y: f64) -> Result<(f64, f64), ProjectionError> {
        if !x.is_finite() || !y.is_finite() {
            return Err(ProjectionError::OutOfDomain {
                operation: format!("{:?}", self),
                x,
                y,
            });
        }
        if self.forward {
            Ok(lon_lat_to_mercator(x, y))
        } else {
            Ok(mercator_to_lon_lat(x, y))
        }
    }

    fn inverse(&self) -> Box<dyn CoordinateOperation> {
        Box::new(MercatorOperation {
            forward: !self.forward,
        })
    }
}

/// Operations applied one after another.
#[derive(Debug)]
pub struct ConcatenatedOperation {
    steps: Vec<Box<dyn CoordinateOperation>>,
}

impl ConcatenatedOperation {
    pub fn new(steps: Vec<Box<dyn CoordinateOperation>>) -> Self {
        Self { steps }
    }
}

impl CoordinateOperation for ConcatenatedOperation {
    fn transform(&self, x: f64, y: f64) -> Result<(f64, f64), ProjectionError> {
        self.steps
            .iter()
            .try_fold((x, y), |(x, y), step| step.transform(x, y))
    }

    fn inverse(&self) -> Box<dyn CoordinateOperation> {
        Box::new(ConcatenatedOperation {
            steps: self.steps.iter().rev().map(|step| step.inverse()).collect(),
        })
    }

    fn as_affine(&self) -> Option<AffineTransform> {
        self.steps
            .iter()
            .try_fold(AffineTransform::identity(), |acc, step| {
                step.as_affine().map(|affine| acc.then(&affine))
            })
    }
}
