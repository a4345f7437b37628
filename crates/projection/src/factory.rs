//! Lookup of coordinate operations between two systems.

use coverage_common::{AxisOrder, Crs, CrsCode};
use tracing::debug;

use crate::error::ProjectionError;
use crate::operation::{AffineOperation, ConcatenatedOperation, CoordinateOperation, MercatorOperation};

/// Supplies coordinate operations between reference systems.
///
/// The store only ever asks for horizontal operations; both systems must
/// carry the same extra axes.
pub trait TransformProvider: Send + Sync {
    fn find_operation(
        &self,
        source: &Crs,
        target: &Crs,
    ) -> Result<Box<dyn CoordinateOperation>, ProjectionError>;
}

/// Built-in provider covering axis swaps and WGS84/Web Mercator.
#[derive(Debug, Clone, Copy, Default)]
pub struct OperationFactory;

impl OperationFactory {
    pub fn new() -> Self {
        Self
    }

    fn unsupported(source: &Crs, target: &Crs) -> ProjectionError {
        ProjectionError::Unsupported {
            source_crs: source.to_string(),
            target_crs: target.to_string(),
        }
    }

    /// Step taking ordinates in `order` to (east, north).
    fn to_xy(order: AxisOrder) -> Option<Box<dyn CoordinateOperation>> {
        match order {
            AxisOrder::XY => None,
            AxisOrder::YX => Some(Box::new(AffineOperation::axis_swap())),
        }
    }
}

impl TransformProvider for OperationFactory {
    fn find_operation(
        &self,
        source: &Crs,
        target: &Crs,
    ) -> Result<Box<dyn CoordinateOperation>, ProjectionError> {
        if source.extra_axes != target.extra_axes {
            return Err(Self::unsupported(source, target));
        }

        if source.code == target.code {
            return Ok(if source.axis_order == target.axis_order {
                Box::new(AffineOperation::identity())
            } else {
                Box::new(AffineOperation::axis_swap())
            });
        }

        let projection: Box<dyn CoordinateOperation> = match (source.code, target.code) {
            (CrsCode::Wgs84, CrsCode::WebMercator) => Box::new(MercatorOperation::forward()),
            (CrsCode::WebMercator, CrsCode::Wgs84) => Box::new(MercatorOperation::reverse()),
            _ => return Err(Self::unsupported(source, target)),
        };

        let mut steps = Vec::with_capacity(3);
        if let Some(step) = Self::to_xy(source.axis_order) {
            steps.push(step);
        }
        steps.push(projection);
        if let Some(step) = Self::to_xy(target.axis_order) {
            // Swapping is its own inverse.
            steps.push(step);
        }

        debug!(source = %source, target = %target, steps = steps.len(), "Built coordinate operation");
        Ok(Box::new(ConcatenatedOperation::new(steps)))
    }
}
