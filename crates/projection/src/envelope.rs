//! Envelope reprojection.

use coverage_common::{Crs, Envelope};

use crate::error::ProjectionError;
use crate::operation::CoordinateOperation;

/// Points sampled along each edge for non-linear operations.
const EDGE_SAMPLES: usize = 32;

/// Transform the horizontal part of `envelope` into `target`.
///
/// Linear operations map the four corners; other operations sample every
/// edge, so the result bounds the curved image of the source box. Extra-axis
/// ranges are copied unchanged.
pub fn transform_envelope(
    envelope: &Envelope,
    target: &Crs,
    operation: &dyn CoordinateOperation,
) -> Result<Envelope, ProjectionError> {
    if !envelope.is_bounded(0) || !envelope.is_bounded(1) {
        return Err(ProjectionError::InvalidEnvelope(format!(
            "horizontal range of {:?}..{:?} is not finite",
            envelope.lower, envelope.upper
        )));
    }
    if target.dimension() != envelope.dimension() {
        return Err(ProjectionError::InvalidEnvelope(format!(
            "{} has {} dimensions, envelope has {}",
            target,
            target.dimension(),
            envelope.dimension()
        )));
    }

    let (x0, y0) = (envelope.lower[0], envelope.lower[1]);
    let (x1, y1) = (envelope.upper[0], envelope.upper[1]);

    let samples = if operation.as_affine().is_some() {
        1
    } else {
        EDGE_SAMPLES
    };

    let mut lower = [f64::INFINITY; 2];
    let mut upper = [f64::NEG_INFINITY; 2];
    for t in 0..=samples {
        let frac = t as f64 / samples as f64;
        let x = x0 + frac * (x1 - x0);
        let y = y0 + frac * (y1 - y0);

        for (px, py) in [(x, y0), (x, y1), (x0, y), (x1, y)] {
            let (tx, ty) = operation.transform(px, py)?;
            lower[0] = lower[0].min(tx);
            lower[1] = lower[1].min(ty);
            upper[0] = upper[0].max(tx);
            upper[1] = upper[1].max(ty);
        }
    }

    let mut out_lower = envelope.lower.clone();
    let mut out_upper = envelope.upper.clone();
    out_lower[..2].copy_from_slice(&lower);
    out_upper[..2].copy_from_slice(&upper);

    Ok(Envelope {
        crs: target.clone(),
        lower: out_lower,
        upper: out_upper,
    })
}
