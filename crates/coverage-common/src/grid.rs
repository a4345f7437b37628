//! Grid-to-world affine transforms.
//!
//! Pixel coordinates address pixel corners: pixel `(col, row)` covers
//! `[col, col + 1) x [row, row + 1)` and its center is `(col + 0.5, row + 0.5)`.
//! World coordinates are in the axis order of the CRS they belong to.

use nalgebra::Matrix3;

/// A 2D affine transform stored as a homogeneous 3x3 matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    matrix: Matrix3<f64>,
}

impl AffineTransform {
    /// Build from the six coefficients of
    /// `x' = m00*x + m01*y + m02`, `y' = m10*x + m11*y + m12`.
    pub fn new(m00: f64, m01: f64, m02: f64, m10: f64, m11: f64, m12: f64) -> Self {
        Self {
            matrix: Matrix3::new(m00, m01, m02, m10, m11, m12, 0.0, 0.0, 1.0),
        }
    }

    pub fn identity() -> Self {
        Self {
            matrix: Matrix3::identity(),
        }
    }

    pub fn from_matrix(matrix: Matrix3<f64>) -> Self {
        Self { matrix }
    }

    /// Scale then translate: `x' = sx*x + tx`, `y' = sy*y + ty`.
    pub fn scale_translate(sx: f64, sy: f64, tx: f64, ty: f64) -> Self {
        Self::new(sx, 0.0, tx, 0.0, sy, ty)
    }

    /// Exchange the two ordinates.
    pub fn axis_swap() -> Self {
        Self::new(0.0, 1.0, 0.0, 1.0, 0.0, 0.0)
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    /// The six affine coefficients in `[m00, m01, m02, m10, m11, m12]` order.
    pub fn coefficients(&self) -> [f64; 6] {
        let m = &self.matrix;
        [m[(0, 0)], m[(0, 1)], m[(0, 2)], m[(1, 0)], m[(1, 1)], m[(1, 2)]]
    }

    pub fn transform(&self, x: f64, y: f64) -> (f64, f64) {
        let m = &self.matrix;
        (
            m[(0, 0)] * x + m[(0, 1)] * y + m[(0, 2)],
            m[(1, 0)] * x + m[(1, 1)] * y + m[(1, 2)],
        )
    }

    /// Inverse transform, `None` when singular.
    pub fn inverse(&self) -> Option<Self> {
        self.matrix.try_inverse().map(Self::from_matrix)
    }

    /// Apply `self` first, then `next`.
    pub fn then(&self, next: &AffineTransform) -> Self {
        Self::from_matrix(next.matrix * self.matrix)
    }

    pub fn is_identity(&self, tolerance: f64) -> bool {
        (self.matrix - Matrix3::identity()).abs().max() <= tolerance
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_and_inverse() {
        let t = AffineTransform::scale_translate(0.5, -0.5, 10.0, 20.0);
        assert_eq!(t.transform(4.0, 2.0), (12.0, 19.0));

        let inv = t.inverse().unwrap();
        let (x, y) = inv.transform(12.0, 19.0);
        assert!((x - 4.0).abs() < 1e-12);
        assert!((y - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_then_applies_in_order() {
        let scale = AffineTransform::scale_translate(2.0, 3.0, 0.0, 0.0);
        let swap = AffineTransform::axis_swap();
        let combined = scale.then(&swap);
        assert_eq!(combined.transform(1.0, 1.0), (3.0, 2.0));
    }

    #[test]
    fn test_singular_has_no_inverse() {
        let t = AffineTransform::new(1.0, 1.0, 0.0, 2.0, 2.0, 0.0);
        assert!(t.inverse().is_none());
        assert!(AffineTransform::identity().is_identity(0.0));
    }
}
