//! A raster located in a CRS.

use coverage_common::{AffineTransform, Crs, CoverageError, Envelope, Raster, Result};
use nalgebra::DMatrix;

/// Raster plus its pixel-to-world transform.
///
/// `grid_to_crs` maps pixel corners to the two horizontal ordinates in the
/// axis order of `crs`. `slice` holds one ordinate per extra axis of `crs`.
#[derive(Debug, Clone, PartialEq)]
pub struct GridCoverage {
    pub raster: Raster,
    pub grid_to_crs: AffineTransform,
    pub crs: Crs,
    pub slice: Vec<f64>,
}

impl GridCoverage {
    pub fn new(raster: Raster, grid_to_crs: AffineTransform, crs: Crs) -> Self {
        Self {
            raster,
            grid_to_crs,
            crs,
            slice: Vec::new(),
        }
    }

    pub fn with_slice(mut self, slice: Vec<f64>) -> Self {
        self.slice = slice;
        self
    }

    fn check_slice(&self) -> Result<()> {
        if self.slice.len() != self.crs.extra_axes.len() {
            return Err(CoverageError::InvalidParameter(format!(
                "{} has {} extra axes but the coverage is located by {} ordinate(s)",
                self.crs,
                self.crs.extra_axes.len(),
                self.slice.len()
            )));
        }
        Ok(())
    }

    /// Extent of the raster; extra axes collapse to the slice ordinates.
    pub fn envelope(&self) -> Result<Envelope> {
        self.check_slice()?;
        let w = self.raster.width() as f64;
        let h = self.raster.height() as f64;

        let mut lower = vec![f64::INFINITY; 2];
        let mut upper = vec![f64::NEG_INFINITY; 2];
        for (px, py) in [(0.0, 0.0), (w, 0.0), (0.0, h), (w, h)] {
            let (a, b) = self.grid_to_crs.transform(px, py);
            lower[0] = lower[0].min(a);
            lower[1] = lower[1].min(b);
            upper[0] = upper[0].max(a);
            upper[1] = upper[1].max(b);
        }
        lower.extend_from_slice(&self.slice);
        upper.extend_from_slice(&self.slice);

        Envelope::new(self.crs.clone(), lower, upper)
    }

    /// Ground size of one pixel along the raster columns and rows.
    pub fn pixel_size(&self) -> (f64, f64) {
        let [m00, m01, _, m10, m11, _] = self.grid_to_crs.coefficients();
        (m00.hypot(m10), m01.hypot(m11))
    }

    /// Full N-D grid-to-CRS matrix in homogeneous form.
    ///
    /// The horizontal block is `grid_to_crs`; each extra axis adds a unit
    /// row whose translation is the slice ordinate.
    pub fn grid_to_crs_nd(&self) -> DMatrix<f64> {
        let n = 2 + self.slice.len();
        let [m00, m01, m02, m10, m11, m12] = self.grid_to_crs.coefficients();

        let mut matrix = DMatrix::identity(n + 1, n + 1);
        matrix[(0, 0)] = m00;
        matrix[(0, 1)] = m01;
        matrix[(0, n)] = m02;
        matrix[(1, 0)] = m10;
        matrix[(1, 1)] = m11;
        matrix[(1, n)] = m12;
        for (k, value) in self.slice.iter().enumerate() {
            matrix[(2 + k, n)] = *value;
        }
        matrix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coverage_common::{ColorModel, ExtraAxis, SampleModel, SampleType};

    fn raster(w: usize, h: usize) -> Raster {
        Raster::new(w, h, SampleModel::new(SampleType::U8, 1), ColorModel::Gray)
    }

    #[test]
    fn test_envelope_follows_axis_order() {
        let xy = GridCoverage::new(
            raster(10, 5),
            AffineTransform::new(2.0, 0.0, 100.0, 0.0, -2.0, 50.0),
            Crs::crs_84(),
        );
        let env = xy.envelope().unwrap();
        assert_eq!(env.lower, vec![100.0, 40.0]);
        assert_eq!(env.upper, vec![120.0, 50.0]);

        let yx = GridCoverage::new(
            raster(10, 5),
            AffineTransform::new(0.0, -2.0, 50.0, 2.0, 0.0, 100.0),
            Crs::epsg_4326(),
        );
        let env = yx.envelope().unwrap();
        assert_eq!(env.lower, vec![40.0, 100.0]);
        assert_eq!(env.upper, vec![50.0, 120.0]);
        assert_eq!(yx.pixel_size(), (2.0, 2.0));
    }

    #[test]
    fn test_slice_must_match_extra_axes() {
        let crs = Crs::crs_84().with_extra_axis(ExtraAxis::time());
        let coverage = GridCoverage::new(raster(1, 1), AffineTransform::identity(), crs);
        assert!(coverage.envelope().is_err());

        let env = coverage.with_slice(vec![3600.0]).envelope().unwrap();
        assert_eq!((env.lower[2], env.upper[2]), (3600.0, 3600.0));
    }

    #[test]
    fn test_nd_transform() {
        let crs = Crs::crs_84()
            .with_extra_axis(ExtraAxis::elevation())
            .with_extra_axis(ExtraAxis::time());
        let coverage = GridCoverage::new(
            raster(1, 1),
            AffineTransform::new(0.5, 0.0, 10.0, 0.0, -0.5, 20.0),
            crs,
        )
        .with_slice(vec![-9.0, 21.0]);

        let m = coverage.grid_to_crs_nd();
        assert_eq!(m.nrows(), 5);
        assert_eq!(m[(0, 0)], 0.5);
        assert_eq!(m[(1, 1)], -0.5);
        assert_eq!(m[(0, 4)], 10.0);
        assert_eq!(m[(1, 4)], 20.0);
        assert_eq!(m[(2, 2)], 1.0);
        assert_eq!(m[(2, 4)], -9.0);
        assert_eq!(m[(3, 4)], 21.0);
        assert_eq!(m[(4, 4)], 1.0);
    }
}
