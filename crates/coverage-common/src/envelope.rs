//! Bounding box and envelope types.

use serde::{Deserialize, Serialize};

use crate::crs::Crs;
use crate::error::{CoverageError, Result};

/// A horizontal bounding box expressed in east/north terms.
///
/// `x` is always the east/west axis and `y` the north/south axis, whatever
/// the axis order of the CRS the box was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a new bounding box from corner coordinates.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Smallest box holding every point; `None` for an empty iterator.
    pub fn from_points(points: impl IntoIterator<Item = (f64, f64)>) -> Option<Self> {
        let mut iter = points.into_iter();
        let (x, y) = iter.next()?;
        let mut bbox = Self::new(x, y, x, y);
        for (x, y) in iter {
            bbox.min_x = bbox.min_x.min(x);
            bbox.min_y = bbox.min_y.min(y);
            bbox.max_x = bbox.max_x.max(x);
            bbox.max_y = bbox.max_y.max(y);
        }
        Some(bbox)
    }

    /// Width of the bounding box in coordinate units.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height of the bounding box in coordinate units.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Check if this bbox intersects another with a non-empty area.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x < other.max_x
            && self.max_x > other.min_x
            && self.min_y < other.max_y
            && self.max_y > other.min_y
    }

    /// Compute the intersection of two bounding boxes.
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        if !self.intersects(other) {
            return None;
        }

        Some(BoundingBox {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        })
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Check if a point is contained within this bbox.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
}

/// An axis-aligned box in a CRS, one `[lower, upper]` range per dimension.
///
/// Dimensions follow the CRS order: the two horizontal axes first, then the
/// extra axes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub crs: Crs,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl Envelope {
    pub fn new(crs: Crs, lower: Vec<f64>, upper: Vec<f64>) -> Result<Self> {
        if lower.len() != crs.dimension() || upper.len() != crs.dimension() {
            return Err(CoverageError::InvalidParameter(format!(
                "envelope has {}/{} ordinates but {} has {} dimensions",
                lower.len(),
                upper.len(),
                crs,
                crs.dimension()
            )));
        }
        Ok(Self { crs, lower, upper })
    }

    /// Horizontal envelope from an east/north box. Extra axes, if the CRS has
    /// any, are left unbounded.
    pub fn from_bbox(crs: Crs, bbox: &BoundingBox) -> Self {
        let dim = crs.dimension();
        let mut lower = vec![f64::NEG_INFINITY; dim];
        let mut upper = vec![f64::INFINITY; dim];
        let (e, n) = (crs.east_axis(), crs.north_axis());
        lower[e] = bbox.min_x;
        upper[e] = bbox.max_x;
        lower[n] = bbox.min_y;
        upper[n] = bbox.max_y;
        Self { crs, lower, upper }
    }

    /// The horizontal extent in east/north terms.
    pub fn horizontal_bbox(&self) -> BoundingBox {
        let (e, n) = (self.crs.east_axis(), self.crs.north_axis());
        BoundingBox::new(self.lower[e], self.lower[n], self.upper[e], self.upper[n])
    }

    /// Set the range of one dimension.
    pub fn with_range(mut self, dimension: usize, lower: f64, upper: f64) -> Result<Self> {
        if dimension >= self.dimension() {
            return Err(CoverageError::InvalidParameter(format!(
                "dimension {} out of range for {}",
                dimension, self.crs
            )));
        }
        self.lower[dimension] = lower.min(upper);
        self.upper[dimension] = lower.max(upper);
        Ok(self)
    }

    pub fn dimension(&self) -> usize {
        self.lower.len()
    }

    pub fn span(&self, dimension: usize) -> f64 {
        self.upper[dimension] - self.lower[dimension]
    }

    pub fn median(&self, dimension: usize) -> f64 {
        (self.lower[dimension] + self.upper[dimension]) / 2.0
    }

    /// True when a dimension carries a finite range.
    pub fn is_bounded(&self, dimension: usize) -> bool {
        self.lower[dimension].is_finite() && self.upper[dimension].is_finite()
    }

    /// True when any dimension has a non-positive span.
    pub fn is_empty(&self) -> bool {
        self.lower.iter().zip(&self.upper).any(|(lo, hi)| !(hi > lo))
    }
}
