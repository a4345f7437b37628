//! Composition of 2D coverages along extra axes.
//!
//! Each slice owns the half-open interval reaching halfway to its
//! neighbours. The first and last slices mirror their single neighbour
//! distance; a lone slice spans the whole axis.

use std::ops::Range;

use coverage_common::{CoverageError, Result};

/// One slice of a stack.
#[derive(Debug, Clone)]
pub struct StackElement<T> {
    pub center: f64,
    pub range: Range<f64>,
    pub value: StackLevel<T>,
}

impl<T> StackElement<T> {
    pub fn contains(&self, value: f64) -> bool {
        self.range.start <= value && value < self.range.end
    }
}

/// Either a 2D coverage or a stack over the next extra axis.
#[derive(Debug, Clone)]
pub enum StackLevel<T> {
    Coverage(T),
    Nested(CoverageStack<T>),
}

/// Ordered, range-indexed slices along one extra axis.
#[derive(Debug, Clone)]
pub struct CoverageStack<T> {
    /// Index of the axis in the full CRS.
    axis: usize,
    elements: Vec<StackElement<T>>,
}

impl<T> CoverageStack<T> {
    /// Stack one level of `(center, coverage)` pairs along `axis`.
    pub fn new(axis: usize, slices: Vec<(f64, T)>) -> Result<Self> {
        Self::from_levels(
            axis,
            slices
                .into_iter()
                .map(|(center, coverage)| (center, StackLevel::Coverage(coverage)))
                .collect(),
        )
    }

    /// Build nested stacks from slices located by one coordinate per extra
    /// axis. `first_axis` is the CRS index of the outermost axis.
    pub fn nested(first_axis: usize, slices: Vec<(Vec<f64>, T)>) -> Result<Self> {
        let depth = match slices.first() {
            Some((coords, _)) => coords.len(),
            None => return Self::from_levels(first_axis, Vec::new()),
        };
        if depth == 0 || slices.iter().any(|(coords, _)| coords.len() != depth) {
            return Err(CoverageError::InvalidParameter(format!(
                "every slice needs {} coordinate(s)",
                depth.max(1)
            )));
        }

        if depth == 1 {
            return Self::new(
                first_axis,
                slices.into_iter().map(|(coords, t)| (coords[0], t)).collect(),
            );
        }

        // Group by the outer coordinate, keeping first-seen order.
        let mut groups: Vec<(f64, Vec<(Vec<f64>, T)>)> = Vec::new();
        for (coords, coverage) in slices {
            let outer = coords[0];
            let rest = coords[1..].to_vec();
            match groups.iter_mut().find(|(c, _)| *c == outer) {
                Some((_, members)) => members.push((rest, coverage)),
                None => groups.push((outer, vec![(rest, coverage)])),
            }
        }

        let mut levels = Vec::with_capacity(groups.len());
        for (outer, members) in groups {
            let inner = Self::nested(first_axis + 1, members)?;
            levels.push((outer, StackLevel::Nested(inner)));
        }
        Self::from_levels(first_axis, levels)
    }

    fn from_levels(axis: usize, mut levels: Vec<(f64, StackLevel<T>)>) -> Result<Self> {
        if levels.iter().any(|(c, _)| !c.is_finite()) {
            return Err(CoverageError::InvalidParameter(
                "slice centers must be finite".to_string(),
            ));
        }
        levels.sort_by(|a, b| a.0.total_cmp(&b.0));
        if levels.windows(2).any(|w| w[0].0 == w[1].0) {
            return Err(CoverageError::InvalidParameter(format!(
                "duplicate slice center on axis {}",
                axis
            )));
        }

        let centers: Vec<f64> = levels.iter().map(|(c, _)| *c).collect();
        let elements = levels
            .into_iter()
            .enumerate()
            .map(|(i, (center, value))| StackElement {
                center,
                range: slice_range(&centers, i),
                value,
            })
            .collect();

        Ok(Self { axis, elements })
    }

    pub fn axis(&self) -> usize {
        self.axis
    }

    pub fn elements(&self) -> &[StackElement<T>] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Union of every slice range.
    pub fn extent(&self) -> Option<Range<f64>> {
        let first = self.elements.first()?;
        let last = self.elements.last()?;
        Some(first.range.start..last.range.end)
    }

    /// Slices whose range contains `value`.
    pub fn coverages_at(&self, value: f64) -> Vec<&StackElement<T>> {
        self.elements.iter().filter(|e| e.contains(value)).collect()
    }

    /// Walk down the nesting, one requested value per axis. `None` picks the
    /// first slice. Returns the centers crossed and the coverage reached.
    pub fn resolve(&self, values: &[Option<f64>]) -> Option<(Vec<f64>, &T)> {
        let element = match values.first().copied().flatten() {
            Some(v) => self.coverages_at(v).into_iter().next()?,
            None => self.elements.first()?,
        };

        match &element.value {
            StackLevel::Coverage(coverage) => Some((vec![element.center], coverage)),
            StackLevel::Nested(inner) => {
                let rest = values.get(1..).unwrap_or(&[]);
                let (mut centers, coverage) = inner.resolve(rest)?;
                centers.insert(0, element.center);
                Some((centers, coverage))
            }
        }
    }
}

fn slice_range(centers: &[f64], i: usize) -> Range<f64> {
    let c = centers[i];
    let below = if i > 0 { Some(c - centers[i - 1]) } else { None };
    let above = centers.get(i + 1).map(|next| next - c);

    match (below, above) {
        (Some(b), Some(a)) => (c - b / 2.0)..(c + a / 2.0),
        (None, Some(a)) => (c - a / 2.0)..(c + a / 2.0),
        (Some(b), None) => (c - b / 2.0)..(c + b / 2.0),
        (None, None) => f64::NEG_INFINITY..f64::INFINITY,
    }
}
