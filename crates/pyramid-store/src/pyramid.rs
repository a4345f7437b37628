//! Pyramids and the per-dataset pyramid set.

use coverage_common::{BoundingBox, Crs, CoverageError, Envelope, Result};
use serde::{Deserialize, Serialize};

use crate::mosaic::{approx_eq, GridMosaic, GridSize, TileFormat, TileSize};
use crate::stack::CoverageStack;

/// Resolution levels sharing one CRS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pyramid {
    pub id: String,
    pub crs: Crs,
    pub mosaics: Vec<GridMosaic>,
}

/// Mosaics of a pyramid located at the same extra-axis coordinates.
#[derive(Debug, Clone)]
pub struct PyramidSlice<'a> {
    pub coordinates: Vec<f64>,
    pub mosaics: Vec<&'a GridMosaic>,
}

impl Pyramid {
    pub fn new(id: impl Into<String>, crs: Crs) -> Self {
        Self {
            id: id.into(),
            crs,
            mosaics: Vec::new(),
        }
    }

    pub fn mosaic(&self, id: &str) -> Result<&GridMosaic> {
        self.mosaics
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| CoverageError::NoSuchMosaic(format!("{}/{}", self.id, id)))
    }

    pub(crate) fn mosaic_mut(&mut self, id: &str) -> Result<&mut GridMosaic> {
        let pyramid_id = self.id.clone();
        self.mosaics
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| CoverageError::NoSuchMosaic(format!("{}/{}", pyramid_id, id)))
    }

    pub fn has_extra_axes(&self) -> bool {
        !self.crs.extra_axes.is_empty()
    }

    /// Scales of every mosaic, finest first, without duplicates.
    pub fn scales(&self) -> Vec<f64> {
        let mut scales: Vec<f64> = self.mosaics.iter().map(|m| m.scale).collect();
        scales.sort_by(|a, b| a.total_cmp(b));
        scales.dedup_by(|a, b| approx_eq(*a, *b));
        scales
    }

    /// Union of the mosaic extents.
    pub fn bbox(&self) -> Option<BoundingBox> {
        self.mosaics
            .iter()
            .map(|m| m.bbox(&self.crs))
            .reduce(|a, b| a.union(&b))
    }

    /// Union of the mosaic envelopes, extra axes included.
    pub fn envelope(&self) -> Option<Envelope> {
        let mut mosaics = self.mosaics.iter();
        let mut envelope = mosaics.next()?.envelope(&self.crs);
        for mosaic in mosaics {
            let other = mosaic.envelope(&self.crs);
            for d in 0..envelope.dimension() {
                envelope.lower[d] = envelope.lower[d].min(other.lower[d]);
                envelope.upper[d] = envelope.upper[d].max(other.upper[d]);
            }
        }
        Some(envelope)
    }

    /// Mosaics grouped by extra-axis coordinates, in first-seen order. A 2D
    /// pyramid has a single slice with no coordinates.
    pub fn slices(&self) -> Vec<PyramidSlice<'_>> {
        let mut slices: Vec<PyramidSlice<'_>> = Vec::new();
        for mosaic in &self.mosaics {
            let coords = mosaic.slice_coordinates();
            match slices
                .iter_mut()
                .find(|s| s.coordinates.as_slice() == coords)
            {
                Some(slice) => slice.mosaics.push(mosaic),
                None => slices.push(PyramidSlice {
                    coordinates: coords.to_vec(),
                    mosaics: vec![mosaic],
                }),
            }
        }
        slices
    }

    /// The slice at exactly `coordinates`.
    pub fn slice_at(&self, coordinates: &[f64]) -> Option<PyramidSlice<'_>> {
        self.slices().into_iter().find(|s| {
            s.coordinates.len() == coordinates.len()
                && s
                    .coordinates
                    .iter()
                    .zip(coordinates)
                    .all(|(a, b)| approx_eq(*a, *b))
        })
    }

    /// Stack of slices, nested one level per extra axis. `None` for 2D
    /// pyramids.
    pub fn stack(&self) -> Result<Option<CoverageStack<PyramidSlice<'_>>>> {
        if !self.has_extra_axes() {
            return Ok(None);
        }
        let slices = self
            .slices()
            .into_iter()
            .map(|slice| (slice.coordinates.clone(), slice))
            .collect();
        CoverageStack::nested(2, slices).map(Some)
    }
}

/// Every pyramid of a dataset. Serialized as the dataset catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PyramidSet {
    pub pyramids: Vec<Pyramid>,
}

impl PyramidSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.pyramids.is_empty()
    }

    pub fn pyramid(&self, id: &str) -> Result<&Pyramid> {
        self.pyramids
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| CoverageError::NoSuchPyramid(id.to_string()))
    }

    pub(crate) fn pyramid_mut(&mut self, id: &str) -> Result<&mut Pyramid> {
        self.pyramids
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| CoverageError::NoSuchPyramid(id.to_string()))
    }

    /// Pyramid whose CRS equals `crs`, ignoring metadata.
    pub fn find_by_crs(&self, crs: &Crs) -> Option<&Pyramid> {
        self.pyramids
            .iter()
            .find(|p| p.crs.equals_ignore_metadata(crs))
    }

    /// Id of the pyramid for `crs`, creating it when missing. The flag is
    /// true when a pyramid was created.
    pub fn create_pyramid(&mut self, crs: &Crs) -> (String, bool) {
        if let Some(existing) = self.find_by_crs(crs) {
            return (existing.id.clone(), false);
        }
        let id = self.next_pyramid_id();
        self.pyramids.push(Pyramid::new(id.clone(), crs.clone()));
        (id, true)
    }

    /// Id of the mosaic with this geometry, creating it when missing. The
    /// flag is true when a mosaic was created.
    pub fn create_mosaic(
        &mut self,
        pyramid_id: &str,
        grid_size: GridSize,
        tile_size: TileSize,
        upper_left: Vec<f64>,
        scale: f64,
    ) -> Result<(String, bool)> {
        let pyramid = self.pyramid_mut(pyramid_id)?;
        GridMosaic::validate(&pyramid.crs, grid_size, tile_size, &upper_left, scale)?;

        if let Some(existing) = pyramid
            .mosaics
            .iter()
            .find(|m| m.same_geometry(grid_size, tile_size, &upper_left, scale))
        {
            return Ok((existing.id.clone(), false));
        }

        let id = next_id("mosaic", pyramid.mosaics.iter().map(|m| m.id.as_str()));
        pyramid.mosaics.push(GridMosaic {
            id: id.clone(),
            pyramid_id: pyramid_id.to_string(),
            grid_size,
            tile_size,
            upper_left,
            scale,
            format: None,
        });
        Ok((id, true))
    }

    /// Fix the tile format of a mosaic. Declaring the same format again is
    /// a no-op; a different one fails. Returns true when the format was set.
    pub fn declare_format(
        &mut self,
        pyramid_id: &str,
        mosaic_id: &str,
        format: TileFormat,
    ) -> Result<bool> {
        let mosaic = self.pyramid_mut(pyramid_id)?.mosaic_mut(mosaic_id)?;
        match mosaic.format {
            Some(existing) if existing.sample_model != format.sample_model => Err(
                CoverageError::incompatible(existing.sample_model, format.sample_model),
            ),
            Some(_) => Ok(false),
            None => {
                mosaic.format = Some(format);
                Ok(true)
            }
        }
    }

    /// Envelope of the dataset in the CRS of its first pyramid.
    pub fn envelope(&self) -> Option<Envelope> {
        let first = self.pyramids.first()?;
        let mut envelope = first.envelope()?;
        for other in self.pyramids[1..]
            .iter()
            .filter(|p| p.crs.equals_ignore_metadata(&first.crs))
        {
            if let Some(e) = other.envelope() {
                for d in 0..envelope.dimension() {
                    envelope.lower[d] = envelope.lower[d].min(e.lower[d]);
                    envelope.upper[d] = envelope.upper[d].max(e.upper[d]);
                }
            }
        }
        Some(envelope)
    }

    /// Scales per pyramid, finest first.
    pub fn resolutions(&self) -> Vec<(String, Vec<f64>)> {
        self.pyramids
            .iter()
            .map(|p| (p.id.clone(), p.scales()))
            .collect()
    }

    /// Finest scale of any pyramid.
    pub fn finest_scale(&self) -> Option<f64> {
        self.pyramids
            .iter()
            .flat_map(|p| p.mosaics.iter().map(|m| m.scale))
            .min_by(|a, b| a.total_cmp(b))
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    fn next_pyramid_id(&self) -> String {
        next_id("pyramid", self.pyramids.iter().map(|p| p.id.as_str()))
    }
}

/// First `{prefix}-{n}` not already taken.
fn next_id<'a>(prefix: &str, taken: impl Iterator<Item = &'a str> + Clone) -> String {
    (0..)
        .map(|n| format!("{}-{}", prefix, n))
        .find(|candidate| !taken.clone().any(|t| t == candidate))
        .unwrap_or_else(|| prefix.to_string())
}
