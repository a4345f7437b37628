//! Coordinate Reference System types and utilities.
//!
//! A [`Crs`] is a horizontal 2D system (a datum/projection code plus an axis
//! order) optionally followed by extra, non-spatial axes such as elevation or
//! time. Transforms between systems live in the `projection` crate; this
//! module only describes them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Horizontal datum/projection families understood by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrsCode {
    /// WGS84 geographic (degrees)
    Wgs84,
    /// Web Mercator (meters)
    WebMercator,
    /// Local cartesian system with no known relation to the earth
    Engineering,
}

/// Order of the two horizontal axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AxisOrder {
    /// East/easting first, north/northing second
    XY,
    /// North/northing first, east/easting second (EPSG:4326 style)
    YX,
}

impl AxisOrder {
    /// The opposite order.
    pub fn swapped(self) -> Self {
        match self {
            AxisOrder::XY => AxisOrder::YX,
            AxisOrder::YX => AxisOrder::XY,
        }
    }
}

/// A non-spatial axis appended after the horizontal ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExtraAxis {
    pub name: String,
    pub unit: String,
}

impl ExtraAxis {
    pub fn new(name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
        }
    }

    /// Elevation in meters above the reference surface.
    pub fn elevation() -> Self {
        Self::new("elevation", "m")
    }

    /// Time in seconds since an arbitrary epoch.
    pub fn time() -> Self {
        Self::new("time", "s")
    }
}

/// Full CRS definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Crs {
    pub code: CrsCode,
    pub axis_order: AxisOrder,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_axes: Vec<ExtraAxis>,
    /// Display name; metadata only, never part of equality.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Crs {
    pub fn new(code: CrsCode, axis_order: AxisOrder) -> Self {
        Self {
            code,
            axis_order,
            extra_axes: Vec::new(),
            name: None,
        }
    }

    /// EPSG:4326 with its authority axis order (latitude first).
    pub fn epsg_4326() -> Self {
        Self::new(CrsCode::Wgs84, AxisOrder::YX).with_name("WGS 84")
    }

    /// CRS:84, WGS84 with longitude first.
    pub fn crs_84() -> Self {
        Self::new(CrsCode::Wgs84, AxisOrder::XY).with_name("WGS 84 (CRS84)")
    }

    /// EPSG:3857 Web Mercator.
    pub fn web_mercator() -> Self {
        Self::new(CrsCode::WebMercator, AxisOrder::XY).with_name("WGS 84 / Pseudo-Mercator")
    }

    /// Cartesian engineering system with easting first.
    pub fn engineering() -> Self {
        Self::new(CrsCode::Engineering, AxisOrder::XY)
    }

    /// Parse a CRS identifier.
    ///
    /// Accepts formats like:
    /// - "EPSG:4326" (latitude, longitude)
    /// - "CRS:84" / "OGC:CRS84" (longitude, latitude)
    /// - "EPSG:3857" / "EPSG:900913"
    pub fn from_code(s: &str) -> Result<Self, CrsParseError> {
        let normalized = s.trim().to_uppercase();

        match normalized.as_str() {
            "EPSG:4326" => Ok(Self::epsg_4326()),
            "CRS:84" | "OGC:CRS84" => Ok(Self::crs_84()),
            "EPSG:3857" | "EPSG:900913" => Ok(Self::web_mercator()),
            _ => Err(CrsParseError::UnsupportedCrs(s.to_string())),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_extra_axis(mut self, axis: ExtraAxis) -> Self {
        self.extra_axes.push(axis);
        self
    }

    /// Same system with the two horizontal axes exchanged.
    pub fn swapped(&self) -> Self {
        Self {
            axis_order: self.axis_order.swapped(),
            name: None,
            ..self.clone()
        }
    }

    /// The horizontal part of this system, without extra axes.
    pub fn horizontal(&self) -> Self {
        Self {
            extra_axes: Vec::new(),
            ..self.clone()
        }
    }

    /// Total number of dimensions.
    pub fn dimension(&self) -> usize {
        2 + self.extra_axes.len()
    }

    /// Index of the east/west axis, which maps to tile columns.
    pub fn east_axis(&self) -> usize {
        match self.axis_order {
            AxisOrder::XY => 0,
            AxisOrder::YX => 1,
        }
    }

    /// Index of the north/south axis, which maps to tile rows.
    pub fn north_axis(&self) -> usize {
        1 - self.east_axis()
    }

    pub fn is_geographic(&self) -> bool {
        self.code == CrsCode::Wgs84
    }

    /// Equality that ignores the display name.
    pub fn equals_ignore_metadata(&self, other: &Crs) -> bool {
        self.code == other.code
            && self.axis_order == other.axis_order
            && self.extra_axes == other.extra_axes
    }

    /// True when both systems differ at most by horizontal axis order.
    pub fn same_datum(&self, other: &Crs) -> bool {
        self.code == other.code && self.extra_axes == other.extra_axes
    }
}

impl PartialEq for Crs {
    fn eq(&self, other: &Self) -> bool {
        self.equals_ignore_metadata(other)
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match (self.code, self.axis_order) {
            (CrsCode::Wgs84, AxisOrder::YX) => "EPSG:4326",
            (CrsCode::Wgs84, AxisOrder::XY) => "CRS:84",
            (CrsCode::WebMercator, AxisOrder::XY) => "EPSG:3857",
            (CrsCode::WebMercator, AxisOrder::YX) => "EPSG:3857 (northing, easting)",
            (CrsCode::Engineering, AxisOrder::XY) => "ENGINEERING",
            (CrsCode::Engineering, AxisOrder::YX) => "ENGINEERING (y, x)",
        };
        write!(f, "{}", code)?;
        for axis in &self.extra_axes {
            write!(f, " + {} [{}]", axis.name, axis.unit)?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CrsParseError {
    #[error("Unsupported CRS: {0}")]
    UnsupportedCrs(String),
}
