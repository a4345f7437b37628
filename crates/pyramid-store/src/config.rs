//! Configuration for the pyramid store.

use serde::{Deserialize, Serialize};

use crate::interpolation::InterpolationMethod;

/// Runtime configuration shared by readers, writers and builders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PyramidStoreConfig {
    /// Tolerance factor `k` of the resolution policy: mosaics whose scale is
    /// at most `k` times the requested resolution qualify.
    pub resolution_tolerance: f64,

    /// Tile edge in pixels used when the builder creates mosaics.
    pub default_tile_size: u32,

    /// Value written into every band of pixels that carry no data.
    pub fill_value: f64,

    /// Resampler used by writers.
    pub interpolation: InterpolationMethod,

    /// Tiles fetched or merged concurrently.
    pub io_concurrency: usize,

    /// Idle reader/writer handles kept for reuse.
    pub max_pooled_handles: usize,

    /// Memory budget for the tile cache in megabytes (0 disables it).
    pub tile_cache_size_mb: usize,

    /// Payload compression of encoded tiles.
    pub compression: TileCompression,
}

impl Default for PyramidStoreConfig {
    fn default() -> Self {
        Self {
            resolution_tolerance: 2.0,
            default_tile_size: 256,
            fill_value: 0.0,
            interpolation: InterpolationMethod::Nearest,
            io_concurrency: 8,
            max_pooled_handles: 4,
            tile_cache_size_mb: 64,
            compression: TileCompression::Deflate,
        }
    }
}

impl PyramidStoreConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("PYRAMID_RESOLUTION_TOLERANCE") {
            if let Ok(k) = val.parse() {
                config.resolution_tolerance = k;
            }
        }

        if let Ok(val) = std::env::var("PYRAMID_TILE_SIZE") {
            if let Ok(size) = val.parse() {
                config.default_tile_size = size;
            }
        }

        if let Ok(val) = std::env::var("PYRAMID_FILL_VALUE") {
            if let Ok(fill) = val.parse() {
                config.fill_value = fill;
            }
        }

        if let Ok(val) = std::env::var("PYRAMID_INTERPOLATION") {
            config.interpolation = InterpolationMethod::from_str(&val);
        }

        if let Ok(val) = std::env::var("PYRAMID_IO_CONCURRENCY") {
            if let Ok(n) = val.parse() {
                config.io_concurrency = n;
            }
        }

        if let Ok(val) = std::env::var("PYRAMID_MAX_POOLED_HANDLES") {
            if let Ok(n) = val.parse() {
                config.max_pooled_handles = n;
            }
        }

        if let Ok(val) = std::env::var("PYRAMID_TILE_CACHE_MB") {
            if let Ok(size) = val.parse() {
                config.tile_cache_size_mb = size;
            }
        }

        if let Ok(val) = std::env::var("PYRAMID_TILE_COMPRESSION") {
            config.compression = TileCompression::from_str(&val);
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.resolution_tolerance >= 1.0) {
            return Err("resolution_tolerance must be >= 1".to_string());
        }

        if self.default_tile_size == 0 {
            return Err("default_tile_size must be > 0".to_string());
        }

        if self.io_concurrency == 0 {
            return Err("io_concurrency must be > 0".to_string());
        }

        if !self.fill_value.is_finite() && !self.fill_value.is_nan() {
            return Err("fill_value must be finite or NaN".to_string());
        }

        Ok(())
    }
}

/// Compression applied to tile payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TileCompression {
    None,
    #[default]
    Deflate,
}

impl TileCompression {
    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "none" | "raw" => Self::None,
            _ => Self::Deflate,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Deflate => "deflate",
        }
    }

    pub(crate) fn flag(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Deflate => 1,
        }
    }

    pub(crate) fn from_flag(flag: u8) -> Option<Self> {
        match flag {
            0 => Some(Self::None),
            1 => Some(Self::Deflate),
            _ => None,
        }
    }
}

impl std::fmt::Display for TileCompression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Builder Configuration
// ============================================================================

/// Controls which levels the pyramid builder creates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PyramidBuildConfig {
    /// Scale multiplier between consecutive levels.
    pub downscale_factor: u32,

    /// Stop adding coarser levels once the whole extent fits in this many
    /// tiles along each axis.
    pub min_tile_count: u32,

    /// Explicit level scales in world units per pixel. When set, no levels
    /// are derived.
    pub scales: Option<Vec<f64>>,

    /// Tile size for new mosaics; falls back to the store's default.
    pub tile_size: Option<(u32, u32)>,
}

impl Default for PyramidBuildConfig {
    fn default() -> Self {
        Self {
            downscale_factor: 2,
            min_tile_count: 1,
            scales: None,
            tile_size: None,
        }
    }
}

impl PyramidBuildConfig {
    /// Load builder configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("PYRAMID_DOWNSCALE_FACTOR") {
            if let Ok(factor) = val.parse() {
                config.downscale_factor = factor;
            }
        }

        if let Ok(val) = std::env::var("PYRAMID_MIN_TILE_COUNT") {
            if let Ok(count) = val.parse() {
                config.min_tile_count = count;
            }
        }

        if let Ok(val) = std::env::var("PYRAMID_SCALES") {
            let scales: Vec<f64> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if !scales.is_empty() {
                config.scales = Some(scales);
            }
        }

        config
    }

    pub fn with_scales(mut self, scales: Vec<f64>) -> Self {
        self.scales = Some(scales);
        self
    }

    pub fn with_tile_size(mut self, width: u32, height: u32) -> Self {
        self.tile_size = Some((width, height));
        self
    }

    /// Validate the builder configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.downscale_factor < 2 {
            return Err("pyramid downscale_factor must be >= 2".to_string());
        }

        if self.min_tile_count == 0 {
            return Err("pyramid min_tile_count must be > 0".to_string());
        }

        if let Some(scales) = &self.scales {
            if scales.is_empty() {
                return Err("pyramid scales must not be empty".to_string());
            }
            if scales.iter().any(|s| !(*s > 0.0) || !s.is_finite()) {
                return Err("pyramid scales must be finite and > 0".to_string());
            }
        }

        if let Some((w, h)) = self.tile_size {
            if w == 0 || h == 0 {
                return Err("pyramid tile_size must be > 0".to_string());
            }
        }

        Ok(())
    }
}
