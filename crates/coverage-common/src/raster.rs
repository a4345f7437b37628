//! In-memory rasters with a fixed pixel/sample/color model.
//!
//! Samples are stored pixel-interleaved in native byte order, row-major from
//! the top-left pixel. Every tile of a mosaic and every raster returned by a
//! read share one [`SampleModel`] and [`ColorModel`].

use std::fmt;

use bytemuck::Pod;
use serde::{Deserialize, Serialize};

use crate::error::{CoverageError, Result};

/// Numeric type of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleType {
    U8,
    U16,
    I16,
    I32,
    F32,
    F64,
}

impl SampleType {
    /// Size of one sample in bytes.
    pub fn size(self) -> usize {
        match self {
            SampleType::U8 => 1,
            SampleType::U16 | SampleType::I16 => 2,
            SampleType::I32 | SampleType::F32 => 4,
            SampleType::F64 => 8,
        }
    }

    pub fn is_integer(self) -> bool {
        !matches!(self, SampleType::F32 | SampleType::F64)
    }

    /// Stable one-byte tag used by the tile codec.
    pub fn tag(self) -> u8 {
        match self {
            SampleType::U8 => 0,
            SampleType::U16 => 1,
            SampleType::I16 => 2,
            SampleType::I32 => 3,
            SampleType::F32 => 4,
            SampleType::F64 => 5,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => SampleType::U8,
            1 => SampleType::U16,
            2 => SampleType::I16,
            3 => SampleType::I32,
            4 => SampleType::F32,
            5 => SampleType::F64,
            _ => return None,
        })
    }

    fn decode(self, bytes: &[u8]) -> f64 {
        match self {
            SampleType::U8 => bytes[0] as f64,
            SampleType::U16 => bytemuck::pod_read_unaligned::<u16>(bytes) as f64,
            SampleType::I16 => bytemuck::pod_read_unaligned::<i16>(bytes) as f64,
            SampleType::I32 => bytemuck::pod_read_unaligned::<i32>(bytes) as f64,
            SampleType::F32 => bytemuck::pod_read_unaligned::<f32>(bytes) as f64,
            SampleType::F64 => bytemuck::pod_read_unaligned::<f64>(bytes),
        }
    }

    fn encode(self, value: f64, out: &mut [u8]) {
        // Float-to-int `as` casts saturate; round first so interpolated
        // values land on the nearest representable sample.
        match self {
            SampleType::U8 => out[0] = value.round() as u8,
            SampleType::U16 => out.copy_from_slice(bytemuck::bytes_of(&(value.round() as u16))),
            SampleType::I16 => out.copy_from_slice(bytemuck::bytes_of(&(value.round() as i16))),
            SampleType::I32 => out.copy_from_slice(bytemuck::bytes_of(&(value.round() as i32))),
            SampleType::F32 => out.copy_from_slice(bytemuck::bytes_of(&(value as f32))),
            SampleType::F64 => out.copy_from_slice(bytemuck::bytes_of(&value)),
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SampleType::U8 => "u8",
            SampleType::U16 => "u16",
            SampleType::I16 => "i16",
            SampleType::I32 => "i32",
            SampleType::F32 => "f32",
            SampleType::F64 => "f64",
        };
        write!(f, "{}", name)
    }
}

/// Rust types usable as raster samples.
pub trait Sample: Pod {
    const TYPE: SampleType;
}

impl Sample for u8 {
    const TYPE: SampleType = SampleType::U8;
}
impl Sample for u16 {
    const TYPE: SampleType = SampleType::U16;
}
impl Sample for i16 {
    const TYPE: SampleType = SampleType::I16;
}
impl Sample for i32 {
    const TYPE: SampleType = SampleType::I32;
}
impl Sample for f32 {
    const TYPE: SampleType = SampleType::F32;
}
impl Sample for f64 {
    const TYPE: SampleType = SampleType::F64;
}

/// Band layout of a pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SampleModel {
    pub sample_type: SampleType,
    pub bands: usize,
}

impl SampleModel {
    pub fn new(sample_type: SampleType, bands: usize) -> Self {
        Self { sample_type, bands }
    }

    /// Bytes per pixel.
    pub fn pixel_stride(&self) -> usize {
        self.sample_type.size() * self.bands
    }
}

impl fmt::Display for SampleModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} band(s) of {}", self.bands, self.sample_type)
    }
}

/// How band values are interpreted for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColorModel {
    Gray,
    Rgb,
    Rgba,
    /// Measurement data with no color interpretation
    #[default]
    Data,
}

impl ColorModel {
    pub fn tag(self) -> u8 {
        match self {
            ColorModel::Gray => 0,
            ColorModel::Rgb => 1,
            ColorModel::Rgba => 2,
            ColorModel::Data => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => ColorModel::Gray,
            1 => ColorModel::Rgb,
            2 => ColorModel::Rgba,
            3 => ColorModel::Data,
            _ => return None,
        })
    }
}

/// A pixel-interleaved raster.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    width: usize,
    height: usize,
    model: SampleModel,
    color: ColorModel,
    data: Vec<u8>,
}

impl Raster {
    /// Zero-initialized raster.
    pub fn new(width: usize, height: usize, model: SampleModel, color: ColorModel) -> Self {
        Self {
            width,
            height,
            model,
            color,
            data: vec![0; width * height * model.pixel_stride()],
        }
    }

    /// Raster with every pixel set to `fill`. A single fill value applies to
    /// every band; otherwise one value per band is expected.
    pub fn filled(
        width: usize,
        height: usize,
        model: SampleModel,
        color: ColorModel,
        fill: &[f64],
    ) -> Self {
        let mut pixel = vec![0u8; model.pixel_stride()];
        let size = model.sample_type.size();
        for band in 0..model.bands {
            let value = fill
                .get(band)
                .or_else(|| fill.first())
                .copied()
                .unwrap_or(0.0);
            model
                .sample_type
                .encode(value, &mut pixel[band * size..(band + 1) * size]);
        }

        let mut data = Vec::with_capacity(width * height * pixel.len());
        for _ in 0..width * height {
            data.extend_from_slice(&pixel);
        }

        Self {
            width,
            height,
            model,
            color,
            data,
        }
    }

    /// Wrap raw native-order bytes.
    pub fn from_bytes(
        width: usize,
        height: usize,
        model: SampleModel,
        color: ColorModel,
        data: Vec<u8>,
    ) -> Result<Self> {
        let expected = width
            .checked_mul(height)
            .and_then(|pixels| pixels.checked_mul(model.pixel_stride()))
            .ok_or_else(|| {
                CoverageError::InvalidParameter(format!(
                    "raster {}x{} of {} overflows",
                    width, height, model
                ))
            })?;
        if data.len() != expected {
            return Err(CoverageError::InvalidParameter(format!(
                "raster {}x{} of {} needs {} bytes, got {}",
                width,
                height,
                model,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            model,
            color,
            data,
        })
    }

    /// Build from typed, pixel-interleaved samples.
    pub fn from_samples<T: Sample>(
        width: usize,
        height: usize,
        bands: usize,
        color: ColorModel,
        samples: &[T],
    ) -> Result<Self> {
        Self::from_bytes(
            width,
            height,
            SampleModel::new(T::TYPE, bands),
            color,
            bytemuck::cast_slice(samples).to_vec(),
        )
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn sample_model(&self) -> SampleModel {
        self.model
    }

    pub fn color_model(&self) -> ColorModel {
        self.color
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    fn offset(&self, x: usize, y: usize) -> usize {
        (y * self.width + x) * self.model.pixel_stride()
    }

    /// Raw bytes of one pixel.
    pub fn pixel(&self, x: usize, y: usize) -> &[u8] {
        let start = self.offset(x, y);
        &self.data[start..start + self.model.pixel_stride()]
    }

    pub fn set_pixel(&mut self, x: usize, y: usize, bytes: &[u8]) {
        let start = self.offset(x, y);
        let stride = self.model.pixel_stride();
        self.data[start..start + stride].copy_from_slice(bytes);
    }

    /// Sample value widened to f64.
    pub fn sample(&self, x: usize, y: usize, band: usize) -> f64 {
        let size = self.model.sample_type.size();
        let start = self.offset(x, y) + band * size;
        self.model.sample_type.decode(&self.data[start..start + size])
    }

    /// Store a sample, rounding and saturating for integer types.
    pub fn set_sample(&mut self, x: usize, y: usize, band: usize, value: f64) {
        let size = self.model.sample_type.size();
        let start = self.offset(x, y) + band * size;
        self.model
            .sample_type
            .encode(value, &mut self.data[start..start + size]);
    }

    /// Typed copy of every sample, pixel-interleaved.
    pub fn samples<T: Sample>(&self) -> Result<Vec<T>> {
        if T::TYPE != self.model.sample_type {
            return Err(CoverageError::incompatible(
                self.model.sample_type,
                T::TYPE,
            ));
        }
        Ok(bytemuck::pod_collect_to_vec(&self.data))
    }

    /// Copy a `width` x `height` block from `src` at `(src_x, src_y)` into
    /// this raster at `(dst_x, dst_y)`. Both rasters must share a sample model.
    #[allow(clippy::too_many_arguments)]
    pub fn copy_block(
        &mut self,
        src: &Raster,
        src_x: usize,
        src_y: usize,
        width: usize,
        height: usize,
        dst_x: usize,
        dst_y: usize,
    ) -> Result<()> {
        if src.model != self.model {
            return Err(CoverageError::incompatible(self.model, src.model));
        }
        if src_x + width > src.width
            || src_y + height > src.height
            || dst_x + width > self.width
            || dst_y + height > self.height
        {
            return Err(CoverageError::InvalidParameter(format!(
                "block {}x{} does not fit source {}x{} at ({}, {}) or destination {}x{} at ({}, {})",
                width,
                height,
                src.width,
                src.height,
                src_x,
                src_y,
                self.width,
                self.height,
                dst_x,
                dst_y
            )));
        }

        let row_bytes = width * self.model.pixel_stride();
        for row in 0..height {
            let from = src.offset(src_x, src_y + row);
            let to = self.offset(dst_x, dst_y + row);
            self.data[to..to + row_bytes].copy_from_slice(&src.data[from..from + row_bytes]);
        }
        Ok(())
    }
}
