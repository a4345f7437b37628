//! Binary tile format.
//!
//! ```text
//! offset  size  field
//!      0     4  magic "PYRT"
//!      4     1  format version
//!      5     1  compression flag (0 none, 1 deflate)
//!      6     1  sample type tag
//!      7     1  color model tag
//!      8     4  width  (u32 LE)
//!     12     4  height (u32 LE)
//!     16     2  bands  (u16 LE)
//!     18     2  reserved, zero
//!     20     4  CRC32 of the uncompressed payload (u32 LE)
//!     24     4  stored payload length (u32 LE)
//!     28     -  payload: pixel-interleaved samples, little-endian
//! ```
//!
//! Encoding is deterministic: equal rasters always produce equal bytes.

use std::io::{Read, Write};

use bytes::Bytes;
use coverage_common::{ColorModel, CoverageError, Raster, SampleModel, SampleType};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use thiserror::Error;

use crate::config::TileCompression;

const MAGIC: &[u8; 4] = b"PYRT";
const VERSION: u8 = 1;
const HEADER_LEN: usize = 28;

/// Tile decoding and encoding failures.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("tile is truncated: {0} bytes")]
    Truncated(usize),

    #[error("not a tile: bad magic")]
    BadMagic,

    #[error("unsupported tile format version {0}")]
    UnsupportedVersion(u8),

    #[error("invalid tile header: {0}")]
    InvalidHeader(String),

    #[error("tile checksum mismatch: stored {stored:08x}, computed {computed:08x}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    #[error("compression error: {0}")]
    Compression(#[from] std::io::Error),
}

impl From<CodecError> for CoverageError {
    fn from(err: CodecError) -> Self {
        CoverageError::Io(err.to_string())
    }
}

/// Encodes rasters into tiles and back.
#[derive(Debug, Clone, Copy, Default)]
pub struct TileCodec {
    compression: TileCompression,
}

impl TileCodec {
    pub fn new(compression: TileCompression) -> Self {
        Self { compression }
    }

    pub fn compression(&self) -> TileCompression {
        self.compression
    }

    pub fn encode(&self, raster: &Raster) -> Result<Bytes, CodecError> {
        let model = raster.sample_model();
        let width = u32::try_from(raster.width())
            .map_err(|_| CodecError::InvalidHeader("width exceeds u32".to_string()))?;
        let height = u32::try_from(raster.height())
            .map_err(|_| CodecError::InvalidHeader("height exceeds u32".to_string()))?;
        let bands = u16::try_from(model.bands)
            .map_err(|_| CodecError::InvalidHeader("band count exceeds u16".to_string()))?;

        let mut payload = raster.data().to_vec();
        swap_to_little_endian(&mut payload, model.sample_type.size());
        let crc = crc32fast::hash(&payload);

        let stored = match self.compression {
            TileCompression::None => payload,
            TileCompression::Deflate => {
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(&payload)?;
                encoder.finish()?
            }
        };
        let stored_len = u32::try_from(stored.len())
            .map_err(|_| CodecError::InvalidHeader("payload exceeds u32".to_string()))?;

        let mut out = Vec::with_capacity(HEADER_LEN + stored.len());
        out.extend_from_slice(MAGIC);
        out.push(VERSION);
        out.push(self.compression.flag());
        out.push(model.sample_type.tag());
        out.push(raster.color_model().tag());
        out.extend_from_slice(&width.to_le_bytes());
        out.extend_from_slice(&height.to_le_bytes());
        out.extend_from_slice(&bands.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&stored_len.to_le_bytes());
        out.extend_from_slice(&stored);

        Ok(Bytes::from(out))
    }

    /// Decode a tile. The compression flag is read from the header, so any
    /// codec decodes tiles written by any other.
    pub fn decode(&self, data: &[u8]) -> Result<Raster, CodecError> {
        if data.len() < HEADER_LEN {
            return Err(CodecError::Truncated(data.len()));
        }
        if &data[0..4] != MAGIC {
            return Err(CodecError::BadMagic);
        }
        if data[4] != VERSION {
            return Err(CodecError::UnsupportedVersion(data[4]));
        }

        let compression = TileCompression::from_flag(data[5]).ok_or_else(|| {
            CodecError::InvalidHeader(format!("unknown compression flag {}", data[5]))
        })?;
        let sample_type = SampleType::from_tag(data[6]).ok_or_else(|| {
            CodecError::InvalidHeader(format!("unknown sample type {}", data[6]))
        })?;
        let color = ColorModel::from_tag(data[7]).ok_or_else(|| {
            CodecError::InvalidHeader(format!("unknown color model {}", data[7]))
        })?;

        let width = read_u32(data, 8) as usize;
        let height = read_u32(data, 12) as usize;
        let bands = u16::from_le_bytes([data[16], data[17]]) as usize;
        let stored_crc = read_u32(data, 20);
        let stored_len = read_u32(data, 24) as usize;

        // The checksum covers the payload only, so header sizes are checked here.
        let model = SampleModel::new(sample_type, bands);
        let expected = width
            .checked_mul(height)
            .and_then(|pixels| pixels.checked_mul(model.pixel_stride()))
            .ok_or_else(|| {
                CodecError::InvalidHeader(format!(
                    "{}x{} tile of {} overflows",
                    width, height, model
                ))
            })?;

        let stored = HEADER_LEN
            .checked_add(stored_len)
            .and_then(|end| data.get(HEADER_LEN..end))
            .ok_or(CodecError::Truncated(data.len()))?;

        let mut payload = match compression {
            TileCompression::None => stored.to_vec(),
            TileCompression::Deflate => {
                let mut out = Vec::new();
                DeflateDecoder::new(stored)
                    .take(expected as u64 + 1)
                    .read_to_end(&mut out)?;
                out
            }
        };
        if payload.len() != expected {
            return Err(CodecError::InvalidHeader(format!(
                "{}x{} tile of {} needs {} bytes, payload has {}",
                width,
                height,
                model,
                expected,
                payload.len()
            )));
        }

        let computed = crc32fast::hash(&payload);
        if computed != stored_crc {
            return Err(CodecError::ChecksumMismatch {
                stored: stored_crc,
                computed,
            });
        }

        swap_to_little_endian(&mut payload, sample_type.size());
        Raster::from_bytes(width, height, model, color, payload)
        .map_err(|e| CodecError::InvalidHeader(e.to_string()))
    }
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// Convert native-order samples to little-endian. The conversion is its own
/// inverse, so decoding uses it too.
fn swap_to_little_endian(data: &mut [u8], sample_size: usize) {
    if cfg!(target_endian = "big") && sample_size > 1 {
        for sample in data.chunks_exact_mut(sample_size) {
            sample.reverse();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgba_tile() -> Raster {
        let mut raster = Raster::new(
            4,
            3,
            SampleModel::new(SampleType::U8, 4),
            ColorModel::Rgba,
        );
        for y in 0..3 {
            for x in 0..4 {
                raster.set_pixel(x, y, &[x as u8 * 60, y as u8 * 80, 7, 255]);
            }
        }
        raster
    }

    #[test]
    fn test_roundtrip_both_compressions() {
        let tile = rgba_tile();
        for compression in [TileCompression::None, TileCompression::Deflate] {
            let codec = TileCodec::new(compression);
            let encoded = codec.encode(&tile).unwrap();
            assert_eq!(&encoded[0..4], b"PYRT");
            assert_eq!(codec.decode(&encoded).unwrap(), tile);
        }
    }

    #[test]
    fn test_roundtrip_float_samples() {
        let data: Vec<f32> = vec![1.5, -2.25, f32::MAX, 0.0, 3.0, 4.0];
        let tile = Raster::from_samples(3, 1, 2, ColorModel::Data, &data).unwrap();
        let codec = TileCodec::default();
        let decoded = codec.decode(&codec.encode(&tile).unwrap()).unwrap();
        assert_eq!(decoded.samples::<f32>().unwrap(), data);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let codec = TileCodec::new(TileCompression::Deflate);
        assert_eq!(
            codec.encode(&rgba_tile()).unwrap(),
            codec.encode(&rgba_tile()).unwrap()
        );
    }

    #[test]
    fn test_any_codec_decodes_any_tile() {
        let raw = TileCodec::new(TileCompression::None)
            .encode(&rgba_tile())
            .unwrap();
        let decoded = TileCodec::new(TileCompression::Deflate)
            .decode(&raw)
            .unwrap();
        assert_eq!(decoded, rgba_tile());
    }

    #[test]
    fn test_corrupt_payload_is_detected() {
        let codec = TileCodec::new(TileCompression::None);
        let mut encoded = codec.encode(&rgba_tile()).unwrap().to_vec();
        let last = encoded.len() - 1;
        encoded[last] ^= 0xff;
        assert!(matches!(
            codec.decode(&encoded),
            Err(CodecError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_header_errors() {
        let codec = TileCodec::default();
        assert!(matches!(codec.decode(b"PYRT"), Err(CodecError::Truncated(4))));

        let mut encoded = codec.encode(&rgba_tile()).unwrap().to_vec();
        encoded[0] = b'X';
        assert!(matches!(codec.decode(&encoded), Err(CodecError::BadMagic)));

        let err: CoverageError = CodecError::BadMagic.into();
        assert!(matches!(err, CoverageError::Io(_)));
    }

    #[test]
    fn test_oversized_header_is_rejected() {
        let codec = TileCodec::new(TileCompression::None);
        let mut encoded = codec.encode(&rgba_tile()).unwrap().to_vec();
        encoded[8..12].copy_from_slice(&u32::MAX.to_le_bytes());
        encoded[12..16].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            codec.decode(&encoded),
            Err(CodecError::InvalidHeader(_))
        ));

        let mut encoded = codec.encode(&rgba_tile()).unwrap().to_vec();
        encoded[8..12].copy_from_slice(&5u32.to_le_bytes());
        let err: CoverageError = codec.decode(&encoded).unwrap_err().into();
        assert!(matches!(err, CoverageError::Io(_)));
    }
}
