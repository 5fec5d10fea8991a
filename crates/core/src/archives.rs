//! In-memory compression with gzip, zstd and LZ4.
//!
//! ```rust
//! use yali_core::archives::{ArcCompression, Archived, Archiver, CompressionConfig, DecompressionConfig};
//!
//! let archive = ArcCompression::zstd(3).unwrap();
//! let packed = Archiver::compress_string("hello", &CompressionConfig::b64_string(archive)).unwrap();
//! let Archived::Text(b64) = packed else { unreachable!() };
//!
//! let unpacked = Archiver::decompress_string(&b64, &DecompressionConfig::raw_string(archive)).unwrap();
//! assert_eq!(unpacked, Archived::Text("hello".into()));
//! ```

use crate::consts::DEFAULT_COMPRESS_LEVEL;
use crate::error::{CoreError, CoreErrorExt};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{Read, Write};
use tracing::trace;

const GZIP_MAX_LEVEL: u32 = 9;
const ZSTD_MAX_LEVEL: u32 = 22;
const LZ4_MAX_LEVEL: u32 = 16;

/// Upper bound of the LZ4 block expansion ratio tried when the size is unknown.
const LZ4_MAX_RATIO: usize = 100;

/// Compression algorithm and level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "algo", rename_all = "lowercase", try_from = "RawArcCompression")]
pub enum ArcCompression {
    Gzip { level: u32 },
    Zstd { level: u32 },
    Lz4 { level: u32 },
}

#[derive(Deserialize)]
#[serde(tag = "algo", rename_all = "lowercase")]
enum RawArcCompression {
    Gzip {
        #[serde(default = "default_level")]
        level: u32,
    },
    Zstd {
        #[serde(default = "default_level")]
        level: u32,
    },
    Lz4 {
        #[serde(default = "default_level")]
        level: u32,
    },
}

const fn default_level() -> u32 {
    DEFAULT_COMPRESS_LEVEL
}

impl TryFrom<RawArcCompression> for ArcCompression {
    type Error = CoreError;

    fn try_from(raw: RawArcCompression) -> Result<Self, Self::Error> {
        match raw {
            RawArcCompression::Gzip { level } => Self::gzip(level),
            RawArcCompression::Zstd { level } => Self::zstd(level),
            RawArcCompression::Lz4 { level } => Self::lz4(level),
        }
    }
}

fn check_level(algo: &'static str, level: u32, max: u32) -> Result<u32, CoreError> {
    if level > max {
        return Err(CoreError::validation(format!("level must be within 0..={max}, got {level}")))
            .context(algo);
    }
    Ok(level)
}

impl ArcCompression {
    pub fn gzip(level: u32) -> Result<Self, CoreError> {
        Ok(Self::Gzip { level: check_level("gzip", level, GZIP_MAX_LEVEL)? })
    }

    pub fn zstd(level: u32) -> Result<Self, CoreError> {
        Ok(Self::Zstd { level: check_level("zstd", level, ZSTD_MAX_LEVEL)? })
    }

    /// LZ4 frames are produced by a single-speed encoder; `level` is validated and recorded only.
    pub fn lz4(level: u32) -> Result<Self, CoreError> {
        Ok(Self::Lz4 { level: check_level("lz4", level, LZ4_MAX_LEVEL)? })
    }

    #[must_use]
    pub const fn level(self) -> u32 {
        match self {
            Self::Gzip { level } | Self::Zstd { level } | Self::Lz4 { level } => level,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Gzip { .. } => "gzip",
            Self::Zstd { .. } => "zstd",
            Self::Lz4 { .. } => "lz4",
        }
    }
}

impl Default for ArcCompression {
    fn default() -> Self {
        Self::Zstd { level: DEFAULT_COMPRESS_LEVEL }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressedOutput {
    #[default]
    RawBytes,
    B64String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecompressedOutput {
    #[default]
    RawBytes,
    RawString,
    Json,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionConfig {
    pub archive: ArcCompression,
    #[serde(default)]
    pub output: CompressedOutput,
}

impl CompressionConfig {
    #[must_use]
    pub const fn raw_bytes(archive: ArcCompression) -> Self {
        Self { archive, output: CompressedOutput::RawBytes }
    }

    #[must_use]
    pub const fn b64_string(archive: ArcCompression) -> Self {
        Self { archive, output: CompressedOutput::B64String }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecompressionConfig {
    pub archive: ArcCompression,
    #[serde(default)]
    pub output: DecompressedOutput,
}

impl DecompressionConfig {
    #[must_use]
    pub const fn raw_bytes(archive: ArcCompression) -> Self {
        Self { archive, output: DecompressedOutput::RawBytes }
    }

    #[must_use]
    pub const fn raw_string(archive: ArcCompression) -> Self {
        Self { archive, output: DecompressedOutput::RawString }
    }

    #[must_use]
    pub const fn json(archive: ArcCompression) -> Self {
        Self { archive, output: DecompressedOutput::Json }
    }
}

/// Result of an [`Archiver`] call, shaped by the requested output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Archived {
    Bytes(Vec<u8>),
    Text(String),
    Json(Value),
}

impl Archived {
    /// Returns the payload as bytes regardless of its shape.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Bytes(b) => b,
            Self::Text(s) => s.into_bytes(),
            Self::Json(v) => v.to_string().into_bytes(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Archiver;

impl Archiver {
    pub fn compress_bytes(data: &[u8], config: &CompressionConfig) -> Result<Archived, CoreError> {
        let packed = match config.archive {
            ArcCompression::Gzip { level } => gzip_compress(data, level)?,
            ArcCompression::Zstd { level } => zstd::encode_all(data, level.cast_signed())
                .map_err(|e| CoreError::compression(e.to_string()))
                .context("zstd")?,
            ArcCompression::Lz4 { .. } => lz4_frame_compress(data)?,
        };
        trace!(algo = config.archive.name(), input = data.len(), output = packed.len(), "Compressed");

        Ok(match config.output {
            CompressedOutput::RawBytes => Archived::Bytes(packed),
            CompressedOutput::B64String => Archived::Text(B64.encode(packed)),
        })
    }

    pub fn decompress_bytes(
        data: &[u8],
        config: &DecompressionConfig,
    ) -> Result<Archived, CoreError> {
        let unpacked = match config.archive {
            ArcCompression::Gzip { .. } => gzip_decompress(data)?,
            ArcCompression::Zstd { .. } => zstd::decode_all(data)
                .map_err(|e| CoreError::decode(e.to_string()))
                .context("zstd")?,
            ArcCompression::Lz4 { .. } => lz4_decompress(data)?,
        };

        match config.output {
            DecompressedOutput::RawBytes => Ok(Archived::Bytes(unpacked)),
            DecompressedOutput::RawString => Ok(Archived::Text(into_utf8(unpacked)?)),
            DecompressedOutput::Json => match serde_json::from_slice::<Value>(&unpacked) {
                Ok(value) => Ok(Archived::Json(value)),
                Err(_) => Ok(match String::from_utf8(unpacked) {
                    Ok(text) => Archived::Text(text),
                    Err(e) => Archived::Bytes(e.into_bytes()),
                }),
            },
        }
    }

    pub fn compress_string(data: &str, config: &CompressionConfig) -> Result<Archived, CoreError> {
        Self::compress_bytes(data.as_bytes(), config)
    }

    /// Decompresses base64 text, or the raw UTF-8 bytes of `data` when it is not base64.
    pub fn decompress_string(
        data: &str,
        config: &DecompressionConfig,
    ) -> Result<Archived, CoreError> {
        match B64.decode(data) {
            Ok(bytes) => Self::decompress_bytes(&bytes, config),
            Err(_) => Self::decompress_bytes(data.as_bytes(), config),
        }
    }

    pub fn compress_json(data: &Value, config: &CompressionConfig) -> Result<Archived, CoreError> {
        Self::compress_bytes(&serde_json::to_vec(data)?, config)
    }
}

fn into_utf8(bytes: Vec<u8>) -> Result<String, CoreError> {
    String::from_utf8(bytes).map_err(|e| CoreError::decode(e.to_string()))
}

fn gzip_compress(data: &[u8], level: u32) -> Result<Vec<u8>, CoreError> {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::new(level));
    encoder.write_all(data).context("gzip")?;
    Ok(encoder.finish().context("gzip")?)
}

fn gzip_decompress(data: &[u8]) -> Result<Vec<u8>, CoreError> {
    let mut out = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| CoreError::decode(e.to_string()))
        .context("gzip")?;
    Ok(out)
}

fn lz4_frame_compress(data: &[u8]) -> Result<Vec<u8>, CoreError> {
    let mut encoder = lz4_flex::frame::FrameEncoder::new(Vec::new());
    encoder.write_all(data).context("lz4")?;
    encoder.finish().map_err(|e| CoreError::compression(e.to_string())).context("lz4")
}

/// Tries an LZ4 frame, then a size-prepended block, then a bare block of unknown size.
fn lz4_decompress(data: &[u8]) -> Result<Vec<u8>, CoreError> {
    let mut out = Vec::new();
    if lz4_flex::frame::FrameDecoder::new(data).read_to_end(&mut out).is_ok() {
        return Ok(out);
    }

    let max_size = data.len().max(1) * LZ4_MAX_RATIO;
    let prepended = data.first_chunk::<4>().map(|b| u32::from_le_bytes(*b) as usize);
    if prepended.is_some_and(|size| size <= max_size)
        && let Ok(out) = lz4_flex::decompress_size_prepended(data)
    {
        return Ok(out);
    }
    lz4_block_decompress(data, max_size)
}

fn lz4_block_decompress(data: &[u8], max_size: usize) -> Result<Vec<u8>, CoreError> {
    let mut size = max_size / 16;

    loop {
        match lz4_flex::block::decompress(data, size) {
            Ok(out) => return Ok(out),
            Err(e) => {
                size *= 2;
                if size > max_size {
                    return Err(CoreError::decode(e.to_string())).context("lz4 block");
                }
            },
        }
    }
}
