//! Value transformation pipeline.
//!
//! Memcached stores opaque bytes plus a 32-bit flags word. This module
//! repurposes two flag bits to round-trip richer values:
//!
//! - [`FLAG_SERIALIZED`] - the payload is a JSON-serialized structured
//!   value rather than raw bytes
//! - [`FLAG_COMPRESSED`] - the payload is zlib-compressed
//!
//! The bits are independent; a large structured value may carry both. On
//! fetch the transformations are undone in reverse order: decompress
//! first, then deserialize.

use std::io::{Read, Write};

use bytes::Bytes;
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

/// Payload is serialized from a structured value.
pub const FLAG_SERIALIZED: u32 = 0x1;

/// Payload is zlib-compressed.
pub const FLAG_COMPRESSED: u32 = 0x2;

/// Payload length at or above which compression is attempted, unless
/// configured otherwise.
pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 4096;

/// Compression must shave off at least this percentage of the original
/// size to be kept, unless configured otherwise.
pub const DEFAULT_MIN_SAVINGS_PCT: u8 = 20;

/// A value as seen by the client API: either raw bytes, stored verbatim,
/// or a structured value that rides through the serialization half of
/// the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    Raw(Bytes),
    Structured(serde_json::Value),
}

impl CacheValue {
    /// The raw bytes, if this is a raw value.
    pub fn as_raw(&self) -> Option<&[u8]> {
        match self {
            CacheValue::Raw(bytes) => Some(bytes),
            CacheValue::Structured(_) => None,
        }
    }

    /// The structured value, if present.
    pub fn as_structured(&self) -> Option<&serde_json::Value> {
        match self {
            CacheValue::Raw(_) => None,
            CacheValue::Structured(value) => Some(value),
        }
    }
}

impl From<Bytes> for CacheValue {
    fn from(bytes: Bytes) -> Self {
        CacheValue::Raw(bytes)
    }
}

impl From<Vec<u8>> for CacheValue {
    fn from(bytes: Vec<u8>) -> Self {
        CacheValue::Raw(Bytes::from(bytes))
    }
}

impl From<&[u8]> for CacheValue {
    fn from(bytes: &[u8]) -> Self {
        CacheValue::Raw(Bytes::copy_from_slice(bytes))
    }
}

impl From<&str> for CacheValue {
    fn from(s: &str) -> Self {
        CacheValue::Raw(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for CacheValue {
    fn from(s: String) -> Self {
        CacheValue::Raw(Bytes::from(s.into_bytes()))
    }
}

impl From<serde_json::Value> for CacheValue {
    fn from(value: serde_json::Value) -> Self {
        CacheValue::Structured(value)
    }
}

/// Errors from the value pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ValueError {
    #[error("serialize: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("deserialize: {0}")]
    Deserialize(#[source] serde_json::Error),

    #[error("compress: {0}")]
    Compress(#[source] std::io::Error),

    #[error("decompress: {0}")]
    Decompress(#[source] std::io::Error),
}

/// Store-side and fetch-side value transformations.
#[derive(Debug, Clone)]
pub struct ValuePipeline {
    /// Master switch for the compression half.
    pub compression: bool,
    /// Payload length at or above which compression is attempted.
    pub compression_threshold: usize,
    /// Required savings percentage for compressed output to be kept.
    pub min_savings_pct: u8,
}

impl Default for ValuePipeline {
    fn default() -> Self {
        ValuePipeline {
            compression: true,
            compression_threshold: DEFAULT_COMPRESSION_THRESHOLD,
            min_savings_pct: DEFAULT_MIN_SAVINGS_PCT,
        }
    }
}

impl ValuePipeline {
    /// Transform a value for storage, returning the wire payload and the
    /// flags word describing the transformations applied.
    ///
    /// `compressible` is false for append/prepend payloads: compressed
    /// fragments would corrupt the byte-level concatenation the server
    /// performs.
    pub fn encode(
        &self,
        value: &CacheValue,
        compressible: bool,
    ) -> Result<(Vec<u8>, u32), ValueError> {
        let (mut payload, mut flags) = match value {
            CacheValue::Raw(bytes) => (bytes.to_vec(), 0),
            CacheValue::Structured(value) => (
                serde_json::to_vec(value).map_err(ValueError::Serialize)?,
                FLAG_SERIALIZED,
            ),
        };

        if compressible && self.compression && payload.len() >= self.compression_threshold {
            let compressed = zlib_compress(&payload)?;
            let keep_pct = 100 - self.min_savings_pct.min(100) as usize;
            if compressed.len() * 100 <= payload.len() * keep_pct {
                payload = compressed;
                flags |= FLAG_COMPRESSED;
            }
        }

        Ok((payload, flags))
    }

    /// Undo storage transformations on a fetched payload according to its
    /// flags word.
    pub fn decode(&self, payload: &[u8], flags: u32) -> Result<CacheValue, ValueError> {
        let bytes = if flags & FLAG_COMPRESSED != 0 {
            zlib_decompress(payload)?
        } else {
            payload.to_vec()
        };

        if flags & FLAG_SERIALIZED != 0 {
            let value = serde_json::from_slice(&bytes).map_err(ValueError::Deserialize)?;
            Ok(CacheValue::Structured(value))
        } else {
            Ok(CacheValue::Raw(Bytes::from(bytes)))
        }
    }
}

fn zlib_compress(data: &[u8]) -> Result<Vec<u8>, ValueError> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data).map_err(ValueError::Compress)?;
    encoder.finish().map_err(ValueError::Compress)
}

fn zlib_decompress(data: &[u8]) -> Result<Vec<u8>, ValueError> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::with_capacity(data.len() * 2);
    decoder
        .read_to_end(&mut out)
        .map_err(ValueError::Decompress)?;
    Ok(out)
}
