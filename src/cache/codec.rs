//! Value Codec
//!
//! Maps typed values to the `Bytes` that cross the tier boundary. Each
//! encoded payload is prefixed with a one-byte envelope describing its
//! serialization format and compression, so reads are self-describing even
//! when an operation's config changes between writes.
//!
//! LZ4 compression is skipped for payloads below a size cutoff, and falls
//! back to storing uncompressed when compression fails or does not shrink
//! the payload.

use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::SerializationFormat;
use crate::error::{Error, Result};

/// Envelope flag: payload is MessagePack (JSON otherwise)
const FLAG_BINARY: u8 = 0b0000_0001;
/// Envelope flag: payload is LZ4-compressed
const FLAG_COMPRESSED: u8 = 0b0000_0010;

/// Payloads below this size are never compressed
const MIN_COMPRESS_BYTES: usize = 128;

/// Compression implementation for one algorithm
pub trait Compressor: Send + Sync {
    /// Algorithm name for diagnostics
    fn name(&self) -> &'static str;

    /// Compress data
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decompress data
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// LZ4 block compression
pub struct Lz4Compressor;

impl Compressor for Lz4Compressor {
    fn name(&self) -> &'static str {
        "lz4"
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        lz4::block::compress(data, None, true).map_err(|e| Error::CompressionFailed {
            algorithm: self.name().into(),
            reason: e.to_string(),
        })
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        lz4::block::decompress(data, None).map_err(|e| Error::DecompressionFailed {
            algorithm: self.name().into(),
            reason: e.to_string(),
        })
    }
}

/// Codec configured per operation
pub struct ValueCodec {
    format: SerializationFormat,
    compression: bool,
    lz4: Lz4Compressor,
}

impl ValueCodec {
    /// Create a codec for the given format and compression flag
    pub fn new(format: SerializationFormat, compression: bool) -> Self {
        Self {
            format,
            compression,
            lz4: Lz4Compressor,
        }
    }

    /// Encode a value into an enveloped payload
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Bytes> {
        let serialized = match self.format {
            SerializationFormat::Json => serde_json::to_vec(value)?,
            SerializationFormat::Binary => {
                rmp_serde::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))?
            }
        };

        let mut flags = match self.format {
            SerializationFormat::Json => 0,
            SerializationFormat::Binary => FLAG_BINARY,
        };

        let body = if self.compression && serialized.len() >= MIN_COMPRESS_BYTES {
            match self.lz4.compress(&serialized) {
                Ok(compressed) if compressed.len() < serialized.len() => {
                    flags |= FLAG_COMPRESSED;
                    compressed
                }
                // Incompressible or failed: store uncompressed
                _ => serialized,
            }
        } else {
            serialized
        };

        let mut buf = BytesMut::with_capacity(1 + body.len());
        buf.put_u8(flags);
        buf.put_slice(&body);
        Ok(buf.freeze())
    }

    /// Decode an enveloped payload back into a value
    pub fn decode<T: DeserializeOwned>(&self, payload: &Bytes) -> Result<T> {
        let (flags, body) = payload
            .split_first()
            .ok_or_else(|| Error::Deserialization("empty payload".into()))?;

        let serialized;
        let bytes: &[u8] = if flags & FLAG_COMPRESSED != 0 {
            serialized = self.lz4.decompress(body)?;
            &serialized
        } else {
            body
        };

        if flags & FLAG_BINARY != 0 {
            rmp_serde::from_slice(bytes).map_err(|e| Error::Deserialization(e.to_string()))
        } else {
            serde_json::from_slice(bytes).map_err(|e| Error::Deserialization(e.to_string()))
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
