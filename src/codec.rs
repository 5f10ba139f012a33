//! Blob value codec
//!
//! Values stored through the blob allocator pass through two pluggable
//! stages: serde serialization via bincode, then optional zlib compression.
//! Decode reverses the stages. The chosen compression is recorded in the
//! metadata blob so reopening a file always uses the codec it was written
//! with.

use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StrataError};

/// Compression applied after serialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Compression {
    #[default]
    None,
    Zlib,
}

/// Two-stage encode/decode pipeline for blob values
#[derive(Debug, Clone)]
pub struct BlobCodec {
    compression: Compression,
}

impl BlobCodec {
    pub fn new(compression: Compression) -> Self {
        Self { compression }
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Serialize and (optionally) compress a value
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let serialized = bincode::serialize(value)?;
        match self.compression {
            Compression::None => Ok(serialized),
            Compression::Zlib => {
                let mut encoder = flate2::write::ZlibEncoder::new(
                    Vec::new(),
                    flate2::Compression::default(),
                );
                encoder.write_all(&serialized)?;
                Ok(encoder.finish()?)
            }
        }
    }

    /// Decompress and deserialize a value
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        let serialized = match self.compression {
            Compression::None => bytes.to_vec(),
            Compression::Zlib => {
                let mut decoder = flate2::read::ZlibDecoder::new(bytes);
                let mut out = Vec::new();
                decoder.read_to_end(&mut out).map_err(|e| {
                    StrataError::Corruption(format!("zlib decode failed: {}", e))
                })?;
                out
            }
        };
        Ok(bincode::deserialize(&serialized)?)
    }
}
