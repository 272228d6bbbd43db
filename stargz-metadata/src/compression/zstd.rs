//! Zstandard frames, one per chunk.

use std::io::{Error, ErrorKind, Result};

use super::{Compression, Compressor, Decompressor};

pub const DEFAULT_LEVEL: i32 = 3;

#[derive(Debug, Clone, Copy, Default)]
pub struct ZstdDecompressor;

impl Decompressor for ZstdDecompressor {
    fn compression(&self) -> Compression {
        Compression::Zstd
    }

    fn decompress(&self, input: &[u8], size_hint: Option<usize>) -> Result<Vec<u8>> {
        let out = ::zstd::stream::decode_all(input)?;
        if let Some(expected) = size_hint {
            if out.len() != expected {
                return Err(Error::new(
                    ErrorKind::InvalidData,
                    format!("zstd frame holds {} bytes, expected {}", out.len(), expected),
                ));
            }
        }
        Ok(out)
    }
}

/// Zstd compressor with a fixed level (1 fastest, 19 best).
#[derive(Debug, Clone, Copy)]
pub struct ZstdCompressor {
    level: i32,
}

impl ZstdCompressor {
    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

impl Default for ZstdCompressor {
    fn default() -> Self {
        Self::new(DEFAULT_LEVEL)
    }
}

impl Compressor for ZstdCompressor {
    fn compression(&self) -> Compression {
        Compression::Zstd
    }

    fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        ::zstd::stream::encode_all(input, self.level)
    }
}
