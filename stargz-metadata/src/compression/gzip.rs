//! Gzip members, one per chunk.

use std::io::{Error, ErrorKind, Read, Result};

use flate2::read::{GzDecoder, GzEncoder};

use super::{Compression, Compressor, Decompressor};

pub const DEFAULT_LEVEL: u32 = 6;

const MAX_PREALLOC: usize = 1 << 20;

#[derive(Debug, Clone, Copy, Default)]
pub struct GzipDecompressor;

impl Decompressor for GzipDecompressor {
    fn compression(&self) -> Compression {
        Compression::Gzip
    }

    fn decompress(&self, input: &[u8], size_hint: Option<usize>) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(size_hint.unwrap_or(input.len()).min(MAX_PREALLOC));
        GzDecoder::new(input).read_to_end(&mut out)?;
        if let Some(expected) = size_hint {
            if out.len() != expected {
                return Err(Error::new(
                    ErrorKind::InvalidData,
                    format!("gzip member holds {} bytes, expected {}", out.len(), expected),
                ));
            }
        }
        Ok(out)
    }
}

/// Gzip compressor with a level from 0 (no compression) to 9.
#[derive(Debug, Clone, Copy)]
pub struct GzipCompressor {
    level: u32,
}

impl GzipCompressor {
    pub fn new(level: u32) -> Self {
        Self { level: level.min(9) }
    }
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self::new(DEFAULT_LEVEL)
    }
}

impl Compressor for GzipCompressor {
    fn compression(&self) -> Compression {
        Compression::Gzip
    }

    fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut out = vec![];
        GzEncoder::new(input, flate2::Compression::new(self.level)).read_to_end(&mut out)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels() {
        let input = b"qwertyuiopasdfghjk".repeat(64);
        for level in &[0, 1, 6, 9] {
            let compressed = GzipCompressor::new(*level).compress(&input).unwrap();
            let out = GzipDecompressor
                .decompress(&compressed, Some(input.len()))
                .unwrap();
            assert_eq!(out, input);
        }
    }

    #[test]
    fn checks_size_and_data() {
        let compressed = GzipCompressor::default().compress(b"hello").unwrap();
        assert!(GzipDecompressor.decompress(&compressed, Some(6)).is_err());
        assert!(GzipDecompressor.decompress(&compressed, Some(usize::MAX)).is_err());
        assert!(GzipDecompressor.decompress(b"not gzip", None).is_err());
    }
}
