//! XZ streams, one per chunk.

use std::io::{Error, ErrorKind, Read, Result};

use xz2::read::{XzDecoder, XzEncoder};

use super::{Compression, Compressor, Decompressor};

pub const DEFAULT_LEVEL: u32 = 6;

/// Upper bound on the buffer reserved up front; the hint comes from the archive.
const MAX_PREALLOC: usize = 1 << 20;

#[derive(Debug, Clone, Copy, Default)]
pub struct XzDecompressor;

impl Decompressor for XzDecompressor {
    fn compression(&self) -> Compression {
        Compression::Xz
    }

    fn decompress(&self, input: &[u8], size_hint: Option<usize>) -> Result<Vec<u8>> {
        let capacity = size_hint.unwrap_or(input.len()).min(MAX_PREALLOC);
        let mut out = Vec::with_capacity(capacity);
        XzDecoder::new(input).read_to_end(&mut out)?;
        if let Some(expected) = size_hint {
            if out.len() != expected {
                return Err(Error::new(
                    ErrorKind::InvalidData,
                    format!("xz stream holds {} bytes, expected {}", out.len(), expected),
                ));
            }
        }
        Ok(out)
    }
}

/// XZ compressor with a preset level (0-9).
#[derive(Debug, Clone, Copy)]
pub struct XzCompressor {
    level: u32,
}

impl XzCompressor {
    pub fn new(level: u32) -> Self {
        Self { level: level.min(9) }
    }
}

impl Default for XzCompressor {
    fn default() -> Self {
        Self::new(DEFAULT_LEVEL)
    }
}

impl Compressor for XzCompressor {
    fn compression(&self) -> Compression {
        Compression::Xz
    }

    fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut out = vec![];
        XzEncoder::new(input, self.level).read_to_end(&mut out)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels() {
        let input = b"1111111111".repeat(100);
        for level in &[0, 6, 9] {
            let compressed = XzCompressor::new(*level).compress(&input).unwrap();
            let out = XzDecompressor.decompress(&compressed, None).unwrap();
            assert_eq!(out, input);
        }
    }

    #[test]
    fn wrong_size_hint() {
        let compressed = XzCompressor::default().compress(b"hello").unwrap();
        assert!(XzDecompressor.decompress(&compressed, Some(usize::MAX)).is_err());
        assert!(XzDecompressor.decompress(&compressed, Some(4)).is_err());
    }

    #[test]
    fn empty_input() {
        let compressed = XzCompressor::default().compress(b"").unwrap();
        assert!(XzDecompressor.decompress(&compressed, Some(0)).unwrap().is_empty());
    }
}
