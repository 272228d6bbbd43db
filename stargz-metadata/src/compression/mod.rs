//! Compression schemes understood by the reader.
//!
//! The engine only ever sees the [`Decompressor`] trait. Each archive declares
//! its scheme by id in the footer, and the reader picks the registered
//! decompressor for that id. [`Compressor`] is the writing half, used by the
//! fixture builder in [`crate::testutil`].

use std::fmt;
use std::io::{Error, ErrorKind, Result};
use std::sync::Arc;

#[cfg(feature = "gzip")]
pub mod gzip;
#[cfg(feature = "xz")]
pub mod xz;
#[cfg(feature = "zstd")]
pub mod zstd;

pub mod constants {
    /// Chunks and TOC are written as-is.
    pub const COMPRESSION_STORED: u8 = 0x00;
    pub const COMPRESSION_ZSTD: u8 = 0x10;
    pub const COMPRESSION_XZ: u8 = 0x20;
    pub const COMPRESSION_GZIP: u8 = 0x30;
}

use self::constants::*;

/// Compression algorithm identifier.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Default)]
pub enum Compression {
    #[default]
    Stored,
    Zstd,
    Xz,
    Gzip,
    Unknown(u8),
}

impl Compression {
    pub const fn id(self) -> u8 {
        match self {
            Compression::Stored => COMPRESSION_STORED,
            Compression::Zstd => COMPRESSION_ZSTD,
            Compression::Xz => COMPRESSION_XZ,
            Compression::Gzip => COMPRESSION_GZIP,
            Compression::Unknown(id) => id,
        }
    }

    pub const fn from_id(id: u8) -> Compression {
        match id {
            COMPRESSION_STORED => Compression::Stored,
            COMPRESSION_ZSTD => Compression::Zstd,
            COMPRESSION_XZ => Compression::Xz,
            COMPRESSION_GZIP => Compression::Gzip,
            id => Compression::Unknown(id),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::Stored => write!(f, "stored"),
            Compression::Zstd => write!(f, "Zstandard"),
            Compression::Xz => write!(f, "xz"),
            Compression::Gzip => write!(f, "gzip"),
            Compression::Unknown(id) => write!(f, "Unknown(id: {:x})", id),
        }
    }
}

impl fmt::Debug for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Turns one compressed range of the archive back into plain bytes.
pub trait Decompressor: Send + Sync {
    /// The scheme this decompressor handles.
    fn compression(&self) -> Compression;

    /// `size_hint` is the expected output length when the caller knows it.
    fn decompress(&self, input: &[u8], size_hint: Option<usize>) -> Result<Vec<u8>>;
}

pub trait Compressor: Send + Sync {
    fn compression(&self) -> Compression;

    /// Compress `input` as one self-contained stream, so it can later be
    /// decompressed without any of its neighbours.
    fn compress(&self, input: &[u8]) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StoredDecompressor;

impl Decompressor for StoredDecompressor {
    fn compression(&self) -> Compression {
        Compression::Stored
    }

    fn decompress(&self, input: &[u8], size_hint: Option<usize>) -> Result<Vec<u8>> {
        if let Some(expected) = size_hint {
            if expected != input.len() {
                return Err(Error::new(
                    ErrorKind::InvalidData,
                    format!(
                        "stored range is {} bytes, expected {}",
                        input.len(),
                        expected
                    ),
                ));
            }
        }
        Ok(input.to_vec())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StoredCompressor;

impl Compressor for StoredCompressor {
    fn compression(&self) -> Compression {
        Compression::Stored
    }

    fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        Ok(input.to_vec())
    }
}

/// Every decompressor compiled into this build.
pub fn builtin_decompressors() -> Vec<Arc<dyn Decompressor>> {
    #[allow(unused_mut)]
    let mut out: Vec<Arc<dyn Decompressor>> = vec![Arc::new(StoredDecompressor)];
    #[cfg(feature = "zstd")]
    out.push(Arc::new(self::zstd::ZstdDecompressor));
    #[cfg(feature = "xz")]
    out.push(Arc::new(self::xz::XzDecompressor));
    #[cfg(feature = "gzip")]
    out.push(Arc::new(self::gzip::GzipDecompressor));
    out
}

/// Compression configuration: the scheme and an optional level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompressionConfig {
    pub compression: Compression,
    pub level: Option<i32>,
}

impl CompressionConfig {
    pub fn new(compression: Compression) -> Self {
        Self {
            compression,
            level: None,
        }
    }

    pub fn with_level(compression: Compression, level: i32) -> Self {
        Self {
            compression,
            level: Some(level),
        }
    }

    pub fn compressor(&self) -> Result<Box<dyn Compressor>> {
        match self.compression {
            Compression::Stored => Ok(Box::new(StoredCompressor)),
            #[cfg(feature = "zstd")]
            Compression::Zstd => Ok(Box::new(self::zstd::ZstdCompressor::new(
                self.level.unwrap_or(self::zstd::DEFAULT_LEVEL),
            ))),
            #[cfg(feature = "xz")]
            Compression::Xz => Ok(Box::new(self::xz::XzCompressor::new(
                self.level.map(|l| l as u32).unwrap_or(self::xz::DEFAULT_LEVEL),
            ))),
            #[cfg(feature = "gzip")]
            Compression::Gzip => Ok(Box::new(self::gzip::GzipCompressor::new(
                self.level.map(|l| l as u32).unwrap_or(self::gzip::DEFAULT_LEVEL),
            ))),
            Compression::Unknown(id) => Err(Error::new(
                ErrorKind::InvalidInput,
                format!("Cannot handle compression with id {}", id),
            )),
            #[allow(unreachable_patterns)]
            missing => Err(Error::new(
                ErrorKind::InvalidInput,
                format!("Compiled without support for {:?}", missing),
            )),
        }
    }
}

impl fmt::Display for CompressionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.level {
            Some(level) => write!(f, "{}-{}", self.compression, level),
            None => write!(f, "{}", self.compression),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip() {
        for c in &[
            Compression::Stored,
            Compression::Zstd,
            Compression::Xz,
            Compression::Gzip,
        ] {
            assert_eq!(Compression::from_id(c.id()), *c);
        }
        assert_eq!(Compression::from_id(0x99), Compression::Unknown(0x99));
    }

    #[test]
    fn stored_checks_size() {
        let d = StoredDecompressor;
        assert_eq!(d.decompress(b"abc", Some(3)).unwrap(), b"abc");
        assert!(d.decompress(b"abc", Some(4)).is_err());
    }

    #[test]
    fn unknown_has_no_compressor() {
        assert!(CompressionConfig::new(Compression::Unknown(7))
            .compressor()
            .is_err());
    }

    #[test]
    fn every_builtin_round_trips() {
        let input = b"This, this, this, this, this is a compressable string string string.\n";
        for d in builtin_decompressors() {
            let config = CompressionConfig::new(d.compression());
            let compressed = config.compressor().unwrap().compress(input).unwrap();
            let out = d.decompress(&compressed, Some(input.len())).unwrap();
            assert_eq!(&out[..], &input[..], "{}", config);
        }
    }
}
