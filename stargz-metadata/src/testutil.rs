//! Builds small archives in memory for tests.
//!
//! ```
//! use stargz_metadata::testutil::{build_archive, BuildOptions, TarEntry};
//! use stargz_metadata::Reader;
//!
//! let bytes = build_archive(
//!     &[TarEntry::dir("bar/"), TarEntry::file("bar/baz.txt", "bazbazbaz")],
//!     &BuildOptions::default(),
//! )
//! .unwrap();
//! let reader = Reader::new(bytes).unwrap();
//! assert_eq!(reader.num_of_nodes().unwrap(), 4);
//! ```

use std::collections::BTreeMap;
use std::io;

use chrono::{DateTime, Utc};

use crate::compression::{Compression, CompressionConfig, Compressor};
use crate::footer::Footer;
use crate::toc::{
    JsonEntry, JsonEntryType, JsonToc, NO_PREFETCH_LANDMARK, PREFETCH_LANDMARK, TOC_VERSION,
};

/// Path prefixes archive writers are known to put in front of entry names.
pub const PREFIXES: [&str; 4] = ["", "./", "/", "../"];

/// Content of a landmark file written by [`build_archive`].
pub const LANDMARK_CONTENTS: [u8; 1] = [0xf];

/// One entry to write, in the order given.
#[derive(Debug, Clone)]
pub struct TarEntry {
    name: String,
    kind: JsonEntryType,
    content: Vec<u8>,
    link_name: String,
    mode: u32,
    uid: u32,
    gid: u32,
    mod_time: Option<DateTime<Utc>>,
    dev_major: u32,
    dev_minor: u32,
    xattrs: BTreeMap<String, Vec<u8>>,
}

impl TarEntry {
    fn new(name: &str, kind: JsonEntryType, mode: u32) -> TarEntry {
        TarEntry {
            name: name.to_string(),
            kind,
            content: vec![],
            link_name: String::new(),
            mode,
            uid: 0,
            gid: 0,
            mod_time: None,
            dev_major: 0,
            dev_minor: 0,
            xattrs: BTreeMap::new(),
        }
    }

    pub fn file<C: Into<Vec<u8>>>(name: &str, content: C) -> TarEntry {
        TarEntry {
            content: content.into(),
            ..TarEntry::new(name, JsonEntryType::Reg, 0o644)
        }
    }

    /// A directory; by convention `name` ends with `/`.
    pub fn dir(name: &str) -> TarEntry {
        TarEntry::new(name, JsonEntryType::Dir, 0o755)
    }

    /// A hardlink named `name` to the earlier entry `target`.
    pub fn link(name: &str, target: &str) -> TarEntry {
        TarEntry {
            link_name: target.to_string(),
            ..TarEntry::new(name, JsonEntryType::Hardlink, 0o644)
        }
    }

    pub fn symlink(name: &str, target: &str) -> TarEntry {
        TarEntry {
            link_name: target.to_string(),
            ..TarEntry::new(name, JsonEntryType::Symlink, 0o777)
        }
    }

    pub fn chardev(name: &str, major: u32, minor: u32) -> TarEntry {
        TarEntry {
            dev_major: major,
            dev_minor: minor,
            ..TarEntry::new(name, JsonEntryType::Char, 0o600)
        }
    }

    pub fn blockdev(name: &str, major: u32, minor: u32) -> TarEntry {
        TarEntry {
            dev_major: major,
            dev_minor: minor,
            ..TarEntry::new(name, JsonEntryType::Block, 0o600)
        }
    }

    pub fn fifo(name: &str) -> TarEntry {
        TarEntry::new(name, JsonEntryType::Fifo, 0o644)
    }

    /// Permission bits, including setuid, setgid and sticky.
    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    pub fn owner(mut self, uid: u32, gid: u32) -> Self {
        self.uid = uid;
        self.gid = gid;
        self
    }

    pub fn mod_time(mut self, time: DateTime<Utc>) -> Self {
        self.mod_time = Some(time);
        self
    }

    pub fn xattr<V: Into<Vec<u8>>>(mut self, key: &str, value: V) -> Self {
        self.xattrs.insert(key.to_string(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Where [`build_archive`] places the landmark file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkPlacement {
    /// Write no landmark; the reader synthesizes one.
    Omit,
    /// `.no.prefetch.landmark` before every other entry.
    NoPrefetch,
    /// `.prefetch.landmark` after the first `n` entries.
    PrefetchAfter(usize),
}

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub prefix: String,
    pub compression: CompressionConfig,
    /// Split regular files into chunks of this many bytes; 0 keeps each
    /// file in one chunk.
    pub chunk_size: u64,
    pub landmark: LandmarkPlacement,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            prefix: String::new(),
            compression: CompressionConfig::default(),
            chunk_size: 0,
            landmark: LandmarkPlacement::NoPrefetch,
        }
    }
}

impl BuildOptions {
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    pub fn with_compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_landmark(mut self, landmark: LandmarkPlacement) -> Self {
        self.landmark = landmark;
        self
    }
}

/// Every compression scheme compiled into this build, at a fast and a
/// thorough level where levels apply.
pub fn compression_matrix() -> Vec<CompressionConfig> {
    #[allow(unused_mut)]
    let mut out = vec![CompressionConfig::new(Compression::Stored)];
    #[cfg(feature = "zstd")]
    {
        out.push(CompressionConfig::with_level(Compression::Zstd, 1));
        out.push(CompressionConfig::with_level(Compression::Zstd, 19));
    }
    #[cfg(feature = "xz")]
    {
        out.push(CompressionConfig::with_level(Compression::Xz, 0));
        out.push(CompressionConfig::with_level(Compression::Xz, 9));
    }
    #[cfg(feature = "gzip")]
    {
        for level in &[0, 1, 6, 9] {
            out.push(CompressionConfig::with_level(Compression::Gzip, *level));
        }
    }
    out
}

struct Writer {
    out: Vec<u8>,
    compressor: Box<dyn Compressor>,
    toc: Vec<JsonEntry>,
    chunk_size: u64,
}

impl Writer {
    fn write_chunk(&mut self, data: &[u8]) -> io::Result<(u64, u64)> {
        let compressed = self.compressor.compress(data)?;
        let offset = self.out.len() as u64;
        self.out.extend_from_slice(&compressed);
        Ok((offset, compressed.len() as u64))
    }

    fn add(&mut self, entry: &TarEntry, prefix: &str) -> io::Result<()> {
        let link_name = match entry.kind {
            JsonEntryType::Hardlink => format!("{}{}", prefix, entry.link_name),
            _ => entry.link_name.clone(),
        };
        let base = JsonEntry {
            name: format!("{}{}", prefix, entry.name),
            kind: entry.kind,
            size: 0,
            mode: entry.mode,
            uid: entry.uid,
            gid: entry.gid,
            modtime: entry.mod_time,
            link_name,
            dev_major: entry.dev_major,
            dev_minor: entry.dev_minor,
            xattrs: entry.xattrs.clone(),
            offset: 0,
            compressed_size: 0,
            chunk_offset: 0,
            chunk_size: 0,
        };

        if entry.kind != JsonEntryType::Reg {
            self.toc.push(base);
            return Ok(());
        }

        let size = entry.content.len() as u64;
        let step = if self.chunk_size == 0 || self.chunk_size >= size {
            size.max(1)
        } else {
            self.chunk_size
        };
        let split = step < size;

        let mut chunk_offset = 0u64;
        loop {
            let end = (chunk_offset + step).min(size);
            let (offset, compressed_size) =
                self.write_chunk(&entry.content[chunk_offset as usize..end as usize])?;
            let chunk_size = if split { end - chunk_offset } else { 0 };

            if chunk_offset == 0 {
                self.toc.push(JsonEntry {
                    size,
                    offset,
                    compressed_size,
                    chunk_size,
                    ..base.clone()
                });
            } else {
                self.toc.push(JsonEntry {
                    name: base.name.clone(),
                    kind: JsonEntryType::Chunk,
                    size: 0,
                    mode: 0,
                    uid: 0,
                    gid: 0,
                    modtime: None,
                    link_name: String::new(),
                    dev_major: 0,
                    dev_minor: 0,
                    xattrs: BTreeMap::new(),
                    offset,
                    compressed_size,
                    chunk_offset,
                    chunk_size,
                });
            }

            chunk_offset = end;
            if chunk_offset >= size {
                break;
            }
        }
        Ok(())
    }
}

/// Writes `entries` as an archive: compressed chunks, then the compressed
/// table of contents, then the footer.
pub fn build_archive(entries: &[TarEntry], opts: &BuildOptions) -> io::Result<Vec<u8>> {
    let mut writer = Writer {
        out: vec![],
        compressor: opts.compression.compressor()?,
        toc: vec![],
        chunk_size: opts.chunk_size,
    };

    let landmark = |name: &str| TarEntry::file(name, LANDMARK_CONTENTS.to_vec());

    if opts.landmark == LandmarkPlacement::NoPrefetch {
        writer.add(&landmark(NO_PREFETCH_LANDMARK), &opts.prefix)?;
    }
    for (i, entry) in entries.iter().enumerate() {
        if opts.landmark == LandmarkPlacement::PrefetchAfter(i) {
            writer.add(&landmark(PREFETCH_LANDMARK), &opts.prefix)?;
        }
        writer.add(entry, &opts.prefix)?;
    }
    if let LandmarkPlacement::PrefetchAfter(n) = opts.landmark {
        if n >= entries.len() {
            writer.add(&landmark(PREFETCH_LANDMARK), &opts.prefix)?;
        }
    }

    let toc = JsonToc {
        version: TOC_VERSION,
        chunk_size: opts.chunk_size,
        entries: writer.toc,
    };
    let json = serde_json::to_vec(&toc)?;
    let compressed = writer.compressor.compress(&json)?;

    let mut out = writer.out;
    let footer = Footer {
        toc_offset: out.len() as u64,
        toc_length: compressed.len() as u64,
        toc_uncompressed_length: json.len() as u64,
        compression: opts.compression.compression,
    };
    out.extend_from_slice(&compressed);
    footer.write(&mut out)?;

    tracing::trace!(
        entries = entries.len(),
        bytes = out.len(),
        compression = %opts.compression,
        "built test archive"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toc::{StargzTocDecoder, TocDecoder, TocEntryKind};

    fn decode(bytes: &Vec<u8>, compression: CompressionConfig) -> crate::toc::Toc {
        let decoder = StargzTocDecoder;
        let footer = decoder.read_footer(bytes).unwrap();
        assert_eq!(footer.compression, compression.compression);
        let raw = decoder.read_toc(bytes, &footer).unwrap();
        let decompressor = crate::compression::builtin_decompressors()
            .into_iter()
            .find(|d| d.compression() == compression.compression)
            .unwrap();
        decoder.parse_toc(&raw, &footer, &*decompressor).unwrap()
    }

    #[test]
    fn splits_into_chunks() {
        let opts = BuildOptions::default().with_chunk_size(4);
        let bytes = build_archive(&[TarEntry::file("large", "0123456789")], &opts).unwrap();
        let toc = decode(&bytes, opts.compression);

        assert_eq!(toc.entries[0].name, NO_PREFETCH_LANDMARK);
        let large = &toc.entries[1];
        assert_eq!(large.kind, TocEntryKind::Regular);
        let lengths: Vec<_> = large.chunks.iter().map(|c| c.length).collect();
        assert_eq!(lengths, vec![4, 4, 2]);
    }

    #[test]
    fn prefixes_names_and_link_targets() {
        let opts = BuildOptions::default()
            .with_prefix("../")
            .with_landmark(LandmarkPlacement::Omit);
        let bytes = build_archive(
            &[
                TarEntry::file("foo", "x"),
                TarEntry::link("foolink", "foo"),
                TarEntry::symlink("sym", "foo"),
            ],
            &opts,
        )
        .unwrap();
        let toc = decode(&bytes, opts.compression);
        assert_eq!(toc.entries[0].name, "../foo");
        assert_eq!(toc.entries[1].link_name, "../foo");
        assert_eq!(toc.entries[2].link_name, "foo");
    }

    #[test]
    fn prefetch_landmark_placement() {
        let opts = BuildOptions::default().with_landmark(LandmarkPlacement::PrefetchAfter(1));
        let bytes = build_archive(&[TarEntry::file("a", "a"), TarEntry::file("b", "b")], &opts)
            .unwrap();
        let names: Vec<_> = decode(&bytes, opts.compression)
            .entries
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["a", PREFETCH_LANDMARK, "b"]);
    }
}
