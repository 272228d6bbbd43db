//! The table of contents and the decoder that finds it in an archive.
//!
//! On disk the TOC is a compressed JSON document placed right before the
//! footer. Regular files list their first chunk on the `reg` entry itself and
//! every further chunk as a `chunk` entry with the same name directly after
//! it. [`StargzTocDecoder`] folds those into one [`TocEntry`] per path.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::archive::ReadAt;
use crate::attr::constants::PERMISSION_MASK;
use crate::chunk::ChunkDescriptor;
use crate::compression::Decompressor;
use crate::error::{Error, Result};
use crate::footer::{Footer, FOOTER_SIZE};

pub const TOC_VERSION: u32 = 1;

/// File names that mark the end of the prefetch section of an archive.
pub const PREFETCH_LANDMARK: &str = ".prefetch.landmark";
pub const NO_PREFETCH_LANDMARK: &str = ".no.prefetch.landmark";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum JsonEntryType {
    Dir,
    Reg,
    Symlink,
    Hardlink,
    Char,
    Block,
    Fifo,
    Chunk,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct JsonEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: JsonEntryType,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub size: u64,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub mode: u32,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub uid: u32,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub gid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modtime: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub link_name: String,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub dev_major: u32,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub dev_minor: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub xattrs: BTreeMap<String, Vec<u8>>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub offset: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub compressed_size: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub chunk_offset: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub chunk_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct JsonToc {
    pub version: u32,
    #[serde(default)]
    pub chunk_size: u64,
    pub entries: Vec<JsonEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TocEntryKind {
    Directory,
    Regular,
    Symlink,
    /// Another name for the entry at `link_name`.
    Hardlink,
    CharDevice,
    BlockDevice,
    Fifo,
}

/// One decoded archive entry, in archive order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    /// The raw name as stored; not yet normalized.
    pub name: String,
    pub kind: TocEntryKind,
    pub size: u64,
    /// Permission bits, including setuid, setgid and sticky.
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub mod_time: DateTime<Utc>,
    pub link_name: String,
    pub dev_major: u32,
    pub dev_minor: u32,
    pub xattrs: BTreeMap<String, Vec<u8>>,
    /// Chunks of a regular file, ordered by offset. Empty otherwise.
    pub chunks: Vec<ChunkDescriptor>,
}

#[derive(Debug, Clone, Default)]
pub struct Toc {
    pub version: u32,
    /// The chunk size the archive was written with; 0 when files were not split.
    pub chunk_size: u64,
    pub entries: Vec<TocEntry>,
}

/// Finds and decodes the table of contents of an archive.
///
/// The three methods are the three phases a reader reports to its telemetry:
/// footer located, TOC located, TOC parsed.
pub trait TocDecoder: Send + Sync {
    fn read_footer(&self, archive: &dyn ReadAt) -> Result<Footer>;

    /// Returns the raw (still compressed) bytes of the TOC.
    fn read_toc(&self, archive: &dyn ReadAt, footer: &Footer) -> Result<Vec<u8>>;

    fn parse_toc(&self, raw: &[u8], footer: &Footer, decompressor: &dyn Decompressor)
        -> Result<Toc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StargzTocDecoder;

impl TocDecoder for StargzTocDecoder {
    fn read_footer(&self, archive: &dyn ReadAt) -> Result<Footer> {
        let len = archive.size();
        if len < FOOTER_SIZE {
            return Err(Error::InvalidFooter(format!(
                "archive is {} bytes, smaller than a footer",
                len
            )));
        }
        let bytes = archive
            .read_range(len - FOOTER_SIZE, FOOTER_SIZE)
            .map_err(Error::io("reading footer"))?;
        let footer = Footer::parse(&bytes, len).map_err(Error::InvalidFooter)?;
        tracing::debug!(
            toc_offset = footer.toc_offset,
            toc_length = footer.toc_length,
            compression = %footer.compression,
            "located footer"
        );
        Ok(footer)
    }

    fn read_toc(&self, archive: &dyn ReadAt, footer: &Footer) -> Result<Vec<u8>> {
        archive
            .read_range(footer.toc_offset, footer.toc_length)
            .map_err(Error::io("reading table of contents"))
    }

    fn parse_toc(
        &self,
        raw: &[u8],
        footer: &Footer,
        decompressor: &dyn Decompressor,
    ) -> Result<Toc> {
        let size_hint = usize::try_from(footer.toc_uncompressed_length).ok();
        let json = decompressor
            .decompress(raw, size_hint)
            .map_err(Error::io("decompressing table of contents"))?;
        if json.len() as u64 != footer.toc_uncompressed_length {
            return Err(Error::InvalidFooter(format!(
                "table of contents is {} bytes, footer declares {}",
                json.len(),
                footer.toc_uncompressed_length
            )));
        }
        let toc: JsonToc = serde_json::from_slice(&json).map_err(Error::InvalidToc)?;
        if toc.version != TOC_VERSION {
            return Err(Error::malformed(
                "",
                format!("unsupported table of contents version {}", toc.version),
            ));
        }
        let entries = fold_entries(toc.entries)?;
        tracing::debug!(entries = entries.len(), bytes = json.len(), "parsed table of contents");
        Ok(Toc {
            version: toc.version,
            chunk_size: toc.chunk_size,
            entries,
        })
    }
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::from(std::time::UNIX_EPOCH)
}

/// A file split into several chunks declares its first chunk size; one that
/// is not split leaves it implicit.
fn first_chunk(entry: &JsonEntry) -> ChunkDescriptor {
    let length = if entry.chunk_size == 0 {
        entry.size
    } else {
        entry.chunk_size
    };
    ChunkDescriptor {
        file_id: 0,
        offset: entry.chunk_offset,
        length,
        compressed_offset: entry.offset,
        compressed_length: entry.compressed_size,
    }
}

/// Attaches `chunk` entries to the regular file they continue.
fn fold_entries(raw: Vec<JsonEntry>) -> Result<Vec<TocEntry>> {
    let mut out: Vec<TocEntry> = Vec::with_capacity(raw.len());

    for entry in raw {
        let kind = match entry.kind {
            JsonEntryType::Chunk => {
                let chunk = ChunkDescriptor {
                    file_id: 0,
                    offset: entry.chunk_offset,
                    length: entry.chunk_size,
                    compressed_offset: entry.offset,
                    compressed_length: entry.compressed_size,
                };
                match out.last_mut() {
                    Some(prev) if prev.kind == TocEntryKind::Regular && prev.name == entry.name => {
                        let last_end = prev.chunks.last().map(|c| c.end()).unwrap_or(0);
                        // The last chunk of a file may leave its size implicit.
                        let chunk = if chunk.length == 0 {
                            ChunkDescriptor {
                                length: prev.size.saturating_sub(last_end),
                                ..chunk
                            }
                        } else {
                            chunk
                        };
                        prev.chunks.push(chunk);
                    }
                    _ => {
                        return Err(Error::malformed(
                            &entry.name,
                            "chunk entry does not follow its regular file",
                        ))
                    }
                }
                continue;
            }
            JsonEntryType::Dir => TocEntryKind::Directory,
            JsonEntryType::Reg => TocEntryKind::Regular,
            JsonEntryType::Symlink => TocEntryKind::Symlink,
            JsonEntryType::Hardlink => TocEntryKind::Hardlink,
            JsonEntryType::Char => TocEntryKind::CharDevice,
            JsonEntryType::Block => TocEntryKind::BlockDevice,
            JsonEntryType::Fifo => TocEntryKind::Fifo,
        };

        let chunks = if kind == TocEntryKind::Regular {
            vec![first_chunk(&entry)]
        } else {
            vec![]
        };

        out.push(TocEntry {
            name: entry.name,
            kind,
            size: if kind == TocEntryKind::Regular { entry.size } else { 0 },
            mode: entry.mode & PERMISSION_MASK,
            uid: entry.uid,
            gid: entry.gid,
            mod_time: entry.modtime.unwrap_or_else(epoch),
            link_name: entry.link_name,
            dev_major: entry.dev_major,
            dev_minor: entry.dev_minor,
            xattrs: entry.xattrs,
            chunks,
        });
    }

    Ok(out)
}
