//! A read-only metadata index for seekable, chunk-addressable archives.
//!
//! [`Reader`] parses the footer and table of contents of an archive, builds
//! the node tree with stable ids and serves attributes, directory listings
//! and random-access file reads from it.

pub mod archive;
pub mod attr;
pub mod chunk;
pub mod compression;
mod error;
pub mod footer;
pub mod path;
mod reader;
pub mod testutil;
pub mod toc;
pub mod tree;

pub use archive::{FileArchive, MmapArchive, ReadAt};
pub use attr::{Attr, Mode, NodeKind};
pub use chunk::ChunkDescriptor;
pub use compression::{Compression, CompressionConfig, Decompressor};
pub use error::{Error, Result};
pub use path::TocPath;
pub use reader::{FileReader, Hook, Reader, ReaderOptions, Telemetry};
pub use toc::{StargzTocDecoder, Toc, TocDecoder, TocEntry, TocEntryKind};
pub use tree::{LANDMARK_ID, ROOT_ID};
