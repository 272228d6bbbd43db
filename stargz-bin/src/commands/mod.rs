use std::sync::Arc;
use std::time::Instant;

use stargz_metadata::{FileArchive, MmapArchive, ReadAt, Reader, ReaderOptions, Telemetry};

use crate::error::{Error, Result};
use crate::ArchiveArgs;

pub mod cat;
pub mod info;
pub mod list;
pub mod stat;

pub use cat::run as cat;
pub use info::run as info;
pub use list::run as list;
pub use stat::run as stat;

/// Opens the archive and logs how long each loading phase took.
pub(crate) fn open(args: &ArchiveArgs) -> Result<Reader> {
    let open_error = |source| Error::OpenArchive {
        path: args.path.clone(),
        source,
    };
    let archive: Arc<dyn ReadAt> = if args.mmap {
        Arc::new(MmapArchive::open(&args.path).map_err(open_error)?)
    } else {
        Arc::new(FileArchive::open(&args.path).map_err(open_error)?)
    };

    let start = Instant::now();
    let phase = move |name: &'static str| {
        move |at: Instant| tracing::debug!(phase = name, elapsed = ?at.duration_since(start))
    };
    let telemetry = Telemetry::new()
        .on_footer_located(phase("footer located"))
        .on_toc_located(phase("toc located"))
        .on_toc_parsed(phase("toc parsed"));

    Reader::with_options(archive, ReaderOptions::default().with_telemetry(telemetry)).map_err(
        |source| Error::ReadArchive {
            path: args.path.clone(),
            source,
        },
    )
}

pub(crate) fn resolve(reader: &Reader, path: &str) -> Result<u32> {
    reader.lookup(path).map_err(|source| Error::NotFound {
        path: path.to_string(),
        source,
    })
}

pub(crate) fn format_size(n: u64) -> String {
    use humansize::{file_size_opts as options, FileSize};
    n.file_size(options::BINARY)
        .unwrap_or_else(|_| format!("{} B", n))
}
