use stargz_metadata::{NodeKind, Reader};

use super::{format_size, open};
use crate::error::{Error, Result};
use crate::ArchiveArgs;

#[derive(Debug, Default)]
struct Stats {
    dirs: usize,
    files: usize,
    others: usize,
    bytes: u64,
    chunks: usize,
}

fn collect(reader: &Reader) -> stargz_metadata::Result<Stats> {
    let mut stats = Stats::default();
    let mut seen = std::collections::HashSet::new();
    for (_, id) in reader.paths()? {
        if !seen.insert(id) {
            continue;
        }
        let attr = reader.get_attr(id)?;
        match attr.kind() {
            NodeKind::Directory => stats.dirs += 1,
            NodeKind::Regular => {
                stats.files += 1;
                stats.bytes += attr.size;
                stats.chunks += reader.num_of_chunks(id)?;
            }
            _ => stats.others += 1,
        }
    }
    Ok(stats)
}

pub fn run(args: &ArchiveArgs) -> Result<()> {
    let archive_size = std::fs::metadata(&args.path)
        .map_err(|source| Error::OpenArchive {
            path: args.path.clone(),
            source,
        })?
        .len();
    let reader = open(args)?;
    let read_error = |source| Error::ReadArchive {
        path: args.path.clone(),
        source,
    };

    let stats = collect(&reader).map_err(read_error)?;
    let landmark = if reader.has_prefetch_landmark().map_err(read_error)? {
        "prefetch"
    } else {
        "no prefetch"
    };

    println!("Archive:      {}", args.path.display());
    println!("Size:         {}", format_size(archive_size));
    println!("Compression:  {}", reader.compression().map_err(read_error)?);
    println!("Nodes:        {}", reader.num_of_nodes().map_err(read_error)?);
    println!("Directories:  {}", stats.dirs);
    println!(
        "Files:        {} ({}, {} chunks)",
        stats.files,
        format_size(stats.bytes),
        stats.chunks
    );
    println!("Other:        {}", stats.others);
    println!("Landmark:     {}", landmark);

    Ok(())
}
