//! Archives read from disk rather than from memory.

use std::sync::Arc;

use tempfile::TempDir;

use stargz_metadata::compression::Compression;
use stargz_metadata::testutil::{build_archive, BuildOptions, LandmarkPlacement, TarEntry};
use stargz_metadata::{CompressionConfig, FileArchive, MmapArchive, ReadAt, Reader, ReaderOptions};

/// Writes a small xz archive into a fresh temp dir.
fn create_test_archive() -> (TempDir, std::path::PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = temp_dir.path().join("test.stargz");

    let opts = BuildOptions::default()
        .with_compression(CompressionConfig::new(Compression::Xz))
        .with_chunk_size(4)
        .with_landmark(LandmarkPlacement::PrefetchAfter(1));
    let bytes = build_archive(
        &[
            TarEntry::file("hello.txt", "hello world"),
            TarEntry::dir("sub/"),
            TarEntry::symlink("sub/link", "../hello.txt"),
        ],
        &opts,
    )
    .unwrap();
    std::fs::write(&archive_path, bytes).unwrap();

    (temp_dir, archive_path)
}

fn check(reader: &Reader) {
    assert_eq!(reader.num_of_nodes().unwrap(), 5);
    assert!(reader.has_prefetch_landmark().unwrap());
    assert_eq!(reader.compression().unwrap(), Compression::Xz);

    let id = reader.lookup("hello.txt").unwrap();
    let file = reader.open_file(id).unwrap();
    assert_eq!(file.num_chunks().unwrap(), 3);
    assert_eq!(file.read_all().unwrap(), b"hello world");

    let mut buf = [0u8; 5];
    assert_eq!(file.read_at(&mut buf, 6).unwrap(), 5);
    assert_eq!(&buf, b"world");

    let chunk = file.chunk_for(5).unwrap().unwrap();
    assert_eq!((chunk.offset, chunk.length), (4, 4));
    assert!(file.chunk_for(11).unwrap().is_none());

    let link = reader.get_attr(reader.lookup("sub/link").unwrap()).unwrap();
    assert_eq!(link.link_name, "../hello.txt");
}

#[test]
fn reads_through_positional_file_reads() {
    let (_temp_dir, archive_path) = create_test_archive();
    let archive = FileArchive::open(&archive_path).unwrap();
    assert_eq!(archive.size(), std::fs::metadata(&archive_path).unwrap().len());

    let reader = Reader::with_options(Arc::new(archive), ReaderOptions::default()).unwrap();
    check(&reader);
}

#[test]
fn reads_through_memory_map() {
    let (_temp_dir, archive_path) = create_test_archive();
    let reader = Reader::new(MmapArchive::open(&archive_path).unwrap()).unwrap();
    check(&reader);

    let clone = reader
        .clone_with(Arc::new(FileArchive::open(&archive_path).unwrap()))
        .unwrap();
    check(&clone);
    assert_eq!(reader.paths().unwrap(), clone.paths().unwrap());
}

#[test]
fn missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let err = FileArchive::open(temp_dir.path().join("nope.stargz")).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
}
