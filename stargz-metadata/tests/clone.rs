use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use stargz_metadata::compression::Compression;
use stargz_metadata::footer::{Footer, FOOTER_SIZE};
use stargz_metadata::testutil::{build_archive, BuildOptions, TarEntry};
use stargz_metadata::{CompressionConfig, Error, Reader, ReaderOptions, Telemetry};

fn sample_entries() -> Vec<TarEntry> {
    vec![
        TarEntry::file("foo", "foofoo"),
        TarEntry::dir("bar/"),
        TarEntry::link("bar/foolink", "foo"),
        TarEntry::file("bar/1/baz.txt", "testtest"),
        TarEntry::symlink("foosym", "bar/foolink"),
        TarEntry::dir("a/b/c/"),
        TarEntry::file("a/b/c/d", "0123456789"),
        TarEntry::fifo("a/fifo"),
    ]
}

fn sample_archive() -> Vec<u8> {
    let opts = BuildOptions::default()
        .with_compression(CompressionConfig::new(Compression::Zstd))
        .with_chunk_size(3);
    build_archive(&sample_entries(), &opts).unwrap()
}

#[test]
fn clone_keeps_ids() {
    let bytes = sample_archive();
    let reader = Reader::new(bytes.clone()).unwrap();
    let clone = reader.clone_with(Arc::new(bytes)).unwrap();

    let paths = reader.paths().unwrap();
    assert_eq!(paths, clone.paths().unwrap());
    for (path, id) in paths {
        assert_eq!(clone.lookup(&path).unwrap(), id, "{}", path);
        assert_eq!(clone.get_attr(id).unwrap(), reader.get_attr(id).unwrap());
    }

    let id = clone.lookup("a/b/c/d").unwrap();
    assert_eq!(clone.open_file(id).unwrap().read_all().unwrap(), b"0123456789");
}

#[test]
fn independent_builds_agree() {
    let first = Reader::new(sample_archive()).unwrap();
    let second = Reader::new(sample_archive()).unwrap();
    assert_eq!(first.paths().unwrap(), second.paths().unwrap());
}

#[test]
fn clone_rejects_another_archive() {
    let reader = Reader::new(sample_archive()).unwrap();
    let other = build_archive(&[TarEntry::file("foo", "bar")], &BuildOptions::default()).unwrap();
    assert!(matches!(
        reader.clone_with(Arc::new(other)),
        Err(Error::TocMismatch)
    ));
}

#[test]
fn clone_outlives_original() {
    let bytes = sample_archive();
    let reader = Reader::new(bytes.clone()).unwrap();
    let clone = reader.clone_with(Arc::new(bytes)).unwrap();
    let file = reader.open_file(reader.lookup("foo").unwrap()).unwrap();

    reader.close();
    reader.close();
    assert!(reader.is_closed());
    assert!(matches!(reader.num_of_nodes(), Err(Error::Closed)));
    assert!(matches!(file.read_all(), Err(Error::Closed)));
    assert!(matches!(
        reader.clone_with(Arc::new(sample_archive())),
        Err(Error::Closed)
    ));

    let id = clone.lookup("foo").unwrap();
    assert_eq!(clone.open_file(id).unwrap().read_all().unwrap(), b"foofoo");
}

#[test]
fn clone_reuses_options() {
    let parsed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&parsed);
    let telemetry = Telemetry::new().on_toc_parsed(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let bytes = sample_archive();
    let reader = Reader::with_options(
        Arc::new(bytes.clone()),
        ReaderOptions::default().with_telemetry(telemetry),
    )
    .unwrap();
    let _clone = reader.clone_with(Arc::new(bytes)).unwrap();
    assert_eq!(parsed.load(Ordering::SeqCst), 2);
}

#[test]
fn missing_decompressor() {
    let err = Reader::with_options(Arc::new(sample_archive()), ReaderOptions::bare()).unwrap_err();
    assert!(matches!(err, Error::MissingDecompressor(Compression::Zstd)));
}

#[test]
fn failed_phase_stops_telemetry() {
    let counts = Arc::new([AtomicUsize::new(0), AtomicUsize::new(0), AtomicUsize::new(0)]);
    let hook = |i: usize| {
        let counts = Arc::clone(&counts);
        move |_: std::time::Instant| {
            counts[i].fetch_add(1, Ordering::SeqCst);
        }
    };
    let telemetry = Telemetry::new()
        .on_footer_located(hook(0))
        .on_toc_located(hook(1))
        .on_toc_parsed(hook(2));

    // A stored archive keeps its JSON readable, so it can be broken in place.
    let mut bytes =
        build_archive(&[TarEntry::file("foo", "foo")], &BuildOptions::default()).unwrap();
    let toc_end = bytes.len() - FOOTER_SIZE as usize;
    let brace = bytes[..toc_end].iter().rposition(|b| *b == b'}').unwrap();
    bytes[brace] = b' ';

    let err = Reader::with_options(
        Arc::new(bytes),
        ReaderOptions::default().with_telemetry(telemetry),
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidToc(_)), "{:?}", err);

    let fired: Vec<_> = counts.iter().map(|c| c.load(Ordering::SeqCst)).collect();
    assert_eq!(fired, vec![1, 1, 0]);
}

#[test]
fn truncated_archive() {
    let bytes = sample_archive();
    let err = Reader::new(bytes[..bytes.len() - 1].to_vec()).unwrap_err();
    assert!(matches!(err, Error::InvalidFooter(_)));
}

/// Lays out `data` followed by a stored, uncompressed TOC and its footer.
fn stored_archive(data: &[u8], toc: &str) -> Vec<u8> {
    let mut out = data.to_vec();
    let footer = Footer {
        toc_offset: out.len() as u64,
        toc_length: toc.len() as u64,
        toc_uncompressed_length: toc.len() as u64,
        compression: Compression::Stored,
    };
    out.extend_from_slice(toc.as_bytes());
    footer.write(&mut out).unwrap();
    out
}

#[test]
fn overflowing_chunk_is_malformed() {
    let toc = r#"{"version":1,"entries":[
        {"name":"f","type":"reg","size":8,"offset":0,"compressed_size":4,"chunk_size":4},
        {"name":"f","type":"chunk","offset":4,"compressed_size":4,"chunk_offset":4,"chunk_size":18446744073709551615}
    ]}"#;
    let err = Reader::new(stored_archive(b"01234567", toc)).unwrap_err();
    assert!(matches!(err, Error::Malformed { .. }), "{:?}", err);
}

#[cfg(feature = "xz")]
#[test]
fn oversized_toc_length_is_an_error() {
    let opts = BuildOptions::default().with_compression(CompressionConfig::new(Compression::Xz));
    let mut bytes = build_archive(&sample_entries(), &opts).unwrap();
    let footer_start = bytes.len() - FOOTER_SIZE as usize;
    bytes[footer_start + 16..footer_start + 24].copy_from_slice(&u64::MAX.to_le_bytes());

    let err = Reader::new(bytes).unwrap_err();
    assert!(
        matches!(err, Error::Io { .. } | Error::InvalidFooter(_)),
        "{:?}",
        err
    );
}
