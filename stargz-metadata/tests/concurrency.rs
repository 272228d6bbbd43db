use std::sync::Arc;
use std::thread;

use stargz_metadata::compression::Compression;
use stargz_metadata::testutil::{build_archive, BuildOptions, TarEntry};
use stargz_metadata::{CompressionConfig, Reader};

const THREADS: usize = 8;

fn content(i: usize) -> Vec<u8> {
    (0..(100 + i * 37)).map(|n| (n * (i + 1)) as u8).collect()
}

#[test]
fn shared_reader_across_threads() {
    let entries: Vec<_> = (0..THREADS)
        .map(|i| TarEntry::file(&format!("dir{}/file{}", i % 3, i), content(i)))
        .collect();
    let names: Vec<String> = entries.iter().map(|e| e.name().to_string()).collect();

    let opts = BuildOptions::default()
        .with_compression(CompressionConfig::new(Compression::Zstd))
        .with_chunk_size(16);
    let reader = Arc::new(Reader::new(build_archive(&entries, &opts).unwrap()).unwrap());

    let handles: Vec<_> = names
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            let reader = Arc::clone(&reader);
            thread::spawn(move || {
                let want = content(i);
                let file = reader.open_file(reader.lookup(&name).unwrap()).unwrap();
                for _ in 0..20 {
                    for offset in (0..want.len()).step_by(7) {
                        let mut buf = [0u8; 23];
                        let n = file.read_at(&mut buf, offset as u64).unwrap();
                        let end = (offset + buf.len()).min(want.len());
                        assert_eq!(&buf[..n], &want[offset..end], "{} at {}", name, offset);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn file_readers_are_shareable() {
    let opts = BuildOptions::default().with_chunk_size(5);
    let bytes = build_archive(&[TarEntry::file("big", content(7))], &opts).unwrap();
    let reader = Reader::new(bytes).unwrap();
    let file = Arc::new(reader.open_file(reader.lookup("big").unwrap()).unwrap());

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let file = Arc::clone(&file);
            thread::spawn(move || {
                let want = content(7);
                let offset = t * 11;
                let mut buf = vec![0u8; 40];
                let n = file.read_at(&mut buf, offset as u64).unwrap();
                assert_eq!(&buf[..n], &want[offset..(offset + 40).min(want.len())]);
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}
