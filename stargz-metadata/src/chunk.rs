use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::path::TocPath;

/// One independently decompressible range of a regular file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkDescriptor {
    pub file_id: u32,
    /// Offset of the chunk inside the uncompressed file.
    pub offset: u64,
    /// Uncompressed length.
    pub length: u64,
    /// Where the compressed bytes start in the archive.
    pub compressed_offset: u64,
    pub compressed_length: u64,
}

impl ChunkDescriptor {
    /// One past the last byte of the chunk, saturating at `u64::MAX`.
    #[inline(always)]
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.length)
    }

    #[inline(always)]
    pub fn contains(&self, offset: u64) -> bool {
        self.offset <= offset && offset < self.end()
    }
}

/// Chunk lists of every regular file, keyed by file id.
#[derive(Debug, Default)]
pub struct ChunkIndex {
    files: HashMap<u32, FileChunks>,
}

#[derive(Debug)]
struct FileChunks {
    size: u64,
    chunks: Vec<ChunkDescriptor>,
}

impl ChunkIndex {
    /// Registers the chunks of file `id`, checking that they tile
    /// `[0, size)` exactly and that every compressed range ends before
    /// `data_end`.
    ///
    /// An empty file always ends up with a single zero-length chunk.
    pub fn insert(
        &mut self,
        id: u32,
        path: &TocPath,
        size: u64,
        mut chunks: Vec<ChunkDescriptor>,
        data_end: u64,
    ) -> Result<()> {
        if size == 0 && chunks.iter().all(|c| c.length == 0) {
            let compressed_offset = chunks.first().map(|c| c.compressed_offset).unwrap_or(0);
            let compressed_length = chunks.first().map(|c| c.compressed_length).unwrap_or(0);
            chunks = vec![ChunkDescriptor {
                file_id: id,
                offset: 0,
                length: 0,
                compressed_offset,
                compressed_length,
            }];
        }

        if chunks.is_empty() {
            return Err(Error::malformed(path, "regular file has no chunks"));
        }

        let mut expected = 0u64;
        for chunk in chunks.iter_mut() {
            chunk.file_id = id;
            if chunk.offset != expected {
                return Err(Error::malformed(
                    path,
                    format!(
                        "chunk starts at {} but the previous one ended at {}",
                        chunk.offset, expected
                    ),
                ));
            }
            if chunk.length == 0 && size != 0 {
                return Err(Error::malformed(
                    path,
                    format!("zero-length chunk at {}", chunk.offset),
                ));
            }
            let compressed_end = chunk
                .compressed_offset
                .checked_add(chunk.compressed_length)
                .filter(|end| *end <= data_end);
            if compressed_end.is_none() {
                return Err(Error::malformed(
                    path,
                    format!(
                        "chunk at {} points outside the data section ({:#x}+{})",
                        chunk.offset, chunk.compressed_offset, chunk.compressed_length
                    ),
                ));
            }
            expected = match chunk.offset.checked_add(chunk.length) {
                Some(end) => end,
                None => return Err(Error::malformed(path, "chunk range overflows")),
            };
        }

        if expected != size {
            return Err(Error::malformed(
                path,
                format!("chunks cover {} bytes of a {} byte file", expected, size),
            ));
        }

        tracing::trace!(id, %path, size, chunks = chunks.len(), "indexed chunks");
        self.files.insert(id, FileChunks { size, chunks });
        Ok(())
    }

    pub fn chunks(&self, id: u32) -> Result<&[ChunkDescriptor]> {
        self.files
            .get(&id)
            .map(|f| &*f.chunks)
            .ok_or(Error::NotRegularFile { id })
    }

    pub fn num_chunks(&self, id: u32) -> Result<usize> {
        self.chunks(id).map(<[_]>::len)
    }

    /// The chunk covering `offset`, or `None` once `offset` is at or past
    /// the end of the file.
    pub fn lookup(&self, id: u32, offset: u64) -> Result<Option<&ChunkDescriptor>> {
        let file = self.files.get(&id).ok_or(Error::NotRegularFile { id })?;
        if offset >= file.size {
            return Ok(None);
        }
        let index = file.chunks.partition_point(|c| c.end() <= offset);
        Ok(file.chunks.get(index))
    }

    /// The chunk following `chunk` in the same file, if any.
    pub fn next(&self, chunk: &ChunkDescriptor) -> Option<&ChunkDescriptor> {
        let file = self.files.get(&chunk.file_id)?;
        let index = file.chunks.partition_point(|c| c.offset <= chunk.offset);
        file.chunks.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(size: u64, chunk_size: u64) -> Vec<ChunkDescriptor> {
        let mut out = vec![];
        let mut offset = 0;
        while offset < size {
            let length = chunk_size.min(size - offset);
            out.push(ChunkDescriptor {
                file_id: 0,
                offset,
                length,
                compressed_offset: offset * 2,
                compressed_length: length * 2,
            });
            offset += length;
        }
        out
    }

    fn path() -> TocPath {
        TocPath::new("foo/large").unwrap()
    }

    #[test]
    fn lookup_every_offset() {
        let mut index = ChunkIndex::default();
        index.insert(7, &path(), 22, split(22, 4), 1000).unwrap();

        assert_eq!(index.num_chunks(7).unwrap(), 6);
        for offset in 0..22 {
            let chunk = index.lookup(7, offset).unwrap().unwrap();
            assert!(chunk.contains(offset));
            assert_eq!(chunk.offset, offset / 4 * 4);
            assert_eq!(chunk.file_id, 7);
        }
        assert!(index.lookup(7, 22).unwrap().is_none());
        assert!(index.lookup(7, 1_000).unwrap().is_none());
    }

    #[test]
    fn lookup_is_stable() {
        let mut index = ChunkIndex::default();
        index.insert(3, &path(), 10, split(10, 3), 1000).unwrap();
        let first = *index.lookup(3, 5).unwrap().unwrap();
        let _ = index.lookup(3, 9).unwrap();
        assert_eq!(first, *index.lookup(3, 5).unwrap().unwrap());
    }

    #[test]
    fn next_walks_in_order() {
        let mut index = ChunkIndex::default();
        index.insert(3, &path(), 10, split(10, 4), 1000).unwrap();
        let first = *index.lookup(3, 0).unwrap().unwrap();
        let second = *index.next(&first).unwrap();
        assert_eq!(second.offset, 4);
        let third = *index.next(&second).unwrap();
        assert_eq!(third.offset, 8);
        assert!(index.next(&third).is_none());
    }

    #[test]
    fn empty_file_has_one_chunk() {
        let mut index = ChunkIndex::default();
        index.insert(4, &path(), 0, vec![], 1000).unwrap();
        assert_eq!(index.num_chunks(4).unwrap(), 1);
        assert!(index.lookup(4, 0).unwrap().is_none());
    }

    #[test]
    fn rejects_gaps_and_short_coverage() {
        let mut index = ChunkIndex::default();

        let mut gap = split(12, 4);
        gap.remove(1);
        assert!(matches!(
            index.insert(1, &path(), 12, gap, 1000),
            Err(Error::Malformed { .. })
        ));

        assert!(matches!(
            index.insert(1, &path(), 13, split(12, 4), 1000),
            Err(Error::Malformed { .. })
        ));

        assert!(matches!(
            index.insert(1, &path(), 5, vec![], 1000),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn rejects_ranges_past_data() {
        let mut index = ChunkIndex::default();
        assert!(matches!(
            index.insert(1, &path(), 12, split(12, 4), 20),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn rejects_overflowing_range() {
        let mut index = ChunkIndex::default();
        let mut chunks = split(8, 4);
        chunks[1].length = u64::MAX;
        assert!(matches!(
            index.insert(1, &path(), 8, chunks, 1000),
            Err(Error::Malformed { .. })
        ));

        let huge = ChunkDescriptor {
            file_id: 1,
            offset: 4,
            length: u64::MAX,
            compressed_offset: 0,
            compressed_length: 0,
        };
        assert_eq!(huge.end(), u64::MAX);
        assert!(huge.contains(u64::MAX - 1));
    }

    #[test]
    fn unknown_file() {
        let index = ChunkIndex::default();
        assert!(matches!(
            index.num_chunks(9),
            Err(Error::NotRegularFile { id: 9 })
        ));
    }
}
