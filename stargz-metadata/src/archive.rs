//! Positional access to the bytes of an archive.
//!
//! The reader never keeps a cursor: every read names its own offset, so one
//! handle can serve concurrent readers. Handles that need locking around a
//! single stream must do it inside [`ReadAt::read_at`].

use std::fs::File;
use std::io::{Error, ErrorKind, Result};
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;

pub trait ReadAt: Send + Sync {
    /// Reads up to `buf.len()` bytes starting at `offset`. Returns 0 at or
    /// after the end of the archive.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize>;

    /// Total length of the archive in bytes.
    fn size(&self) -> u64;

    fn read_exact_at(&self, mut buf: &mut [u8], mut offset: u64) -> Result<()> {
        while !buf.is_empty() {
            match self.read_at(buf, offset) {
                Ok(0) => {
                    return Err(Error::new(
                        ErrorKind::UnexpectedEof,
                        format!("archive ended before offset {:#x}", offset),
                    ))
                }
                Ok(n) => {
                    buf = &mut buf[n..];
                    offset += n as u64;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Reads the range `[offset, offset + len)` into a fresh buffer.
    fn read_range(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        let end = offset.checked_add(len).filter(|end| *end <= self.size());
        if end.is_none() {
            return Err(Error::new(
                ErrorKind::UnexpectedEof,
                format!(
                    "range {:#x}+{} is outside the archive ({} bytes)",
                    offset,
                    len,
                    self.size()
                ),
            ));
        }
        let mut buf = vec![0u8; len as usize];
        self.read_exact_at(&mut buf, offset)?;
        Ok(buf)
    }
}

fn read_slice_at(data: &[u8], buf: &mut [u8], offset: u64) -> usize {
    if offset >= data.len() as u64 {
        return 0;
    }
    let src = &data[offset as usize..];
    let n = src.len().min(buf.len());
    buf[..n].copy_from_slice(&src[..n]);
    n
}

impl ReadAt for Vec<u8> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        Ok(read_slice_at(self, buf, offset))
    }

    fn size(&self) -> u64 {
        self.len() as u64
    }
}

impl ReadAt for Arc<[u8]> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        Ok(read_slice_at(self, buf, offset))
    }

    fn size(&self) -> u64 {
        self.len() as u64
    }
}

/// An archive on disk, read with positional reads so no cursor is shared.
#[derive(Debug)]
pub struct FileArchive {
    file: File,
    len: u64,
}

impl FileArchive {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<FileArchive> {
        let file = File::open(path.as_ref())?;
        FileArchive::new(file)
    }

    pub fn new(file: File) -> Result<FileArchive> {
        let len = file.metadata()?.len();
        Ok(FileArchive { file, len })
    }
}

impl ReadAt for FileArchive {
    #[cfg(unix)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        use std::os::unix::fs::FileExt;
        if offset >= self.len {
            return Ok(0);
        }
        self.file.read_at(buf, offset)
    }

    #[cfg(windows)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        use std::os::windows::fs::FileExt;
        if offset >= self.len {
            return Ok(0);
        }
        self.file.seek_read(buf, offset)
    }

    fn size(&self) -> u64 {
        self.len
    }
}

/// An archive mapped into memory.
#[derive(Debug)]
pub struct MmapArchive {
    mmap: Mmap,
}

impl MmapArchive {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<MmapArchive> {
        let file = File::open(path.as_ref())?;
        // SAFETY: archives are treated as immutable for the lifetime of the
        // reader; truncating the file underneath the map is not supported.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(MmapArchive { mmap })
    }
}

impl ReadAt for MmapArchive {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        Ok(read_slice_at(&self.mmap, buf, offset))
    }

    fn size(&self) -> u64 {
        self.mmap.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_reads_at_the_end() {
        let data = b"hello world".to_vec();
        let mut buf = [0u8; 8];
        assert_eq!(data.read_at(&mut buf, 6).unwrap(), 5);
        assert_eq!(&buf[..5], b"world");
        assert_eq!(data.read_at(&mut buf, 11).unwrap(), 0);
        assert_eq!(data.read_at(&mut buf, 100).unwrap(), 0);
    }

    #[test]
    fn read_range_bounds() {
        let data: Arc<[u8]> = Arc::from(&b"0123456789"[..]);
        assert_eq!(data.read_range(2, 3).unwrap(), b"234");
        assert_eq!(data.read_range(10, 0).unwrap(), b"");
        let err = data.read_range(8, 3).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
        assert!(data.read_range(u64::MAX, 2).is_err());
    }
}
