use std::io::Write;

use super::{open, resolve};
use crate::error::{Error, Result};
use crate::ArchiveArgs;

const BUF_SIZE: usize = 64 * 1024;

pub fn run(args: &ArchiveArgs, path: &str, offset: u64, length: Option<u64>) -> Result<()> {
    let reader = open(args)?;
    let id = resolve(&reader, path)?;
    let read_error = |source| Error::ReadFile {
        path: path.to_string(),
        source,
    };
    let file = reader.open_file(id).map_err(read_error)?;

    let end = match length {
        Some(length) => offset.saturating_add(length).min(file.size()),
        None => file.size(),
    };
    tracing::info!(id, offset, end, chunks = ?file.num_chunks().ok(), "reading file");

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut buf = vec![0u8; BUF_SIZE];
    let mut pos = offset;
    while pos < end {
        let want = ((end - pos) as usize).min(BUF_SIZE);
        let n = file.read_at(&mut buf[..want], pos).map_err(read_error)?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n]).map_err(Error::Output)?;
        pos += n as u64;
    }
    out.flush().map_err(Error::Output)?;

    Ok(())
}
