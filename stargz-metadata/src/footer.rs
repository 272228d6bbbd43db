use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::compression::Compression;

// The leading 0xff is never valid UTF-8, so text files are rejected at once.
pub const MAGIC_BYTES: &[u8; 8] = b"\xffSTARGZ\x01";

/// Size of the footer at the very end of every archive.
pub const FOOTER_SIZE: u64 = 40;

/// Locates the table of contents. Always the last `FOOTER_SIZE` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    pub toc_offset: u64,
    pub toc_length: u64,
    pub toc_uncompressed_length: u64,
    pub compression: Compression,
}

impl Footer {
    pub fn write<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        writer.write_u64::<LittleEndian>(self.toc_offset)?;
        writer.write_u64::<LittleEndian>(self.toc_length)?;
        writer.write_u64::<LittleEndian>(self.toc_uncompressed_length)?;
        writer.write_u8(self.compression.id())?;
        writer.write_all(&[0u8; 7])?;
        writer.write_all(MAGIC_BYTES)?;
        Ok(())
    }

    /// Parses a footer, checking it against an archive of `archive_len` bytes.
    pub fn parse(bytes: &[u8], archive_len: u64) -> Result<Footer, String> {
        if bytes.len() as u64 != FOOTER_SIZE {
            return Err(format!("footer must be {} bytes, got {}", FOOTER_SIZE, bytes.len()));
        }

        let (footer, reserved, magic) =
            read_fields(&mut Cursor::new(bytes)).map_err(|e| e.to_string())?;

        if &magic != MAGIC_BYTES {
            return Err("magic bytes do not match".into());
        }
        if reserved != [0u8; 7] {
            return Err("reserved footer bytes are not zero".into());
        }

        let toc_end = footer
            .toc_offset
            .checked_add(footer.toc_length)
            .ok_or_else(|| "table of contents range overflows".to_string())?;
        if toc_end != archive_len.saturating_sub(FOOTER_SIZE) {
            return Err(format!(
                "table of contents ends at {:#x}, footer starts at {:#x}",
                toc_end,
                archive_len.saturating_sub(FOOTER_SIZE)
            ));
        }

        Ok(footer)
    }
}

fn read_fields<R: Read>(reader: &mut R) -> std::io::Result<(Footer, [u8; 7], [u8; 8])> {
    let toc_offset = reader.read_u64::<LittleEndian>()?;
    let toc_length = reader.read_u64::<LittleEndian>()?;
    let toc_uncompressed_length = reader.read_u64::<LittleEndian>()?;
    let compression = Compression::from_id(reader.read_u8()?);
    let mut reserved = [0u8; 7];
    reader.read_exact(&mut reserved)?;
    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic)?;
    let footer = Footer {
        toc_offset,
        toc_length,
        toc_uncompressed_length,
        compression,
    };
    Ok((footer, reserved, magic))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Footer {
        Footer {
            toc_offset: 100,
            toc_length: 20,
            toc_uncompressed_length: 64,
            compression: Compression::Zstd,
        }
    }

    fn sample_bytes() -> Vec<u8> {
        let mut out = vec![];
        sample().write(&mut out).unwrap();
        out
    }

    #[test]
    fn layout() {
        let bytes = sample_bytes();
        assert_eq!(bytes.len() as u64, FOOTER_SIZE);
        assert_eq!(&bytes[32..], MAGIC_BYTES);
        assert_eq!(bytes[24], Compression::Zstd.id());
        assert_eq!(Footer::parse(&bytes, 160).unwrap(), sample());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = sample_bytes();
        bytes[39] = b'!';
        assert!(Footer::parse(&bytes, 160).is_err());
    }

    #[test]
    fn rejects_toc_not_adjacent_to_footer() {
        let bytes = sample_bytes();
        assert!(Footer::parse(&bytes, 161).is_err());
        assert!(Footer::parse(&bytes[..39], 160).is_err());
    }
}
