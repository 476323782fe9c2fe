use std::io::{self, Read, Write};

use flate2::read::ZlibDecoder;
use tracing::trace;

use crate::table::{inflate_table, MAX_METADATA_RECORD_SIZE};
use crate::{Entry, EntryTable, Error, Header, Preamble, TableLayout, PREAMBLE_SIZE};

const COPY_BUF_SIZE: usize = 64 * 1024;

/// Random access storage holding a HashFS archive
pub trait ArchiveSrc {
    type Err: From<Error>;

    /// Fill all of `buf` with the bytes starting at `offset`
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), Self::Err>;

    /// Total size of the archive in bytes
    fn len(&self) -> Result<u64, Self::Err>;

    fn is_empty(&self) -> Result<bool, Self::Err> {
        Ok(self.len()? == 0)
    }

    /// Fail with [`Error::Truncated`] unless `len` bytes starting at
    /// `offset` lie inside the archive. Lengths read from the archive are
    /// checked with this before anything is allocated for them.
    fn check_range(&self, offset: u64, len: usize) -> Result<(), Self::Err> {
        let total = self.len()?;
        let end = offset
            .checked_add(len as u64)
            .ok_or(Error::Overflow)?;
        if end > total {
            return Err(Error::Truncated {
                offset,
                expected: len,
                actual: usize::try_from(total.saturating_sub(offset)).unwrap_or(usize::MAX),
            }
            .into());
        }
        Ok(())
    }

    fn read_vec(&mut self, offset: u64, len: usize) -> Result<Vec<u8>, Self::Err> {
        self.check_range(offset, len)?;
        let mut buf = vec![0; len];
        self.read_at(offset, &mut buf)?;
        Ok(buf)
    }

    fn read_header(&mut self) -> Result<Header, Self::Err> {
        let mut preamble_data = [0; PREAMBLE_SIZE];
        self.read_at(0, &mut preamble_data)?;
        let (preamble, version) = Preamble::new(&preamble_data)?;

        let tail = self.read_vec(PREAMBLE_SIZE as u64, version.tail_size())?;
        Ok(Header::new(&preamble, version, &tail)?)
    }

    /// Load the complete entry table described by `header`
    fn read_entry_table(&mut self, header: &Header) -> Result<EntryTable, Self::Err> {
        match header.layout {
            TableLayout::V1 { table_offset } => {
                let size = (header.entry_count as usize)
                    .checked_mul(crate::V1_ENTRY_SIZE)
                    .ok_or(Error::Overflow)?;
                let data = self.read_vec(table_offset, size)?;
                Ok(EntryTable::from_v1(&data, header.entry_count)?)
            }
            TableLayout::V2 {
                entry_table_len,
                metadata_entry_count,
                metadata_table_len,
                entry_table_offset,
                metadata_table_offset,
            } => {
                // Every entry has one plain record; image records are
                // bounded by the declared metadata count
                let entry_count = header.entry_count as u64;
                let compact_limit = entry_count * crate::V2_ENTRY_SIZE as u64;
                let metadata_limit = (entry_count + metadata_entry_count as u64)
                    * MAX_METADATA_RECORD_SIZE as u64;

                let compact = self.read_vec(entry_table_offset, entry_table_len as usize)?;
                let compact = inflate_table(&compact, compact_limit)?;
                let metadata = self.read_vec(metadata_table_offset, metadata_table_len as usize)?;
                let metadata = inflate_table(&metadata, metadata_limit)?;
                trace!(metadata_entry_count, "read v2 tables");
                Ok(EntryTable::from_v2(&compact, &metadata, header.entry_count)?)
            }
        }
    }

    /// Read an entry's content into memory, decompressing it if needed
    fn read_content(&mut self, entry: &Entry) -> Result<Vec<u8>, Self::Err> {
        trace!(hash = %format_args!("{:016x}", entry.hash), size = entry.size, "read content");
        if entry.size == 0 {
            return Ok(Vec::new());
        }

        if !entry.is_compressed {
            return self.read_vec(entry.offset, entry.size as usize);
        }

        let compressed = self.read_vec(entry.offset, entry.compressed_size as usize)?;
        // The declared size is only trusted once inflation has produced it
        let mut content = Vec::with_capacity(compressed.len());
        ZlibDecoder::new(&compressed[..])
            .take(entry.size as u64 + 1)
            .read_to_end(&mut content)
            .map_err(|e| Error::CorruptContent(format!("inflate failed: {}", e)))?;
        check_len(entry, content.len() as u64)?;
        Ok(content)
    }

    /// Stream an entry's content into `dest` without holding all of it in
    /// memory. Returns the number of bytes written.
    fn copy_content<W: Write>(&mut self, entry: &Entry, dest: &mut W) -> Result<u64, Self::Err>
    where
        Self: Sized,
    {
        trace!(hash = %format_args!("{:016x}", entry.hash), size = entry.size, "copy content");
        if entry.size == 0 {
            return Ok(0);
        }

        self.check_range(entry.offset, entry.stored_size() as usize)?;
        let mut buf = vec![0; COPY_BUF_SIZE];
        if !entry.is_compressed {
            let mut offset = entry.offset;
            let mut remaining = entry.size as usize;
            while remaining > 0 {
                let count = remaining.min(buf.len());
                self.read_at(offset, &mut buf[..count])?;
                dest.write_all(&buf[..count]).map_err(Error::Io)?;
                offset += count as u64;
                remaining -= count;
            }
            return Ok(entry.size as u64);
        }

        let mut reader = SrcReader {
            src: self,
            offset: entry.offset,
            remaining: entry.compressed_size as u64,
            err: None,
        };
        let mut decoder = ZlibDecoder::new(&mut reader).take(entry.size as u64 + 1);
        let mut total = 0u64;
        loop {
            let count = match decoder.read(&mut buf) {
                Ok(0) => break,
                Ok(count) => count,
                Err(e) => {
                    drop(decoder);
                    return Err(match reader.err.take() {
                        Some(err) => err,
                        None => Error::CorruptContent(format!("inflate failed: {}", e)).into(),
                    });
                }
            };
            total += count as u64;
            check_len_at_most(entry, total)?;
            dest.write_all(&buf[..count]).map_err(Error::Io)?;
        }
        check_len(entry, total)?;
        Ok(total)
    }
}

/// [`Read`] over a window of an [`ArchiveSrc`]. Source errors are kept
/// aside so they reach the caller with their own type.
struct SrcReader<'a, S: ArchiveSrc> {
    src: &'a mut S,
    offset: u64,
    remaining: u64,
    err: Option<S::Err>,
}

impl<S: ArchiveSrc> Read for SrcReader<'_, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = (<[u8]>::len(buf) as u64).min(self.remaining) as usize;
        if count == 0 {
            return Ok(0);
        }
        match self.src.read_at(self.offset, &mut buf[..count]) {
            Ok(()) => {
                self.offset += count as u64;
                self.remaining -= count as u64;
                Ok(count)
            }
            Err(err) => {
                self.err = Some(err);
                Err(io::Error::new(io::ErrorKind::Other, "archive read failed"))
            }
        }
    }
}

fn check_len(entry: &Entry, len: u64) -> Result<(), Error> {
    if len != entry.size as u64 {
        return Err(Error::CorruptContent(format!(
            "entry {:016x} inflated to {} bytes, expected {}",
            entry.hash, len, entry.size
        )));
    }
    Ok(())
}

fn check_len_at_most(entry: &Entry, len: u64) -> Result<(), Error> {
    if len > entry.size as u64 {
        return check_len(entry, len);
    }
    Ok(())
}

impl<T: AsRef<[u8]>> ArchiveSrc for T {
    type Err = Error;

    fn len(&self) -> Result<u64, Error> {
        Ok(self.as_ref().len() as u64)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), Error> {
        let data = self.as_ref();
        let expected = <[u8]>::len(buf);
        let truncated = |actual| Error::Truncated {
            offset,
            expected,
            actual,
        };
        let start = usize::try_from(offset).map_err(|_| Error::Overflow)?;
        if start > data.len() {
            return Err(truncated(0));
        }
        let end = start.checked_add(expected).ok_or(Error::Overflow)?;
        if end > data.len() {
            return Err(truncated(data.len() - start));
        }
        buf.copy_from_slice(&data[start..end]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::write::ZlibEncoder;
    use flate2::Compression;

    use super::ArchiveSrc;
    use crate::{Entry, Error, HASH_METHOD, MAGIC};

    fn preamble(version: u16, entry_count: u32) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&MAGIC.to_le_bytes());
        data.extend_from_slice(&version.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&HASH_METHOD);
        data.extend_from_slice(&entry_count.to_le_bytes());
        data
    }

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn entry(offset: u64, size: u32, compressed_size: u32, is_compressed: bool) -> Entry {
        Entry {
            hash: 1,
            offset,
            size,
            compressed_size,
            is_directory: false,
            is_compressed,
            verify: false,
            encrypted: false,
            crc: None,
        }
    }

    #[test]
    fn slice_read_at() {
        let mut src = b"0123456789".to_vec();
        let mut buf = [0; 4];
        src.read_at(3, &mut buf).unwrap();
        assert_eq!(&buf, b"3456");
        assert!(matches!(
            src.read_at(8, &mut buf),
            Err(Error::Truncated { offset: 8, expected: 4, actual: 2 })
        ));
        assert!(matches!(
            src.read_at(20, &mut buf),
            Err(Error::Truncated { actual: 0, .. })
        ));
    }

    #[test]
    fn raw_content() {
        let mut src = b"xxhello worldxx".to_vec();
        let entry = entry(2, 11, 11, false);
        assert_eq!(src.read_content(&entry).unwrap(), b"hello world");

        let mut out = Vec::new();
        assert_eq!(src.copy_content(&entry, &mut out).unwrap(), 11);
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn compressed_content() {
        let content: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let compressed = zlib(&content);
        let mut src = vec![0xEE; 5];
        src.extend_from_slice(&compressed);

        let entry = entry(5, content.len() as u32, compressed.len() as u32, true);
        assert_eq!(src.read_content(&entry).unwrap(), content);

        let mut out = Vec::new();
        assert_eq!(src.copy_content(&entry, &mut out).unwrap(), content.len() as u64);
        assert_eq!(out, content);
    }

    #[test]
    fn empty_content_is_not_read() {
        let mut src: &[u8] = &[];
        let entry = entry(1000, 0, 0, true);
        assert!(src.read_content(&entry).unwrap().is_empty());
        assert_eq!(src.copy_content(&entry, &mut Vec::new()).unwrap(), 0);
    }

    #[test]
    fn size_mismatch_is_corrupt() {
        let compressed = zlib(b"twelve bytes");
        let len = compressed.len() as u32;

        for size in [11, 13] {
            let mut src = compressed.clone();
            let entry = entry(0, size, len, true);
            assert!(matches!(src.read_content(&entry), Err(Error::CorruptContent(_))));
            assert!(matches!(
                src.copy_content(&entry, &mut Vec::new()),
                Err(Error::CorruptContent(_))
            ));
        }

        let mut garbage = vec![0x55; 32];
        let entry = entry(0, 12, 32, true);
        assert!(matches!(garbage.read_content(&entry), Err(Error::CorruptContent(_))));
    }

    #[test]
    fn short_source_is_truncated() {
        let compressed = zlib(b"some content that will be cut short");
        let mut src = compressed[..compressed.len() / 2].to_vec();
        let entry = entry(0, 35, compressed.len() as u32, true);
        assert!(matches!(
            src.copy_content(&entry, &mut Vec::new()),
            Err(Error::Truncated { .. })
        ));
        assert!(matches!(src.read_content(&entry), Err(Error::Truncated { .. })));
    }

    #[test]
    fn huge_v1_entry_count_is_truncated() {
        let mut src = preamble(1, u32::MAX);
        src.extend_from_slice(&20u32.to_le_bytes());

        let header = src.read_header().unwrap();
        assert!(matches!(
            src.read_entry_table(&header),
            Err(Error::Truncated { offset: 20, actual: 0, .. })
        ));
    }

    #[test]
    fn huge_v2_table_len_is_truncated() {
        let mut src = preamble(2, 1);
        src.extend_from_slice(&u32::MAX.to_le_bytes());
        src.extend_from_slice(&1u32.to_le_bytes());
        src.extend_from_slice(&u32::MAX.to_le_bytes());
        src.extend_from_slice(&44u64.to_le_bytes());
        src.extend_from_slice(&44u64.to_le_bytes());

        let header = src.read_header().unwrap();
        assert!(matches!(
            src.read_entry_table(&header),
            Err(Error::Truncated { offset: 44, .. })
        ));
    }

    #[test]
    fn huge_content_size_is_checked_first() {
        let mut src = b"tiny archive".to_vec();
        let raw = entry(2, u32::MAX, u32::MAX, false);
        assert!(matches!(src.read_content(&raw), Err(Error::Truncated { .. })));
        assert!(matches!(
            src.copy_content(&raw, &mut Vec::new()),
            Err(Error::Truncated { .. })
        ));

        let packed = entry(0, 10, u32::MAX, true);
        assert!(matches!(src.read_content(&packed), Err(Error::Truncated { .. })));

        let far = entry(u64::MAX, 10, 10, false);
        assert!(matches!(src.read_content(&far), Err(Error::Overflow)));

        // A small stream claiming to inflate to 4 GiB fails once it ends
        let mut src = zlib(b"short");
        let bomb = entry(0, u32::MAX, src.len() as u32, true);
        assert!(matches!(src.read_content(&bomb), Err(Error::CorruptContent(_))));
    }

    #[test]
    fn v2_table_bomb_is_corrupt() {
        let bomb = zlib(&vec![0; 1 << 20]);
        let mut src = preamble(2, 1);
        src.extend_from_slice(&(bomb.len() as u32).to_le_bytes());
        src.extend_from_slice(&1u32.to_le_bytes());
        src.extend_from_slice(&(bomb.len() as u32).to_le_bytes());
        src.extend_from_slice(&44u64.to_le_bytes());
        src.extend_from_slice(&44u64.to_le_bytes());
        src.extend_from_slice(&bomb);

        let header = src.read_header().unwrap();
        assert!(matches!(
            src.read_entry_table(&header),
            Err(Error::CorruptEntryTable(_))
        ));
    }
}
