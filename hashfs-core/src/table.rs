use std::collections::hash_map::{self, HashMap};
use std::io::Read;

use flate2::read::ZlibDecoder;
use tracing::{debug, trace, warn};

use crate::entry::V2PlainMetadata;
use crate::{
    Entry, Error, V1Entry, V2Entry, BLOCK_SIZE, IMAGE_METADATA_SIZE, V1_ENTRY_SIZE,
    V2_ENTRY_SIZE,
};

const METADATA_IMAGE: u8 = 1;
const METADATA_PLAIN: u8 = 128;
const METADATA_DIRECTORY: u8 = 129;

const METADATA_INDEX_MASK: u32 = 0x00FF_FFFF;
const COMPRESSED_SIZE_MASK: u32 = 0x0FFF_FFFF;
const PLAIN_METADATA_SIZE: usize = core::mem::size_of::<V2PlainMetadata>();

/// Largest metadata record: a tag word followed by image metadata
pub const MAX_METADATA_RECORD_SIZE: usize = 4 + IMAGE_METADATA_SIZE;

/// Every entry of an archive, keyed by path hash
#[derive(Clone, Debug, Default)]
pub struct EntryTable {
    entries: HashMap<u64, Entry>,
}

impl EntryTable {
    /// Decode `count` fixed size version 1 records. A repeated hash
    /// replaces the earlier record.
    pub fn from_v1(data: &[u8], count: u32) -> Result<EntryTable, Error> {
        let size = (count as usize)
            .checked_mul(V1_ENTRY_SIZE)
            .ok_or(Error::Overflow)?;
        let data = data.get(..size).ok_or(Error::Truncated {
            offset: 0,
            expected: size,
            actual: data.len(),
        })?;
        let records: &[V1Entry] = bytemuck::try_cast_slice(data)?;

        let mut entries = HashMap::with_capacity(records.len());
        for record in records {
            let entry = record.to_entry()?;
            if entries.insert(entry.hash, entry).is_some() {
                warn!(hash = %format_args!("{:016x}", entry.hash), "duplicate entry hash");
            }
        }

        debug!(entries = entries.len(), "decoded v1 entry table");
        Ok(EntryTable { entries })
    }

    /// Join an inflated version 2 entry table with its inflated metadata
    /// table. Each compact record is matched to the metadata record whose
    /// index equals `metadata_index + metadata_count`.
    pub fn from_v2(compact: &[u8], metadata: &[u8], count: u32) -> Result<EntryTable, Error> {
        if compact.len() % V2_ENTRY_SIZE != 0 {
            return Err(Error::CorruptEntryTable(format!(
                "entry table length {} is not a multiple of {}",
                compact.len(),
                V2_ENTRY_SIZE
            )));
        }
        let records: &[V2Entry] = bytemuck::try_cast_slice(compact)?;
        if records.len() != count as usize {
            return Err(Error::CorruptEntryTable(format!(
                "expected {} entries, table holds {}",
                count,
                records.len()
            )));
        }

        let metadata = decode_metadata(metadata)?;
        if metadata.len() != records.len() {
            return Err(Error::CorruptEntryTable(format!(
                "{} metadata records for {} entries",
                metadata.len(),
                records.len()
            )));
        }

        let mut entries = HashMap::with_capacity(records.len());
        for record in records {
            let key = record.metadata_key()?;
            let meta = metadata.get(&key).ok_or_else(|| {
                Error::CorruptEntryTable(format!(
                    "entry {:016x} refers to missing metadata {}",
                    record.hash(),
                    key
                ))
            })?;
            trace!(
                hash = %format_args!("{:016x}", record.hash()),
                flags = u16::from_le(record.flags),
                key,
                "joined entry"
            );
            let entry = Entry {
                hash: record.hash(),
                offset: meta.offset,
                size: meta.size,
                compressed_size: meta.compressed_size,
                is_directory: meta.is_directory,
                is_compressed: meta.is_compressed,
                verify: false,
                encrypted: false,
                crc: None,
            };
            if entries.insert(entry.hash, entry).is_some() {
                warn!(hash = %format_args!("{:016x}", entry.hash), "duplicate entry hash");
            }
        }

        debug!(entries = entries.len(), "decoded v2 entry table");
        Ok(EntryTable { entries })
    }

    pub fn get(&self, hash: u64) -> Option<&Entry> {
        self.entries.get(&hash)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, in no particular order
    pub fn iter(&self) -> hash_map::Values<'_, u64, Entry> {
        self.entries.values()
    }
}

impl<'a> IntoIterator for &'a EntryTable {
    type Item = &'a Entry;
    type IntoIter = hash_map::Values<'a, u64, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Inflate one of the zlib compressed version 2 tables, which may not
/// grow past `limit` bytes
pub fn inflate_table(data: &[u8], limit: u64) -> Result<Vec<u8>, Error> {
    let mut inflated = Vec::new();
    ZlibDecoder::new(data)
        .take(limit.saturating_add(1))
        .read_to_end(&mut inflated)
        .map_err(|e| Error::CorruptEntryTable(format!("inflate failed: {}", e)))?;
    if inflated.len() as u64 > limit {
        return Err(Error::CorruptEntryTable(format!(
            "table inflates past {} bytes",
            limit
        )));
    }
    trace!(compressed = data.len(), inflated = inflated.len(), "inflated table");
    Ok(inflated)
}

#[derive(Clone, Copy, Debug)]
struct Metadata {
    offset: u64,
    size: u32,
    compressed_size: u32,
    is_directory: bool,
    is_compressed: bool,
}

/// Read tagged metadata records until `data` is exhausted
fn decode_metadata(data: &[u8]) -> Result<HashMap<u32, Metadata>, Error> {
    let mut records = HashMap::new();
    let mut pos = 0;
    while pos < data.len() {
        let word = u32::from_le_bytes(take::<4>(data, pos)?);
        pos += 4;

        let tag = (word >> 24) as u8;
        let index = word & METADATA_INDEX_MASK;
        trace!(tag, index, "metadata record");

        match tag {
            METADATA_IMAGE => {
                take::<IMAGE_METADATA_SIZE>(data, pos)?;
                pos += IMAGE_METADATA_SIZE;
            }
            METADATA_PLAIN | METADATA_DIRECTORY => {
                let plain: V2PlainMetadata =
                    bytemuck::pod_read_unaligned(&take::<PLAIN_METADATA_SIZE>(data, pos)?);
                pos += PLAIN_METADATA_SIZE;

                let compression = u32::from_le(plain.compression);
                let size = u64::from_le(plain.size);
                let size = u32::try_from(size).map_err(|_| Error::FileTooLarge(size))?;
                let offset = (u32::from_le(plain.block) as u64)
                    .checked_mul(BLOCK_SIZE)
                    .ok_or(Error::Overflow)?;

                records.insert(
                    index,
                    Metadata {
                        offset,
                        size,
                        compressed_size: compression & COMPRESSED_SIZE_MASK,
                        is_directory: tag == METADATA_DIRECTORY,
                        is_compressed: compression & !COMPRESSED_SIZE_MASK != 0,
                    },
                );
            }
            other => return Err(Error::UnsupportedMetadataEntryType(other)),
        }
    }
    Ok(records)
}

fn take<const N: usize>(data: &[u8], pos: usize) -> Result<[u8; N], Error> {
    let mut bytes = [0; N];
    let src = pos
        .checked_add(N)
        .and_then(|end| data.get(pos..end))
        .ok_or_else(|| {
            Error::CorruptEntryTable(format!("metadata record truncated at {}", pos))
        })?;
    bytes.copy_from_slice(src);
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::write::ZlibEncoder;
    use flate2::Compression;

    use super::{inflate_table, EntryTable};
    use crate::Error;

    fn v1_record(hash: u64, offset: u64, flags: u32, size: u32, compressed: u32) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&hash.to_le_bytes());
        data.extend_from_slice(&offset.to_le_bytes());
        data.extend_from_slice(&flags.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&size.to_le_bytes());
        data.extend_from_slice(&compressed.to_le_bytes());
        data
    }

    fn compact(hash: u64, index: u32, count: u16) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&hash.to_le_bytes());
        data.extend_from_slice(&index.to_le_bytes());
        data.extend_from_slice(&count.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data
    }

    fn plain(tag: u8, index: u32, compression: u32, size: u64, block: u32) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&(((tag as u32) << 24) | index).to_le_bytes());
        data.extend_from_slice(&compression.to_le_bytes());
        data.extend_from_slice(&size.to_le_bytes());
        data.extend_from_slice(&block.to_le_bytes());
        data
    }

    #[test]
    fn v1_table() {
        let mut data = v1_record(1, 100, 0b01, 20, 20);
        data.extend(v1_record(2, 120, 0b10, 50, 30));

        let table = EntryTable::from_v1(&data, 2).unwrap();
        assert_eq!(table.len(), 2);
        let dir = table.get(1).unwrap();
        assert!(dir.is_directory && !dir.is_compressed);
        let file = table.get(2).unwrap();
        assert!(!file.is_directory && file.is_compressed);
        assert_eq!((file.offset, file.size, file.compressed_size), (120, 50, 30));
        assert!(table.get(3).is_none());
    }

    #[test]
    fn v1_duplicate_hash_last_wins() {
        let mut data = v1_record(1, 100, 0, 20, 20);
        data.extend(v1_record(1, 200, 0, 5, 5));

        let table = EntryTable::from_v1(&data, 2).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(1).unwrap().offset, 200);
    }

    #[test]
    fn v1_truncated() {
        let data = v1_record(1, 100, 0, 20, 20);
        assert!(matches!(
            EntryTable::from_v1(&data, 2),
            Err(Error::Truncated { expected: 64, actual: 32, .. })
        ));
    }

    #[test]
    fn v2_join() {
        let mut entries = compact(0xAA, 0, 1);
        entries.extend(compact(0xBB, 4, 1));

        let mut metadata = plain(129, 1, 12, 12, 3);
        // Image records carry no location and are skipped
        metadata.extend_from_slice(&(1u32 << 24 | 2).to_le_bytes());
        metadata.extend_from_slice(&[0xFF; crate::IMAGE_METADATA_SIZE]);
        metadata.extend(plain(128, 5, (1 << 28) | 70, 200, 10));

        let table = EntryTable::from_v2(&entries, &metadata, 2).unwrap();
        let dir = table.get(0xAA).unwrap();
        assert!(dir.is_directory && !dir.is_compressed);
        assert_eq!((dir.offset, dir.size, dir.compressed_size), (48, 12, 12));

        let file = table.get(0xBB).unwrap();
        assert!(!file.is_directory && file.is_compressed);
        assert_eq!((file.offset, file.size, file.compressed_size), (160, 200, 70));
        assert_eq!(file.crc, None);
    }

    #[test]
    fn v2_count_mismatch() {
        let entries = compact(0xAA, 0, 1);
        let metadata = plain(128, 1, 1, 1, 1);
        assert!(matches!(
            EntryTable::from_v2(&entries, &metadata, 2),
            Err(Error::CorruptEntryTable(_))
        ));
        assert!(matches!(
            EntryTable::from_v2(&entries[..10], &metadata, 1),
            Err(Error::CorruptEntryTable(_))
        ));

        let mut metadata = plain(128, 1, 1, 1, 1);
        metadata.extend(plain(128, 2, 1, 1, 1));
        assert!(matches!(
            EntryTable::from_v2(&entries, &metadata, 1),
            Err(Error::CorruptEntryTable(_))
        ));
    }

    #[test]
    fn v2_unresolved_join() {
        let entries = compact(0xAA, 0, 0);
        let metadata = plain(128, 1, 1, 1, 1);
        assert!(matches!(
            EntryTable::from_v2(&entries, &metadata, 1),
            Err(Error::CorruptEntryTable(_))
        ));
    }

    #[test]
    fn v2_bad_metadata() {
        let entries = compact(0xAA, 0, 1);
        assert!(matches!(
            EntryTable::from_v2(&entries, &plain(2, 1, 1, 1, 1), 1),
            Err(Error::UnsupportedMetadataEntryType(2))
        ));
        assert!(matches!(
            EntryTable::from_v2(&entries, &plain(128, 1, 1, 1 << 32, 1), 1),
            Err(Error::FileTooLarge(0x1_0000_0000))
        ));
        assert!(matches!(
            EntryTable::from_v2(&entries, &plain(128, 1, 1, 1, 1)[..12], 1),
            Err(Error::CorruptEntryTable(_))
        ));
    }

    #[test]
    fn inflate() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"entry table").unwrap();
        let compressed = encoder.finish().unwrap();

        assert_eq!(inflate_table(&compressed, 11).unwrap(), b"entry table");
        assert!(matches!(
            inflate_table(b"not zlib at all", 100),
            Err(Error::CorruptEntryTable(_))
        ));
    }

    #[test]
    fn inflate_stops_at_limit() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(&vec![0; 1 << 20]).unwrap();
        let compressed = encoder.finish().unwrap();
        assert!(compressed.len() < 4096);

        assert!(matches!(
            inflate_table(&compressed, 10 * 16),
            Err(Error::CorruptEntryTable(_))
        ));
        assert_eq!(inflate_table(&compressed, 1 << 20).unwrap().len(), 1 << 20);
    }
}
