//! The packed structs represent the on-disk format of HashFS
use bytemuck::{Pod, Zeroable};
use tracing::debug;

use crate::{Error, HASH_METHOD, MAGIC, PREAMBLE_SIZE};

/// Fixed start of every archive
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(packed, C)]
pub struct Preamble {
    /// `SCS#` read as a little endian u32
    pub magic: u32,
    pub version: u16,
    /// Prepended to every path as decimal text before hashing, if nonzero
    pub salt: u16,
    /// Four character tag of the path hash; only `CITY` exists
    pub hash_method: [u8; 4],
    /// Count of entries in the entry table
    pub entry_count: u32,
}

/// Remainder of a version 1 header
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(packed, C)]
pub struct V1Tail {
    /// Absolute offset of the fixed size entry records
    pub table_offset: u32,
}

/// Remainder of a version 2 header
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(packed, C)]
pub struct V2Tail {
    /// Compressed length of the entry table
    pub entry_table_len: u32,
    pub metadata_entry_count: u32,
    /// Compressed length of the metadata table
    pub metadata_table_len: u32,
    pub entry_table_offset: u64,
    pub metadata_table_offset: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Version {
    V1,
    V2,
}

impl Version {
    pub fn number(&self) -> u16 {
        match self {
            Version::V1 => 1,
            Version::V2 => 2,
        }
    }

    /// Size of the header fields following the preamble
    pub fn tail_size(&self) -> usize {
        match self {
            Version::V1 => core::mem::size_of::<V1Tail>(),
            Version::V2 => core::mem::size_of::<V2Tail>(),
        }
    }

    /// First character of a directory listing name that marks a subdirectory
    pub fn dir_marker(&self) -> u8 {
        match self {
            Version::V1 => b'*',
            Version::V2 => b'/',
        }
    }
}

impl TryFrom<u16> for Version {
    type Error = Error;

    fn try_from(version: u16) -> Result<Version, Error> {
        match version {
            1 => Ok(Version::V1),
            2 => Ok(Version::V2),
            other => Err(Error::UnsupportedVersion(other)),
        }
    }
}

/// Where and how the entry table is stored
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableLayout {
    V1 {
        table_offset: u64,
    },
    V2 {
        entry_table_len: u32,
        metadata_entry_count: u32,
        metadata_table_len: u32,
        entry_table_offset: u64,
        metadata_table_offset: u64,
    },
}

/// A validated archive header
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub salt: u16,
    pub entry_count: u32,
    pub layout: TableLayout,
}

impl Preamble {
    /// Parse the preamble from the first [`PREAMBLE_SIZE`] bytes of `data`
    /// and check magic, version and hash method, in that order
    pub fn new(data: &[u8]) -> Result<(Preamble, Version), Error> {
        let data = data.get(..PREAMBLE_SIZE).ok_or(Error::Truncated {
            offset: 0,
            expected: PREAMBLE_SIZE,
            actual: data.len(),
        })?;
        let preamble: Preamble = bytemuck::pod_read_unaligned(data);

        let magic = u32::from_le(preamble.magic);
        if magic != MAGIC {
            return Err(Error::NotAnArchive(magic));
        }

        let version = Version::try_from(u16::from_le(preamble.version))?;

        if preamble.hash_method != HASH_METHOD {
            return Err(Error::UnsupportedHashMethod(preamble.hash_method));
        }

        Ok((preamble, version))
    }

    pub fn salt(&self) -> u16 {
        u16::from_le(self.salt)
    }

    pub fn entry_count(&self) -> u32 {
        u32::from_le(self.entry_count)
    }
}

impl Header {
    /// Complete a header from its preamble and the version specific tail
    pub fn new(preamble: &Preamble, version: Version, tail: &[u8]) -> Result<Header, Error> {
        let tail = tail.get(..version.tail_size()).ok_or(Error::Truncated {
            offset: PREAMBLE_SIZE as u64,
            expected: version.tail_size(),
            actual: tail.len(),
        })?;

        let layout = match version {
            Version::V1 => {
                let tail: V1Tail = bytemuck::pod_read_unaligned(tail);
                TableLayout::V1 {
                    table_offset: u32::from_le(tail.table_offset) as u64,
                }
            }
            Version::V2 => {
                let tail: V2Tail = bytemuck::pod_read_unaligned(tail);
                TableLayout::V2 {
                    entry_table_len: u32::from_le(tail.entry_table_len),
                    metadata_entry_count: u32::from_le(tail.metadata_entry_count),
                    metadata_table_len: u32::from_le(tail.metadata_table_len),
                    entry_table_offset: u64::from_le(tail.entry_table_offset),
                    metadata_table_offset: u64::from_le(tail.metadata_table_offset),
                }
            }
        };

        let header = Header {
            salt: preamble.salt(),
            entry_count: preamble.entry_count(),
            layout,
        };
        debug!(
            version = version.number(),
            salt = header.salt,
            entry_count = header.entry_count,
            "parsed header"
        );
        Ok(header)
    }

    pub fn version(&self) -> Version {
        match self.layout {
            TableLayout::V1 { .. } => Version::V1,
            TableLayout::V2 { .. } => Version::V2,
        }
    }

    /// Size of the whole header, preamble included
    pub fn size(&self) -> usize {
        PREAMBLE_SIZE + self.version().tail_size()
    }
}

#[cfg(test)]
mod tests {
    use super::{Header, Preamble, TableLayout, Version};
    use crate::{Error, MAGIC};

    fn preamble(magic: u32, version: u16, method: &[u8; 4]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&magic.to_le_bytes());
        data.extend_from_slice(&version.to_le_bytes());
        data.extend_from_slice(&42u16.to_le_bytes());
        data.extend_from_slice(method);
        data.extend_from_slice(&3u32.to_le_bytes());
        data
    }

    #[test]
    fn v1_header() {
        let mut data = preamble(MAGIC, 1, b"CITY");
        data.extend_from_slice(&0x1234u32.to_le_bytes());

        let (pre, version) = Preamble::new(&data).unwrap();
        assert_eq!(version, Version::V1);
        let header = Header::new(&pre, version, &data[16..]).unwrap();
        assert_eq!(header.salt, 42);
        assert_eq!(header.entry_count, 3);
        assert_eq!(header.layout, TableLayout::V1 { table_offset: 0x1234 });
        assert_eq!(header.size(), 20);
    }

    #[test]
    fn v2_header() {
        let mut data = preamble(MAGIC, 2, b"CITY");
        for field in [10u32, 11, 12] {
            data.extend_from_slice(&field.to_le_bytes());
        }
        data.extend_from_slice(&0x1_0000_0000u64.to_le_bytes());
        data.extend_from_slice(&64u64.to_le_bytes());

        let (pre, version) = Preamble::new(&data).unwrap();
        let header = Header::new(&pre, version, &data[16..]).unwrap();
        assert_eq!(header.version(), Version::V2);
        assert_eq!(
            header.layout,
            TableLayout::V2 {
                entry_table_len: 10,
                metadata_entry_count: 11,
                metadata_table_len: 12,
                entry_table_offset: 0x1_0000_0000,
                metadata_table_offset: 64,
            }
        );
        assert_eq!(header.size(), 44);
    }

    #[test]
    fn rejects_bad_preamble() {
        assert!(matches!(
            Preamble::new(&preamble(0x0403_4b50, 1, b"CITY")),
            Err(Error::NotAnArchive(0x0403_4b50))
        ));
        assert!(matches!(
            Preamble::new(&preamble(MAGIC, 3, b"CITY")),
            Err(Error::UnsupportedVersion(3))
        ));
        assert!(matches!(
            Preamble::new(&preamble(MAGIC, 1, b"FNV1")),
            Err(Error::UnsupportedHashMethod(m)) if &m == b"FNV1"
        ));
        assert!(matches!(
            Preamble::new(&preamble(MAGIC, 1, b"CITY")[..10]),
            Err(Error::Truncated { expected: 16, actual: 10, .. })
        ));
    }

    #[test]
    fn rejects_short_tail() {
        let data = preamble(MAGIC, 2, b"CITY");
        let (pre, version) = Preamble::new(&data).unwrap();
        assert!(matches!(
            Header::new(&pre, version, &[0; 8]),
            Err(Error::Truncated { expected: 28, actual: 8, .. })
        ));
    }

    #[test]
    fn dir_markers() {
        assert_eq!(Version::V1.dir_marker(), b'*');
        assert_eq!(Version::V2.dir_marker(), b'/');
    }
}
