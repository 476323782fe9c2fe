//! The packed structs represent the on-disk format of HashFS
use core::fmt::Display;

use bytemuck::{Pod, Zeroable};

use crate::{BitField, Error};

const FLAG_DIRECTORY: u32 = 0;
const FLAG_COMPRESSED: u32 = 1;
const FLAG_VERIFY: u32 = 2;
const FLAG_ENCRYPTED: u32 = 3;

/// Result of looking a path up in an archive
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryKind {
    NotFound,
    File,
    Directory,
}

/// One file or directory of an archive, as loaded from its entry table
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Entry {
    /// Hash of the full path, see [`crate::hash_path`]
    pub hash: u64,
    /// Absolute offset of the content in the archive
    pub offset: u64,
    /// Size of the content once decompressed
    pub size: u32,
    /// Size of the content in the archive
    pub compressed_size: u32,
    pub is_directory: bool,
    pub is_compressed: bool,
    /// Version 1 only; never checked by this crate
    pub verify: bool,
    /// Version 1 only; encrypted content is not supported
    pub encrypted: bool,
    /// Version 1 only; the record field following the flags
    pub crc: Option<u32>,
}

impl Entry {
    pub fn kind(&self) -> EntryKind {
        if self.is_directory {
            EntryKind::Directory
        } else {
            EntryKind::File
        }
    }

    /// Number of bytes occupied in the archive
    pub fn stored_size(&self) -> u32 {
        if self.is_compressed {
            self.compressed_size
        } else {
            self.size
        }
    }
}

impl Display for Entry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "hash={:016x} offset={} size={} compressed_size={} kind={:?}{}",
            self.hash,
            self.offset,
            self.size,
            self.compressed_size,
            self.kind(),
            if self.is_compressed { " zlib" } else { "" },
        )
    }
}

/// Version 1 entry table record
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(packed, C)]
pub struct V1Entry {
    pub hash: u64,
    pub offset: u64,
    /// Bit 0 directory, bit 1 compressed, bit 2 verify, bit 3 encrypted
    pub flags: u32,
    pub crc: u32,
    pub size: u32,
    pub compressed_size: u32,
}

impl V1Entry {
    pub fn to_entry(&self) -> Result<Entry, Error> {
        let flags = BitField::new(u32::from_le(self.flags));
        Ok(Entry {
            hash: u64::from_le(self.hash),
            offset: u64::from_le(self.offset),
            size: u32::from_le(self.size),
            compressed_size: u32::from_le(self.compressed_size),
            is_directory: flags.bit(FLAG_DIRECTORY)?,
            is_compressed: flags.bit(FLAG_COMPRESSED)?,
            verify: flags.bit(FLAG_VERIFY)?,
            encrypted: flags.bit(FLAG_ENCRYPTED)?,
            crc: Some(u32::from_le(self.crc)),
        })
    }
}

/// Version 2 entry table record. Sizes and offsets live in the metadata
/// table; this only ties a path hash to its metadata.
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(packed, C)]
pub struct V2Entry {
    pub hash: u64,
    pub metadata_index: u32,
    pub metadata_count: u16,
    pub flags: u16,
}

impl V2Entry {
    pub fn hash(&self) -> u64 {
        u64::from_le(self.hash)
    }

    /// Index of the metadata record describing this entry
    pub fn metadata_key(&self) -> Result<u32, Error> {
        let index = u32::from_le(self.metadata_index);
        let count = u16::from_le(self.metadata_count) as u32;
        index.checked_add(count).ok_or_else(|| {
            Error::CorruptEntryTable(format!(
                "metadata index {} + {} overflows",
                index, count
            ))
        })
    }
}

/// Fields shared by file and directory records of the version 2 metadata
/// table, following the tag word
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(packed, C)]
pub struct V2PlainMetadata {
    /// Low 28 bits compressed size, any of the top 4 set means zlib
    pub compression: u32,
    pub size: u64,
    /// Content offset in units of [`crate::BLOCK_SIZE`]
    pub block: u32,
}
