//! Core data types and decoders for HashFS, the content addressed archive
//! format of SCS Software asset packs (`.scs`).
//!
//! Archives store no names. Each entry is keyed by the [`hash_path`] of its
//! path and directories carry the names of their children, so a tree can
//! only be discovered by listing directories from the root.
use core::mem;

pub use crate::bitfield::BitField;
pub use crate::dir::{decode_listing, filter_listing, DirName, ListKinds};
pub use crate::entry::{Entry, EntryKind, V1Entry, V2Entry, V2PlainMetadata};
pub use crate::error::Error;
pub use crate::hash::{city_hash64, hash_path};
pub use crate::header::{Header, Preamble, TableLayout, V1Tail, V2Tail, Version};
pub use crate::src::ArchiveSrc;
pub use crate::table::{inflate_table, EntryTable};

mod bitfield;
mod dir;
mod entry;
mod error;
mod hash;
mod header;
mod src;
mod table;

#[cfg(any(test, feature = "fixture"))]
pub mod fixture;

/// `SCS#`
pub const MAGIC: u32 = 0x2353_4353;
pub const HASH_METHOD: [u8; 4] = *b"CITY";

/// Path of the root directory
pub const ROOT: &str = "/";

/// Version 2 content offsets are stored in units of this many bytes
pub const BLOCK_SIZE: u64 = 16;

/// Bytes following the tag word of a version 2 image metadata record
pub const IMAGE_METADATA_SIZE: usize = 24;

pub const PREAMBLE_SIZE: usize = mem::size_of::<Preamble>();
pub const V1_ENTRY_SIZE: usize = mem::size_of::<V1Entry>();
pub const V2_ENTRY_SIZE: usize = mem::size_of::<V2Entry>();

#[cfg(test)]
mod tests {
    use core::mem;

    use crate::{
        Preamble, V1Entry, V1Tail, V2Entry, V2PlainMetadata, V2Tail, MAGIC, PREAMBLE_SIZE,
        V1_ENTRY_SIZE, V2_ENTRY_SIZE,
    };

    #[test]
    fn preamble_size() {
        assert_eq!(mem::size_of::<Preamble>(), 16);
        assert_eq!(PREAMBLE_SIZE, 16);
        assert_eq!(mem::size_of::<V1Tail>(), 4);
        assert_eq!(mem::size_of::<V2Tail>(), 28);
    }

    #[test]
    fn entry_size() {
        assert_eq!(mem::size_of::<V1Entry>(), 32);
        assert_eq!(V1_ENTRY_SIZE, 32);
        assert_eq!(mem::size_of::<V2Entry>(), 16);
        assert_eq!(V2_ENTRY_SIZE, 16);
        assert_eq!(mem::size_of::<V2PlainMetadata>(), 16);
    }

    #[test]
    fn magic() {
        assert_eq!(&MAGIC.to_le_bytes(), b"SCS#");
    }
}
