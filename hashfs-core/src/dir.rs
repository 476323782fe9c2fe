//! Directory entries hold the names of their children, since the entry
//! table itself only knows hashes.
use bitflags::bitflags;

use crate::{Error, Version};

bitflags! {
    /// Which children a listing returns
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ListKinds: u8 {
        const FILES = 1 << 0;
        const DIRECTORIES = 1 << 1;
    }
}

/// A child name decoded from a directory entry
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DirName {
    /// Name relative to the listed directory; subdirectories end in `/`
    pub name: String,
    pub is_directory: bool,
}

/// Decode the raw content of a directory entry
pub fn decode_listing(version: Version, data: &[u8]) -> Result<Vec<DirName>, Error> {
    let marker = version.dir_marker();
    match version {
        Version::V1 => Ok(data
            .split(|&b| b == b'\n')
            .filter(|token| !token.is_empty())
            .map(|token| dir_name(token, marker))
            .collect()),
        Version::V2 => {
            let count_bytes = data.get(..4).ok_or_else(|| truncated(data.len()))?;
            let mut count = [0; 4];
            count.copy_from_slice(count_bytes);
            let count = u32::from_le_bytes(count) as usize;

            let lengths = count
                .checked_add(4)
                .and_then(|end| data.get(4..end))
                .ok_or_else(|| truncated(data.len()))?;

            let mut names = Vec::with_capacity(count);
            let mut pos = 4 + count;
            for &len in lengths {
                let end = pos + len as usize;
                let token = data.get(pos..end).ok_or_else(|| truncated(data.len()))?;
                names.push(dir_name(token, marker));
                pos = end;
            }
            Ok(names)
        }
    }
}

/// Keep the names of the requested kinds, in listing order
pub fn filter_listing(names: Vec<DirName>, kinds: ListKinds) -> Vec<String> {
    names
        .into_iter()
        .filter(|name| {
            if name.is_directory {
                kinds.contains(ListKinds::DIRECTORIES)
            } else {
                kinds.contains(ListKinds::FILES)
            }
        })
        .map(|name| name.name)
        .collect()
}

fn dir_name(token: &[u8], marker: u8) -> DirName {
    // Names are single byte encoded; map each byte to the same code point
    match token.split_first() {
        Some((&first, rest)) if first == marker => {
            let mut name: String = rest.iter().map(|&b| b as char).collect();
            name.push('/');
            DirName {
                name,
                is_directory: true,
            }
        }
        _ => DirName {
            name: token.iter().map(|&b| b as char).collect(),
            is_directory: false,
        },
    }
}

fn truncated(len: usize) -> Error {
    Error::CorruptContent(format!("directory listing truncated ({} bytes)", len))
}
