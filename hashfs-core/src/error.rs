use std::error;
use std::fmt::{Display, Formatter, Result};
use std::io;

use bytemuck::PodCastError;

#[derive(Debug)]
pub enum Error {
    Cast(PodCastError),
    CorruptContent(String),
    CorruptEntryTable(String),
    FileTooLarge(u64),
    InvalidPath(String),
    Io(io::Error),
    NotAnArchive(u32),
    OutOfRange { index: u32, max: u32 },
    Overflow,
    /// A read ended before `expected` bytes were available at `offset`
    Truncated { offset: u64, expected: usize, actual: usize },
    UnsupportedHashMethod([u8; 4]),
    UnsupportedMetadataEntryType(u8),
    UnsupportedVersion(u16),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> Result {
        use Error::*;

        let msg = match self {
            Cast(err) => format!("Cast: {:?}", err),
            CorruptContent(reason) => format!("Corrupt entry content: {}", reason),
            CorruptEntryTable(reason) => format!("Corrupt entry table: {}", reason),
            FileTooLarge(size) => format!("Entry too large: {} bytes", size),
            InvalidPath(path) => format!("Path cannot be hashed: {:?}", path),
            Io(err) => format!("Io: {}", err),
            NotAnArchive(magic) => format!("Not a HashFS archive (magic {:#010x})", magic),
            OutOfRange { index, max } => format!("Index {} out of range (max {})", index, max),
            Overflow => "Overflow".to_string(),
            Truncated { offset, expected, actual } => format!(
                "Truncated read at {}: expected {} bytes, got {}",
                offset, expected, actual
            ),
            UnsupportedHashMethod(method) => format!(
                "Unsupported hash method {:?}",
                String::from_utf8_lossy(method)
            ),
            UnsupportedMetadataEntryType(tag) => format!("Unsupported metadata entry type {}", tag),
            UnsupportedVersion(version) => format!("Unsupported archive version {}", version),
        };
        write!(f, "{}", msg)
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<PodCastError> for Error {
    fn from(err: PodCastError) -> Error {
        Error::Cast(err)
    }
}
