//! Read HashFS (`.scs`) archives from disk or memory.
//!
//! ```no_run
//! use hashfs::{HashFsFile, ListKinds};
//!
//! let mut archive = HashFsFile::open("base.scs")?;
//! for name in archive.list("/def", ListKinds::all())? {
//!     println!("{}", name);
//! }
//! let data = archive.extract("/def/world/city.sii")?;
//! # Ok::<(), hashfs::Error>(())
//! ```
mod archive;
mod bin;
mod error;
mod file;

pub use archive::*;
pub use bin::*;
pub use error::Error;
pub use file::FileSrc;

pub use hashfs_core::{hash_path, ArchiveSrc, Entry, EntryKind, Header, ListKinds, Version};
