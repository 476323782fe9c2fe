use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use hashfs_core::ArchiveSrc;

use crate::{wrap_io_err, Error};

/// An archive file on disk, read through its own handle
#[derive(Debug)]
pub struct FileSrc {
    path: PathBuf,
    src: BufReader<File>,
}

impl FileSrc {
    pub fn open(path: impl AsRef<Path>) -> Result<FileSrc, Error> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .open(&path)
            .map_err(wrap_io_err!(path, "Open"))?;

        Ok(FileSrc {
            path,
            src: BufReader::new(file),
        })
    }

    /// Open the same file again, with an independent handle and position
    pub fn reopen(&self) -> Result<FileSrc, Error> {
        FileSrc::open(&self.path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ArchiveSrc for FileSrc {
    type Err = Error;

    fn len(&self) -> Result<u64, Error> {
        let metadata = self
            .src
            .get_ref()
            .metadata()
            .map_err(wrap_io_err!(self.path, "Metadata"))?;
        Ok(metadata.len())
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), Error> {
        self.src
            .seek(SeekFrom::Start(offset))
            .map_err(wrap_io_err!(self.path, "Seek"))?;
        self.src
            .read_exact(buf)
            .map_err(wrap_io_err!(self.path, "Read"))
    }
}
