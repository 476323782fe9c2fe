use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use hashfs_core::{
    decode_listing, filter_listing, hash_path, ArchiveSrc, Entry, EntryKind, EntryTable, Header,
    ListKinds, Version, ROOT,
};
use tracing::{debug, warn};

use crate::{wrap_io_err, Error, FileSrc};

/// An open archive: its header, its entry table and the source the
/// content is read from.
///
/// The entry table is built once by [`HashFs::from_src`] and never changes,
/// so handles made with [`HashFs::try_clone`] share it.
#[derive(Debug)]
pub struct HashFs<S> {
    src: S,
    header: Header,
    entries: Arc<EntryTable>,
}

/// An archive read from a file on disk
pub type HashFsFile = HashFs<FileSrc>;

impl HashFs<FileSrc> {
    /// Open the archive at `path`. The file is closed again if the header or
    /// entry table cannot be read.
    pub fn open(path: impl AsRef<Path>) -> Result<HashFsFile, Error> {
        let src = FileSrc::open(path)?;
        HashFs::from_src(src)
    }

    /// A second handle on the same archive with its own file descriptor, so
    /// both can read at the same time
    pub fn try_clone(&self) -> Result<HashFsFile, Error> {
        Ok(HashFs {
            src: self.src.reopen()?,
            header: self.header,
            entries: Arc::clone(&self.entries),
        })
    }

    pub fn path(&self) -> &Path {
        self.src.path()
    }
}

impl<S> HashFs<S>
where
    S: ArchiveSrc,
    Error: From<S::Err>,
{
    /// Read the header and the entry table from `src`. On failure `src` is
    /// dropped before returning.
    pub fn from_src(mut src: S) -> Result<HashFs<S>, Error> {
        let header = src.read_header()?;
        let entries = src.read_entry_table(&header)?;
        if entries.len() != header.entry_count as usize {
            debug!(
                declared = header.entry_count,
                loaded = entries.len(),
                "entry count differs from header"
            );
        }
        Ok(HashFs {
            src,
            header,
            entries: Arc::new(entries),
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn version(&self) -> Version {
        self.header.version()
    }

    pub fn salt(&self) -> u16 {
        self.header.salt
    }

    /// Number of entries loaded from the entry table
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Every loaded entry, in no particular order
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    pub fn into_inner(self) -> S {
        self.src
    }

    /// Hash of `path` as this archive keys it
    pub fn hash(&self, path: &str) -> Result<u64, Error> {
        Ok(hash_path(normalize(path), self.header.salt)?)
    }

    pub fn entry(&self, path: &str) -> Result<Option<Entry>, Error> {
        let hash = self.hash(path)?;
        Ok(self.entries.get(hash).copied())
    }

    pub fn entry_kind(&self, path: &str) -> Result<EntryKind, Error> {
        Ok(self
            .entry(path)?
            .map(|entry| entry.kind())
            .unwrap_or(EntryKind::NotFound))
    }

    fn find(&self, path: &str) -> Result<Entry, Error> {
        self.entry(path)?.ok_or_else(|| Error::NotFound {
            path: path.to_string(),
        })
    }

    /// Entries handed back by callers must still belong to this archive
    fn check_entry(&self, entry: &Entry) -> Result<(), Error> {
        match self.entries.get(entry.hash) {
            Some(known) if known == entry => Ok(()),
            _ => Err(Error::NotFound {
                path: format!("#{:016x}", entry.hash),
            }),
        }
    }

    /// Content of the file at `path`
    pub fn extract(&mut self, path: &str) -> Result<Vec<u8>, Error> {
        let entry = self.find(path)?;
        Ok(self.src.read_content(&entry)?)
    }

    pub fn extract_entry(&mut self, entry: &Entry) -> Result<Vec<u8>, Error> {
        self.check_entry(entry)?;
        Ok(self.src.read_content(entry)?)
    }

    /// Stream the content of the file at `path` into `dest`, returning the
    /// number of bytes written
    pub fn extract_to<W: Write>(&mut self, path: &str, dest: &mut W) -> Result<u64, Error> {
        let entry = self.find(path)?;
        Ok(self.src.copy_content(&entry, dest)?)
    }

    pub fn extract_entry_to<W: Write>(&mut self, entry: &Entry, dest: &mut W) -> Result<u64, Error> {
        self.check_entry(entry)?;
        Ok(self.src.copy_content(entry, dest)?)
    }

    /// Extract the file at `path` into a new file at `dest`. Empty entries
    /// still create an empty file.
    pub fn extract_to_path(&mut self, path: &str, dest: impl AsRef<Path>) -> Result<u64, Error> {
        let entry = self.find(path)?;
        self.write_entry(&entry, dest.as_ref())
    }

    /// Like [`HashFs::extract_to_path`] for an entry of this archive. If
    /// extraction fails, `dest` is removed again.
    pub fn extract_entry_to_path(
        &mut self,
        entry: &Entry,
        dest: impl AsRef<Path>,
    ) -> Result<u64, Error> {
        self.check_entry(entry)?;
        self.write_entry(entry, dest.as_ref())
    }

    fn write_entry(&mut self, entry: &Entry, dest: &Path) -> Result<u64, Error> {
        let mut file = File::create(dest).map_err(wrap_io_err!(dest, "Create"))?;
        let result = self
            .src
            .copy_content(entry, &mut file)
            .map_err(Error::from)
            .and_then(|count| {
                file.flush().map_err(wrap_io_err!(dest, "Flush"))?;
                Ok(count)
            });

        if result.is_err() {
            drop(file);
            if let Err(err) = fs::remove_file(dest) {
                warn!(path = %dest.display(), %err, "cannot remove partial file");
            }
        }
        result
    }

    /// Names of the children of the directory at `path` that are of one of
    /// `kinds`. Subdirectory names end in `/`.
    pub fn list(&mut self, path: &str, kinds: ListKinds) -> Result<Vec<String>, Error> {
        let entry = self.find(path)?;
        if !entry.is_directory {
            return Err(Error::NotADirectory {
                path: path.to_string(),
            });
        }
        let data = self.src.read_content(&entry)?;
        let names = decode_listing(self.header.version(), &data)?;
        Ok(filter_listing(names, kinds))
    }

    pub fn list_files(&mut self, path: &str) -> Result<Vec<String>, Error> {
        self.list(path, ListKinds::FILES)
    }

    pub fn list_directories(&mut self, path: &str) -> Result<Vec<String>, Error> {
        self.list(path, ListKinds::DIRECTORIES)
    }

    /// Every entry of one of `kinds` reachable by listing directories from
    /// `root`, as paths relative to `root` with their entries, sorted by
    /// path. Directory paths end in `/`. Listed names that have no entry in
    /// this archive are skipped along with anything below them.
    pub fn walk(&mut self, root: &str, kinds: ListKinds) -> Result<Vec<(String, Entry)>, Error> {
        let mut found = Vec::new();
        let mut pending = vec![String::new()];
        let base = normalize(root).trim_start_matches('/');

        while let Some(relative) = pending.pop() {
            let dir = join(base, &relative);
            for name in self.list(&dir, ListKinds::all())? {
                let child = format!("{}{}", relative, name);
                let listed_dir = name.ends_with('/');
                let entry = match self.entry(&join(base, &child))? {
                    Some(entry) if entry.is_directory == listed_dir => entry,
                    _ => {
                        warn!(path = %join(base, &child), "listed child has no entry");
                        continue;
                    }
                };

                let kind = if listed_dir {
                    pending.push(child.clone());
                    ListKinds::DIRECTORIES
                } else {
                    ListKinds::FILES
                };
                if kinds.contains(kind) {
                    found.push((child, entry));
                }
            }
        }

        found.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(found)
    }
}

/// Drop one trailing `/`, except from the root itself
fn normalize(path: &str) -> &str {
    if path != ROOT {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}

/// `relative` either is empty or ends in `/`
fn join(base: &str, relative: &str) -> String {
    if base.is_empty() {
        format!("/{}", relative)
    } else {
        format!("/{}/{}", base, relative)
    }
}
