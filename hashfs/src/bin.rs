//! Command implementations behind the `hashfs` binary
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use hashfs_core::{ListKinds, HASH_METHOD, ROOT};
use tracing::debug;

use crate::{wrap_io_err, Error, HashFsFile};

/// Ensure that `path` only has normal components, so joining it onto a
/// directory cannot leave that directory
pub fn check_path(path: &str) -> Result<&Path, Error> {
    let checked = Path::new(path);
    for component in checked.components() {
        match component {
            Component::Normal(_) => {}
            invalid => {
                let bad_component: &Path = invalid.as_ref();
                return Err(Error::UnsafePath {
                    path: path.to_string(),
                    component: bad_component.to_path_buf(),
                });
            }
        }
    }
    Ok(checked)
}

pub fn info(archive_path: impl AsRef<Path>, out: &mut impl Write) -> Result<(), Error> {
    let archive = HashFsFile::open(archive_path)?;
    let header = archive.header();

    writeln!(
        out,
        "version: {}\nsalt: {}\nhash method: {}\nentries: {} (header: {})",
        header.version().number(),
        header.salt,
        String::from_utf8_lossy(&HASH_METHOD),
        archive.entry_count(),
        header.entry_count,
    )
    .map_err(wrap_io_err!("Write info"))
}

/// Print the children of `dir` of the given kinds, one per line. With
/// `recursive`, subdirectories are descended into and names are printed
/// relative to `dir`.
pub fn list(
    archive_path: impl AsRef<Path>,
    dir: &str,
    kinds: ListKinds,
    recursive: bool,
    out: &mut impl Write,
) -> Result<(), Error> {
    let mut archive = HashFsFile::open(archive_path)?;

    let names = if recursive {
        archive
            .walk(dir, kinds)?
            .into_iter()
            .map(|(name, _)| name)
            .collect()
    } else {
        archive.list(dir, kinds)?
    };

    for name in names {
        writeln!(out, "{}", name).map_err(wrap_io_err!("Write listing"))?;
    }
    Ok(())
}

/// Extract one file to `dest`, or to `out` if there is no destination
pub fn extract(
    archive_path: impl AsRef<Path>,
    path: &str,
    dest: Option<&Path>,
    out: &mut impl Write,
) -> Result<u64, Error> {
    let mut archive = HashFsFile::open(archive_path)?;
    match dest {
        Some(dest) => archive.extract_to_path(path, dest),
        None => {
            let count = archive.extract_to(path, out)?;
            out.flush().map_err(wrap_io_err!("Flush output"))?;
            Ok(count)
        }
    }
}

/// Extract every file reachable from the root directory into `base_dir`,
/// returning how many were written
pub fn extract_all(
    archive_path: impl AsRef<Path>,
    base_dir: impl AsRef<Path>,
) -> Result<usize, Error> {
    let mut archive = HashFsFile::open(archive_path)?;
    let base_dir = base_dir.as_ref();

    let files = archive.walk(ROOT, ListKinds::FILES)?;
    for (relative, entry) in &files {
        let target: PathBuf = base_dir.join(check_path(relative)?);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(wrap_io_err!(parent, "Create directory"))?;
        }
        archive.extract_entry_to_path(entry, &target)?;
        debug!(path = %relative, size = entry.size, "extracted");
    }
    Ok(files.len())
}
