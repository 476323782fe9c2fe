//! Small archives assembled in memory, for tests. Only the layout the
//! readers need is produced; this is not a general archive writer.
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::{hash_path, Version, BLOCK_SIZE, HASH_METHOD, MAGIC};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Child {
    Dir(String),
    File(String),
}

struct Blob {
    path: String,
    data: Vec<u8>,
    compress: bool,
    is_dir: bool,
}

struct Placed {
    hash: u64,
    offset: u64,
    size: u32,
    stored_size: u32,
    compressed: bool,
    is_dir: bool,
}

/// Builds a version 1 or version 2 archive holding a tree of files.
/// Directory entries are derived from the file paths.
#[derive(Clone, Debug)]
pub struct Builder {
    version: Version,
    salt: u16,
    files: BTreeMap<String, (Vec<u8>, bool)>,
    omitted: BTreeSet<String>,
}

impl Builder {
    pub fn new(version: Version) -> Builder {
        Builder {
            version,
            salt: 0,
            files: BTreeMap::new(),
            omitted: BTreeSet::new(),
        }
    }

    pub fn salt(mut self, salt: u16) -> Builder {
        self.salt = salt;
        self
    }

    /// Add a file stored as is. `path` has no leading slash.
    pub fn file(mut self, path: &str, data: impl Into<Vec<u8>>) -> Builder {
        self.files.insert(path.to_string(), (data.into(), false));
        self
    }

    /// Add a zlib compressed file
    pub fn compressed_file(mut self, path: &str, data: impl Into<Vec<u8>>) -> Builder {
        self.files.insert(path.to_string(), (data.into(), true));
        self
    }

    /// Keep `path` in its parent's listing but leave it out of the entry
    /// table, as happens when a listing names files of another archive
    pub fn omit(mut self, path: &str) -> Builder {
        self.omitted.insert(path.to_string());
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let header_size = 16 + self.version.tail_size();
        let mut out = vec![0; header_size];

        let mut placed = Vec::new();
        for blob in self.blobs() {
            if self.omitted.contains(&blob.path) {
                continue;
            }
            if self.version == Version::V2 {
                pad_to_block(&mut out);
            }
            let stored = if blob.compress {
                zlib(&blob.data)
            } else {
                blob.data.clone()
            };
            placed.push(Placed {
                hash: hash_path(&blob.path, self.salt).expect("fixture paths are ascii"),
                offset: out.len() as u64,
                size: blob.data.len() as u32,
                stored_size: stored.len() as u32,
                compressed: blob.compress,
                is_dir: blob.is_dir,
            });
            out.extend_from_slice(&stored);
        }

        let mut header = Vec::with_capacity(header_size);
        header.extend_from_slice(&MAGIC.to_le_bytes());
        header.extend_from_slice(&self.version.number().to_le_bytes());
        header.extend_from_slice(&self.salt.to_le_bytes());
        header.extend_from_slice(&HASH_METHOD);
        header.extend_from_slice(&(placed.len() as u32).to_le_bytes());

        match self.version {
            Version::V1 => {
                let table_offset = out.len() as u32;
                for entry in &placed {
                    let flags = entry.is_dir as u32 | (entry.compressed as u32) << 1;
                    out.extend_from_slice(&entry.hash.to_le_bytes());
                    out.extend_from_slice(&entry.offset.to_le_bytes());
                    out.extend_from_slice(&flags.to_le_bytes());
                    out.extend_from_slice(&0u32.to_le_bytes());
                    out.extend_from_slice(&entry.size.to_le_bytes());
                    out.extend_from_slice(&entry.stored_size.to_le_bytes());
                }
                header.extend_from_slice(&table_offset.to_le_bytes());
            }
            Version::V2 => {
                let mut compact = Vec::new();
                let mut metadata = Vec::new();
                for (i, entry) in placed.iter().enumerate() {
                    // Joined on metadata_index + metadata_count
                    let index = 2 * i as u32;
                    compact.extend_from_slice(&entry.hash.to_le_bytes());
                    compact.extend_from_slice(&index.to_le_bytes());
                    compact.extend_from_slice(&1u16.to_le_bytes());
                    compact.extend_from_slice(&0u16.to_le_bytes());

                    let tag: u32 = if entry.is_dir { 129 } else { 128 };
                    let compression = entry.stored_size | (entry.compressed as u32) << 28;
                    metadata.extend_from_slice(&(tag << 24 | (index + 1)).to_le_bytes());
                    metadata.extend_from_slice(&compression.to_le_bytes());
                    metadata.extend_from_slice(&(entry.size as u64).to_le_bytes());
                    metadata.extend_from_slice(&((entry.offset / BLOCK_SIZE) as u32).to_le_bytes());
                }
                let compact = zlib(&compact);
                let metadata = zlib(&metadata);

                let entry_table_offset = out.len() as u64;
                out.extend_from_slice(&compact);
                let metadata_table_offset = out.len() as u64;
                out.extend_from_slice(&metadata);

                header.extend_from_slice(&(compact.len() as u32).to_le_bytes());
                header.extend_from_slice(&(placed.len() as u32).to_le_bytes());
                header.extend_from_slice(&(metadata.len() as u32).to_le_bytes());
                header.extend_from_slice(&entry_table_offset.to_le_bytes());
                header.extend_from_slice(&metadata_table_offset.to_le_bytes());
            }
        }

        out[..header_size].copy_from_slice(&header);
        out
    }

    /// Directory listings followed by files
    fn blobs(&self) -> Vec<Blob> {
        let mut dirs: BTreeMap<String, BTreeSet<Child>> = BTreeMap::new();
        dirs.insert(String::new(), BTreeSet::new());
        for path in self.files.keys() {
            let parts: Vec<&str> = path.split('/').collect();
            let mut parent = String::new();
            for (i, part) in parts.iter().enumerate() {
                let child = if i + 1 == parts.len() {
                    Child::File(part.to_string())
                } else {
                    Child::Dir(part.to_string())
                };
                dirs.entry(parent.clone()).or_default().insert(child);
                parent = join(&parent, part);
            }
        }

        let marker = self.version.dir_marker() as char;
        let mut blobs = Vec::new();
        for (path, children) in &dirs {
            let names: Vec<String> = children
                .iter()
                .map(|child| match child {
                    Child::Dir(name) => format!("{}{}", marker, name),
                    Child::File(name) => name.clone(),
                })
                .collect();
            let data = match self.version {
                Version::V1 => names.join("\n").into_bytes(),
                Version::V2 => {
                    let mut data = (names.len() as u32).to_le_bytes().to_vec();
                    data.extend(names.iter().map(|name| name.len() as u8));
                    for name in &names {
                        data.extend_from_slice(name.as_bytes());
                    }
                    data
                }
            };
            blobs.push(Blob {
                path: path.clone(),
                data,
                compress: self.version == Version::V2,
                is_dir: true,
            });
        }

        for (path, (data, compress)) in &self.files {
            blobs.push(Blob {
                path: path.clone(),
                data: data.clone(),
                compress: *compress,
                is_dir: false,
            });
        }
        blobs
    }
}

fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

fn pad_to_block(out: &mut Vec<u8>) {
    let rem = out.len() % BLOCK_SIZE as usize;
    if rem != 0 {
        out.resize(out.len() + BLOCK_SIZE as usize - rem, 0);
    }
}

fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("writing to a Vec cannot fail");
    encoder.finish().expect("writing to a Vec cannot fail")
}
