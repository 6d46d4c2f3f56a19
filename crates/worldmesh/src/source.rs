// Client data access - everything the decoders read comes through here

use std::path::Path;

use mpq::Archive;

use crate::error::{DecodeError, Result};

/// Where tile, model and skin files come from. The decoders only ever ask
/// for whole files by their client-internal path.
pub trait ArchiveSource {
    /// `None` when the file does not exist or is empty.
    fn load_file(&mut self, name: &str) -> Option<Vec<u8>>;
}

/// A stack of MPQ archives searched front to back. Archives opened later
/// are searched first, which is how client patches override base data.
pub struct MpqArchive {
    archives: Vec<Archive>,
}

impl MpqArchive {
    pub fn new() -> Self {
        Self { archives: Vec::new() }
    }

    /// Returns `Ok(false)` when `path` does not exist, so callers can probe
    /// the usual patch archive names without special casing.
    pub fn open_archive(&mut self, path: &Path) -> Result<bool> {
        if !path.exists() {
            return Ok(false);
        }
        let archive = Archive::open(path).map_err(|e| {
            DecodeError::Malformed(format!("cannot open archive {}: {e}", path.display()))
        })?;
        self.archives.insert(0, archive);
        Ok(true)
    }

    pub fn archive_count(&self) -> usize {
        self.archives.len()
    }
}

impl Default for MpqArchive {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveSource for MpqArchive {
    fn load_file(&mut self, name: &str) -> Option<Vec<u8>> {
        for archive in &mut self.archives {
            // The mpq crate errors out on 0-byte files, treat those as absent
            let file = match archive.open_file(name) {
                Ok(f) => f,
                Err(_) => continue,
            };

            let size = file.size() as usize;
            if size == 0 {
                continue;
            }

            let mut buf = vec![0u8; size];
            if file.read(archive, &mut buf).is_ok() {
                return Some(buf);
            }
        }
        None
    }
}
