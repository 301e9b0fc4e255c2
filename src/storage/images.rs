//! Content-addressed image storage
//!
//! Files are named by the SHA-256 of their bytes, so identical payloads
//! served from different URLs collapse to one file. The extension is kept
//! from the source URL when it names a known image format.

use crate::storage::StorageResult;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Extensions carried through from source URLs; anything else becomes .jpg
const KNOWN_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Directory of images named by content hash
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    /// Creates the store, making the directory if needed
    pub fn open(dir: &Path) -> StorageResult<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// SHA-256 of the bytes, lowercase hex
    pub fn content_hash(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    /// Storage path for a hash and source URL
    pub fn path_for(&self, content_hash: &str, source_url: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", content_hash, extension_for(source_url)))
    }

    /// Writes the bytes unless the file already exists
    ///
    /// Returns true when a new file was written.
    pub fn store(&self, path: &Path, bytes: &[u8]) -> StorageResult<bool> {
        if path.exists() {
            return Ok(false);
        }
        std::fs::write(path, bytes)?;
        Ok(true)
    }
}

/// Picks a file extension from the source URL's path
fn extension_for(source_url: &str) -> &'static str {
    let path = source_url
        .split(['?', '#'])
        .next()
        .unwrap_or(source_url);
    let ext = path.rsplit('.').next().unwrap_or("").to_ascii_lowercase();

    KNOWN_EXTENSIONS
        .iter()
        .find(|known| **known == ext)
        .copied()
        .unwrap_or("jpg")
}
