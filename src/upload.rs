//! Ephemeral storage for uploaded files.
//!
//! Every upload gets its own file name so concurrent requests never collide.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Writes uploads under a directory with collision-free names
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    retain: bool,
}

impl UploadStore {
    pub fn new<P: Into<PathBuf>>(dir: P, retain: bool) -> Self {
        Self {
            dir: dir.into(),
            retain,
        }
    }

    /// Create the upload directory if needed
    pub fn init(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create upload directory {}", self.dir.display()))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist `content` as `<dir>/<uuid>_<filename>`
    pub fn save(&self, filename: &str, content: &[u8]) -> Result<StoredUpload> {
        let path = self
            .dir
            .join(format!("{}_{}", Uuid::new_v4(), sanitize_filename(filename)));
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write upload {}", path.display()))?;
        debug!(path = %path.display(), bytes = content.len(), "Upload stored");

        Ok(StoredUpload {
            path,
            retain: self.retain,
        })
    }
}

/// Upload written to disk; removed on drop unless retained
#[derive(Debug)]
pub struct StoredUpload {
    path: PathBuf,
    retain: bool,
}

impl StoredUpload {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoredUpload {
    fn drop(&mut self) {
        if self.retain {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to remove upload");
        }
    }
}

/// Keep only the final path component and a safe character set
fn sanitize_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "upload.csv".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("patients.csv"), "patients.csv");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\data\\my file.csv"), "my_file.csv");
        assert_eq!(sanitize_filename(".."), "upload.csv");
    }

    #[test]
    fn test_uploads_get_unique_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path(), false);

        let a = store.save("same.csv", b"a").unwrap();
        let b = store.save("same.csv", b"b").unwrap();

        assert_ne!(a.path(), b.path());
        assert!(a.path().starts_with(dir.path()));
        assert_eq!(std::fs::read(b.path()).unwrap(), b"b");
    }

    #[test]
    fn test_upload_removed_unless_retained() {
        let dir = tempfile::tempdir().unwrap();

        let path = {
            let stored = UploadStore::new(dir.path(), false).save("x.csv", b"1").unwrap();
            stored.path().to_path_buf()
        };
        assert!(!path.exists());

        let path = {
            let stored = UploadStore::new(dir.path(), true).save("x.csv", b"1").unwrap();
            stored.path().to_path_buf()
        };
        assert!(path.exists());
    }
}
