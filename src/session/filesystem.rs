//! Filesystem session backend
//!
//! One JSON file per session in a single directory, named after the key or
//! after its SHA-256 digest when the key is not a plain file name. The
//! directory is created on first write. Writes go to a temporary file that is renamed
//! over the target, so a concurrent reader sees either the old or the new
//! content.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{SessionBackend, SessionData};
use crate::error::{MsalAuthError, Result};

/// Longest key stored under its own file name
pub const MAX_PLAIN_KEY_LEN: usize = 128;

/// Session store backed by JSON files
#[derive(Debug, Clone)]
pub struct FilesystemSessionBackend {
    dir: PathBuf,
}

impl FilesystemSessionBackend {
    /// Create a backend rooted at `dir`
    ///
    /// Nothing touches the disk until the first write.
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the session files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file for `key`
    ///
    /// Keys of up to [`MAX_PLAIN_KEY_LEN`] ASCII letters, digits, `-` and `_`
    /// keep their own name. Any other key is stored as `={sha256 hex}`, so a
    /// session id never becomes a path component such as `..`.
    fn path_for(&self, key: &str) -> PathBuf {
        let plain = !key.is_empty()
            && key.len() <= MAX_PLAIN_KEY_LEN
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        let name = if plain {
            key.to_string()
        } else {
            let digest = Sha256::digest(key.as_bytes());
            let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
            format!("={}", hex)
        };
        self.dir.join(format!("{}.json", name))
    }
}

#[async_trait]
impl SessionBackend for FilesystemSessionBackend {
    async fn write(&self, key: &str, value: &SessionData) -> Result<()> {
        let path = self.path_for(key);
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            MsalAuthError::Storage(format!(
                "Failed to create session directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        let contents = serde_json::to_vec(value)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents).await.map_err(|e| {
            MsalAuthError::Storage(format!("Failed to write {}: {}", tmp.display(), e))
        })?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| {
            MsalAuthError::Storage(format!("Failed to replace {}: {}", path.display(), e))
        })?;

        tracing::trace!("Wrote session file {}", path.display());
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<SessionData>> {
        let path = self.path_for(key);
        let contents = match tokio::fs::read(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(MsalAuthError::Storage(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                ))
                .into())
            }
        };

        let data: SessionData = serde_json::from_slice(&contents).map_err(|e| {
            MsalAuthError::Storage(format!("Corrupt session file {}: {}", path.display(), e))
        })?;
        Ok(Some(data))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MsalAuthError::Storage(format!(
                "Failed to remove {}: {}",
                path.display(),
                e
            ))
            .into()),
        }
    }
}
