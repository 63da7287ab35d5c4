//! JSON file storage implementation.
//!
//! Stores each key as its own file under a root directory. Values are
//! expected to be JSON documents (drafts are), and are validated as such
//! before being written so a corrupt write never replaces a good file.

use std::path::{Path, PathBuf};
use async_trait::async_trait;
use tokio::fs;
use super::{KeyValueStore, Result};

/// File-based JSON storage backend.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    /// Create storage rooted at `root`, creating the directory if needed.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", encode_key(key)))
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.key_path(key)).await {
            Ok(json) => Ok(Some(json)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        // Reject non-JSON payloads up front.
        let _: serde_json::Value = serde_json::from_str(value)?;

        let path = self.key_path(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value.as_bytes()).await?;
        fs::rename(&tmp, &path).await?;
        tracing::debug!("Wrote {} bytes to {}", value.len(), path.display());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        fs::remove_file(self.key_path(key)).await.or_else(|e| {
            if e.kind() == std::io::ErrorKind::NotFound { Ok(()) } else { Err(e) }
        })?;
        Ok(())
    }
}

/// Map a key onto a portable file name.
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' => out.push(b as char),
            b':' => out.push('~'),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}
