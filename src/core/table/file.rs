//! Persistent JSON map with single-writer semantics.
//!
//! The whole map is loaded at open and rewritten atomically (temp file +
//! rename) on every mutation. An advisory lock taken at open guards
//! against a second writer; the daemon owning this table is defined as
//! solitary by its supervisor, so contention means operator error.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs2::FileExt;
use tokio::sync::Mutex;

use super::{table_flags, Table, TableError};

pub struct FileTable {
    name: String,
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
    // Held for the process lifetime; dropping it releases the lock.
    _lock: std::fs::File,
}

impl FileTable {
    /// Open (optionally creating) the map file at `path`.
    ///
    /// The caller controls creation-time permissions through the process
    /// umask; the verifier wraps this call in a scoped 022 umask.
    pub async fn open(path: &Path, create: bool) -> Result<Self, TableError> {
        let name = format!("file:{}", path.display());
        let io_err = |source| TableError::Io {
            name: name.clone(),
            source,
        };

        let lock = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(create)
            .open(path)
            .map_err(io_err)?;
        lock.try_lock_exclusive().map_err(|source| {
            if source.kind() == std::io::ErrorKind::WouldBlock {
                TableError::Locked(name.clone())
            } else {
                TableError::Io {
                    name: name.clone(),
                    source,
                }
            }
        })?;

        let raw = std::fs::read_to_string(path).map_err(io_err)?;
        let entries = if raw.trim().is_empty() {
            HashMap::new()
        } else {
            serde_json::from_str(&raw).map_err(|err| TableError::Corrupt {
                name: name.clone(),
                detail: err.to_string(),
            })?
        };

        Ok(Self {
            name,
            path: path.to_path_buf(),
            entries: Mutex::new(entries),
            _lock: lock,
        })
    }

    /// Rewrite the map file from the in-memory state, atomically.
    async fn persist(&self, entries: &HashMap<String, String>) -> Result<(), TableError> {
        let io_err = |source| TableError::Io {
            name: self.name.clone(),
            source,
        };
        let serialized = serde_json::to_string_pretty(entries).map_err(|err| {
            TableError::Corrupt {
                name: self.name.clone(),
                detail: err.to_string(),
            }
        })?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, serialized.as_bytes())
            .await
            .map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl Table for FileTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn flags(&self) -> u32 {
        table_flags::WRITABLE | table_flags::PERSISTENT
    }

    async fn get(&self, key: &str) -> Result<Option<String>, TableError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), TableError> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries).await
    }

    async fn del(&self, key: &str) -> Result<bool, TableError> {
        let mut entries = self.entries.lock().await;
        let existed = entries.remove(key).is_some();
        if existed {
            self.persist(&entries).await?;
        }
        Ok(existed)
    }
}
