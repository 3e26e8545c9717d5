//! Read-only snapshot of a JSON map file.
//!
//! The proxy serves lookups from data loaded once at open; when the file
//! changes on disk the process restarts rather than reloading in place, so
//! every client sees one consistent generation of the data.

use std::collections::HashMap;
use std::path::Path;
use std::time::SystemTime;

use async_trait::async_trait;

use super::{table_flags, Table, TableError};

pub struct SnapshotTable {
    name: String,
    entries: HashMap<String, String>,
    modified: Option<SystemTime>,
}

impl SnapshotTable {
    pub async fn open(path: &Path) -> Result<Self, TableError> {
        let name = format!("hash:{}", path.display());
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| TableError::Io {
                name: name.clone(),
                source,
            })?;
        let entries = if raw.trim().is_empty() {
            HashMap::new()
        } else {
            serde_json::from_str(&raw).map_err(|err| TableError::Corrupt {
                name: name.clone(),
                detail: err.to_string(),
            })?
        };
        let modified = std::fs::metadata(path)
            .and_then(|meta| meta.modified())
            .ok();
        Ok(Self {
            name,
            entries,
            modified,
        })
    }

    /// Backing file mtime captured at open, for change detection.
    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }
}

#[async_trait]
impl Table for SnapshotTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn flags(&self) -> u32 {
        table_flags::PERSISTENT | table_flags::SNAPSHOT
    }

    async fn get(&self, key: &str) -> Result<Option<String>, TableError> {
        Ok(self.entries.get(key).cloned())
    }

    async fn put(&self, _key: &str, _value: &str) -> Result<(), TableError> {
        Err(TableError::ReadOnly(self.name.clone()))
    }

    async fn del(&self, _key: &str) -> Result<bool, TableError> {
        Err(TableError::ReadOnly(self.name.clone()))
    }
}
