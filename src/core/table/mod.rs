/*!
Pluggable key-value tables.

Both daemons sit on top of the same narrow table interface: `open` a
`type:name` reference, then `get`/`put`/`del` string keys. The verifier
owns one writable table for its cache; the proxy opens read-only tables on
behalf of clients and polls the registry's global `changed()` signal to
know when on-disk data was replaced behind its open handles.

Implementations here:

- [`mem::MemTable`] - process-local hash table.
- [`file::FileTable`] - persistent JSON map, single writer, atomic rewrite.
- [`snapshot::SnapshotTable`] - read-only snapshot of a JSON map file.
*/

pub mod file;
pub mod mem;
pub mod snapshot;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::SystemTime;

use async_trait::async_trait;
use thiserror::Error;

/// Open-request flag bits; rendered in octal inside handle-cache keys.
pub mod open_flags {
    /// Open for lookups.
    pub const READ: u32 = 0o1;
    /// Open for updates.
    pub const WRITE: u32 = 0o2;
    /// Create the backing file when missing.
    pub const CREATE: u32 = 0o100;
}

/// Capability flag bits reported by an open handle.
pub mod table_flags {
    /// Handle accepts `put`/`del`.
    pub const WRITABLE: u32 = 0o2;
    /// Backing data survives process exit.
    pub const PERSISTENT: u32 = 0o4;
    /// Lookups reflect on-disk changes only after reopen.
    pub const SNAPSHOT: u32 = 0o10;
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error("unsupported table type in {0:?}")]
    UnsupportedType(String),
    #[error("table {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("table {name}: malformed data: {detail}")]
    Corrupt { name: String, detail: String },
    #[error("table {name}: temporary lookup failure")]
    Retry { name: String },
    #[error("table {0:?} is read-only")]
    ReadOnly(String),
    #[error("table {0:?} is already locked by another process")]
    Locked(String),
}

/// One open lookup table.
///
/// `get` distinguishes "no such key" (`Ok(None)`) from a transient failure
/// (`Err(TableError::Retry)`); the proxy maps that distinction onto its
/// protocol statuses.
#[async_trait]
pub trait Table: Send + Sync {
    /// Canonical `type:name` reference this handle was opened from.
    fn name(&self) -> &str;

    /// Capability bits, see [`table_flags`].
    fn flags(&self) -> u32;

    async fn get(&self, key: &str) -> Result<Option<String>, TableError>;

    async fn put(&self, key: &str, value: &str) -> Result<(), TableError>;

    /// Remove `key`; `Ok(true)` when an entry existed.
    async fn del(&self, key: &str) -> Result<bool, TableError>;
}

struct WatchedFile {
    name: String,
    path: PathBuf,
    modified: Option<SystemTime>,
}

/// Resolves `type:name` references and tracks file-backed opens.
///
/// The registry is the process-wide `changed()` authority: every snapshot
/// table opened through it is watched by mtime, and the proxy polls
/// [`TableRegistry::changed`] before each accept to decide whether to
/// restart with fresh handles.
pub struct TableRegistry {
    watched: Mutex<Vec<WatchedFile>>,
    watched_names: Mutex<HashSet<String>>,
}

impl Default for TableRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TableRegistry {
    pub fn new() -> Self {
        Self {
            watched: Mutex::new(Vec::new()),
            watched_names: Mutex::new(HashSet::new()),
        }
    }

    /// Open a `type:name` reference.
    ///
    /// Supported types: `mem` (process-local scratch table), `hash`
    /// (read-only snapshot of a JSON map file), `file` (writable JSON map).
    /// The flag bits are advisory for `mem` and `hash`; `file` honors
    /// [`open_flags::CREATE`].
    pub async fn open(
        &self,
        reference: &str,
        flags: u32,
    ) -> Result<Arc<dyn Table>, TableError> {
        let Some((kind, name)) = reference.split_once(':') else {
            return Err(TableError::UnsupportedType(reference.to_string()));
        };
        match kind {
            "mem" => Ok(Arc::new(mem::MemTable::new(name))),
            "hash" => {
                let table = snapshot::SnapshotTable::open(Path::new(name)).await?;
                self.watch(reference, Path::new(name), table.modified());
                Ok(Arc::new(table))
            }
            "file" => {
                let create = flags & open_flags::CREATE != 0;
                let table = file::FileTable::open(Path::new(name), create).await?;
                Ok(Arc::new(table))
            }
            _ => Err(TableError::UnsupportedType(reference.to_string())),
        }
    }

    fn watch(&self, reference: &str, path: &Path, modified: Option<SystemTime>) {
        let mut names = self
            .watched_names
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !names.insert(reference.to_string()) {
            return;
        }
        self.watched
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(WatchedFile {
                name: reference.to_string(),
                path: path.to_path_buf(),
                modified,
            });
    }

    /// Name of the first watched table whose backing file changed on disk.
    ///
    /// A vanished file counts as changed; the proxy restarts either way.
    pub fn changed(&self) -> Option<String> {
        let watched = self
            .watched
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for entry in watched.iter() {
            let current = std::fs::metadata(&entry.path)
                .and_then(|meta| meta.modified())
                .ok();
            if current != entry.modified {
                return Some(entry.name.clone());
            }
        }
        None
    }

    /// Number of watched backing files (test support).
    pub fn watched_len(&self) -> usize {
        self.watched
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}
