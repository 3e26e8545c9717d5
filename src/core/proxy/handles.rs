//! In-process memoization of open table handles.
//!
//! Keyed by `"type:name:octal-flags"`, append-only: a handle opened for one
//! client is reused for every later request with the same reference and
//! flags, and is never closed. Fresh handles come from a process restart
//! (see the table-change poll in the proxy's pre-accept hook).

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::core::table::{Table, TableError, TableRegistry};

pub struct HandleCache {
    registry: Arc<TableRegistry>,
    handles: HashMap<String, Arc<dyn Table>>,
}

impl HandleCache {
    pub fn new(registry: Arc<TableRegistry>) -> Self {
        Self {
            registry,
            handles: HashMap::new(),
        }
    }

    fn cache_key(reference: &str, flags: u32) -> String {
        format!("{reference}:{flags:o}")
    }

    /// Shared handle for `(reference, flags)`, opening lazily on first use.
    pub async fn open(
        &mut self,
        reference: &str,
        flags: u32,
    ) -> Result<Arc<dyn Table>, TableError> {
        let key = Self::cache_key(reference, flags);
        if let Some(handle) = self.handles.get(&key) {
            return Ok(handle.clone());
        }
        let handle = self.registry.open(reference, flags).await?;
        let octal_flags = format!("{flags:o}");
        info!(table = reference, flags = %octal_flags, "opened table");
        self.handles.insert(key, handle.clone());
        Ok(handle)
    }

    /// Number of distinct open handles.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
