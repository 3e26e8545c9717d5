//! Process-local hash table.
//!
//! Used by the verifier when `address_verify_map` is empty; the cache then
//! lives and dies with the process, so the server skeleton must not recycle
//! it (see the verifier's post-init hook).

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{table_flags, Table, TableError};

pub struct MemTable {
    name: String,
    entries: Mutex<HashMap<String, String>>,
}

impl MemTable {
    pub fn new(label: &str) -> Self {
        Self {
            name: format!("mem:{label}"),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Number of stored entries (test support).
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl Table for MemTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn flags(&self) -> u32 {
        table_flags::WRITABLE
    }

    async fn get(&self, key: &str) -> Result<Option<String>, TableError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), TableError> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, TableError> {
        Ok(self.entries.lock().await.remove(key).is_some())
    }
}
