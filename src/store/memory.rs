//! In-memory object store

use super::{check_key, object_key, ObjectStore};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Volatile store, used in tests and by the `memory` backend
#[derive(Default)]
pub struct MemoryObjectStore {
    records: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored instances
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, kind: &str, id: &str, record: Vec<u8>) -> Result<()> {
        check_key(kind, id)?;
        self.records.write().await.insert(object_key(kind, id), record);
        Ok(())
    }

    async fn get(&self, kind: &str, id: &str) -> Result<Option<Vec<u8>>> {
        check_key(kind, id)?;
        Ok(self.records.read().await.get(&object_key(kind, id)).cloned())
    }
}
