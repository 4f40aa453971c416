//! Durable storage for stateful service instances
//!
//! Instances are opaque serialized records addressed by (kind, id). Records
//! are written on construction and rewritten after every method call; they
//! are never deleted.

pub mod file;
pub mod locks;
pub mod memory;
pub mod rocksdb_store;

pub use self::file::FileObjectStore;
pub use self::locks::{InstanceGuard, InstanceLocks};
pub use self::memory::MemoryObjectStore;
pub use self::rocksdb_store::RocksDbObjectStore;

use crate::error::{ChoreoError, Result};
use async_trait::async_trait;

/// Storage backend for instance records
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store (or replace) the record of an instance
    async fn put(&self, kind: &str, id: &str, record: Vec<u8>) -> Result<()>;

    /// Load the record of an instance, `None` if it was never stored
    async fn get(&self, kind: &str, id: &str) -> Result<Option<Vec<u8>>>;
}

/// Filesystem-like key of an instance record
pub fn object_key(kind: &str, id: &str) -> String {
    format!("{}/{}", kind, id)
}

pub(crate) fn corruption(kind: &str, id: &str, reason: impl ToString) -> ChoreoError {
    ChoreoError::StoreCorruption {
        kind: kind.to_string(),
        id: id.to_string(),
        reason: reason.to_string(),
    }
}

/// Reject keys that would escape their namespace
pub(crate) fn check_key(kind: &str, id: &str) -> Result<()> {
    let bad = |s: &str| s.is_empty() || s == "." || s == ".." || s.contains(['/', '\\', '\0']);
    if bad(kind) || bad(id) {
        return Err(corruption(kind, id, "invalid instance key"));
    }
    Ok(())
}
