//! RocksDB-backed object store
//!
//! All records live in the `objects` column family under the key `kind/id`.

use super::{check_key, corruption, object_key, ObjectStore};
use crate::error::{ChoreoError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, Options, DB};
use std::path::Path;
use std::sync::Arc;

const CF_OBJECTS: &str = "objects";

pub struct RocksDbObjectStore {
    db: Arc<DB>,
}

impl RocksDbObjectStore {
    /// Open the database at `path`, creating it if missing
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = vec![ColumnFamilyDescriptor::new(CF_OBJECTS, Options::default())];
        let db = DB::open_cf_descriptors(&opts, path, cfs).map_err(|e| {
            ChoreoError::Config(format!("cannot open object store at {}: {}", path.display(), e))
        })?;

        Ok(Self { db: Arc::new(db) })
    }

    fn with_objects<T>(
        db: &DB,
        kind: &str,
        id: &str,
        f: impl FnOnce(&DB, &rocksdb::ColumnFamily) -> std::result::Result<T, rocksdb::Error>,
    ) -> Result<T> {
        let cf = db
            .cf_handle(CF_OBJECTS)
            .ok_or_else(|| corruption(kind, id, "objects column family missing"))?;
        f(db, cf).map_err(|e| corruption(kind, id, e))
    }
}

#[async_trait]
impl ObjectStore for RocksDbObjectStore {
    async fn put(&self, kind: &str, id: &str, record: Vec<u8>) -> Result<()> {
        check_key(kind, id)?;
        let db = self.db.clone();
        let (kind, id) = (kind.to_string(), id.to_string());
        tokio::task::spawn_blocking(move || {
            let key = object_key(&kind, &id);
            Self::with_objects(&db, &kind, &id, |db, cf| db.put_cf(cf, key.as_bytes(), record))
        })
        .await
        .map_err(|e| ChoreoError::Config(e.to_string()))?
    }

    async fn get(&self, kind: &str, id: &str) -> Result<Option<Vec<u8>>> {
        check_key(kind, id)?;
        let db = self.db.clone();
        let (kind, id) = (kind.to_string(), id.to_string());
        tokio::task::spawn_blocking(move || {
            let key = object_key(&kind, &id);
            Self::with_objects(&db, &kind, &id, |db, cf| db.get_cf(cf, key.as_bytes()))
        })
        .await
        .map_err(|e| ChoreoError::Config(e.to_string()))?
    }
}
