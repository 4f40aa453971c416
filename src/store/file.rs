//! File-backed object store
//!
//! Layout: `<root>/objects/<kind>/<id>`, one file per instance.

use super::{check_key, corruption, ObjectStore};
use crate::error::{ChoreoError, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const OBJECTS_DIR: &str = "objects";

pub struct FileObjectStore {
    root: PathBuf,
}

impl FileObjectStore {
    /// Open a store under `root`, creating the objects directory
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join(OBJECTS_DIR)).map_err(|e| {
            ChoreoError::Config(format!("cannot create object store at {}: {}", root.display(), e))
        })?;
        Ok(Self { root })
    }

    fn path_of(&self, kind: &str, id: &str) -> PathBuf {
        self.root.join(OBJECTS_DIR).join(kind).join(id)
    }
}

#[async_trait]
impl ObjectStore for FileObjectStore {
    async fn put(&self, kind: &str, id: &str, record: Vec<u8>) -> Result<()> {
        check_key(kind, id)?;
        let path = self.path_of(kind, id);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| corruption(kind, id, e))?;
        }
        // Write aside and rename so readers never see a torn record
        let staging = path.with_file_name(format!("{}.tmp", id));
        tokio::fs::write(&staging, record)
            .await
            .map_err(|e| corruption(kind, id, e))?;
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|e| corruption(kind, id, e))
    }

    async fn get(&self, kind: &str, id: &str) -> Result<Option<Vec<u8>>> {
        check_key(kind, id)?;
        match tokio::fs::read(self.path_of(kind, id)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(corruption(kind, id, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = FileObjectStore::open(dir.path()).unwrap();
            store.put("util.Counter", "k1", b"{\"total\":3}".to_vec()).await.unwrap();
        }
        assert!(dir.path().join("objects/util.Counter/k1").exists());

        let store = FileObjectStore::open(dir.path()).unwrap();
        assert_eq!(
            store.get("util.Counter", "k1").await.unwrap(),
            Some(b"{\"total\":3}".to_vec())
        );
        assert_eq!(store.get("util.Counter", "k2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ids_sharing_a_stem_stage_separately() {
        let dir = TempDir::new().unwrap();
        let store = FileObjectStore::open(dir.path()).unwrap();

        for round in 0..20u8 {
            let (x, y) = tokio::join!(
                store.put("util.Counter", "a.x", vec![b'x', round]),
                store.put("util.Counter", "a.y", vec![b'y', round]),
            );
            x.unwrap();
            y.unwrap();
            assert_eq!(store.get("util.Counter", "a.x").await.unwrap(), Some(vec![b'x', round]));
            assert_eq!(store.get("util.Counter", "a.y").await.unwrap(), Some(vec![b'y', round]));
        }

        let mut names: Vec<String> = std::fs::read_dir(dir.path().join("objects/util.Counter"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["a.x", "a.y"]);
    }

    #[tokio::test]
    async fn test_path_escape_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = FileObjectStore::open(dir.path()).unwrap();
        let result = store.put("..", "passwd", vec![1]).await;
        assert!(matches!(result, Err(ChoreoError::StoreCorruption { .. })));
    }
}
