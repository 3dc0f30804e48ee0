use super::memory::{apply_batch, scan};
use crate::domain::errors::KVStoreError;
use crate::ports::outbound::{BatchOperation, KeyValueStore};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// File-backed key-value store.
///
/// Holds everything in memory and rewrites a bincode snapshot after each
/// mutation, via a temp file and rename.
pub struct FileBackedKVStore {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    path: PathBuf,
}

fn io_err(e: impl std::fmt::Display) -> KVStoreError {
    KVStoreError::IOError {
        message: e.to_string(),
    }
}

impl FileBackedKVStore {
    /// Open the store at `path`, loading an existing snapshot if present.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, KVStoreError> {
        let path = path.as_ref().to_path_buf();
        let data = match std::fs::read(&path) {
            Ok(bytes) => bincode::deserialize(&bytes).map_err(|e| KVStoreError::CorruptionError {
                message: format!("{}: {e}", path.display()),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no existing object store, starting empty");
                BTreeMap::new()
            }
            Err(e) => return Err(io_err(e)),
        };
        if !data.is_empty() {
            info!(path = %path.display(), keys = data.len(), "loaded object store");
        }
        Ok(Self { data, path })
    }

    fn save(&self) -> Result<(), KVStoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
        }
        let bytes = bincode::serialize(&self.data).map_err(io_err)?;
        let temp_path = self.path.with_extension("tmp");
        std::fs::write(&temp_path, bytes).map_err(io_err)?;
        std::fs::rename(&temp_path, &self.path).map_err(|e| {
            warn!(path = %self.path.display(), error = %e, "snapshot rename failed");
            io_err(e)
        })
    }
}

impl KeyValueStore for FileBackedKVStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        Ok(self.data.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        self.data.insert(key.to_vec(), value.to_vec());
        self.save()
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError> {
        self.data.remove(key);
        self.save()
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        apply_batch(&mut self.data, operations);
        self.save()
    }

    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError> {
        Ok(self.data.contains_key(key))
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KVStoreError> {
        Ok(scan(&self.data, prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("objects.bin");
        {
            let mut store = FileBackedKVStore::open(&path).unwrap();
            store.put(b"ent/abc", b"entity").unwrap();
            store
                .atomic_batch_write(vec![
                    BatchOperation::put(b"msg/t".to_vec(), b"m".to_vec()),
                    BatchOperation::delete(b"ent/abc".to_vec()),
                ])
                .unwrap();
        }
        let store = FileBackedKVStore::open(&path).unwrap();
        assert_eq!(store.get(b"msg/t").unwrap(), Some(b"m".to_vec()));
        assert!(!store.exists(b"ent/abc").unwrap());
    }

    #[test]
    fn test_corrupt_snapshot_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("objects.bin");
        std::fs::write(&path, [0xff; 3]).unwrap();
        assert!(matches!(
            FileBackedKVStore::open(&path),
            Err(KVStoreError::CorruptionError { .. })
        ));
    }
}
