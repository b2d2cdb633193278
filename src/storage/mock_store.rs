//! Mock binary storage implementation for testing

use crate::storage::path::validate_owner_id;
use crate::storage::{BlobStorage, ObjectReader, StorageError, StoragePath, StoredObject};
use log::info;
use std::collections::HashMap;
use std::io::{self, Cursor, Read};
use std::sync::{Arc, Mutex, MutexGuard};

/// A mock binary storage implementation that stores data in memory
/// Useful for testing without disk I/O operations
pub struct MockBlobStore {
    /// In-memory storage: storage path -> object bytes
    objects: Arc<Mutex<HashMap<StoragePath, Vec<u8>>>>,
}

impl MockBlobStore {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn objects(&self) -> MutexGuard<'_, HashMap<StoragePath, Vec<u8>>> {
        // A poisoned map is still consistent: inserts happen only after a full read.
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Clear all stored data (useful for testing)
    pub fn clear(&self) {
        self.objects().clear();
    }

    /// Get the number of stored objects for an owner (useful for testing)
    pub fn get_object_count(&self, owner_id: &str) -> usize {
        self.objects()
            .keys()
            .filter(|path| path.owner_id() == owner_id)
            .count()
    }
}

impl Default for MockBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobStorage for MockBlobStore {
    fn save(&self, owner_id: &str, content: &mut dyn Read) -> Result<StoredObject, StorageError> {
        validate_owner_id(owner_id)?;

        let mut data = Vec::new();
        loop {
            let mut buffer = [0u8; 8192];
            match content.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => data.extend_from_slice(&buffer[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(StorageError::Stream(e)),
            }
        }

        let path = StoragePath::generate(owner_id)?;
        let size = data.len() as u64;
        self.objects().insert(path.clone(), data);

        info!("Mock: Stored object {} with size {}", path, size);
        Ok(StoredObject { path, size })
    }

    fn load(&self, path: &StoragePath) -> Result<ObjectReader, StorageError> {
        let data = self
            .objects()
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_string()))?;

        info!("Mock: Retrieved object {} with size {}", path, data.len());
        Ok(Box::new(Cursor::new(data)))
    }

    fn delete(&self, path: &StoragePath) -> Result<(), StorageError> {
        if self.objects().remove(path).is_some() {
            info!("Mock: Deleted object {}", path);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::local_store::tests::FailingReader;

    #[test]
    fn test_mock_store_basic_operations() {
        let store = MockBlobStore::new();
        let test_data = b"Hello, World!";

        let stored = store.save("test_user", &mut &test_data[..]).unwrap();
        assert_eq!(stored.size, test_data.len() as u64);
        assert_eq!(store.get_object_count("test_user"), 1);

        let mut retrieved = Vec::new();
        store.load(&stored.path).unwrap().read_to_end(&mut retrieved).unwrap();
        assert_eq!(retrieved, test_data);

        store.delete(&stored.path).unwrap();
        store.delete(&stored.path).unwrap();
        assert_eq!(store.get_object_count("test_user"), 0);
        assert!(matches!(store.load(&stored.path), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_mock_store_failed_stream_stores_nothing() {
        let store = MockBlobStore::new();

        let err = store.save("test_user", &mut FailingReader::new(b"abc")).unwrap_err();
        assert!(matches!(err, StorageError::Stream(_)));
        assert_eq!(store.get_object_count("test_user"), 0);
    }

    #[test]
    fn test_mock_store_clear() {
        let store = MockBlobStore::new();
        store.save("a", &mut &b"1"[..]).unwrap();
        store.save("b", &mut &b"2"[..]).unwrap();
        assert_eq!(store.get_object_count("a"), 1);

        store.clear();
        assert_eq!(store.get_object_count("a"), 0);
        assert_eq!(store.get_object_count("b"), 0);
    }
}
