//! In-memory object store for tests.

use crate::io::cloud::traits::{ErrorKind, ObjectStore, ObjectStoreError, ObjectStoreResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type BucketStorage = Arc<Mutex<HashMap<String, HashMap<String, Vec<u8>>>>>;

/// Object store keeping every object in memory. Clones share the same storage.
#[derive(Clone, Default)]
pub struct FakeObjectStore {
    storage: BucketStorage,
}

impl FakeObjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects across all buckets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.storage
            .lock()
            .expect("storage mutex poisoned")
            .values()
            .map(HashMap::len)
            .sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjectStore for FakeObjectStore {
    fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> ObjectStoreResult<()> {
        self.storage
            .lock()
            .expect("storage mutex poisoned")
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn get_object(&self, bucket: &str, key: &str) -> ObjectStoreResult<Vec<u8>> {
        let storage = self.storage.lock().expect("storage mutex poisoned");
        storage
            .get(bucket)
            .and_then(|b| b.get(key))
            .cloned()
            .ok_or_else(|| {
                ObjectStoreError::new(
                    ErrorKind::NotFound,
                    format!("object {bucket}/{key} not found"),
                )
            })
    }

    fn object_exists(&self, bucket: &str, key: &str) -> ObjectStoreResult<bool> {
        let storage = self.storage.lock().expect("storage mutex poisoned");
        Ok(storage.get(bucket).is_some_and(|b| b.contains_key(key)))
    }

    fn delete_object(&self, bucket: &str, key: &str) -> ObjectStoreResult<()> {
        if let Some(objects) = self
            .storage
            .lock()
            .expect("storage mutex poisoned")
            .get_mut(bucket)
        {
            objects.remove(key);
        }
        Ok(())
    }
}
