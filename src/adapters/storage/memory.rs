use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::validate_key;
use crate::domain::ports::{ObjectStore, StorageError};

/// In-memory object store.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<(String, String), Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<(), StorageError> {
        validate_key(bucket)?;
        validate_key(key)?;
        self.objects
            .write()
            .await
            .insert((bucket.to_string(), key.to_string()), data);
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        self.objects
            .read()
            .await
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, StorageError> {
        Ok(self
            .objects
            .read()
            .await
            .contains_key(&(bucket.to_string(), key.to_string())))
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .objects
            .read()
            .await
            .keys()
            .filter(|(b, k)| b == bucket && k.starts_with(prefix))
            .map(|(_, k)| k.clone())
            .collect())
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        Ok(self.objects.read().await.keys().any(|(b, _)| b == bucket))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryObjectStore::new();
        store.put_object("job", "error", b"boom".to_vec()).await.unwrap();

        assert!(store.bucket_exists("job").await.unwrap());
        assert!(store.object_exists("job", "error").await.unwrap());
        assert!(!store.object_exists("job", "done").await.unwrap());
        assert_eq!(store.get_object("job", "error").await.unwrap(), b"boom");
        assert_eq!(store.list_objects("job", "").await.unwrap(), vec!["error"]);
    }
}
