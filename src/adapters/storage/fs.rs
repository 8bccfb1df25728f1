//! Filesystem-backed object store.
//!
//! Layout: `<root>/<bucket>/<key>`, keys use `/` as separator.

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

use super::validate_key;
use crate::domain::ports::{ObjectStore, StorageError};

/// Object store keeping buckets as directories under a root.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(bucket)?;
        validate_key(key)?;
        Ok(self.root.join(bucket).join(key))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put_object(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<(), StorageError> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        debug!(bucket, key, bytes = data.len(), "Storing object");
        tokio::fs::write(&path, data).await?;
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.object_path(bucket, key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, StorageError> {
        let path = self.object_path(bucket, key)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError> {
        validate_key(bucket)?;
        let bucket_dir = self.root.join(bucket);
        if !tokio::fs::try_exists(&bucket_dir).await? {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        let mut pending = vec![bucket_dir.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&bucket_dir) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        validate_key(bucket)?;
        match tokio::fs::metadata(self.root.join(bucket)).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_exists() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());

        assert!(!store.bucket_exists("job-1").await.unwrap());
        assert!(!store.object_exists("job-1", "done").await.unwrap());

        store.put_object("job-1", "done", Vec::new()).await.unwrap();
        store
            .put_object("job-1", "outputs/output.json", b"{}".to_vec())
            .await
            .unwrap();

        assert!(store.bucket_exists("job-1").await.unwrap());
        assert!(store.object_exists("job-1", "done").await.unwrap());
        assert_eq!(
            store.get_object("job-1", "outputs/output.json").await.unwrap(),
            b"{}".to_vec()
        );
        assert!(dir.path().join("job-1/outputs/output.json").is_file());
    }

    #[tokio::test]
    async fn test_get_missing_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());

        let err = store.get_object("job-1", "error").await.unwrap_err();
        assert!(matches!(err, StorageError::ObjectNotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_objects_with_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());

        store.put_object("job", "inputs/a.json", b"1".to_vec()).await.unwrap();
        store.put_object("job", "inputs/nested/b.json", b"2".to_vec()).await.unwrap();
        store.put_object("job", "outputs/c.json", b"3".to_vec()).await.unwrap();

        let inputs = store.list_objects("job", "inputs/").await.unwrap();
        assert_eq!(inputs, vec!["inputs/a.json", "inputs/nested/b.json"]);
        assert!(store.list_objects("missing", "").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());

        let err = store.put_object("job", "../escape", Vec::new()).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
    }
}
