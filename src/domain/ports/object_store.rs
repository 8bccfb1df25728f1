use crate::domain::ports::errors::StorageError;
use async_trait::async_trait;

/// Object storage port.
///
/// Every job owns a bucket named after its id. The orchestrator only relies
/// on put/get/exists/list; durability is the adapter's concern.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `bucket/key`, creating the bucket if needed
    async fn put_object(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<(), StorageError>;

    /// Fetch the payload stored under `bucket/key`
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Check whether `bucket/key` exists
    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, StorageError>;

    /// List keys of `bucket` starting with `prefix`, sorted
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Check whether `bucket` exists
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError>;
}
