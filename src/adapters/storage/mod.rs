//! Object storage adapters.
//!
//! - `FsObjectStore` keeps buckets as directories under a root
//! - `MemoryObjectStore` keeps everything in a map, for tests and dry runs

pub mod fs;
pub mod memory;

pub use fs::FsObjectStore;
pub use memory::MemoryObjectStore;

use crate::domain::ports::StorageError;

/// Reject bucket names and keys that could escape the bucket.
pub(crate) fn validate_key(value: &str) -> Result<(), StorageError> {
    let invalid = value.is_empty()
        || value.starts_with('/')
        || value.split('/').any(|part| part.is_empty() || part == "." || part == "..");
    if invalid {
        return Err(StorageError::InvalidKey(value.to_string()));
    }
    Ok(())
}
