//! Port trait definitions (Hexagonal Architecture)
//!
//! - ObjectStore: durable job inputs, outputs and status markers

pub mod errors;
pub mod object_store;

pub use errors::StorageError;
pub use object_store::ObjectStore;
