//! Domain layer for the Shepherd orchestrator
//!
//! Pure types shared by every other layer: sheep and job models, the
//! configuration schema, the error taxonomy and the storage port.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{ShepherdError, ShepherdResult};
