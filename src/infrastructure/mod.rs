//! Infrastructure layer: configuration, logging, container engine,
//! GPU devices and the runner wire protocol.

pub mod config;
pub mod devices;
pub mod docker;
pub mod logging;
pub mod messaging;
