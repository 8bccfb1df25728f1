//! Container engine handle.
//!
//! Thin wrapper around the `docker` CLI (or a compatible replacement such
//! as `nvidia-docker` or `podman`): start detached, kill, liveness probe.

pub mod container;
pub mod error;

pub use container::DockerContainer;
pub use error::DockerError;
