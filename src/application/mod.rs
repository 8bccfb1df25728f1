//! Application layer: the sheep fleet, the orchestrator and its health loop.

pub mod output_listener;
pub mod registry;
pub mod shepherd;
pub mod sheep;

pub use output_listener::OutputListener;
pub use registry::SheepRegistry;
pub use shepherd::{Shepherd, SheepReport};
pub use sheep::{BareSheep, DockerSheep, Sheep, SheepBackend, SheepEvent, SheepNotification};
