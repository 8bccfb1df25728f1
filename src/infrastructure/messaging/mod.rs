//! Shepherd ⇄ runner wire protocol.
//!
//! Newline-delimited JSON over a TCP stream. Each line is one message tagged
//! by `message_type`.

pub mod error;
pub mod message;
pub mod messenger;

pub use error::ProtocolError;
pub use message::{Message, MessageKind};
pub use messenger::Messenger;
