//! Data types for the status relay
//!
//! Wire payloads shared by the ingress endpoint, the subscription socket and
//! the subscriber client.

mod message;
mod status;

pub use message::{ClientMessage, RelayMessage};
pub use status::{StatusEvent, StatusUpdate, TERMINAL_STATUSES};
