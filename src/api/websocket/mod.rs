//! WebSocket subscription endpoint
//!
//! Browsers connect to `/?conversationId=<id>&token=<optional>` (also served
//! at `/ws`). Each accepted socket is registered in the connection registry
//! and receives a `connected` frame followed by the status frames posted for
//! its conversation.

pub mod auth;
pub mod handler;

pub use handler::ws_handler;
