//! Subscriber side of the relay
//!
//! `StatusSubscriber` follows one conversation the way the browser does:
//! connect, keep the last N frames, and on any drop reconnect with capped
//! exponential backoff (5s, 10s, 20s, 30s, ...) until told to stop.

pub mod backoff;
pub mod history;
pub mod subscriber;

pub use backoff::{BackoffConfig, LinkState, ReconnectPolicy};
pub use history::StatusHistory;
pub use subscriber::{StatusSubscriber, SubscriberConfig};

/// Errors raised by the subscriber
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("conversation id is required to subscribe")]
    MissingConversationId,

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}
