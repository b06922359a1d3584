//! Status Relay
//!
//! Relays out-of-band workflow progress updates to the browser tab that is
//! following a conversation.
//!
//! A workflow engine posts `{status, message, progress?, metadata?}` to
//! `POST /status/:conversationId`; the relay pushes it to the WebSocket
//! subscribed under that conversation id, or silently drops it when nobody is
//! listening. Delivery is best-effort and fire-and-forget.
//!
//! # Modules
//!
//! - `relay`: connection registry, liveness prober, rate limiter
//! - `api`: Axum router, ingress and subscription endpoints, server lifecycle
//! - `client`: reconnecting subscriber with bounded status history
//! - `types`: wire payloads
//! - `config`: environment configuration
//! - `error`: error taxonomy and HTTP mapping
//! - `utils`: clock and timestamp helpers
//!
//! # Example
//!
//! ```no_run
//! use status_relay::{RelayConfig, RelayServer};
//! use status_relay::api::http::shutdown_signal;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let config = RelayConfig::default();
//!     let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
//!     RelayServer::new(config).run(listener, shutdown_signal()).await
//! }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod relay;
pub mod types;
pub mod utils;

// Re-export commonly used items at crate root
pub use api::http::{create_router, RelayServer};
pub use api::state::AppState;
pub use client::{StatusSubscriber, SubscriberConfig};
pub use config::RelayConfig;
pub use error::{RelayError, RelayResult};
pub use relay::{ConnectionRegistry, DeliveryOutcome, LivenessProber, RateLimiter};
pub use types::{RelayMessage, StatusEvent, StatusUpdate};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
