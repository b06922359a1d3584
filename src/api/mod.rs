//! API module for HTTP and WebSocket endpoints
//!
//! - `GET /health` - liveness and subscription count
//! - `POST /status/:conversationId` - workflow engine ingress
//! - `GET /` or `GET /ws` - WebSocket subscription

pub mod http;
pub mod state;
pub mod status;
pub mod websocket;

use std::net::SocketAddr;

use axum::http::HeaderMap;

/// Caller identity used for rate limiting
///
/// First `X-Forwarded-For` hop when behind a proxy, otherwise the peer IP.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}
