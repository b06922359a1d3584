//! Status ingress endpoint for the workflow engine

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, Path, State},
    http::HeaderMap,
    Json,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::client_ip;
use super::state::AppState;
use crate::error::{RelayError, RelayResult};
use crate::relay::DeliveryOutcome;
use crate::types::{RelayMessage, StatusUpdate};

/// Longest accepted conversation id, in characters
pub const MAX_CONVERSATION_ID_LEN: usize = 100;

/// Header carrying the shared ingress secret
pub const INGRESS_SECRET_HEADER: &str = "x-relay-secret";

/// Response body for an accepted status
#[derive(Debug, Serialize)]
pub struct Accepted {
    pub success: bool,
}

pub fn validate_conversation_id(conversation_id: &str) -> RelayResult<()> {
    if conversation_id.is_empty() || conversation_id.chars().count() > MAX_CONVERSATION_ID_LEN {
        return Err(RelayError::InvalidRequest("Invalid conversationId".to_string()));
    }
    Ok(())
}

/// POST /status/:conversationId - relay a workflow status to its subscriber
///
/// Always answers 200 once the request passes validation and rate limiting,
/// whether or not anyone is subscribed.
pub async fn post_status(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<String>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    body: Result<Json<StatusUpdate>, JsonRejection>,
) -> RelayResult<Json<Accepted>> {
    validate_conversation_id(&conversation_id)?;

    if let Some(secret) = state.config.ingress_secret.as_deref() {
        let supplied = headers
            .get(INGRESS_SECRET_HEADER)
            .and_then(|v| v.to_str().ok());
        if supplied != Some(secret) {
            return Err(RelayError::Unauthorized("Invalid ingress secret".to_string()));
        }
    }

    let client_ip = client_ip(&headers, connect_info.map(|ConnectInfo(addr)| addr));
    if !state.ingress_limiter.allow(&client_ip) {
        warn!(client_ip = %client_ip, "status rate limit exceeded");
        return Err(RelayError::RateLimited);
    }

    let Json(update) = body.map_err(|e| RelayError::InvalidRequest(e.body_text()))?;

    info!(
        conversation_id = %conversation_id,
        status = %update.status,
        progress = ?update.progress,
        "status update"
    );

    let outcome = state
        .registry
        .try_deliver(&conversation_id, &RelayMessage::status(update));
    match outcome {
        DeliveryOutcome::Delivered => debug!(conversation_id = %conversation_id, "status sent"),
        DeliveryOutcome::NoSubscriber => {
            debug!(conversation_id = %conversation_id, "no active connection")
        }
        DeliveryOutcome::SendFailed => {
            warn!(conversation_id = %conversation_id, outcome = outcome.as_str(), "status dropped")
        }
    }

    Ok(Json(Accepted { success: true }))
}

/// POST /status/ - conversation id missing from the path
pub async fn post_status_missing_id() -> RelayError {
    RelayError::InvalidRequest("Invalid conversationId".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_conversation_id() {
        assert!(validate_conversation_id("1753955715567-ovu9belc6").is_ok());
        assert!(validate_conversation_id("").is_err());
        assert!(validate_conversation_id(&"a".repeat(100)).is_ok());
        assert!(validate_conversation_id(&"a".repeat(101)).is_err());
    }

    #[test]
    fn test_length_counts_characters() {
        assert!(validate_conversation_id(&"é".repeat(100)).is_ok());
    }
}
