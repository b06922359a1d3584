//! WebSocket frame types exchanged with subscribers

use serde::{Deserialize, Serialize};

use super::status::{StatusEvent, StatusUpdate};
use crate::utils::iso_timestamp;

/// Frames pushed from the relay to a subscriber
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayMessage {
    /// Confirmation sent once a subscription is registered
    Connected {
        #[serde(rename = "conversationId")]
        conversation_id: String,
        timestamp: String,
    },

    /// Workflow progress update
    Status(StatusEvent),

    /// Reply to a client `ping` frame
    Pong,
}

impl RelayMessage {
    pub fn connected(conversation_id: impl Into<String>) -> Self {
        RelayMessage::Connected {
            conversation_id: conversation_id.into(),
            timestamp: iso_timestamp(),
        }
    }

    pub fn status(update: StatusUpdate) -> Self {
        RelayMessage::Status(StatusEvent::from_update(update))
    }

    /// The status payload, if this is a status frame
    pub fn as_status(&self) -> Option<&StatusEvent> {
        match self {
            RelayMessage::Status(event) => Some(event),
            _ => None,
        }
    }
}

/// Frames a subscriber may send to the relay
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Application level heartbeat
    Ping,
}
