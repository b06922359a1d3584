//! Workflow status payloads

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::utils::iso_timestamp;

/// Status values that end a workflow run
pub const TERMINAL_STATUSES: [&str; 2] = ["completed", "error"];

/// Body of `POST /status/:conversationId` as sent by the workflow engine
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// Workflow stage (`started`, `processing`, `api-call`, `analyzing`, `completed`, `error`, ...)
    pub status: String,

    /// Human readable progress text
    pub message: String,

    /// Completion percentage, relayed as the exact JSON number received
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<Number>,

    /// Free-form workflow data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl StatusUpdate {
    pub fn new(status: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            message: message.into(),
            progress: None,
            metadata: None,
        }
    }

    pub fn with_progress(mut self, progress: impl Into<Number>) -> Self {
        self.progress = Some(progress.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A status update stamped with the relay's receive time
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub status: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    /// ISO 8601 server timestamp
    pub timestamp: String,
}

impl StatusEvent {
    /// Stamp an incoming update with the current time
    pub fn from_update(update: StatusUpdate) -> Self {
        Self {
            status: update.status,
            message: update.message,
            progress: update.progress,
            metadata: update.metadata,
            timestamp: iso_timestamp(),
        }
    }

    /// Whether this status ends the workflow run
    pub fn is_terminal(&self) -> bool {
        TERMINAL_STATUSES.contains(&self.status.as_str())
    }
}
