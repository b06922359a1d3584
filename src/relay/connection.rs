//! Handle to one live subscriber socket
//!
//! The socket itself is owned by its serving task; everything else talks to it
//! through this handle, which queues frames on an unbounded in-order channel.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use super::liveness::{Liveness, LivenessTracker, ProbeAction};
use crate::types::RelayMessage;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Frames queued for the socket task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Serialized JSON frame
    Text(String),
    /// WebSocket heartbeat ping
    Ping,
    /// Close handshake with the given code, then stop
    Close { code: u16, reason: String },
}

/// Error returned when a frame cannot be queued
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("connection is closed")]
    Closed,
    #[error("failed to serialize frame: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub struct Connection {
    id: u64,
    conversation_id: String,
    tx: mpsc::UnboundedSender<Outbound>,
    liveness: Mutex<LivenessTracker>,
    closed: AtomicBool,
    /// Forced teardown, observed by the socket task ahead of the frame queue
    kill: CancellationToken,
}

impl Connection {
    pub fn new(conversation_id: impl Into<String>, tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            conversation_id: conversation_id.into(),
            tx,
            liveness: Mutex::new(LivenessTracker::new(Instant::now())),
            closed: AtomicBool::new(false),
            kill: CancellationToken::new(),
        }
    }

    /// Create a connection together with the receiving end of its frame queue
    pub fn channel(
        conversation_id: impl Into<String>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self::new(conversation_id, tx)), rx)
    }

    /// Process-unique connection id
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Whether frames can still reach the socket
    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && !self.tx.is_closed()
    }

    /// Serialize and queue a message
    pub fn send_message(&self, message: &RelayMessage) -> Result<(), SendError> {
        let json = serde_json::to_string(message)?;
        self.send_text(json)
    }

    /// Queue a pre-serialized frame
    pub fn send_text(&self, json: String) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::Closed);
        }
        self.tx
            .send(Outbound::Text(json))
            .map_err(|_| SendError::Closed)
    }

    /// Queue a heartbeat ping; false if the socket task is gone
    pub fn ping(&self) -> bool {
        self.is_open() && self.tx.send(Outbound::Ping).is_ok()
    }

    /// Ask the socket task to close with a close frame
    pub fn close(&self, code: u16, reason: impl Into<String>) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let _ = self.tx.send(Outbound::Close {
                code,
                reason: reason.into(),
            });
        }
    }

    /// Drop the socket immediately, even mid-write or with frames queued
    pub fn terminate(&self) {
        self.liveness.lock().terminate();
        self.closed.store(true, Ordering::Release);
        self.kill.cancel();
    }

    pub fn is_terminated(&self) -> bool {
        self.kill.is_cancelled()
    }

    /// Resolves once `terminate` has been called
    pub fn terminated(&self) -> WaitForCancellationFuture<'_> {
        self.kill.cancelled()
    }

    /// Mark the socket task as finished
    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Record a heartbeat response
    pub fn mark_alive(&self) {
        self.liveness.lock().on_pong(Instant::now());
    }

    /// Advance this connection's liveness state by one probe cycle
    pub fn probe(&self) -> ProbeAction {
        self.liveness.lock().on_probe()
    }

    pub fn liveness(&self) -> Liveness {
        self.liveness.lock().state()
    }

    pub fn last_seen(&self) -> Instant {
        self.liveness.lock().last_seen()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("conversation_id", &self.conversation_id)
            .field("open", &self.is_open())
            .field("liveness", &self.liveness())
            .finish()
    }
}
