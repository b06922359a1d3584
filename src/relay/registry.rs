//! Conversation id → live connection routing table

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::connection::Connection;
use crate::types::RelayMessage;

/// Close code sent to a connection replaced by a newer one
pub const CLOSE_SUPERSEDED: u16 = 1000;

/// Outcome of a best-effort push
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    NoSubscriber,
    SendFailed,
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryOutcome::Delivered => "delivered",
            DeliveryOutcome::NoSubscriber => "no_subscriber",
            DeliveryOutcome::SendFailed => "send_failed",
        }
    }
}

/// Holds at most one live connection per conversation id
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<String, Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Register a connection under its conversation id
    ///
    /// Any previous connection for the same id is closed as part of the same
    /// swap, and the new connection receives its `connected` confirmation
    /// before any status can be routed to it.
    pub fn register(&self, connection: Arc<Connection>) -> Option<Arc<Connection>> {
        let conversation_id = connection.conversation_id().to_string();
        let confirmation = RelayMessage::connected(conversation_id.as_str());

        let mut connections = self.connections.lock();
        let previous = connections.insert(conversation_id.clone(), Arc::clone(&connection));
        if let Some(old) = &previous {
            old.close(CLOSE_SUPERSEDED, "Superseded by a newer connection");
            info!(
                conversation_id = %conversation_id,
                old_conn_id = old.id(),
                new_conn_id = connection.id(),
                "replaced existing connection"
            );
        }
        if let Err(e) = connection.send_message(&confirmation) {
            warn!(conversation_id = %conversation_id, error = %e, "failed to send connected confirmation");
        }
        previous
    }

    pub fn lookup(&self, conversation_id: &str) -> Option<Arc<Connection>> {
        self.connections.lock().get(conversation_id).cloned()
    }

    /// Drop the entry for `conversation_id`, if any
    pub fn remove(&self, conversation_id: &str) -> Option<Arc<Connection>> {
        self.connections.lock().remove(conversation_id)
    }

    /// Drop the entry only if it still belongs to `connection_id`
    pub fn release(&self, conversation_id: &str, connection_id: u64) -> bool {
        let mut connections = self.connections.lock();
        match connections.get(conversation_id) {
            Some(current) if current.id() == connection_id => {
                connections.remove(conversation_id);
                true
            }
            _ => false,
        }
    }

    pub fn size(&self) -> usize {
        self.connections.lock().len()
    }

    /// Snapshot of every registered connection
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.connections.lock().values().cloned().collect()
    }

    /// Push a message to the subscriber of `conversation_id`, if any
    pub fn try_deliver(&self, conversation_id: &str, message: &RelayMessage) -> DeliveryOutcome {
        let json = match serde_json::to_string(message) {
            Ok(json) => json,
            Err(e) => {
                warn!(conversation_id, error = %e, "failed to serialize message");
                return DeliveryOutcome::SendFailed;
            }
        };

        let Some(connection) = self.lookup(conversation_id) else {
            debug!(conversation_id, "no active connection");
            return DeliveryOutcome::NoSubscriber;
        };

        match connection.send_text(json) {
            Ok(()) => DeliveryOutcome::Delivered,
            Err(e) => {
                warn!(
                    conversation_id,
                    conn_id = connection.id(),
                    error = %e,
                    "failed to send status, dropping connection"
                );
                self.release(conversation_id, connection.id());
                DeliveryOutcome::SendFailed
            }
        }
    }

    /// Close every connection and clear the registry
    pub fn close_all(&self, code: u16, reason: &str) -> usize {
        let drained: Vec<Arc<Connection>> = {
            let mut connections = self.connections.lock();
            connections.drain().map(|(_, c)| c).collect()
        };
        for connection in &drained {
            connection.close(code, reason);
        }
        drained.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
