//! WebSocket subscription handler

use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, Query, State,
    },
    http::{header, HeaderMap},
    response::Response,
};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::client_ip;
use crate::api::state::AppState;
use crate::relay::{Connection, Outbound};
use crate::types::{ClientMessage, RelayMessage};

/// Query parameters for a subscription
#[derive(Debug, Deserialize)]
pub struct SubscribeParams {
    #[serde(rename = "conversationId")]
    pub conversation_id: Option<String>,
    /// Optional authentication token
    pub token: Option<String>,
}

/// WebSocket upgrade handler
///
/// Rejected subscriptions still complete the upgrade and are then closed
/// with a policy-violation code, so browsers can read the reason.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<SubscribeParams>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let client_ip = client_ip(&headers, connect_info.map(|ConnectInfo(addr)| addr));

    let conversation_id = match params.conversation_id.filter(|id| !id.is_empty()) {
        Some(id) => id,
        None => return reject(ws, "Missing conversationId"),
    };

    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok());
    if let Err(e) = state
        .subscription_policy
        .authorize(origin, params.token.as_deref())
    {
        warn!(conversation_id = %conversation_id, client_ip = %client_ip, reason = %e, "subscription refused");
        return reject(ws, e.to_string());
    }

    if !state.subscription_limiter.allow(&client_ip) {
        warn!(client_ip = %client_ip, "subscription rate limit exceeded");
        return reject(ws, "Rate limit exceeded");
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state, conversation_id, client_ip))
}

/// Accept the upgrade only to close it with 1008 and `reason`
fn reject(ws: WebSocketUpgrade, reason: impl Into<Cow<'static, str>>) -> Response {
    let reason = reason.into();
    ws.on_upgrade(move |mut socket| async move {
        let frame = CloseFrame {
            code: close_code::POLICY,
            reason,
        };
        let _ = socket.send(Message::Close(Some(frame))).await;
    })
}

/// Serve a registered subscription until it closes
async fn handle_socket(
    mut socket: WebSocket,
    state: Arc<AppState>,
    conversation_id: String,
    client_ip: String,
) {
    let (connection, mut outbound) = Connection::channel(conversation_id.as_str());
    state.registry.register(Arc::clone(&connection));
    info!(
        conversation_id = %conversation_id,
        conn_id = connection.id(),
        client_ip = %client_ip,
        "subscriber connected"
    );

    loop {
        tokio::select! {
            _ = connection.terminated() => break,

            // Queued frames to the client; a stuck write still yields to termination
            frame = outbound.recv() => {
                let written = tokio::select! {
                    ok = write_frame(&mut socket, frame) => ok,
                    _ = connection.terminated() => false,
                };
                if !written {
                    break;
                }
            }

            // Frames from the client
            result = socket.recv() => {
                match result {
                    Some(Ok(msg)) => {
                        if !handle_client_message(msg, &connection) {
                            break; // Client requested close
                        }
                    }
                    Some(Err(e)) => {
                        warn!(conversation_id = %conversation_id, error = %e, "websocket error");
                        break;
                    }
                    None => break, // Client disconnected
                }
            }
        }
    }

    connection.mark_closed();
    state.registry.release(&conversation_id, connection.id());
    drain(&mut outbound);
    info!(
        conversation_id = %conversation_id,
        conn_id = connection.id(),
        "subscriber disconnected"
    );
}

/// Write one queued frame; false when the socket should be dropped
async fn write_frame(socket: &mut WebSocket, frame: Option<Outbound>) -> bool {
    match frame {
        Some(Outbound::Text(json)) => socket.send(Message::Text(json)).await.is_ok(),
        Some(Outbound::Ping) => socket.send(Message::Ping(Vec::new())).await.is_ok(),
        Some(Outbound::Close { code, reason }) => {
            let frame = CloseFrame {
                code,
                reason: Cow::Owned(reason),
            };
            let _ = socket.send(Message::Close(Some(frame))).await;
            false
        }
        None => false,
    }
}

/// Handle a message from the client
/// Returns false if the connection should be closed
fn handle_client_message(msg: Message, connection: &Connection) -> bool {
    match msg {
        Message::Text(text) => {
            if let Ok(ClientMessage::Ping) = serde_json::from_str::<ClientMessage>(&text) {
                connection.mark_alive();
                if let Err(e) = connection.send_message(&RelayMessage::Pong) {
                    debug!(conn_id = connection.id(), error = %e, "failed to queue pong");
                }
            }
            true
        }
        Message::Binary(_) => true, // Ignore binary messages
        // Ping replies are written by the transport
        Message::Ping(_) | Message::Pong(_) => {
            connection.mark_alive();
            true
        }
        Message::Close(_) => false, // Client requested close
    }
}

fn drain(outbound: &mut mpsc::UnboundedReceiver<Outbound>) {
    outbound.close();
    while outbound.try_recv().is_ok() {}
}
