//! Reconnecting subscriber for a single conversation
//!
//! Maintains a WebSocket to the relay with exponential-backoff reconnect,
//! records received frames in a bounded history and fans them out to local
//! listeners.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::backoff::{BackoffConfig, LinkState, ReconnectPolicy};
use super::history::{StatusHistory, DEFAULT_MAX_HISTORY};
use super::ClientError;
use crate::types::{RelayMessage, StatusEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Settings for a [`StatusSubscriber`]
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    /// Relay base URL, e.g. `ws://localhost:3001`
    pub url: String,
    pub conversation_id: Option<String>,
    pub token: Option<String>,
    pub backoff: BackoffConfig,
    pub max_history: usize,
}

impl SubscriberConfig {
    pub fn new(url: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            conversation_id: Some(conversation_id.into()),
            token: None,
            backoff: BackoffConfig::default(),
            max_history: DEFAULT_MAX_HISTORY,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    /// Full subscription URL with encoded query parameters
    pub fn subscription_url(&self) -> Result<String, ClientError> {
        let conversation_id = self
            .conversation_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or(ClientError::MissingConversationId)?;

        let base = self.url.trim_end_matches('/');
        let mut url = format!(
            "{}/?conversationId={}",
            base,
            urlencoding::encode(conversation_id)
        );
        if let Some(token) = &self.token {
            url.push_str("&token=");
            url.push_str(&urlencoding::encode(token));
        }
        Ok(url)
    }
}

/// Why a live session ended
enum SessionEnd {
    Dropped,
    Stopped,
}

/// Handle to a running subscriber task
pub struct StatusSubscriber {
    state_rx: watch::Receiver<LinkState>,
    history: Arc<Mutex<StatusHistory>>,
    messages: broadcast::Sender<RelayMessage>,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl StatusSubscriber {
    /// Start the reconnect loop
    ///
    /// A config without a conversation id never connects.
    pub fn spawn(config: SubscriberConfig) -> Self {
        let (state_tx, state_rx) = watch::channel(LinkState::Disconnected);
        let (stop_tx, stop_rx) = watch::channel(false);
        let (messages, _) = broadcast::channel(256);
        let history = Arc::new(Mutex::new(StatusHistory::new(config.max_history)));

        let task = match config.subscription_url() {
            Ok(url) => tokio::spawn(run(
                url,
                config.backoff,
                state_tx,
                stop_rx,
                Arc::clone(&history),
                messages.clone(),
            )),
            Err(e) => {
                debug!(error = %e, "subscriber not started");
                tokio::spawn(async {})
            }
        };

        Self {
            state_rx,
            history,
            messages,
            stop_tx,
            task,
        }
    }

    pub fn state(&self) -> LinkState {
        *self.state_rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == LinkState::Connected
    }

    /// Watch link state transitions
    pub fn state_changes(&self) -> watch::Receiver<LinkState> {
        self.state_rx.clone()
    }

    /// Receive every frame as it arrives
    pub fn subscribe(&self) -> broadcast::Receiver<RelayMessage> {
        self.messages.subscribe()
    }

    /// Snapshot of the recent message window
    pub fn history(&self) -> Vec<RelayMessage> {
        self.history.lock().iter().cloned().collect()
    }

    pub fn latest_status(&self) -> Option<StatusEvent> {
        self.history.lock().latest_status().cloned()
    }

    pub fn is_workflow_active(&self) -> bool {
        self.history.lock().is_workflow_active()
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
    }

    /// Close the socket with 1000 and stop reconnecting
    pub async fn disconnect(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "subscriber task failed");
        }
    }
}

async fn run(
    url: String,
    backoff: BackoffConfig,
    state_tx: watch::Sender<LinkState>,
    mut stop_rx: watch::Receiver<bool>,
    history: Arc<Mutex<StatusHistory>>,
    messages: broadcast::Sender<RelayMessage>,
) {
    let mut policy = ReconnectPolicy::new(backoff);

    loop {
        let _ = state_tx.send(policy.on_connecting());
        debug!(url = %url, "connecting to relay");

        let connected = tokio::select! {
            result = connect(&url) => result,
            _ = stop_rx.changed() => break,
        };

        match connected {
            Ok(ws) => {
                let _ = state_tx.send(policy.on_connected());
                info!("connected to relay");
                match pump(ws, &mut stop_rx, &history, &messages).await {
                    SessionEnd::Stopped => break,
                    SessionEnd::Dropped => info!("relay connection closed"),
                }
            }
            Err(e) => warn!(error = %e, "failed to connect to relay"),
        }

        let delay = policy.on_disconnected();
        let _ = state_tx.send(policy.state());
        info!(
            attempt = policy.attempt(),
            delay_ms = delay.as_millis() as u64,
            "reconnecting"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = stop_rx.changed() => break,
        }
    }

    let _ = state_tx.send(policy.on_stopped());
}

async fn connect(url: &str) -> Result<WsStream, ClientError> {
    let (ws, _response) = tokio_tungstenite::connect_async(url).await?;
    Ok(ws)
}

/// Read frames until the socket drops or a stop is requested
async fn pump(
    mut ws: WsStream,
    stop_rx: &mut watch::Receiver<bool>,
    history: &Mutex<StatusHistory>,
    messages: &broadcast::Sender<RelayMessage>,
) -> SessionEnd {
    loop {
        tokio::select! {
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<RelayMessage>(text.as_str()) {
                        Ok(message) => {
                            history.lock().push(message.clone());
                            let _ = messages.send(message);
                        }
                        Err(e) => warn!(error = %e, "failed to parse relay message"),
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "relay closed the connection");
                    return SessionEnd::Dropped;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "websocket error");
                    return SessionEnd::Dropped;
                }
                None => return SessionEnd::Dropped,
            },

            _ = stop_rx.changed() => {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "Manual disconnect".into(),
                };
                let _ = ws.send(Message::Close(Some(frame))).await;
                return SessionEnd::Stopped;
            }
        }
    }
}
