//! HTTP server setup with Axum

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderName, HeaderValue, Method},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use super::state::AppState;
use super::status::{post_status, post_status_missing_id, INGRESS_SECRET_HEADER};
use super::websocket::ws_handler;
use crate::config::RelayConfig;
use crate::relay::LivenessProber;
use crate::utils::iso_timestamp;

/// Maximum accepted request body
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Close code sent to subscribers when the server stops
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Create the Axum router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.allowed_origins);

    Router::new()
        // WebSocket subscription
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        // Health check
        .route("/health", get(health_check))
        // Workflow engine ingress
        .route("/status/", post(post_status_missing_id))
        .route("/status/:conversation_id", post(post_status))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid allowed origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(INGRESS_SECRET_HEADER),
        ])
        .allow_credentials(true)
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub connections: usize,
    pub timestamp: String,
}

/// GET /health
async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        connections: state.connection_count(),
        timestamp: iso_timestamp(),
    })
}

/// The relay server with its background tasks
pub struct RelayServer {
    state: Arc<AppState>,
}

impl RelayServer {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            state: Arc::new(AppState::new(config)),
        }
    }

    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Start the liveness prober and rate-limit sweepers
    fn spawn_background(&self) -> Vec<JoinHandle<()>> {
        let prober = LivenessProber::new(
            Arc::clone(&self.state.registry),
            self.state.config.heartbeat_interval,
        );
        vec![
            prober.spawn(),
            self.state.ingress_limiter.spawn_sweeper(),
            self.state.subscription_limiter.spawn_sweeper(),
        ]
    }

    /// Serve on `listener` until `shutdown` resolves
    ///
    /// On shutdown every subscriber is closed with 1001 without draining.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let tasks = self.spawn_background();
        let registry = Arc::clone(&self.state.registry);
        let app = create_router(self.state());

        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "status relay listening");
        }

        let result = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown.await;
            let closed = registry.close_all(CLOSE_GOING_AWAY, "Server shutting down");
            info!(closed, "shutdown requested, closed subscriptions");
        })
        .await;

        for task in tasks {
            task.abort();
        }
        info!("server closed");
        result
    }
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("SIGINT received"),
        _ = terminate => info!("SIGTERM received"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    fn test_config() -> RelayConfig {
        RelayConfig {
            rate_limit_max_requests: 3,
            ..RelayConfig::default()
        }
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_status_request(path: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .header("x-forwarded-for", "198.51.100.1")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let state = Arc::new(AppState::new(test_config()));
        let app = create_router(state);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connections"], 0);
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_status_without_subscriber_is_accepted() {
        let state = Arc::new(AppState::new(test_config()));
        let response = create_router(state)
            .oneshot(post_status_request(
                "/status/unknown-id",
                r#"{"status":"processing","message":"Analyzing..."}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!({"success": true}));
    }

    #[tokio::test]
    async fn test_invalid_conversation_id() {
        let state = Arc::new(AppState::new(test_config()));
        let long_id = "x".repeat(101);

        let response = create_router(state.clone())
            .oneshot(post_status_request(
                &format!("/status/{}", long_id),
                r#"{"status":"started","message":"hi"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "INVALID_REQUEST");

        let response = create_router(state)
            .oneshot(post_status_request("/status/", r#"{"status":"started","message":"hi"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let state = Arc::new(AppState::new(test_config()));
        let response = create_router(state)
            .oneshot(post_status_request("/status/abc", r#"{"status":"started"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_rate_limit_returns_429() {
        let state = Arc::new(AppState::new(test_config()));
        let body = r#"{"status":"processing","message":"step"}"#;

        for _ in 0..3 {
            let response = create_router(state.clone())
                .oneshot(post_status_request("/status/abc", body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = create_router(state)
            .oneshot(post_status_request("/status/abc", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body_json(response).await["code"], "RATE_LIMITED");
    }

    #[tokio::test]
    async fn test_ingress_secret_enforced() {
        let config = RelayConfig {
            ingress_secret: Some("s3cret".to_string()),
            ..test_config()
        };
        let state = Arc::new(AppState::new(config));
        let body = r#"{"status":"started","message":"hi"}"#;

        let response = create_router(state.clone())
            .oneshot(post_status_request("/status/abc", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let mut request = post_status_request("/status/abc", body);
        request
            .headers_mut()
            .insert(INGRESS_SECRET_HEADER, HeaderValue::from_static("s3cret"));
        let response = create_router(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_status_delivered_to_registered_connection() {
        use crate::relay::{Connection, Outbound};

        let state = Arc::new(AppState::new(test_config()));
        let (conn, mut rx) = Connection::channel("abc123");
        state.registry.register(conn);
        let _ = rx.try_recv(); // connected

        let response = create_router(state)
            .oneshot(post_status_request(
                "/status/abc123",
                r#"{"status":"processing","message":"Analyzing...","progress":30}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        match rx.try_recv().unwrap() {
            Outbound::Text(json) => {
                let value: serde_json::Value = serde_json::from_str(&json).unwrap();
                assert_eq!(value["type"], "status");
                assert_eq!(value["status"], "processing");
                assert_eq!(value["message"], "Analyzing...");
                assert_eq!(value["progress"], 30);
                assert!(value["timestamp"].is_string());
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_metadata_key_order_preserved_in_frame() {
        use crate::relay::{Connection, Outbound};

        let state = Arc::new(AppState::new(test_config()));
        let (conn, mut rx) = Connection::channel("abc");
        state.registry.register(conn);
        let _ = rx.try_recv(); // connected

        let response = create_router(state)
            .oneshot(post_status_request(
                "/status/abc",
                r#"{"status":"processing","message":"m","progress":12.5,"metadata":{"zeta":1,"alpha":{"y":true,"b":null},"mid":[3,1]}}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        match rx.try_recv().unwrap() {
            Outbound::Text(json) => {
                assert!(json.starts_with(
                    r#"{"type":"status","status":"processing","message":"m","progress":12.5,"metadata":{"zeta":1,"alpha":{"y":true,"b":null},"mid":[3,1]},"timestamp":""#
                ), "frame was {}", json);
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}
