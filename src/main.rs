//! Status Relay - Binary Entry Point

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use status_relay::api::http::shutdown_signal;
use status_relay::{RelayConfig, RelayServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "status_relay=info,tower_http=info".into()),
        )
        .init();

    let config = RelayConfig::from_env().context("invalid configuration")?;
    let addr = config.bind_addr();

    tracing::info!(
        version = status_relay::VERSION,
        heartbeat_ms = config.heartbeat_interval.as_millis() as u64,
        rate_limit = config.rate_limit_max_requests,
        require_token = config.require_token,
        "starting status relay"
    );

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("health check: http://{}/health", addr);

    RelayServer::new(config)
        .run(listener, shutdown_signal())
        .await
        .context("server error")
}
