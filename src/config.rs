//! Relay configuration
//!
//! ## Environment
//! ```bash
//! RELAY_HOST=0.0.0.0
//! RELAY_PORT=3001                 # falls back to WS_PORT
//! ALLOWED_ORIGINS=http://localhost:3000,https://chat.example.com
//! RATE_LIMIT_WINDOW_MS=60000
//! RATE_LIMIT_MAX_REQUESTS=100
//! HEARTBEAT_INTERVAL_MS=30000
//! RELAY_ENV=production            # falls back to NODE_ENV; makes tokens mandatory
//! RELAY_JWT_SECRET=...            # optional, verify subscription tokens as HS256 JWTs
//! RELAY_INGRESS_SECRET=...        # optional, required X-Relay-Secret on ingress
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

/// Errors raised while reading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be a valid {expected}, got {value:?}")]
    InvalidValue {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Origins allowed to call the HTTP API and open subscriptions
    pub allowed_origins: Vec<String>,
    pub rate_limit_window: Duration,
    pub rate_limit_max_requests: usize,
    pub heartbeat_interval: Duration,
    /// Production mode: subscriptions must carry a token
    pub require_token: bool,
    pub jwt_secret: Option<String>,
    pub ingress_secret: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 3001,
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:3002".to_string(),
            ],
            rate_limit_window: Duration::from_millis(60_000),
            rate_limit_max_requests: 100,
            heartbeat_interval: Duration::from_millis(30_000),
            require_token: false,
            jwt_secret: None,
            ingress_secret: None,
        }
    }
}

impl RelayConfig {
    /// Build configuration from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(host) = get("RELAY_HOST") {
            config.host = parse("RELAY_HOST", "IP address", &host)?;
        }

        if let Some(port) = get("RELAY_PORT") {
            config.port = parse("RELAY_PORT", "port", &port)?;
        } else if let Some(port) = get("WS_PORT") {
            config.port = parse("WS_PORT", "port", &port)?;
        }

        if let Some(origins) = get("ALLOWED_ORIGINS") {
            config.allowed_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }

        if let Some(ms) = get("RATE_LIMIT_WINDOW_MS") {
            config.rate_limit_window =
                Duration::from_millis(parse_positive("RATE_LIMIT_WINDOW_MS", &ms)?);
        }

        if let Some(max) = get("RATE_LIMIT_MAX_REQUESTS") {
            config.rate_limit_max_requests =
                parse_positive("RATE_LIMIT_MAX_REQUESTS", &max)? as usize;
        }

        if let Some(ms) = get("HEARTBEAT_INTERVAL_MS") {
            config.heartbeat_interval =
                Duration::from_millis(parse_positive("HEARTBEAT_INTERVAL_MS", &ms)?);
        }

        let mode = get("RELAY_ENV").or_else(|| get("NODE_ENV"));
        config.require_token = mode.is_some_and(|m| m.eq_ignore_ascii_case("production"));

        config.jwt_secret = get("RELAY_JWT_SECRET");
        config.ingress_secret = get("RELAY_INGRESS_SECRET");

        Ok(config)
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse<T: FromStr>(name: &'static str, expected: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name,
        expected,
        value: value.to_string(),
    })
}

fn parse_positive(name: &'static str, value: &str) -> Result<u64, ConfigError> {
    match parse::<u64>(name, "positive integer", value)? {
        0 => Err(ConfigError::InvalidValue {
            name,
            expected: "positive integer",
            value: value.to_string(),
        }),
        n => Ok(n),
    }
}
