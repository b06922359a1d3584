//! Shared application state

use std::sync::Arc;

use crate::config::RelayConfig;
use crate::relay::{ConnectionRegistry, RateLimiter};

use super::websocket::auth::SubscriptionPolicy;

/// State shared by the ingress and subscription endpoints
pub struct AppState {
    pub config: RelayConfig,

    /// Conversation id → live subscriber
    pub registry: Arc<ConnectionRegistry>,

    /// Limiter for `POST /status/:conversationId`
    pub ingress_limiter: Arc<RateLimiter>,

    /// Limiter for WebSocket subscriptions
    pub subscription_limiter: Arc<RateLimiter>,

    pub subscription_policy: SubscriptionPolicy,
}

impl AppState {
    pub fn new(config: RelayConfig) -> Self {
        let limiter = || {
            Arc::new(RateLimiter::new(
                config.rate_limit_window,
                config.rate_limit_max_requests,
            ))
        };
        let ingress_limiter = limiter();
        let subscription_limiter = limiter();
        let subscription_policy = SubscriptionPolicy::from_config(&config);

        Self {
            registry: Arc::new(ConnectionRegistry::new()),
            ingress_limiter,
            subscription_limiter,
            subscription_policy,
            config,
        }
    }

    /// Live subscription count, for health reporting
    pub fn connection_count(&self) -> usize {
        self.registry.size()
    }
}
