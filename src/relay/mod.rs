//! Relay core: connection routing, liveness and rate limiting
//!
//! - `registry`: one live connection per conversation id, best-effort delivery
//! - `connection`: handle to a socket task's outbound queue
//! - `liveness`: ping/pong state machine and the periodic prober
//! - `rate_limit`: sliding-window limiter shared by both endpoints

pub mod connection;
pub mod liveness;
pub mod rate_limit;
pub mod registry;

pub use connection::{Connection, Outbound, SendError};
pub use liveness::{Liveness, LivenessProber, LivenessTracker, ProbeAction, SweepReport};
pub use rate_limit::RateLimiter;
pub use registry::{ConnectionRegistry, DeliveryOutcome};
