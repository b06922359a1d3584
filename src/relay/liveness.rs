//! Heartbeat liveness tracking and the periodic prober
//!
//! Each connection moves `Alive -> Awaiting` when probed and back to `Alive`
//! when a pong arrives. A connection still `Awaiting` at the next probe has
//! missed a full interval and is `Terminated`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::registry::ConnectionRegistry;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Awaiting,
    Terminated,
}

/// What the prober should do with a connection this cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeAction {
    SendPing,
    Terminate,
    Skip,
}

/// Per-connection liveness state machine
#[derive(Debug)]
pub struct LivenessTracker {
    state: Liveness,
    last_seen: Instant,
}

impl LivenessTracker {
    pub fn new(now: Instant) -> Self {
        Self {
            state: Liveness::Alive,
            last_seen: now,
        }
    }

    pub fn state(&self) -> Liveness {
        self.state
    }

    /// Last time the peer answered a heartbeat (or connected)
    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }

    /// Advance one probe cycle
    pub fn on_probe(&mut self) -> ProbeAction {
        match self.state {
            Liveness::Alive => {
                self.state = Liveness::Awaiting;
                ProbeAction::SendPing
            }
            Liveness::Awaiting => {
                self.state = Liveness::Terminated;
                ProbeAction::Terminate
            }
            Liveness::Terminated => ProbeAction::Skip,
        }
    }

    /// Record a heartbeat response
    pub fn on_pong(&mut self, now: Instant) {
        if self.state != Liveness::Terminated {
            self.state = Liveness::Alive;
            self.last_seen = now;
        }
    }

    pub fn terminate(&mut self) {
        self.state = Liveness::Terminated;
    }
}

/// Result of one prober cycle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub pinged: usize,
    pub terminated: usize,
}

/// Periodic heartbeat over every registered connection
pub struct LivenessProber {
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
}

impl LivenessProber {
    pub fn new(registry: Arc<ConnectionRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Run a single probe cycle
    pub fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        for connection in self.registry.connections() {
            match connection.probe() {
                ProbeAction::SendPing => {
                    if connection.ping() {
                        report.pinged += 1;
                    } else {
                        // Socket task already gone
                        self.registry
                            .release(connection.conversation_id(), connection.id());
                    }
                }
                ProbeAction::Terminate => {
                    info!(
                        conversation_id = connection.conversation_id(),
                        conn_id = connection.id(),
                        idle_ms = connection.last_seen().elapsed().as_millis() as u64,
                        "terminating unresponsive connection"
                    );
                    connection.terminate();
                    self.registry
                        .release(connection.conversation_id(), connection.id());
                    report.terminated += 1;
                }
                ProbeAction::Skip => {}
            }
        }

        debug!(
            pinged = report.pinged,
            terminated = report.terminated,
            "liveness sweep"
        );
        report
    }

    /// Probe on a fixed interval until the task is aborted
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            // Missed ticks are delayed, not burst: every ping gets a full interval
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.sweep();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::connection::{Connection, Outbound};

    #[test]
    fn test_tracker_cycle() {
        let now = Instant::now();
        let mut tracker = LivenessTracker::new(now);
        assert_eq!(tracker.state(), Liveness::Alive);

        assert_eq!(tracker.on_probe(), ProbeAction::SendPing);
        assert_eq!(tracker.state(), Liveness::Awaiting);

        tracker.on_pong(now + Duration::from_secs(1));
        assert_eq!(tracker.state(), Liveness::Alive);
        assert_eq!(tracker.last_seen(), now + Duration::from_secs(1));
    }

    #[test]
    fn test_tracker_missed_cycle_terminates() {
        let mut tracker = LivenessTracker::new(Instant::now());
        assert_eq!(tracker.on_probe(), ProbeAction::SendPing);
        assert_eq!(tracker.on_probe(), ProbeAction::Terminate);
        assert_eq!(tracker.state(), Liveness::Terminated);
        assert_eq!(tracker.on_probe(), ProbeAction::Skip);
    }

    #[test]
    fn test_pong_after_termination_is_ignored() {
        let mut tracker = LivenessTracker::new(Instant::now());
        tracker.terminate();
        tracker.on_pong(Instant::now());
        assert_eq!(tracker.state(), Liveness::Terminated);
    }

    #[test]
    fn test_unresponsive_connection_evicted_within_two_sweeps() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (conn, mut rx) = Connection::channel("silent");
        registry.register(conn.clone());
        let _ = rx.try_recv(); // connected confirmation

        let prober = LivenessProber::new(registry.clone(), Duration::from_secs(30));

        let first = prober.sweep();
        assert_eq!(first, SweepReport { pinged: 1, terminated: 0 });
        assert!(matches!(rx.try_recv(), Ok(Outbound::Ping)));
        assert_eq!(registry.size(), 1);

        let second = prober.sweep();
        assert_eq!(second, SweepReport { pinged: 0, terminated: 1 });
        assert!(conn.is_terminated());
        assert_eq!(conn.liveness(), Liveness::Terminated);
        assert_eq!(registry.size(), 0);
    }

    #[test]
    fn test_responsive_connection_is_kept() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (conn, _rx) = Connection::channel("chatty");
        registry.register(conn.clone());

        let prober = LivenessProber::new(registry.clone(), Duration::from_secs(30));
        for _ in 0..5 {
            prober.sweep();
            conn.mark_alive();
        }
        assert_eq!(registry.size(), 1);
        assert!(conn.is_open());
    }

    #[test]
    fn test_dead_channel_released_on_ping() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (conn, rx) = Connection::channel("gone");
        registry.register(conn);
        drop(rx);

        let prober = LivenessProber::new(registry.clone(), Duration::from_secs(30));
        let report = prober.sweep();
        assert_eq!(report.pinged, 0);
        assert_eq!(registry.size(), 0);
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_runtime_stall_does_not_evict_responsive_connection() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (conn, mut rx) = Connection::channel("stalled");
        registry.register(conn.clone());

        let responder = {
            let conn = conn.clone();
            tokio::spawn(async move {
                while let Some(frame) = rx.recv().await {
                    if frame == Outbound::Ping {
                        conn.mark_alive();
                    }
                }
            })
        };

        let prober = LivenessProber::new(registry.clone(), Duration::from_secs(30)).spawn();
        settle().await;

        // Three intervals elapse while the prober cannot run
        tokio::time::advance(Duration::from_secs(95)).await;
        settle().await;
        assert_eq!(registry.size(), 1);
        assert_eq!(conn.liveness(), Liveness::Alive);

        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(30)).await;
            settle().await;
        }
        assert_eq!(registry.size(), 1);
        assert!(!conn.is_terminated());

        prober.abort();
        responder.abort();
    }
}
