//! [`InputMonitor`] – sampling loop between the raw safety trigger and the
//! arbiter's event channel.
//!
//! The monitor produces a lazy, infinite, non-restartable sequence of
//! debounced [`SafetyEvent`]s.  It samples the [`SafetySource`] at a fixed
//! rate, runs every reading through the [`Debouncer`], and forwards emitted
//! edges into a single-consumer mpsc channel.
//!
//! An unreadable source is fail-safe: the monitor immediately emits a
//! synthetic `EstopAsserted`, then keeps retrying the source with a
//! reconnect backoff until readings resume.

use std::time::{Duration, Instant};

use strider_types::SafetyEvent;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::debounce::Debouncer;
use crate::source::SafetySource;

/// Timing knobs for the monitor.  All values come from the configuration
/// surface; the defaults are placeholders to confirm against the real
/// safety requirements before deployment.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Raw signal sampling period.
    pub sample_interval: Duration,
    /// Stability window of the [`Debouncer`].
    pub debounce_window: Duration,
    /// Delay between read attempts while the source is unreadable.
    pub reconnect_backoff: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_millis(10),
            debounce_window: Duration::from_millis(30),
            reconnect_backoff: Duration::from_millis(500),
        }
    }
}

/// Handle to a spawned monitor task.
pub struct MonitorHandle {
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Stop the monitor task.  Only used on shutdown paths; the monitor has
    /// no terminal state of its own.
    pub fn abort(&self) {
        self.task.abort();
    }
}

/// The sampling loop.  Construct via [`InputMonitor::spawn`].
pub struct InputMonitor<S: SafetySource> {
    source: S,
    config: MonitorConfig,
    events: mpsc::Sender<SafetyEvent>,
    debouncer: Debouncer,
    healthy: bool,
}

impl<S: SafetySource + 'static> InputMonitor<S> {
    /// Spawn the monitor as a tokio task feeding `events`.
    pub fn spawn(
        source: S,
        config: MonitorConfig,
        events: mpsc::Sender<SafetyEvent>,
    ) -> MonitorHandle {
        info!(?config, "spawning safety input monitor");
        let monitor = Self {
            debouncer: Debouncer::new(config.debounce_window),
            source,
            config,
            events,
            healthy: true,
        };
        MonitorHandle {
            task: tokio::spawn(monitor.run()),
        }
    }

    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.config.sample_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            match self.source.read().await {
                Ok(raw) => {
                    if !self.healthy {
                        self.healthy = true;
                        info!("safety input source recovered");
                    }
                    if let Some(event) = self.debouncer.sample(raw, Instant::now()) {
                        match event {
                            SafetyEvent::EstopAsserted => warn!("estop asserted"),
                            SafetyEvent::EstopCleared => info!("estop cleared"),
                        }
                        if self.events.send(event).await.is_err() {
                            debug!("safety event consumer dropped; stopping monitor");
                            return;
                        }
                    }
                }
                Err(e) => {
                    if self.healthy {
                        self.healthy = false;
                        error!(error = %e, "safety input unreadable; asserting estop");
                        if self.debouncer.force_asserted()
                            && self
                                .events
                                .send(SafetyEvent::EstopAsserted)
                                .await
                                .is_err()
                        {
                            debug!("safety event consumer dropped; stopping monitor");
                            return;
                        }
                    }
                    tokio::time::sleep(self.config.reconnect_backoff).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ScriptedSource;

    fn test_config() -> MonitorConfig {
        MonitorConfig {
            sample_interval: Duration::from_millis(10),
            debounce_window: Duration::from_millis(30),
            reconnect_backoff: Duration::from_millis(100),
        }
    }

    async fn recv_event(rx: &mut mpsc::Receiver<SafetyEvent>) -> SafetyEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for safety event")
            .expect("monitor dropped channel")
    }

    #[tokio::test(start_paused = true)]
    async fn stable_press_and_release_produce_one_edge_each() {
        let source = ScriptedSource::idle_at(false).readings(true, 10);
        let (tx, mut rx) = mpsc::channel(16);
        let _handle = InputMonitor::spawn(source, test_config(), tx);

        assert_eq!(recv_event(&mut rx).await, SafetyEvent::EstopAsserted);
        // Script exhausts back to released; exactly one cleared edge follows.
        assert_eq!(recv_event(&mut rx).await, SafetyEvent::EstopCleared);
    }

    #[tokio::test(start_paused = true)]
    async fn bounce_produces_no_event() {
        // Alternating levels never hold for a full debounce window.
        let source = ScriptedSource::idle_at(false)
            .reading(true)
            .reading(false)
            .reading(true)
            .reading(false);
        let (tx, mut rx) = mpsc::channel(16);
        let _handle = InputMonitor::spawn(source, test_config(), tx);

        let got = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await;
        assert!(got.is_err(), "bounce must not produce an event, got {got:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_source_asserts_estop_immediately() {
        let source = ScriptedSource::idle_at(false)
            .failure("device unplugged")
            .failure("device unplugged");
        let (tx, mut rx) = mpsc::channel(16);
        let _handle = InputMonitor::spawn(source, test_config(), tx);

        // Synthetic assertion bypasses the debounce window.
        assert_eq!(recv_event(&mut rx).await, SafetyEvent::EstopAsserted);
        // Source recovers reading `false`; the debounced clear follows.
        assert_eq!(recv_event(&mut rx).await, SafetyEvent::EstopCleared);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_failures_assert_only_once() {
        let source = ScriptedSource::idle_at(true)
            .failure("flaky")
            .failure("flaky")
            .failure("flaky");
        let (tx, mut rx) = mpsc::channel(16);
        let _handle = InputMonitor::spawn(source, test_config(), tx);

        assert_eq!(recv_event(&mut rx).await, SafetyEvent::EstopAsserted);
        // Recovery reads `true` (still pressed): no second assertion.
        let got = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await;
        assert!(got.is_err(), "expected no duplicate assertion, got {got:?}");
    }
}
