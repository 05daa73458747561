//! [`Arbiter`] – single-owner state machine governing which controller is
//! allowed to command the robot's actuators.
//!
//! The arbiter drains one single-consumer event channel (safety edges from
//! the input monitor, discrete operator commands) and never processes two
//! events concurrently, which makes every transition an atomic step.  A
//! switching-transport call may suspend event processing for up to the
//! target's activation timeout; while suspended, queued events accumulate
//! and are drained in arrival order once the call resolves — except
//! `EstopAsserted`, which is observed mid-call and preempts any in-flight
//! switch that is not already bound for the safe controller.
//!
//! # Fail-safe switching
//!
//! To switch from A to B the arbiter deactivates A, awaits the outcome, and
//! only then activates B; two commanding controllers are never concurrently
//! active.  A failed or timed-out leg leaves the robot's command state
//! indeterminate, so the arbiter does not assume A still runs — it forces a
//! recovery switch to the safe controller, retried with bounded attempts and
//! increasing backoff.  Exhausting recovery latches a fault: the arbiter
//! stays in best-effort safe state and refuses mode selection until an
//! operator-acknowledged reset.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use strider_transport::SwitchTransport;
use strider_types::{
    ControllerKind, DesiredState, SafetyEvent, StatusEvent, StatusPayload, SupervisorError,
    SwitchOutcome, SwitchReason, SwitchRequest, SwitchResult,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::registry::ControllerRegistry;
use crate::telemetry::StatusBus;

const SOURCE: &str = "strider-supervisor::arbiter";

// ─────────────────────────────────────────────────────────────────────────────
// Public types
// ─────────────────────────────────────────────────────────────────────────────

/// Discrete operator commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArbiterCommand {
    /// Request activation of the named controller.
    Select { target: String },
    /// Operator-acknowledged reset of a latched recovery fault.
    ClearFault,
}

/// Everything the arbiter consumes, multiplexed onto one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArbiterEvent {
    Safety(SafetyEvent),
    Command(ArbiterCommand),
}

/// The arbiter's state machine states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorState {
    /// The safe/holding controller is active.
    SafeActive,
    /// The named commanding controller is active.
    CommandingActive(String),
    /// A deactivate/activate pair is in flight.
    Switching {
        from: String,
        to: String,
        reason: SwitchReason,
    },
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorState::SafeActive => write!(f, "safe_active"),
            SupervisorState::CommandingActive(name) => write!(f, "commanding_active({name})"),
            SupervisorState::Switching { from, to, reason } => {
                write!(f, "switching({from} -> {to}, {reason})")
            }
        }
    }
}

/// Snapshot published through the watch channel after every state or flag
/// change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArbiterStatus {
    pub state: SupervisorState,
    /// Last controller confirmed (or presumed, after recovery) active.
    pub active_controller: String,
    pub estop_asserted: bool,
    pub faulted: bool,
}

/// Arbitration tunables.  Defaults are placeholders to confirm against the
/// real safety requirements before deployment.
#[derive(Debug, Clone)]
pub struct ArbiterConfig {
    /// Bounded attempts for a recovery switch to the safe controller.
    pub recovery_attempts: u32,
    /// First retry backoff; doubled on each further attempt.
    pub recovery_backoff_base: Duration,
    /// Capacity of the arbiter's event channel.
    pub event_queue_depth: usize,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            recovery_attempts: 3,
            recovery_backoff_base: Duration::from_millis(250),
            event_queue_depth: 64,
        }
    }
}

/// Cloneable handle for feeding the arbiter and observing its state.
#[derive(Clone)]
pub struct ArbiterHandle {
    events: mpsc::Sender<ArbiterEvent>,
    status: watch::Receiver<ArbiterStatus>,
}

impl ArbiterHandle {
    /// Request activation of `target`.  The decision and outcome are
    /// reported through the status bus and watch channel.
    pub async fn select(&self, target: impl Into<String>) -> Result<(), SupervisorError> {
        self.send(ArbiterEvent::Command(ArbiterCommand::Select {
            target: target.into(),
        }))
        .await
    }

    /// Acknowledge and clear a latched recovery fault.
    pub async fn clear_fault(&self) -> Result<(), SupervisorError> {
        self.send(ArbiterEvent::Command(ArbiterCommand::ClearFault)).await
    }

    /// Inject a safety event (used by the input-monitor forwarder and the
    /// Ctrl-C hook).
    pub async fn send_safety(&self, event: SafetyEvent) -> Result<(), SupervisorError> {
        self.send(ArbiterEvent::Safety(event)).await
    }

    async fn send(&self, event: ArbiterEvent) -> Result<(), SupervisorError> {
        self.events
            .send(event)
            .await
            .map_err(|e| SupervisorError::Channel(format!("arbiter event channel: {e}")))
    }

    /// A raw sender onto the arbiter's event channel.
    pub fn event_sender(&self) -> mpsc::Sender<ArbiterEvent> {
        self.events.clone()
    }

    /// Current status snapshot.
    pub fn status(&self) -> ArbiterStatus {
        self.status.borrow().clone()
    }

    /// Watch receiver yielding a change notification per transition.
    pub fn subscribe_status(&self) -> watch::Receiver<ArbiterStatus> {
        self.status.clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal switch plumbing
// ─────────────────────────────────────────────────────────────────────────────

/// Result of one bounded transport call, observed through the event pump.
enum CallOutcome {
    Ok,
    Err(SwitchResult, String),
    /// An estop arrived mid-call and the call was abandoned.
    Preempted,
}

/// Where a deactivate/activate pair stopped.
enum SwitchHalt {
    Preempted { leg: String },
    Failed {
        leg: String,
        result: SwitchResult,
        details: String,
    },
}

impl SwitchHalt {
    fn into_parts(self) -> (String, SwitchResult, String) {
        match self {
            SwitchHalt::Preempted { leg } => {
                (leg, SwitchResult::Failed, "superseded by estop".into())
            }
            SwitchHalt::Failed {
                leg,
                result,
                details,
            } => (leg, result, details),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Arbiter
// ─────────────────────────────────────────────────────────────────────────────

/// The state machine.  Construct with [`Arbiter::new`] and drive it with
/// [`Arbiter::run`], or use [`Arbiter::spawn`] to run it as a tokio task.
pub struct Arbiter<T: SwitchTransport> {
    registry: ControllerRegistry,
    transport: T,
    status_bus: StatusBus,
    config: ArbiterConfig,
    events: mpsc::Receiver<ArbiterEvent>,
    events_closed: bool,
    /// Events that arrived while a switch was in flight, drained in arrival
    /// order afterwards.
    deferred: VecDeque<ArbiterEvent>,
    status_tx: watch::Sender<ArbiterStatus>,
    state: SupervisorState,
    active: String,
    estop_asserted: bool,
    faulted: bool,
}

impl<T: SwitchTransport + 'static> Arbiter<T> {
    /// Build an arbiter and its handle.  The robot is presumed to need a
    /// forced switch into the safe controller; [`Arbiter::run`] performs it
    /// before serving events.
    pub fn new(
        registry: ControllerRegistry,
        transport: T,
        status_bus: StatusBus,
        config: ArbiterConfig,
    ) -> (Self, ArbiterHandle) {
        let (events_tx, events_rx) = mpsc::channel(config.event_queue_depth);
        let safe = registry.safe().name.clone();
        let initial = ArbiterStatus {
            state: SupervisorState::SafeActive,
            active_controller: safe.clone(),
            estop_asserted: false,
            faulted: false,
        };
        let (status_tx, status_rx) = watch::channel(initial);

        let arbiter = Self {
            registry,
            transport,
            status_bus,
            config,
            events: events_rx,
            events_closed: false,
            deferred: VecDeque::new(),
            status_tx,
            state: SupervisorState::SafeActive,
            active: safe,
            estop_asserted: false,
            faulted: false,
        };
        let handle = ArbiterHandle {
            events: events_tx,
            status: status_rx,
        };
        (arbiter, handle)
    }

    /// Convenience: build and run on a fresh tokio task.
    pub fn spawn(
        registry: ControllerRegistry,
        transport: T,
        status_bus: StatusBus,
        config: ArbiterConfig,
    ) -> ArbiterHandle {
        let (arbiter, handle) = Self::new(registry, transport, status_bus, config);
        tokio::spawn(arbiter.run());
        handle
    }

    /// Event loop.  Runs for the process lifetime; returns only when every
    /// handle has been dropped.
    pub async fn run(mut self) {
        self.startup().await;

        loop {
            let event = match self.deferred.pop_front() {
                Some(event) => event,
                None => match self.events.recv().await {
                    Some(event) => event,
                    None => {
                        info!("all arbiter handles dropped; event loop ending");
                        return;
                    }
                },
            };
            self.handle_event(event).await;
        }
    }

    /// Restart always lands in the safe controller, regardless of prior
    /// shutdown state.
    async fn startup(&mut self) {
        info!(safe = %self.registry.safe().name, "startup: forcing safe controller");
        self.settle_safe(SwitchReason::Startup, None).await;
    }

    async fn handle_event(&mut self, event: ArbiterEvent) {
        match event {
            ArbiterEvent::Safety(SafetyEvent::EstopAsserted) => self.handle_estop_asserted().await,
            ArbiterEvent::Safety(SafetyEvent::EstopCleared) => self.handle_estop_cleared(),
            ArbiterEvent::Command(ArbiterCommand::Select { target }) => {
                self.handle_select(target).await;
            }
            ArbiterEvent::Command(ArbiterCommand::ClearFault) => self.handle_clear_fault(),
        }
    }

    // ------------------------------------------------------------------
    // Event handlers
    // ------------------------------------------------------------------

    async fn handle_estop_asserted(&mut self) {
        if self.estop_asserted {
            debug!("estop already asserted");
            return;
        }
        self.estop_asserted = true;
        warn!("estop asserted");

        if self.active == self.registry.safe().name {
            // Already holding: latch the flag without transport traffic.
            self.publish_watch();
            return;
        }
        let presumed = self.active.clone();
        self.settle_safe(SwitchReason::Estop, Some(presumed)).await;
    }

    fn handle_estop_cleared(&mut self) {
        if !self.estop_asserted {
            debug!("estop already cleared");
            return;
        }
        self.estop_asserted = false;
        // Clearing never auto-resumes a commanding controller; the operator
        // must explicitly re-select one.
        info!("estop cleared; safe controller stays active until a mode is selected");
        self.publish_watch();
    }

    async fn handle_select(&mut self, target: String) {
        let request = SwitchRequest::new(target.as_str(), SwitchReason::OperatorSelect);

        if self.faulted {
            return self.reject_select(request, "supervisor faulted; operator reset required");
        }
        if self.estop_asserted {
            return self.reject_select(request, "estop asserted");
        }
        let kind = match self.registry.get(&target) {
            Ok(desc) => desc.kind,
            Err(e) => return self.reject_select(request, &e.to_string()),
        };
        if target == self.active {
            return self.reject_select(request, "controller already active");
        }

        let from = self.active.clone();
        self.set_state(
            SupervisorState::Switching {
                from: from.clone(),
                to: target.clone(),
                reason: SwitchReason::OperatorSelect,
            },
            SwitchReason::OperatorSelect,
        );

        match self.execute_switch(&target, Some(from.as_str()), true).await {
            Ok(()) => {
                self.record_outcome(request, SwitchResult::Ok, None);
                self.active = target.clone();
                let settled = match kind {
                    ControllerKind::Safe => SupervisorState::SafeActive,
                    ControllerKind::Commanding => SupervisorState::CommandingActive(target),
                };
                self.set_state(settled, SwitchReason::OperatorSelect);
            }
            Err(SwitchHalt::Preempted { leg }) => {
                info!(target = %request.target, "in-flight switch superseded by estop");
                self.record_outcome(
                    request,
                    SwitchResult::Failed,
                    Some("superseded by estop".into()),
                );
                self.settle_safe(SwitchReason::Estop, Some(leg)).await;
            }
            Err(SwitchHalt::Failed {
                leg,
                result,
                details,
            }) => {
                warn!(
                    target = %request.target,
                    leg = %leg,
                    ?result,
                    %details,
                    "switch failed; forcing safe controller"
                );
                self.record_outcome(request, result, Some(details));
                self.settle_safe(SwitchReason::Recovery, Some(leg)).await;
            }
        }
    }

    fn handle_clear_fault(&mut self) {
        if !self.faulted {
            debug!("no fault to clear");
            return;
        }
        self.faulted = false;
        info!("recovery fault cleared by operator reset");
        self.status_bus
            .publish(StatusEvent::new(SOURCE, StatusPayload::FaultCleared));
        self.publish_watch();
    }

    // ------------------------------------------------------------------
    // Switching
    // ------------------------------------------------------------------

    /// Drive the robot into the safe controller, retrying with bounded
    /// attempts and increasing backoff.  `presumed_active` names the
    /// controller whose deactivation must precede the safe activation; a
    /// partially activated switch target counts, because it may already be
    /// commanding.
    async fn settle_safe(&mut self, reason: SwitchReason, presumed_active: Option<String>) {
        let safe = self.registry.safe().name.clone();
        let attempts = self.config.recovery_attempts.max(1);

        for attempt in 1..=attempts {
            let attempt_reason = if attempt == 1 {
                reason
            } else {
                SwitchReason::Recovery
            };
            let from = presumed_active.clone().unwrap_or_else(|| safe.clone());
            self.set_state(
                SupervisorState::Switching {
                    from,
                    to: safe.clone(),
                    reason: attempt_reason,
                },
                attempt_reason,
            );

            let request = SwitchRequest::new(safe.as_str(), attempt_reason);
            match self
                .execute_switch(&safe, presumed_active.as_deref(), false)
                .await
            {
                Ok(()) => {
                    self.record_outcome(request, SwitchResult::Ok, None);
                    self.active = safe.clone();
                    self.set_state(SupervisorState::SafeActive, attempt_reason);
                    return;
                }
                Err(halt) => {
                    let (leg, result, details) = halt.into_parts();
                    warn!(attempt, leg = %leg, ?result, %details, "safe switch attempt failed");
                    self.record_outcome(request, result, Some(details));

                    if attempt < attempts {
                        let backoff = self.config.recovery_backoff_base * 2u32.pow(attempt - 1);
                        debug!(?backoff, "backing off before next safe switch attempt");
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        // Recovery exhausted: never retry indefinitely while silently leaving
        // the robot uncommanded.  Latch the fault and hold best-effort safe
        // state until an operator-acknowledged reset.
        self.faulted = true;
        self.active = safe.clone();
        error!(
            attempts,
            "recovery exhausted; mode selection refused until operator reset"
        );
        self.status_bus.publish(StatusEvent::new(
            SOURCE,
            StatusPayload::FatalAlert {
                details: format!("switch to '{safe}' failed after {attempts} attempts"),
            },
        ));
        self.set_state(SupervisorState::SafeActive, SwitchReason::Recovery);
    }

    /// One deactivate-then-activate pair.  The target is activated only
    /// after the previous controller's deactivation is confirmed.
    async fn execute_switch(
        &mut self,
        target: &str,
        deactivate: Option<&str>,
        preemptible: bool,
    ) -> Result<(), SwitchHalt> {
        if let Some(from) = deactivate {
            if from != target {
                match self
                    .transport_call(from, DesiredState::Inactive, preemptible)
                    .await
                {
                    CallOutcome::Ok => {}
                    CallOutcome::Preempted => {
                        return Err(SwitchHalt::Preempted {
                            leg: from.to_string(),
                        });
                    }
                    CallOutcome::Err(result, details) => {
                        // The previous controller may still be commanding; do
                        // not bring up the target on top of it.
                        return Err(SwitchHalt::Failed {
                            leg: from.to_string(),
                            result,
                            details,
                        });
                    }
                }
            }
        }

        match self
            .transport_call(target, DesiredState::Active, preemptible)
            .await
        {
            CallOutcome::Ok => Ok(()),
            CallOutcome::Preempted => Err(SwitchHalt::Preempted {
                leg: target.to_string(),
            }),
            CallOutcome::Err(result, details) => Err(SwitchHalt::Failed {
                leg: target.to_string(),
                result,
                details,
            }),
        }
    }

    /// One bounded transport call.  While the call is pending, the event
    /// channel is pumped: `EstopAsserted` is observed immediately (and
    /// preempts the call unless it is already safe-bound); everything else
    /// is deferred in arrival order.
    async fn transport_call(
        &mut self,
        name: &str,
        desired: DesiredState,
        preemptible: bool,
    ) -> CallOutcome {
        let timeout = match self.registry.get(name) {
            Ok(desc) => desc.activation_timeout,
            Err(e) => return CallOutcome::Err(SwitchResult::Failed, e.to_string()),
        };

        let Self {
            transport,
            events,
            events_closed,
            deferred,
            estop_asserted,
            status_tx,
            state,
            active,
            faulted,
            ..
        } = self;

        let call = tokio::time::timeout(timeout, transport.request(name, desired));
        tokio::pin!(call);

        loop {
            tokio::select! {
                result = &mut call => {
                    return match result {
                        Ok(Ok(())) => CallOutcome::Ok,
                        Ok(Err(e)) => CallOutcome::Err(SwitchResult::Failed, e.to_string()),
                        Err(_) => CallOutcome::Err(
                            SwitchResult::TimedOut,
                            format!("no transport response within {timeout:?}"),
                        ),
                    };
                }
                event = events.recv(), if !*events_closed => {
                    match event {
                        Some(ArbiterEvent::Safety(SafetyEvent::EstopAsserted)) => {
                            // Safety edges alternate, so any deferred safety
                            // event predates this assertion and is stale.
                            deferred.retain(|ev| !matches!(ev, ArbiterEvent::Safety(_)));
                            if !*estop_asserted {
                                warn!("estop asserted during in-flight switch");
                            }
                            *estop_asserted = true;
                            if preemptible {
                                return CallOutcome::Preempted;
                            }
                            // The call is already driving toward the safe
                            // controller; latch the flag and let it finish.
                            status_tx.send_replace(ArbiterStatus {
                                state: state.clone(),
                                active_controller: active.clone(),
                                estop_asserted: true,
                                faulted: *faulted,
                            });
                        }
                        Some(other) => deferred.push_back(other),
                        None => *events_closed = true,
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Recording
    // ------------------------------------------------------------------

    fn reject_select(&mut self, request: SwitchRequest, details: &str) {
        warn!(target = %request.target, details, "mode selection rejected");
        self.record_outcome(request, SwitchResult::Failed, Some(details.to_string()));
    }

    /// Outcomes are recorded before the state transition that depends on
    /// them, so the bus always reflects the cause of a transition.
    fn record_outcome(&self, request: SwitchRequest, result: SwitchResult, detail: Option<String>) {
        self.status_bus.publish(StatusEvent::new(
            SOURCE,
            StatusPayload::Outcome(SwitchOutcome::new(request, result, detail)),
        ));
    }

    fn set_state(&mut self, next: SupervisorState, reason: SwitchReason) {
        if next == self.state {
            self.publish_watch();
            return;
        }
        let from = self.state.to_string();
        let to = next.to_string();
        info!(%from, %to, %reason, estop = self.estop_asserted, "state transition");
        self.status_bus.publish(StatusEvent::new(
            SOURCE,
            StatusPayload::Transition {
                from,
                to,
                reason,
                estop_asserted: self.estop_asserted,
            },
        ));
        self.state = next;
        self.publish_watch();
    }

    fn publish_watch(&self) {
        self.status_tx.send_replace(ArbiterStatus {
            state: self.state.clone(),
            active_controller: self.active.clone(),
            estop_asserted: self.estop_asserted,
            faulted: self.faulted,
        });
    }
}
