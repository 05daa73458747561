use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Role of a controller in the locomotion stack: exactly one `Safe`
/// controller exists per registry, everything else is `Commanding`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerKind {
    /// Holding/damping controller the robot falls back to. Never commands
    /// motion on its own.
    Safe,
    /// A learned-policy controller that actively commands the actuators
    /// (e.g. normal, three-legged, parkour locomotion).
    Commanding,
}

/// Static description of one controller known to the registry.
/// Immutable after registry construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerDescriptor {
    /// Unique controller name, as known to the control manager.
    pub name: String,
    pub kind: ControllerKind,
    /// Bounded wait for a single activate/deactivate call on this
    /// controller before the outcome is treated as timed out.
    pub activation_timeout: Duration,
}

impl ControllerDescriptor {
    pub fn new(name: impl Into<String>, kind: ControllerKind, activation_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            kind,
            activation_timeout,
        }
    }
}

/// Why a switch was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchReason {
    /// Operator or fault-triggered emergency stop. Always wins ties.
    Estop,
    /// Explicit operator mode selection.
    OperatorSelect,
    /// Initial forced switch to the safe controller at process start.
    Startup,
    /// Fail-safe switch issued after a failed or timed-out transition.
    Recovery,
}

impl std::fmt::Display for SwitchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwitchReason::Estop => write!(f, "estop"),
            SwitchReason::OperatorSelect => write!(f, "operator_select"),
            SwitchReason::Startup => write!(f, "startup"),
            SwitchReason::Recovery => write!(f, "recovery"),
        }
    }
}

/// One arbitration cycle's switch request. Ephemeral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchRequest {
    pub id: Uuid,
    /// Target controller name.
    pub target: String,
    pub reason: SwitchReason,
    pub issued_at: DateTime<Utc>,
}

impl SwitchRequest {
    pub fn new(target: impl Into<String>, reason: SwitchReason) -> Self {
        Self {
            id: Uuid::new_v4(),
            target: target.into(),
            reason,
            issued_at: Utc::now(),
        }
    }
}

/// Terminal result of a switch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchResult {
    Ok,
    Failed,
    TimedOut,
}

/// Recorded outcome of a [`SwitchRequest`]. Consumed by the arbiter and
/// forwarded to the status bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchOutcome {
    pub request: SwitchRequest,
    pub result: SwitchResult,
    /// Transport-level detail for `Failed`/`TimedOut` outcomes.
    pub detail: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl SwitchOutcome {
    pub fn new(request: SwitchRequest, result: SwitchResult, detail: Option<String>) -> Self {
        Self {
            request,
            result,
            detail,
            completed_at: Utc::now(),
        }
    }
}

/// Debounced, edge-triggered safety-input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyEvent {
    EstopAsserted,
    EstopCleared,
}

/// Desired controller state carried by a switching-transport request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
    Active,
    Inactive,
}

/// Envelope for every record published on the status bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. "strider-supervisor::arbiter"
    pub source: String,
    pub payload: StatusPayload,
}

impl StatusEvent {
    pub fn new(source: impl Into<String>, payload: StatusPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data routed over the status bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StatusPayload {
    /// An arbiter state transition, recorded after the outcome that caused it.
    Transition {
        from: String,
        to: String,
        reason: SwitchReason,
        estop_asserted: bool,
    },
    /// A recorded switch outcome (one per attempt).
    Outcome(SwitchOutcome),
    /// Recovery exhausted: control authority is latched in the safe
    /// controller until an operator-acknowledged reset.
    FatalAlert { details: String },
    /// Operator acknowledged the fault; mode selection is available again.
    FaultCleared,
}

/// Global error type spanning registry validation, transport failures, and
/// arbitration rejections.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SupervisorError {
    #[error("unknown controller '{0}'")]
    UnknownController(String),

    #[error("invalid switch target '{target}': {details}")]
    InvalidTarget { target: String, details: String },

    #[error("supervisor faulted: {0}")]
    Faulted(String),

    #[error("transport error for controller '{controller}': {details}")]
    Transport { controller: String, details: String },

    #[error("channel error: {0}")]
    Channel(String),

    #[error("configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_serialization_roundtrip() {
        let desc = ControllerDescriptor::new(
            "parkour",
            ControllerKind::Commanding,
            Duration::from_millis(500),
        );
        let json = serde_json::to_string(&desc).unwrap();
        let back: ControllerDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(desc, back);
    }

    #[test]
    fn switch_request_roundtrip() {
        let req = SwitchRequest::new("normal", SwitchReason::OperatorSelect);
        let json = serde_json::to_string(&req).unwrap();
        let back: SwitchRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(req.id, back.id);
        assert_eq!(back.target, "normal");
        assert_eq!(back.reason, SwitchReason::OperatorSelect);
    }

    #[test]
    fn switch_outcome_roundtrip() {
        let req = SwitchRequest::new("safe_hold", SwitchReason::Estop);
        let outcome = SwitchOutcome::new(req, SwitchResult::TimedOut, Some("no reply".into()));
        let json = serde_json::to_string(&outcome).unwrap();
        let back: SwitchOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(back.result, SwitchResult::TimedOut);
        assert_eq!(back.detail.as_deref(), Some("no reply"));
    }

    #[test]
    fn status_event_roundtrip() {
        let event = StatusEvent::new(
            "strider-supervisor::arbiter",
            StatusPayload::Transition {
                from: "safe_hold".into(),
                to: "normal".into(),
                reason: SwitchReason::OperatorSelect,
                estop_asserted: false,
            },
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: StatusEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, back.id);
        assert_eq!(event.payload, back.payload);
    }

    #[test]
    fn safety_event_wire_names() {
        assert_eq!(
            serde_json::to_string(&SafetyEvent::EstopAsserted).unwrap(),
            "\"estop_asserted\""
        );
        assert_eq!(
            serde_json::to_string(&SafetyEvent::EstopCleared).unwrap(),
            "\"estop_cleared\""
        );
    }

    #[test]
    fn supervisor_error_display() {
        let err = SupervisorError::UnknownController("walk_backwards".into());
        assert!(err.to_string().contains("walk_backwards"));

        let err2 = SupervisorError::Transport {
            controller: "normal".into(),
            details: "connection reset".into(),
        };
        assert!(err2.to_string().contains("normal"));
        assert!(err2.to_string().contains("connection reset"));
    }
}
