//! Safety-input monitoring for the Strider estop supervisor.
//!
//! The [`InputMonitor`] samples a [`SafetySource`] (a physical estop trigger,
//! e.g. a gamepad button) at a fixed rate, debounces the raw signal, and
//! emits edge-triggered [`SafetyEvent`]s into a single-consumer channel
//! feeding the switch arbiter.  It holds no control authority itself.
//!
//! Loss of the input source is treated as equivalent to an explicit stop
//! request: the monitor emits a synthetic `EstopAsserted` and keeps retrying
//! the source until it is readable again.
//!
//! [`SafetyEvent`]: strider_types::SafetyEvent

pub mod debounce;
pub mod gamepad;
pub mod monitor;
pub mod source;

pub use debounce::Debouncer;
pub use gamepad::GamepadSource;
pub use monitor::{InputMonitor, MonitorConfig, MonitorHandle};
pub use source::{SafetySource, ScriptedSource};

/// Errors raised by the input-monitoring subsystem.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("failed to initialize input source: {0}")]
    Init(String),

    #[error("input source unreadable: {0}")]
    Unreadable(String),
}
