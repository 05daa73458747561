//! Core of the Strider estop supervisor: the controller registry, the
//! switch arbiter, and the status bus.
//!
//! The [`Arbiter`] owns the notion of "currently active controller".  It
//! consumes safety events and operator commands, issues ordered
//! deactivate/activate requests through a
//! [`SwitchTransport`][strider_transport::SwitchTransport], and publishes
//! every transition and outcome on the [`StatusBus`].  Two guarantees hold
//! at every externally observable point:
//!
//! 1. An asserted estop implies the safe controller is active.
//! 2. No two commanding controllers are ever concurrently active.

pub mod arbiter;
pub mod registry;
pub mod telemetry;

pub use arbiter::{
    Arbiter, ArbiterCommand, ArbiterConfig, ArbiterEvent, ArbiterHandle, ArbiterStatus,
    SupervisorState,
};
pub use registry::ControllerRegistry;
pub use telemetry::StatusBus;
