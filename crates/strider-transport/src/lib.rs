//! Switching-transport boundary of the Strider estop supervisor.
//!
//! The arbiter never talks to the real-time control framework directly.  It
//! issues activate/deactivate requests through the [`SwitchTransport`] trait;
//! implementations translate those into the protocol of the outside world:
//!
//! * [`RosbridgeTransport`] – calls a controller-manager-style service over a
//!   rosbridge-compatible WebSocket.
//! * [`SimTransport`] – in-process controller manager double for CI, tests,
//!   and dry runs.

pub mod rosbridge;
pub mod sim;

pub use rosbridge::RosbridgeTransport;
pub use sim::SimTransport;

use async_trait::async_trait;
use strider_types::{DesiredState, SupervisorError};

/// Request/response boundary to the external control-manager service.
///
/// # Contract
///
/// One call changes one controller's desired state.  `Ok(())` means the
/// manager confirmed the change; any `Err` means the switch did not complete
/// and the arbiter must presume the controller's state indeterminate.  The
/// arbiter bounds each call with the target descriptor's
/// `activation_timeout`; implementations do not need their own deadline.
#[async_trait]
pub trait SwitchTransport: Send + Sync {
    /// Request that `controller` be brought to `desired`.
    async fn request(&self, controller: &str, desired: DesiredState)
    -> Result<(), SupervisorError>;
}
