//! In-process controller-manager double for CI/CD testing without a robot.
//!
//! [`SimTransport`] tracks the active/inactive state of every registered
//! controller, records the full call history, and can be scripted to fail or
//! stall individual calls.  It also watches for the one thing the real
//! control loop must never see: two commanding controllers active at once.
//!
//! # Example
//!
//! ```
//! use strider_transport::{SimTransport, SwitchTransport};
//! use strider_types::DesiredState;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let sim = SimTransport::new()
//!     .with_safe("safe_hold")
//!     .with_commanding("normal");
//!
//! sim.request("normal", DesiredState::Active).await.unwrap();
//! assert!(sim.is_active("normal"));
//! # });
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use strider_types::{ControllerKind, DesiredState, SupervisorError};
use tracing::debug;

use crate::SwitchTransport;

/// Scripted behaviour for one upcoming call.  Calls with no script entry
/// succeed immediately.
#[derive(Debug, Clone)]
enum Verdict {
    Succeed,
    Fail(String),
    /// Stall for the given duration before succeeding; long enough stalls
    /// trip the arbiter's activation timeout.
    Stall(Duration),
}

#[derive(Default)]
struct SimState {
    known: HashMap<String, ControllerKind>,
    active: HashSet<String>,
    history: Vec<(String, DesiredState)>,
    script: VecDeque<Verdict>,
    violations: Vec<String>,
}

/// Simulated switching transport.  Clones share state, so a test can keep
/// one handle while the arbiter owns another.
#[derive(Clone, Default)]
pub struct SimTransport {
    state: Arc<Mutex<SimState>>,
}

impl SimTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the safe/holding controller.
    pub fn with_safe(self, name: impl Into<String>) -> Self {
        self.register(name.into(), ControllerKind::Safe);
        self
    }

    /// Register a commanding controller.
    pub fn with_commanding(self, name: impl Into<String>) -> Self {
        self.register(name.into(), ControllerKind::Commanding);
        self
    }

    fn register(&self, name: String, kind: ControllerKind) {
        self.lock().known.insert(name, kind);
    }

    // ------------------------------------------------------------------
    // Scripting
    // ------------------------------------------------------------------

    /// Make the next unscripted call succeed (explicit spacer entry).
    pub fn script_ok(&self) {
        self.lock().script.push_back(Verdict::Succeed);
    }

    /// Make the next unscripted call fail with `detail`.
    pub fn script_failure(&self, detail: impl Into<String>) {
        self.lock().script.push_back(Verdict::Fail(detail.into()));
    }

    /// Make the next unscripted call stall for `delay` before succeeding.
    pub fn script_stall(&self, delay: Duration) {
        self.lock().script.push_back(Verdict::Stall(delay));
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Names of all currently active controllers, sorted.
    pub fn active(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().active.iter().cloned().collect();
        names.sort();
        names
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.lock().active.contains(name)
    }

    /// Every `(controller, desired_state)` pair that reached the manager, in
    /// call order.  Failed and stalled-then-dropped calls are included.
    pub fn history(&self) -> Vec<(String, DesiredState)> {
        self.lock().history.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().history.len()
    }

    /// Recorded attempts to activate a commanding controller while another
    /// commanding controller was still active.  Must stay empty.
    pub fn violations(&self) -> Vec<String> {
        self.lock().violations.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SwitchTransport for SimTransport {
    async fn request(
        &self,
        controller: &str,
        desired: DesiredState,
    ) -> Result<(), SupervisorError> {
        let verdict = {
            let mut state = self.lock();
            state.history.push((controller.to_string(), desired));

            if !state.known.contains_key(controller) {
                return Err(SupervisorError::Transport {
                    controller: controller.to_string(),
                    details: "controller not registered with the manager".into(),
                });
            }
            state.script.pop_front().unwrap_or(Verdict::Succeed)
        };

        match verdict {
            Verdict::Fail(details) => {
                return Err(SupervisorError::Transport {
                    controller: controller.to_string(),
                    details,
                });
            }
            Verdict::Stall(delay) => {
                debug!(controller, ?delay, "sim transport stalling");
                tokio::time::sleep(delay).await;
            }
            Verdict::Succeed => {}
        }

        let mut state = self.lock();
        match desired {
            DesiredState::Active => {
                if state.known.get(controller) == Some(&ControllerKind::Commanding) {
                    let concurrent = state
                        .active
                        .iter()
                        .find(|name| {
                            name.as_str() != controller
                                && state.known.get(name.as_str())
                                    == Some(&ControllerKind::Commanding)
                        })
                        .cloned();
                    if let Some(other) = concurrent {
                        state.violations.push(format!(
                            "activated '{controller}' while commanding controller '{other}' was active"
                        ));
                    }
                }
                state.active.insert(controller.to_string());
            }
            DesiredState::Inactive => {
                state.active.remove(controller);
            }
        }
        Ok(())
    }
}
