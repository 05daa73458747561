//! [`SafetySource`] – the consumed contract of the physical estop trigger.
//!
//! The monitor only needs "current boolean state, polled"; whether that state
//! comes from a gamepad button, a GPIO line, or a message-bus topic is an
//! integration detail behind this trait.

use std::collections::VecDeque;

use async_trait::async_trait;

use crate::MonitorError;

/// A pollable safety-trigger signal.  `true` means "stop asserted".
#[async_trait]
pub trait SafetySource: Send {
    /// Read the current raw trigger state.
    ///
    /// An `Err` means the source is unreadable (disconnected device, stale
    /// signal); the monitor treats that as an implicit stop request.
    async fn read(&mut self) -> Result<bool, MonitorError>;
}

/// In-process simulation source for CI and tests: replays a scripted
/// sequence of readings, then idles at a fixed level.
///
/// # Example
///
/// ```
/// use strider_input::{SafetySource, ScriptedSource};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let mut src = ScriptedSource::idle_at(false).reading(true).reading(true);
/// assert_eq!(src.read().await.unwrap(), true);
/// assert_eq!(src.read().await.unwrap(), true);
/// assert_eq!(src.read().await.unwrap(), false); // script exhausted
/// # });
/// ```
pub struct ScriptedSource {
    script: VecDeque<Result<bool, MonitorError>>,
    idle: bool,
}

impl ScriptedSource {
    /// Create a source whose exhausted script reads as `idle`.
    pub fn idle_at(idle: bool) -> Self {
        Self {
            script: VecDeque::new(),
            idle,
        }
    }

    /// Append one successful reading to the script.
    pub fn reading(mut self, raw: bool) -> Self {
        self.script.push_back(Ok(raw));
        self
    }

    /// Append `n` copies of the same reading.
    pub fn readings(mut self, raw: bool, n: usize) -> Self {
        for _ in 0..n {
            self.script.push_back(Ok(raw));
        }
        self
    }

    /// Append one read failure to the script.
    pub fn failure(mut self, details: impl Into<String>) -> Self {
        self.script
            .push_back(Err(MonitorError::Unreadable(details.into())));
        self
    }
}

#[async_trait]
impl SafetySource for ScriptedSource {
    async fn read(&mut self) -> Result<bool, MonitorError> {
        self.script.pop_front().unwrap_or(Ok(self.idle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_source_replays_then_idles() {
        let mut src = ScriptedSource::idle_at(false)
            .reading(true)
            .failure("cable pulled")
            .reading(false);

        assert!(src.read().await.unwrap());
        assert!(matches!(
            src.read().await,
            Err(MonitorError::Unreadable(_))
        ));
        assert!(!src.read().await.unwrap());
        // Exhausted: idle level.
        assert!(!src.read().await.unwrap());
        assert!(!src.read().await.unwrap());
    }
}
