//! [`Debouncer`] – stability-window filtering of the raw safety signal.
//!
//! Physical estop triggers bounce: a single press can produce several raw
//! transitions within a few milliseconds.  The debouncer commits a level
//! change only after the raw signal has held the new level for the full
//! configured window, and reports each commit as one edge-triggered
//! [`SafetyEvent`].

use std::time::{Duration, Instant};

use strider_types::SafetyEvent;

/// Edge-triggered debouncer over a boolean "stop asserted" signal.
///
/// Pure and synchronous; the caller supplies the sample clock, which keeps
/// the timing behaviour testable without sleeping.
///
/// # Example
///
/// ```
/// use std::time::{Duration, Instant};
/// use strider_input::Debouncer;
/// use strider_types::SafetyEvent;
///
/// let mut d = Debouncer::new(Duration::from_millis(30));
/// let t0 = Instant::now();
/// assert_eq!(d.sample(true, t0), None); // not stable yet
/// assert_eq!(
///     d.sample(true, t0 + Duration::from_millis(30)),
///     Some(SafetyEvent::EstopAsserted)
/// );
/// ```
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    /// Last level reported to the consumer.
    committed: bool,
    /// Level currently being observed for stability.
    candidate: bool,
    candidate_since: Option<Instant>,
}

impl Debouncer {
    /// Create a debouncer with the given stability window.  The initial
    /// committed level is "not asserted".
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            committed: false,
            candidate: false,
            candidate_since: None,
        }
    }

    /// Feed one raw sample taken at `now`.
    ///
    /// Returns a [`SafetyEvent`] when the raw level has remained stable for
    /// the full window and differs from the committed level, `None`
    /// otherwise.
    pub fn sample(&mut self, raw: bool, now: Instant) -> Option<SafetyEvent> {
        if raw != self.candidate {
            self.candidate = raw;
            self.candidate_since = Some(now);
        }

        if self.candidate != self.committed {
            let since = *self.candidate_since.get_or_insert(now);
            if now.duration_since(since) >= self.window {
                self.committed = self.candidate;
                return Some(if self.committed {
                    SafetyEvent::EstopAsserted
                } else {
                    SafetyEvent::EstopCleared
                });
            }
        }
        None
    }

    /// Force the committed level to "asserted", bypassing the stability
    /// window.  Used for the synthetic estop raised when the input source
    /// becomes unreadable.
    ///
    /// Returns `true` when this changed the committed level (i.e. an
    /// `EstopAsserted` event should be emitted).
    pub fn force_asserted(&mut self) -> bool {
        let changed = !self.committed;
        self.committed = true;
        self.candidate = true;
        self.candidate_since = None;
        changed
    }

    /// Current committed level.
    pub fn is_asserted(&self) -> bool {
        self.committed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(30);

    fn at(t0: Instant, ms: u64) -> Instant {
        t0 + Duration::from_millis(ms)
    }

    #[test]
    fn stable_press_is_reported_once() {
        let mut d = Debouncer::new(WINDOW);
        let t0 = Instant::now();

        assert_eq!(d.sample(true, t0), None);
        assert_eq!(d.sample(true, at(t0, 10)), None);
        assert_eq!(d.sample(true, at(t0, 30)), Some(SafetyEvent::EstopAsserted));
        // Continued pressure produces no further events.
        assert_eq!(d.sample(true, at(t0, 40)), None);
        assert_eq!(d.sample(true, at(t0, 1000)), None);
    }

    #[test]
    fn bounce_within_window_is_rejected() {
        let mut d = Debouncer::new(WINDOW);
        let t0 = Instant::now();

        // Contact bounce: rapid flapping, never stable for a full window.
        assert_eq!(d.sample(true, t0), None);
        assert_eq!(d.sample(false, at(t0, 5)), None);
        assert_eq!(d.sample(true, at(t0, 10)), None);
        assert_eq!(d.sample(false, at(t0, 15)), None);
        assert!(!d.is_asserted());

        // The signal then settles high; the window restarts from the last edge.
        assert_eq!(d.sample(true, at(t0, 20)), None);
        assert_eq!(d.sample(true, at(t0, 40)), None);
        assert_eq!(d.sample(true, at(t0, 50)), Some(SafetyEvent::EstopAsserted));
    }

    #[test]
    fn release_is_debounced_like_press() {
        let mut d = Debouncer::new(WINDOW);
        let t0 = Instant::now();
        d.sample(true, t0);
        assert_eq!(d.sample(true, at(t0, 30)), Some(SafetyEvent::EstopAsserted));

        assert_eq!(d.sample(false, at(t0, 40)), None);
        assert_eq!(d.sample(false, at(t0, 69)), None);
        assert_eq!(d.sample(false, at(t0, 70)), Some(SafetyEvent::EstopCleared));
        assert!(!d.is_asserted());
    }

    #[test]
    fn zero_window_commits_immediately() {
        let mut d = Debouncer::new(Duration::ZERO);
        let t0 = Instant::now();
        assert_eq!(d.sample(true, t0), Some(SafetyEvent::EstopAsserted));
        assert_eq!(d.sample(false, at(t0, 1)), Some(SafetyEvent::EstopCleared));
    }

    #[test]
    fn force_asserted_reports_change_once() {
        let mut d = Debouncer::new(WINDOW);
        assert!(d.force_asserted());
        assert!(d.is_asserted());
        // Already asserted: no second event.
        assert!(!d.force_asserted());
    }

    #[test]
    fn forced_assertion_clears_through_normal_sampling() {
        let mut d = Debouncer::new(WINDOW);
        let t0 = Instant::now();
        d.force_asserted();

        // A stable low signal clears the forced assertion after the window.
        assert_eq!(d.sample(false, at(t0, 100)), None);
        assert_eq!(
            d.sample(false, at(t0, 130)),
            Some(SafetyEvent::EstopCleared)
        );
    }
}
