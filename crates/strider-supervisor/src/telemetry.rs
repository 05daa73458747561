//! [`StatusBus`] – fire-and-forget fan-out of arbitration records.
//!
//! Uses a [`tokio::sync::broadcast`] channel so every subscriber receives
//! every record without any single subscriber blocking the arbiter.  Zero
//! subscribers is a normal condition; a lagging subscriber loses the oldest
//! records rather than applying backpressure.

use strider_types::StatusEvent;
use tokio::sync::broadcast;
use tracing::trace;

/// Default channel capacity (buffered records before old ones are dropped
/// for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Shared status bus.  Clone it cheaply – all clones share the same
/// underlying broadcast channel.
#[derive(Clone, Debug)]
pub struct StatusBus {
    sender: broadcast::Sender<StatusEvent>,
}

impl StatusBus {
    /// Create a bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a record.  Never blocks and never fails: the arbiter must not
    /// stall on observability.
    pub fn publish(&self, event: StatusEvent) {
        match self.sender.send(event) {
            Ok(receivers) => trace!(receivers, "status record published"),
            Err(_) => trace!("status record dropped (no subscribers)"),
        }
    }

    /// Subscribe to all records published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.sender.subscribe()
    }
}

impl Default for StatusBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
