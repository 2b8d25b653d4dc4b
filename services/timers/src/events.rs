//! Timer transition fan-out
//!
//! State transitions (pause, resume, completion, REST upserts) are
//! broadcast to every WebSocket connection; each connection keeps the ones
//! addressed to its user.

use common::protocol::TimerDelta;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Capacity of the transition channel
const HUB_CAPACITY: usize = 1024;

/// A change to one timer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerTransition {
    /// Connection that caused the change, if any
    pub origin: Option<Uuid>,
    pub user_id: String,
    pub delta: TimerDelta,
}

/// Broadcast hub for timer transitions
#[derive(Debug, Clone)]
pub struct TimerHub {
    tx: broadcast::Sender<TimerTransition>,
}

impl TimerHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(HUB_CAPACITY);
        Self { tx }
    }

    /// Subscribe to all transitions
    pub fn subscribe(&self) -> broadcast::Receiver<TimerTransition> {
        self.tx.subscribe()
    }

    /// Publish a transition; returns the number of live subscribers
    pub fn publish(&self, origin: Option<Uuid>, user_id: &str, delta: TimerDelta) -> usize {
        let transition = TimerTransition {
            origin,
            user_id: user_id.to_string(),
            delta,
        };

        // No subscribers just means nobody is connected
        self.tx.send(transition).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for TimerHub {
    fn default() -> Self {
        Self::new()
    }
}
