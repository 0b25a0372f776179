//! Broadcast bus for lifecycle events.
//!
//! Lets several consumers (a console, a UI, a test harness) follow the same
//! registry without each registering a sink.
//!
//! # Example
//!
//! ```rust
//! use devsession_core::sink::{EventBus, LifecycleSink};
//! use devsession_core::{LifecycleEvent, LifecycleKind, SessionSlot};
//!
//! let bus = EventBus::new();
//! let mut rx = bus.subscribe();
//!
//! bus.on_lifecycle_event(&LifecycleEvent::new(LifecycleKind::Connected, SessionSlot(0), None));
//! assert_eq!(rx.try_recv().unwrap().slot, SessionSlot(0));
//! ```

use super::LifecycleSink;
use crate::event::LifecycleEvent;
use tokio::sync::broadcast;

/// Default channel capacity for the event bus.
/// Subscribers that fall further behind than this miss events (lag).
pub const DEFAULT_CAPACITY: usize = 256;

/// Fan-out of lifecycle events over a tokio broadcast channel.
pub struct EventBus {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus that buffers up to `capacity` events per subscriber.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event. Returns how many subscribers it reached.
    pub fn emit(&self, event: LifecycleEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Receive all events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleSink for EventBus {
    fn on_lifecycle_event(&self, event: &LifecycleEvent) {
        if self.emit(event.clone()) == 0 {
            log::trace!("No subscribers for {} event on slot {}", event.kind, event.slot);
        }
    }
}
