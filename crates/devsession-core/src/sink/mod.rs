//! Destinations for lifecycle events.
//!
//! The registry hands every event to one [`LifecycleSink`]. Presentation layers
//! implement the trait directly, pass a closure, or combine the stock sinks
//! with [`FanoutSink`].

mod event_bus;
mod journal;

pub use event_bus::{EventBus, DEFAULT_CAPACITY};
pub use journal::{load_journal, JournalError, JournalSink};

use crate::event::LifecycleEvent;
use std::sync::Arc;

/// Receives lifecycle events from the registry.
///
/// Called outside the registry's lock, possibly from the transport thread that
/// fired a health signal. Implementations must not block for long.
pub trait LifecycleSink: Send + Sync {
    fn on_lifecycle_event(&self, event: &LifecycleEvent);
}

impl<F> LifecycleSink for F
where
    F: Fn(&LifecycleEvent) + Send + Sync,
{
    fn on_lifecycle_event(&self, event: &LifecycleEvent) {
        self(event)
    }
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LifecycleSink for NullSink {
    fn on_lifecycle_event(&self, _event: &LifecycleEvent) {}
}

/// Forwards each event to several sinks in the order they were added.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn LifecycleSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn LifecycleSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn push(&mut self, sink: Arc<dyn LifecycleSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl LifecycleSink for FanoutSink {
    fn on_lifecycle_event(&self, event: &LifecycleEvent) {
        for sink in &self.sinks {
            sink.on_lifecycle_event(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::LifecycleKind;
    use crate::identity::SessionSlot;
    use std::sync::Mutex;

    fn event(slot: usize) -> LifecycleEvent {
        LifecycleEvent::new(LifecycleKind::Connected, SessionSlot(slot), None)
    }

    #[test]
    fn closure_is_a_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = Arc::clone(&seen);
            move |e: &LifecycleEvent| seen.lock().unwrap().push(e.slot)
        };

        sink.on_lifecycle_event(&event(3));
        assert_eq!(*seen.lock().unwrap(), vec![SessionSlot(3)]);
    }

    #[test]
    fn fanout_forwards_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let tagged = |tag: &'static str| {
            let order = Arc::clone(&order);
            Arc::new(move |_: &LifecycleEvent| order.lock().unwrap().push(tag))
                as Arc<dyn LifecycleSink>
        };

        let fanout = FanoutSink::new().with(tagged("first")).with(tagged("second"));
        assert_eq!(fanout.len(), 2);

        fanout.on_lifecycle_event(&event(0));
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn empty_fanout_is_fine() {
        let fanout = FanoutSink::new();
        assert!(fanout.is_empty());
        fanout.on_lifecycle_event(&event(0));
        NullSink.on_lifecycle_event(&event(0));
    }
}
