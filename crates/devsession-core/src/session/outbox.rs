//! Ordered delivery of lifecycle events.
//!
//! Events are queued while the registry state lock is held, so queue order is
//! the order in which state changed. Whichever thread finds the queue idle
//! drains it into the sink; other threads only enqueue. The sink therefore
//! sees one event at a time, in state order, and never runs under the state
//! lock.

use crate::event::{LifecycleEvent, LifecycleKind};
use crate::shutdown::ShutdownToken;
use crate::sink::LifecycleSink;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct OutboxState {
    queue: VecDeque<LifecycleEvent>,
    draining: bool,
}

#[derive(Default)]
pub(crate) struct Outbox {
    state: Mutex<OutboxState>,
}

impl Outbox {
    fn lock(&self) -> MutexGuard<'_, OutboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue an event. Call with the registry state lock held.
    pub fn push(&self, event: LifecycleEvent) {
        self.lock().queue.push_back(event);
    }

    /// Deliver queued events unless another thread already is.
    ///
    /// `Lost` events are dropped at delivery time once `shutdown` is set.
    /// Events queued by the sink itself are delivered after the current one.
    pub fn drain(&self, sink: &dyn LifecycleSink, shutdown: &ShutdownToken, prefix: &str) {
        {
            let mut state = self.lock();
            if state.draining {
                return;
            }
            state.draining = true;
        }
        let _draining = DrainGuard(self);

        loop {
            // The idle check and the flag reset share one critical section so
            // an event pushed concurrently is never left behind.
            let next = {
                let mut state = self.lock();
                let next = state.queue.pop_front();
                if next.is_none() {
                    state.draining = false;
                }
                next
            };
            let Some(event) = next else {
                return;
            };
            if event.kind == LifecycleKind::Lost && shutdown.is_set() {
                log::debug!(
                    "Shutting down, not reporting loss of {}",
                    event.name(prefix)
                );
                continue;
            }
            sink.on_lifecycle_event(&event);
        }
    }

    #[cfg(test)]
    fn pending(&self) -> usize {
        self.lock().queue.len()
    }
}

/// Clears the draining flag when a sink panics mid-delivery.
struct DrainGuard<'a>(&'a Outbox);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.lock().draining = false;
        }
    }
}
