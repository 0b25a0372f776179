//! One-shot channel health signal.
//!
//! Every connection carries a [`ChannelHealth`]. The transport calls
//! [`ChannelHealth::fire`] when the channel becomes unusable; everything that
//! subscribed learns about it exactly once. Subscribing to a signal that has
//! already fired runs the callback straight away, so there is no window in
//! which a break can be missed.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::watch;

type Callback = Box<dyn FnOnce() + Send + 'static>;

struct SignalState {
    broken: bool,
    next_id: u64,
    subscribers: Vec<(u64, Callback)>,
}

struct Inner {
    state: Mutex<SignalState>,
    broken_tx: watch::Sender<bool>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, SignalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Broken/alive signal for a single connection.
///
/// Cloning yields another handle to the same signal.
#[derive(Clone)]
pub struct ChannelHealth {
    inner: Arc<Inner>,
}

impl ChannelHealth {
    /// Create a signal in the alive state.
    pub fn new() -> Self {
        let (broken_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SignalState {
                    broken: false,
                    next_id: 0,
                    subscribers: Vec::new(),
                }),
                broken_tx,
            }),
        }
    }

    pub fn is_broken(&self) -> bool {
        self.inner.lock().broken
    }

    /// Mark the channel as broken and notify subscribers in subscription order.
    ///
    /// Only the first call has any effect; it returns `true`. Callbacks run on
    /// the calling thread after the internal lock is released.
    pub fn fire(&self) -> bool {
        let subscribers = {
            let mut state = self.inner.lock();
            if state.broken {
                return false;
            }
            state.broken = true;
            std::mem::take(&mut state.subscribers)
        };

        self.inner.broken_tx.send_replace(true);

        for (_, callback) in subscribers {
            callback();
        }
        true
    }

    /// Register a callback for the break.
    ///
    /// If the signal already fired, the callback runs before this returns and
    /// the returned subscription is inert. Dropping the subscription does not
    /// unsubscribe; call [`Subscription::cancel`] for that.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.inner.lock();
        if state.broken {
            drop(state);
            callback();
            return Subscription {
                id: None,
                signal: Weak::new(),
            };
        }

        let id = state.next_id;
        state.next_id += 1;
        state.subscribers.push((id, Box::new(callback)));

        Subscription {
            id: Some(id),
            signal: Arc::downgrade(&self.inner),
        }
    }

    /// Number of callbacks still waiting for the break.
    pub fn pending_subscribers(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    /// Wait until the signal fires. Returns immediately if it already has.
    pub async fn broken(&self) {
        let mut rx = self.inner.broken_tx.subscribe();
        // The sender lives as long as `self`, so this only returns Ok.
        let _ = rx.wait_for(|broken| *broken).await;
    }
}

impl Default for ChannelHealth {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ChannelHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("ChannelHealth")
            .field("broken", &state.broken)
            .field("subscribers", &state.subscribers.len())
            .finish()
    }
}

/// Handle to a pending health subscription.
#[derive(Debug)]
pub struct Subscription {
    id: Option<u64>,
    signal: Weak<Inner>,
}

impl Subscription {
    /// Remove the callback if it has not run yet.
    ///
    /// Returns `true` when a pending callback was removed.
    pub fn cancel(self) -> bool {
        let (Some(id), Some(inner)) = (self.id, self.signal.upgrade()) else {
            return false;
        };
        let mut state = inner.lock();
        let before = state.subscribers.len();
        state.subscribers.retain(|(sub_id, _)| *sub_id != id);
        state.subscribers.len() != before
    }
}
