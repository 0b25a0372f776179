//! Process-wide shutdown flag.
//!
//! Once set, the registry keeps its bookkeeping up to date but stops announcing
//! lost devices: during teardown every channel breaks and nobody needs to hear
//! about it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    set: AtomicBool,
    notify: Notify,
}

/// Cloneable shutdown token. All clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    inner: Arc<Inner>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Idempotent.
    pub fn set(&self) {
        if !self.inner.set.swap(true, Ordering::SeqCst) {
            log::debug!("Shutdown requested");
        }
        self.inner.notify.notify_waiters();
    }

    pub fn is_set(&self) -> bool {
        self.inner.set.load(Ordering::SeqCst)
    }

    /// Wait until shutdown is requested.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a concurrent `set` is not lost.
            notified.as_mut().enable();
            if self.is_set() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn starts_unset() {
        assert!(!ShutdownToken::new().is_set());
    }

    #[test]
    fn set_is_shared_between_clones() {
        let token = ShutdownToken::new();
        let clone = token.clone();
        clone.set();
        assert!(token.is_set());

        token.set();
        assert!(clone.is_set());
    }

    #[tokio::test]
    async fn cancelled_returns_when_already_set() {
        let token = ShutdownToken::new();
        token.set();
        tokio::time::timeout(Duration::from_millis(50), token.cancelled())
            .await
            .expect("token already set");
    }

    #[tokio::test]
    async fn cancelled_wakes_on_set() {
        let token = ShutdownToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.set();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }
}
