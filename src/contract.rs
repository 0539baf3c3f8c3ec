//! Small cross-cutting cancellation primitive shared by the registry and
//! the notification fabric.

use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};

use tokio::sync::Notify;

#[derive(Debug)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cooperative cancellation token. Shutdown of the registry (spec §5)
/// cancels all outstanding subscriptions and the eviction drain loop by
/// flipping one of these.
#[derive(Clone, Debug)]
pub struct Cancellation {
    inner: Arc<Inner>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Marks the token cancelled. Returns `true` on the call that actually
    /// transitioned it (first writer wins), `false` if already cancelled.
    pub fn cancel(&self) -> bool {
        let transitioned = self
            .inner
            .cancelled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if transitioned {
            self.inner.notify.notify_waiters();
        }
        transitioned
    }

    /// Clone sharing the same underlying flag.
    pub fn child(&self) -> Self {
        self.clone()
    }

    /// Resolves once the token is cancelled; resolves immediately if it
    /// already is. Lets a select loop race cancellation against its other
    /// branches instead of polling `is_cancelled` on a timer.
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_returns_true_only_on_the_transitioning_call() {
        let token = Cancellation::new();
        assert!(!token.is_cancelled());
        assert!(token.cancel());
        assert!(token.is_cancelled());
        assert!(!token.cancel());
    }

    #[test]
    fn child_shares_the_same_flag() {
        let token = Cancellation::new();
        let child = token.child();
        token.cancel();
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_resolves_immediately_if_already_cancelled() {
        let token = Cancellation::new();
        token.cancel();
        token.cancelled().await;
    }

    #[tokio::test]
    async fn cancelled_resolves_once_cancel_is_called() {
        let token = Cancellation::new();
        let waiter = token.child();
        let handle = tokio::spawn(async move { waiter.cancelled().await });
        tokio::task::yield_now().await;
        token.cancel();
        handle.await.unwrap();
    }
}
