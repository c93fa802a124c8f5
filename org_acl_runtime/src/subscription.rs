//! Replay-one subscriptions over a `watch` channel.
//!
//! A new subscriber first sees the current value, then every later update.
//! Intermediate values published while the subscriber is not polling are
//! skipped: it always catches up to the latest. Dropping the subscription
//! unsubscribes without affecting the publisher or other subscribers.

use tokio::sync::watch;

#[derive(Debug)]
pub struct Subscription<T> {
    rx: watch::Receiver<T>,
    primed: bool,
}

impl<T: Clone> Subscription<T> {
    pub(crate) fn new(rx: watch::Receiver<T>) -> Self {
        Self { rx, primed: false }
    }

    /// Latest value, without consuming an update.
    pub fn current(&self) -> T {
        self.rx.borrow().clone()
    }

    /// Next value: the current one on the first call, then waits for a
    /// change. `None` once the publisher is gone.
    pub async fn next(&mut self) -> Option<T> {
        if !self.primed {
            self.primed = true;
            return Some(self.rx.borrow_and_update().clone());
        }
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}
