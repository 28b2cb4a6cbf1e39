//! Counter of jobs submitted but not yet resolved into a result
//!
//! The pagination loop is the only caller of `add` and the result consumer
//! the only caller of `done`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    count: AtomicUsize,
    idle: Notify,
}

/// Wait-group style counter; clones share the same count
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    inner: Arc<Inner>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one submitted job
    pub fn add(&self) {
        self.inner.count.fetch_add(1, Ordering::SeqCst);
    }

    /// Records one consumed result, waking idle waiters at zero
    pub fn done(&self) {
        let previous = self
            .inner
            .count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));

        match previous {
            Ok(1) => self.inner.idle.notify_waiters(),
            Ok(_) => {}
            Err(_) => tracing::error!("In-flight counter decremented below zero"),
        }
    }

    pub fn count(&self) -> usize {
        self.inner.count.load(Ordering::SeqCst)
    }

    /// Waits until the count is zero
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }
}
