use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Limits how many requests are in flight and lets any request stop the rest.
///
/// Wrap in an `Arc` via [`Throttler::new`], then call [`Throttler::acquire`] before
/// each request. At most `max_concurrent` requests run simultaneously. Once any task
/// calls [`Throttler::halt`], requests that have not started yet are turned away
/// while requests already running complete normally.
#[derive(Debug)]
pub struct Throttler {
    semaphore: Arc<Semaphore>,
}

impl Throttler {
    /// Create a new throttler that allows at most `max_concurrent` requests at a time.
    #[must_use]
    pub fn new(max_concurrent: usize) -> Arc<Self> {
        Arc::new(Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
        })
    }

    /// Wait for a concurrency slot.
    ///
    /// Returns `None` once the throttler has been halted, including for callers already waiting.
    /// The returned permit must be held for the duration of the request.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.semaphore).acquire_owned().await.ok()
    }

    /// Stop handing out slots for the rest of this throttler's life.
    pub fn halt(&self) {
        self.semaphore.close();
    }
}
