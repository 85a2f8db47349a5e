use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cancellation token for long-running operations (chat stream, upload,
/// readiness poll). Each operation carries its own token; stopping one does
/// not affect the others.
///
/// Besides the cancel flag, the token carries a one-shot release latch used
/// to guard idempotent resource cleanup: whichever side calls
/// [`try_release`](Self::try_release) first wins, so a deferred server-side
/// delete and a late completion signal can never both act on the resource.
#[derive(Debug, Default)]
pub struct CancellationToken {
    cancelled: AtomicBool,
    released: AtomicBool,
}

impl CancellationToken {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Consume the release latch. Returns true exactly once per token.
    pub fn try_release(&self) -> bool {
        !self.released.swap(true, Ordering::SeqCst)
    }
}
