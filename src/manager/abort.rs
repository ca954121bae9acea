use crate::reactor::Waker;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Requests a graceful abort of a running [`Manager`](crate::Manager).
///
/// The handle can be cloned and sent to other threads. Aborting wakes the
/// manager's reactor, so a blocked poll returns promptly; the abort itself
/// is observed between loop iterations.
#[derive(Clone)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl AbortHandle {
    pub(crate) fn new(waker: Arc<Waker>) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            waker,
        }
    }

    /// Asks the manager to interrupt running tasks and cancel pending ones.
    pub fn abort(&self) {
        self.flag.store(true, Ordering::Release);
        self.waker.wake();
    }

    /// Returns `true` if an abort has been requested and not yet handled.
    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    pub(crate) fn reset(&self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl fmt::Debug for AbortHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortHandle")
            .field("aborted", &self.is_aborted())
            .finish()
    }
}
