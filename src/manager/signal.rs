//! SIGINT integration.
//!
//! While a run is in progress, SIGINT is turned into an abort request
//! instead of killing the process. The handler records the signal and pokes
//! the reactor's waker; both operations are async-signal-safe. The handler
//! is installed without `SA_RESTART`, so a blocking poll on the main thread
//! also returns with `EINTR`.
//!
//! The signal disposition is process-wide. Two managers running at once in
//! the same process share the pending flag, and whichever observes it first
//! consumes it.

use crate::reactor::{Waker, wake_fd};

use libc::{SIGINT, c_int, sigaction, sigemptyset, sighandler_t};
use std::io;
use std::mem;
use std::os::fd::RawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

static PENDING: AtomicBool = AtomicBool::new(false);
static WAKE_FD: AtomicI32 = AtomicI32::new(-1);

extern "C" fn on_sigint(_: c_int) {
    PENDING.store(true, Ordering::SeqCst);

    let fd = WAKE_FD.load(Ordering::SeqCst);
    if fd >= 0 {
        wake_fd(fd);
    }
}

/// Consumes a pending SIGINT, returning whether one was received.
pub(crate) fn take_pending() -> bool {
    PENDING.swap(false, Ordering::SeqCst)
}

/// Keeps the SIGINT handler installed; restores the previous disposition
/// on drop.
pub(crate) struct InterruptGuard {
    previous: sigaction,
    previous_fd: RawFd,

    /// Keeps the wake descriptor open while the handler may write to it.
    _waker: Arc<Waker>,
}

impl InterruptGuard {
    pub(crate) fn install(waker: Arc<Waker>) -> io::Result<Self> {
        PENDING.store(false, Ordering::SeqCst);
        let previous_fd = WAKE_FD.swap(waker.fd, Ordering::SeqCst);

        let handler = on_sigint as extern "C" fn(c_int);

        let mut action: sigaction = unsafe { mem::zeroed() };
        action.sa_sigaction = handler as sighandler_t;
        action.sa_flags = 0;
        unsafe { sigemptyset(&mut action.sa_mask) };

        let mut previous: sigaction = unsafe { mem::zeroed() };
        let rc = unsafe { sigaction(SIGINT, &action, &mut previous) };
        if rc < 0 {
            WAKE_FD.store(previous_fd, Ordering::SeqCst);
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            previous,
            previous_fd,
            _waker: waker,
        })
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        unsafe {
            sigaction(SIGINT, &self.previous, std::ptr::null_mut());
        }
        WAKE_FD.store(self.previous_fd, Ordering::SeqCst);
    }
}
