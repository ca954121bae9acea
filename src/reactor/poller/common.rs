use super::platform::{sys_close, sys_write};

use std::os::fd::RawFd;

/// Interest a descriptor is registered with.
///
/// At least one of `read` and `write` must be set for a registration to be
/// accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interest {
    pub read: bool,
    pub write: bool,
}

impl Interest {
    /// Read interest only.
    pub const READABLE: Interest = Interest {
        read: true,
        write: false,
    };

    /// Write interest only.
    pub const WRITABLE: Interest = Interest {
        read: false,
        write: true,
    };

    /// Read and write interest.
    pub const BOTH: Interest = Interest {
        read: true,
        write: true,
    };

    pub fn new(read: bool, write: bool) -> Self {
        Self { read, write }
    }

    /// Returns `true` if neither read nor write is requested.
    pub fn is_empty(&self) -> bool {
        !self.read && !self.write
    }
}

/// Write end of the poller's wake-up channel.
///
/// On Linux this is an `eventfd`, elsewhere the write end of a pipe.
/// `wake` only calls `write(2)` and is therefore safe to use from a signal
/// handler.
pub(crate) struct Waker {
    pub(crate) fd: RawFd,

    /// Read end of a self-pipe, if the platform needs a separate one.
    pub(crate) read_fd: Option<RawFd>,
}

impl Waker {
    /// Wake the poller.
    pub(crate) fn wake(&self) {
        wake_fd(self.fd);
    }
}

impl Drop for Waker {
    fn drop(&mut self) {
        sys_close(self.fd);
        if let Some(fd) = self.read_fd {
            sys_close(fd);
        }
    }
}

/// Writes an 8-byte token to a wake descriptor.
///
/// Async-signal-safe. A full pipe or a saturated eventfd already means a
/// wake-up is pending, so the result is ignored.
pub(crate) fn wake_fd(fd: RawFd) {
    let buf: u64 = 1;
    let _ = sys_write(fd, &buf.to_ne_bytes());
}
