use std::os::fd::RawFd;

/// Readiness reported for a registered descriptor.
///
/// A handler receives one `Ready` per dispatch. Error and hang-up
/// conditions are folded into `readable` so that a reader observes them
/// as end-of-file or a failing `read(2)`; they are also exposed on their own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ready {
    /// The descriptor can be read without blocking.
    pub readable: bool,

    /// The descriptor can be written without blocking.
    pub writable: bool,

    /// The peer hung up.
    pub hangup: bool,

    /// An error is pending on the descriptor.
    pub error: bool,
}

/// An I/O event reported by the poller.
pub(crate) struct Event {
    /// Descriptor the readiness belongs to.
    pub(crate) fd: RawFd,

    pub(crate) ready: Ready,
}
