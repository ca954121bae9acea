//! Readiness-based I/O event demultiplexer.
//!
//! The [`IoMap`] owns a registry of descriptor handlers and the platform
//! poller. Tasks register the descriptors they own together with a
//! closure; [`IoMap::poll`] waits for readiness and calls the closure of
//! every ready descriptor on the calling thread.
//!
//! Handlers receive the `IoMap` itself, so they can unregister their
//! descriptor once it reaches end-of-file, or register new ones.

mod event;
mod poller;

pub(crate) use poller::common::{Waker, wake_fd};
pub(crate) use poller::platform;

pub use event::Ready;
pub use poller::common::Interest;

use crate::error::{Error, Result};
use event::Event;
use poller::Poller;

use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::os::fd::RawFd;
use std::sync::Arc;
use std::time::Duration;

/// Callback invoked when a registered descriptor becomes ready.
///
/// Returning an error aborts the current dispatch and makes
/// [`IoMap::poll`] fail with it.
pub type Handler = Box<dyn FnMut(RawFd, Ready, &mut IoMap) -> Result<()>>;

/// Registry entry for one descriptor.
struct Entry {
    /// `None` while the handler is being invoked.
    handler: Option<Handler>,

    interest: Interest,
}

/// A manager for file descriptors and their associated handlers.
///
/// Every registered descriptor has exactly one handler and exactly one
/// registration in the poller. The two are always added and removed
/// together.
pub struct IoMap {
    handlers: HashMap<RawFd, Entry>,

    poller: Poller,

    /// Reusable buffer for events returned by the poller.
    events: Vec<Event>,
}

impl IoMap {
    /// Creates an empty map backed by a fresh poller instance.
    pub fn new() -> Result<Self> {
        Ok(Self {
            handlers: HashMap::new(),
            poller: Poller::new()?,
            events: Vec::with_capacity(64),
        })
    }

    /// Registers an I/O handler for a file descriptor.
    ///
    /// At least one of `interest.read` and `interest.write` must be set.
    /// On failure the registry is left unchanged.
    ///
    /// # Errors
    ///
    /// - [`Error::NoInterest`] if neither read nor write is requested,
    /// - [`Error::AlreadyRegistered`] if `fd` already has a handler,
    /// - [`Error::Io`] if the poller rejects the descriptor.
    pub fn register<F>(&mut self, fd: RawFd, handler: F, interest: Interest) -> Result<()>
    where
        F: FnMut(RawFd, Ready, &mut IoMap) -> Result<()> + 'static,
    {
        if interest.is_empty() {
            return Err(Error::NoInterest(fd));
        }
        if self.handlers.contains_key(&fd) {
            return Err(Error::AlreadyRegistered(fd));
        }

        self.poller.register(fd, interest)?;
        self.handlers.insert(
            fd,
            Entry {
                handler: Some(Box::new(handler)),
                interest,
            },
        );

        tracing::trace!(fd, ?interest, "registered descriptor");
        Ok(())
    }

    /// Unregisters the given file descriptor.
    ///
    /// Must be called before the descriptor is closed. A descriptor closed
    /// first has already left the kernel interest set; that case is
    /// tolerated.
    ///
    /// # Errors
    ///
    /// [`Error::NotRegistered`] if `fd` has no handler.
    pub fn unregister(&mut self, fd: RawFd) -> Result<()> {
        if !self.handlers.contains_key(&fd) {
            return Err(Error::NotRegistered(fd));
        }

        // The entry goes only once the poller has let go of the descriptor.
        if let Err(err) = self.poller.deregister(fd) {
            match err.raw_os_error() {
                Some(libc::EBADF) | Some(libc::ENOENT) => {
                    tracing::debug!(fd, "descriptor left the poller before unregister");
                }
                _ => return Err(err.into()),
            }
        }

        self.handlers.remove(&fd);
        tracing::trace!(fd, "unregistered descriptor");
        Ok(())
    }

    /// Returns `true` if `fd` currently has a handler.
    pub fn contains(&self, fd: RawFd) -> bool {
        self.handlers.contains_key(&fd)
    }

    /// Interest `fd` was registered with.
    pub fn interest(&self, fd: RawFd) -> Option<Interest> {
        self.handlers.get(&fd).map(|entry| entry.interest)
    }

    /// Number of registered descriptors.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Performs a poll and dispatches the resulting events.
    ///
    /// Blocks for at most `wait` (`None` blocks until something is ready),
    /// then invokes the handler of each ready descriptor in the order the
    /// poller reported them. The ready list is fetched before dispatch
    /// starts; a descriptor unregistered by an earlier handler in the same
    /// batch is skipped.
    ///
    /// A poll cut short by a signal or by the internal waker returns
    /// `Ok(0)`.
    ///
    /// Returns the number of handlers invoked.
    pub fn poll(&mut self, wait: Option<Duration>) -> Result<usize> {
        let mut events = mem::take(&mut self.events);

        let result = match self.poller.poll(&mut events, wait) {
            Ok(()) => self.dispatch(&events),
            Err(err) => Err(err.into()),
        };

        events.clear();
        self.events = events;

        result
    }

    fn dispatch(&mut self, events: &[Event]) -> Result<usize> {
        let mut dispatched = 0;

        for event in events {
            let Some(mut handler) = self
                .handlers
                .get_mut(&event.fd)
                .and_then(|entry| entry.handler.take())
            else {
                continue;
            };

            let outcome = handler(event.fd, event.ready, self);

            // Put the handler back unless it unregistered itself (or was
            // replaced by a fresh registration) while running.
            if let Some(entry) = self.handlers.get_mut(&event.fd) {
                if entry.handler.is_none() {
                    entry.handler = Some(handler);
                }
            }

            dispatched += 1;
            outcome?;
        }

        Ok(dispatched)
    }

    /// Waker able to interrupt a blocking [`poll`](Self::poll) from any
    /// thread.
    pub(crate) fn waker(&self) -> Arc<Waker> {
        self.poller.waker()
    }
}

impl fmt::Debug for IoMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fds: Vec<_> = self.handlers.keys().copied().collect();
        fds.sort_unstable();

        f.debug_struct("IoMap").field("fds", &fds).finish()
    }
}
