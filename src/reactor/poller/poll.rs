//! Portable `poll(2)`-based poller for Unix targets without `epoll`.
//!
//! Exposes the same interface as the `epoll` backend. The interest set is
//! kept in a dense `pollfd` array; slot 0 always holds the read end of the
//! wake-up self-pipe.

use super::common::{Interest, Waker};
use super::platform::{sys_drain, sys_pipe};
use crate::reactor::event::{Event, Ready};

use libc::{POLLERR, POLLHUP, POLLIN, POLLNVAL, POLLOUT, nfds_t, pollfd};
use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;
use std::sync::Arc;
use std::time::Duration;

pub(crate) struct PollPoller {
    /// Interest set handed to `poll(2)`.
    fds: Vec<pollfd>,

    /// Position of each registered descriptor inside `fds`.
    slots: HashMap<RawFd, usize>,

    waker: Arc<Waker>,
}

impl PollPoller {
    pub(crate) fn new() -> io::Result<Self> {
        let (read_fd, write_fd) = sys_pipe()?;
        let waker = Arc::new(Waker {
            fd: write_fd,
            read_fd: Some(read_fd),
        });

        let fds = vec![pollfd {
            fd: read_fd,
            events: POLLIN,
            revents: 0,
        }];

        Ok(Self {
            fds,
            slots: HashMap::new(),
            waker,
        })
    }

    pub(crate) fn waker(&self) -> Arc<Waker> {
        self.waker.clone()
    }

    pub(crate) fn register(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        if self.slots.contains_key(&fd) {
            return Err(io::Error::from_raw_os_error(libc::EEXIST));
        }

        let mut events = 0;
        if interest.read {
            events |= POLLIN;
        }
        if interest.write {
            events |= POLLOUT;
        }

        self.slots.insert(fd, self.fds.len());
        self.fds.push(pollfd {
            fd,
            events,
            revents: 0,
        });

        Ok(())
    }

    pub(crate) fn deregister(&mut self, fd: RawFd) -> io::Result<()> {
        let slot = self
            .slots
            .remove(&fd)
            .ok_or_else(|| io::Error::from_raw_os_error(libc::ENOENT))?;

        self.fds.swap_remove(slot);
        if let Some(moved) = self.fds.get(slot) {
            self.slots.insert(moved.fd, slot);
        }

        Ok(())
    }

    pub(crate) fn poll(
        &mut self,
        events: &mut Vec<Event>,
        timeout: Option<Duration>,
    ) -> io::Result<()> {
        events.clear();

        let timeout_ms = timeout.map(super::timeout_millis).unwrap_or(-1);

        for entry in &mut self.fds {
            entry.revents = 0;
        }

        let n = unsafe {
            libc::poll(
                self.fds.as_mut_ptr(),
                self.fds.len() as nfds_t,
                timeout_ms,
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }

        for (index, entry) in self.fds.iter().enumerate() {
            let flags = entry.revents;
            if flags == 0 {
                continue;
            }

            if index == 0 {
                sys_drain(entry.fd);
                continue;
            }

            let hangup = flags & POLLHUP != 0;
            let error = flags & (POLLERR | POLLNVAL) != 0;

            events.push(Event {
                fd: entry.fd,
                ready: Ready {
                    readable: flags & POLLIN != 0 || hangup || error,
                    writable: flags & POLLOUT != 0,
                    hangup,
                    error,
                },
            });
        }

        Ok(())
    }
}
