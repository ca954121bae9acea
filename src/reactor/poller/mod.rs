//! Platform-specific I/O poller abstraction.
//!
//! This module provides a unified interface over the platform's readiness
//! mechanism: `epoll` on Linux, `poll(2)` on every other Unix target.
//!
//! The concrete implementation is selected at compile time
//! depending on the target operating system.

pub(crate) mod common;

use std::time::Duration;

#[cfg(target_os = "linux")]
mod epoll;

#[cfg(all(unix, not(target_os = "linux")))]
mod poll;

#[cfg(target_os = "linux")]
pub(crate) type Poller = epoll::EpollPoller;

#[cfg(all(unix, not(target_os = "linux")))]
pub(crate) type Poller = poll::PollPoller;

#[cfg(unix)]
pub(crate) mod unix;

#[cfg(unix)]
pub(crate) use unix as platform;

/// Converts a wait into whole milliseconds for the poll syscalls.
///
/// Rounds up so that a sub-millisecond wait does not turn into a
/// non-blocking spin.
pub(crate) fn timeout_millis(wait: Duration) -> i32 {
    let millis = wait.as_nanos().div_ceil(1_000_000);
    millis.min(i32::MAX as u128) as i32
}
