//! Error type shared by the reactor, the writer and the manager.

use std::io;
use std::os::fd::RawFd;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the execution engine.
///
/// The registration variants signal a defect in a [`Task`](crate::Task)
/// implementation. They are never absorbed: they propagate out of the
/// handler, out of [`IoMap::poll`](crate::IoMap::poll) and out of
/// [`Manager::run`](crate::Manager::run).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `register` was called without read or write interest.
    #[error("fd {0} registered without read or write interest")]
    NoInterest(RawFd),

    /// The descriptor already has a handler.
    #[error("fd {0} is already registered")]
    AlreadyRegistered(RawFd),

    /// The descriptor has no handler.
    #[error("fd {0} is not registered")]
    NotRegistered(RawFd),

    /// The writer thread panicked before it could be joined.
    #[error("writer thread panicked")]
    WriterPanicked,

    /// An operating system call failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Returns `true` for errors caused by misuse of the registration API.
    pub fn is_registration(&self) -> bool {
        matches!(
            self,
            Error::NoInterest(_) | Error::AlreadyRegistered(_) | Error::NotRegistered(_)
        )
    }
}
