use crate::error::Result;
use crate::reactor::IoMap;
use crate::writer::WriteHandle;

use std::time::Duration;

/// A unit of work driven by the [`Manager`](crate::Manager).
///
/// A task is started once, polled through [`running`](Self::running) after
/// every reactor pass, and reported exactly once. The task owns the
/// descriptors it registers with the [`IoMap`] and is responsible for
/// unregistering them, at the latest in [`release`](Self::release).
///
/// Lifecycle as seen by the manager:
///
/// ```text
/// PENDING --start--> RUNNING --(running() == false)--> FINISHED
///    |                  |--timedout() ... running() == false--^
///    |                  `--interrupted()----------------------^
///    `--cancel()--------------------------------------------- ^
/// ```
pub trait Task {
    /// Registers the task's descriptors and begins work.
    ///
    /// `writer` is `Some` when at least one task of the run declared
    /// [`needs_writer`](Self::needs_writer). An error here is fatal to the
    /// whole run.
    fn start(&mut self, iomap: &mut IoMap, writer: Option<&WriteHandle>) -> Result<()>;

    /// Returns `true` while work remains.
    fn running(&mut self) -> bool;

    /// Time elapsed since [`start`](Self::start).
    fn elapsed(&self) -> Duration;

    /// Requests best-effort termination because the run's ceiling was
    /// exceeded.
    ///
    /// Called on every pass until the task stops running, so it must be
    /// idempotent.
    fn timedout(&mut self);

    /// Requests best-effort termination because the user aborted the run.
    fn interrupted(&mut self);

    /// Marks the task as never started.
    fn cancel(&mut self);

    /// Drops whatever the task still has registered with the reactor.
    ///
    /// Called once, right before [`report`](Self::report). A task that was
    /// killed or interrupted may still own descriptors at that point.
    fn release(&mut self, _iomap: &mut IoMap) {}

    /// Emits the final status. `ordinal` is the 1-based completion order.
    fn report(&mut self, ordinal: usize);

    /// Whether the task writes to files through the [`Writer`](crate::Writer).
    fn needs_writer(&self) -> bool {
        false
    }
}

impl<T: Task + ?Sized> Task for Box<T> {
    fn start(&mut self, iomap: &mut IoMap, writer: Option<&WriteHandle>) -> Result<()> {
        (**self).start(iomap, writer)
    }

    fn running(&mut self) -> bool {
        (**self).running()
    }

    fn elapsed(&self) -> Duration {
        (**self).elapsed()
    }

    fn timedout(&mut self) {
        (**self).timedout()
    }

    fn interrupted(&mut self) {
        (**self).interrupted()
    }

    fn cancel(&mut self) {
        (**self).cancel()
    }

    fn release(&mut self, iomap: &mut IoMap) {
        (**self).release(iomap)
    }

    fn report(&mut self, ordinal: usize) {
        (**self).report(ordinal)
    }

    fn needs_writer(&self) -> bool {
        (**self).needs_writer()
    }
}
