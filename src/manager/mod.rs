//! Bounded task pool driving the reactor.
//!
//! The [`Manager`] admits queued tasks up to a concurrency limit, polls the
//! [`IoMap`] on their behalf, reaps the ones that stopped running, asks the
//! ones over the ceiling to terminate, and reports each task exactly once
//! with its 1-based completion ordinal.

mod abort;
mod builder;
mod signal;
mod task;

pub use abort::AbortHandle;
pub use builder::ManagerBuilder;
pub use task::Task;

use crate::error::Result;
use crate::reactor::IoMap;
use crate::writer::{WriteHandle, Writer};
use signal::InterruptGuard;

use std::collections::VecDeque;
use std::mem;
use std::time::Duration;

/// Executes tasks concurrently.
///
/// Tasks are added with [`add_task`](Self::add_task) and executed with
/// [`run`](Self::run). Every task is in exactly one of three collections at
/// any time: pending (FIFO), running (at most `limit`), or done (completion
/// order).
///
/// `Manager<Box<dyn Task>>` (the default) runs heterogeneous tasks; a
/// concrete `T` keeps typed access to [`done`](Self::done).
pub struct Manager<T: Task = Box<dyn Task>> {
    limit: usize,
    timeout: Option<Duration>,
    tick: Duration,
    catch_interrupt: bool,

    iomap: IoMap,
    abort: AbortHandle,

    pending: VecDeque<T>,
    running: Vec<T>,
    done: Vec<T>,
}

impl<T: Task> Manager<T> {
    /// Creates a manager running at most `limit` tasks at once, each for at
    /// most `timeout_secs` seconds (`<= 0` disables the ceiling).
    ///
    /// # Panics
    ///
    /// Panics if `limit == 0`.
    pub fn new(limit: usize, timeout_secs: f64) -> Result<Self> {
        ManagerBuilder::new()
            .limit(limit)
            .timeout_secs(timeout_secs)
            .build()
    }

    pub(crate) fn with_config(config: ManagerBuilder) -> Result<Self> {
        let iomap = IoMap::new()?;
        let abort = AbortHandle::new(iomap.waker());

        Ok(Self {
            limit: config.limit,
            timeout: config.timeout,
            tick: config.tick,
            catch_interrupt: config.catch_interrupt,
            iomap,
            abort,
            pending: VecDeque::new(),
            running: Vec::new(),
            done: Vec::new(),
        })
    }

    /// Adds a task to be processed by [`run`](Self::run).
    pub fn add_task(&mut self, task: T) {
        self.pending.push_back(task);
    }

    /// Returns a handle that aborts the run from any thread.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Finished tasks in completion order; index `i` has ordinal `i + 1`.
    pub fn done(&self) -> &[T] {
        &self.done
    }

    /// Consumes the manager, returning finished tasks in completion order.
    pub fn into_done(self) -> Vec<T> {
        self.done
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn running_len(&self) -> usize {
        self.running.len()
    }

    /// Processes the tasks previously added with [`add_task`](Self::add_task).
    ///
    /// Returns once every task has been reported. A user abort (SIGINT when
    /// enabled, or [`AbortHandle::abort`]) interrupts running tasks, cancels
    /// pending ones, reports them all, and returns `Ok`.
    ///
    /// When a task needs file output, a [`Writer`] is spawned for the run
    /// and joined before returning, so every queued write has been applied.
    ///
    /// # Errors
    ///
    /// Fails on reactor errors and on errors raised by a task's `start` or
    /// by one of its handlers. These indicate a defective task and end the
    /// run immediately; the tasks left in flight are not reported.
    pub fn run(&mut self) -> Result<()> {
        let writer = if self.pending.iter().any(|task| task.needs_writer()) {
            Some(Writer::spawn()?)
        } else {
            None
        };
        let handle = writer.as_ref().map(Writer::handle);

        let guard = if self.catch_interrupt {
            Some(InterruptGuard::install(self.iomap.waker())?)
        } else {
            None
        };

        let outcome = self.drive(handle.as_ref());

        drop(guard);
        drop(handle);

        let shutdown = writer.map_or(Ok(()), Writer::shutdown);

        outcome.and(shutdown)
    }

    fn drive(&mut self, writer: Option<&WriteHandle>) -> Result<()> {
        let mut wait = None;

        while !self.pending.is_empty() || !self.running.is_empty() {
            if self.aborted() {
                self.interrupted();
                return Ok(());
            }

            self.start_tasks(writer)?;

            let wait_for = match wait {
                Some(remaining) if remaining >= self.tick => remaining,
                _ => self.tick,
            };
            self.iomap.poll(Some(wait_for))?;

            if self.aborted() {
                self.interrupted();
                return Ok(());
            }

            self.check_tasks();
            wait = self.check_timeout();
        }

        Ok(())
    }

    fn aborted(&self) -> bool {
        if self.catch_interrupt && signal::take_pending() {
            tracing::warn!("received SIGINT");
            self.abort.abort();
        }

        self.abort.is_aborted()
    }

    /// Starts as many tasks as allowed.
    fn start_tasks(&mut self, writer: Option<&WriteHandle>) -> Result<()> {
        while self.running.len() < self.limit {
            let Some(mut task) = self.pending.pop_front() else {
                break;
            };

            let started = task.start(&mut self.iomap, writer);
            self.running.push(task);
            started?;

            tracing::debug!(
                running = self.running.len(),
                pending = self.pending.len(),
                "started task"
            );
        }

        Ok(())
    }

    /// Checks to see if any tasks have terminated.
    fn check_tasks(&mut self) {
        let running = mem::take(&mut self.running);
        let mut still_running = Vec::with_capacity(running.len());

        for mut task in running {
            if task.running() {
                still_running.push(task);
            } else {
                self.finished(task);
            }
        }

        self.running = still_running;
    }

    /// Asks timed-out tasks to terminate and returns the lowest time left.
    ///
    /// `None` means there is no constraint: either the ceiling is disabled
    /// or no running task has time left.
    fn check_timeout(&mut self) -> Option<Duration> {
        let ceiling = self.timeout?;

        let mut min_left: Option<Duration> = None;
        for task in &mut self.running {
            match ceiling.checked_sub(task.elapsed()) {
                Some(left) if !left.is_zero() => {
                    min_left = Some(min_left.map_or(left, |min| min.min(left)));
                }
                _ => {
                    tracing::debug!(?ceiling, "task exceeded its ceiling");
                    task.timedout();
                }
            }
        }

        min_left
    }

    /// Cleans up after an abort.
    fn interrupted(&mut self) {
        tracing::warn!(
            running = self.running.len(),
            pending = self.pending.len(),
            "run aborted"
        );

        for mut task in mem::take(&mut self.running) {
            task.interrupted();
            self.finished(task);
        }

        while let Some(mut task) = self.pending.pop_front() {
            task.cancel();
            self.finished(task);
        }

        self.abort.reset();
    }

    /// Marks a task as complete and lets it report its status.
    fn finished(&mut self, mut task: T) {
        task.release(&mut self.iomap);
        self.done.push(task);
        let ordinal = self.done.len();

        tracing::debug!(ordinal, "task finished");

        if let Some(task) = self.done.last_mut() {
            task.report(ordinal);
        }
    }
}
