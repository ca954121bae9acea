use super::Manager;
use super::task::Task;
use crate::error::Result;

use std::thread;
use std::time::Duration;

/// Builder for configuring and creating a [`Manager`].
///
/// # Examples
///
/// ```rust,ignore
/// let manager: Manager = ManagerBuilder::new()
///     .limit(32)
///     .timeout(Duration::from_secs(60))
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct ManagerBuilder {
    /// Maximum number of tasks running at once.
    pub(super) limit: usize,

    /// Per-task ceiling; `None` disables enforcement.
    pub(super) timeout: Option<Duration>,

    /// Upper bound on a single reactor wait.
    pub(super) tick: Duration,

    /// Whether SIGINT aborts the run.
    pub(super) catch_interrupt: bool,
}

impl ManagerBuilder {
    /// Creates a builder with the default configuration.
    ///
    /// The limit defaults to the number of available logical CPUs, falling
    /// back to `1`. Timeouts are disabled, the tick is one second and SIGINT
    /// is caught.
    pub fn new() -> Self {
        let limit = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            limit,
            timeout: None,
            tick: Duration::from_secs(1),
            catch_interrupt: true,
        }
    }

    /// Sets the maximum number of concurrently running tasks.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn limit(mut self, n: usize) -> Self {
        assert!(n > 0, "limit must be > 0");

        self.limit = n;
        self
    }

    /// Sets the per-task timeout. A zero duration disables enforcement.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Sets the per-task timeout in seconds. Values `<= 0` (and NaN)
    /// disable enforcement.
    pub fn timeout_secs(mut self, secs: f64) -> Self {
        self.timeout = if secs > 0.0 {
            Duration::try_from_secs_f64(secs).ok()
        } else {
            None
        };
        self
    }

    /// Sets the time unit of the adaptive wait.
    ///
    /// The reactor never waits longer than the smallest remaining task
    /// budget, and never less than one tick, so the loop wakes at least once
    /// per tick even when no descriptor becomes ready.
    ///
    /// # Panics
    ///
    /// Panics if `tick` is zero.
    pub fn tick(mut self, tick: Duration) -> Self {
        assert!(!tick.is_zero(), "tick must be > 0");

        self.tick = tick;
        self
    }

    /// Whether SIGINT turns into an abort for the duration of
    /// [`Manager::run`].
    pub fn catch_interrupt(mut self, enabled: bool) -> Self {
        self.catch_interrupt = enabled;
        self
    }

    /// Builds the manager with the configured options.
    ///
    /// This creates the manager's reactor.
    pub fn build<T: Task>(self) -> Result<Manager<T>> {
        Manager::with_config(self)
    }
}

impl Default for ManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
