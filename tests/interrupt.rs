use fleetrun::{IoMap, Manager, ManagerBuilder, Result, Task, WriteHandle};
use std::time::{Duration, Instant};

/// Raises SIGINT from `start`, then runs until interrupted.
struct SignalTask {
    raise: bool,
    started: Option<Instant>,
    interrupted: bool,
    cancelled: bool,
    ordinal: Option<usize>,
}

impl SignalTask {
    fn new(raise: bool) -> Self {
        Self {
            raise,
            started: None,
            interrupted: false,
            cancelled: false,
            ordinal: None,
        }
    }
}

impl Task for SignalTask {
    fn start(&mut self, _: &mut IoMap, _: Option<&WriteHandle>) -> Result<()> {
        self.started = Some(Instant::now());
        if self.raise {
            let rc = unsafe { libc::raise(libc::SIGINT) };
            assert_eq!(rc, 0);
        }
        Ok(())
    }

    fn running(&mut self) -> bool {
        !self.interrupted
    }

    fn elapsed(&self) -> Duration {
        self.started.map(|at| at.elapsed()).unwrap_or_default()
    }

    fn timedout(&mut self) {}

    fn interrupted(&mut self) {
        self.interrupted = true;
    }

    fn cancel(&mut self) {
        self.cancelled = true;
    }

    fn report(&mut self, ordinal: usize) {
        self.ordinal = Some(ordinal);
    }
}

#[test]
fn test_sigint_interrupts_running_and_cancels_pending() {
    let mut manager: Manager<SignalTask> = ManagerBuilder::new()
        .limit(1)
        .tick(Duration::from_secs(30))
        .catch_interrupt(true)
        .build()
        .unwrap();

    manager.add_task(SignalTask::new(true));
    manager.add_task(SignalTask::new(false));

    let start = Instant::now();
    manager.run().unwrap();

    assert!(start.elapsed() < Duration::from_secs(10));

    let done = manager.done();
    assert_eq!(done.len(), 2);
    assert!(done[0].interrupted && !done[0].cancelled);
    assert!(done[1].cancelled && done[1].started.is_none());
    assert_eq!(done[0].ordinal, Some(1));
    assert_eq!(done[1].ordinal, Some(2));
}
