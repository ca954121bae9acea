//! Local child process as a [`Task`].
//!
//! A `ProcessTask` spawns a [`Command`] with piped stdout and stderr, hands
//! both pipes to the reactor, captures everything they produce and,
//! optionally, mirrors each stream into `<dir>/<name>` through the
//! [`Writer`](crate::Writer).
//!
//! The task is done once the child has exited and both pipes reached
//! end-of-file, or as soon as the child has exited after it was killed for
//! a timeout or an abort.

use crate::error::Result;
use crate::manager::Task;
use crate::reactor::{Interest, IoMap, Ready, platform::sys_set_nonblocking};
use crate::writer::{Destination, WriteHandle};

use std::cell::RefCell;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Final status of a [`ProcessTask`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Exited with status zero.
    Success,

    /// Exited unsuccessfully or was killed by a signal.
    Failed(ExitStatus),

    /// Killed after exceeding the run's ceiling.
    TimedOut,

    /// Killed because the run was aborted.
    Interrupted,

    /// Never started.
    Cancelled,

    /// Could not be spawned or observed.
    Error(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => Ok(()),
            Outcome::Failed(status) => match (status.code(), status.signal()) {
                (Some(code), _) => write!(f, "Exited with error code {code}"),
                (None, Some(signal)) => write!(f, "Killed by signal {signal}"),
                (None, None) => write!(f, "Exited abnormally"),
            },
            Outcome::TimedOut => write!(f, "Timed out"),
            Outcome::Interrupted => write!(f, "Interrupted"),
            Outcome::Cancelled => write!(f, "Cancelled"),
            Outcome::Error(message) => write!(f, "Error: {message}"),
        }
    }
}

/// One captured output stream.
#[derive(Default)]
struct Capture {
    /// Read end of the pipe; `None` once it reached end-of-file.
    pipe: Option<File>,

    buffer: Vec<u8>,

    /// Mirror file, when the stream is written to a directory.
    dest: Option<Destination>,
    writer: Option<WriteHandle>,
}

impl Capture {
    fn is_open(&self) -> bool {
        self.pipe.is_some()
    }

    /// Reads what the pipe holds right now. Returns `true` at end-of-file.
    fn drain(&mut self) -> bool {
        let Some(pipe) = self.pipe.as_mut() else {
            return true;
        };
        let mut chunk = [0u8; 4096];

        loop {
            match pipe.read(&mut chunk) {
                Ok(0) => return true,
                Ok(n) => {
                    self.buffer.extend_from_slice(&chunk[..n]);
                    if let (Some(writer), Some(dest)) = (&self.writer, self.dest) {
                        writer.write(dest, &chunk[..n]);
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return false,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    tracing::debug!(fd = pipe.as_raw_fd(), "pipe read failed: {}", err);
                    return true;
                }
            }
        }
    }

    fn on_ready(&mut self, fd: RawFd, iomap: &mut IoMap) -> Result<()> {
        if self.drain() {
            self.detach(fd, iomap)?;
        }
        Ok(())
    }

    /// Unregisters and closes the pipe, then closes the mirror file.
    fn detach(&mut self, fd: RawFd, iomap: &mut IoMap) -> Result<()> {
        iomap.unregister(fd)?;
        self.pipe = None;

        if let (Some(writer), Some(dest)) = (self.writer.take(), self.dest.take()) {
            writer.close(dest);
        }

        Ok(())
    }

    /// Collects what is left in a pipe that never reached end-of-file.
    fn release(&mut self, iomap: &mut IoMap) {
        let Some(fd) = self.pipe.as_ref().map(AsRawFd::as_raw_fd) else {
            return;
        };

        self.drain();
        if let Err(err) = self.detach(fd, iomap) {
            tracing::debug!(fd, "releasing pipe failed: {}", err);
        }
    }
}

/// Runs a local command as a unit of work.
///
/// # Examples
///
/// ```rust,ignore
/// let mut manager: Manager<ProcessTask> = ManagerBuilder::new().limit(8).build()?;
/// for host in hosts {
///     let mut command = Command::new("ssh");
///     command.arg(&host).arg("uptime");
///     manager.add_task(ProcessTask::new(host, command).outdir("out"));
/// }
/// manager.run()?;
/// ```
pub struct ProcessTask {
    name: String,
    command: Command,

    outdir: Option<PathBuf>,
    errdir: Option<PathBuf>,

    child: Option<Child>,
    pid: Option<u32>,
    started: Option<Instant>,

    stdout: Rc<RefCell<Capture>>,
    stderr: Rc<RefCell<Capture>>,

    status: Option<ExitStatus>,

    /// Why the child was killed, if it was.
    killed: Option<Outcome>,

    outcome: Option<Outcome>,
    ordinal: Option<usize>,
}

impl ProcessTask {
    /// Creates a task named `name` that will spawn `command`.
    ///
    /// Stdin is redirected from `/dev/null`; stdout and stderr are piped.
    pub fn new(name: impl Into<String>, command: Command) -> Self {
        Self {
            name: name.into(),
            command,
            outdir: None,
            errdir: None,
            child: None,
            pid: None,
            started: None,
            stdout: Rc::default(),
            stderr: Rc::default(),
            status: None,
            killed: None,
            outcome: None,
            ordinal: None,
        }
    }

    /// Mirrors stdout into `<dir>/<name>`.
    pub fn outdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.outdir = Some(dir.into());
        self
    }

    /// Mirrors stderr into `<dir>/<name>`.
    pub fn errdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.errdir = Some(dir.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Everything read from the child's stdout so far.
    pub fn stdout(&self) -> Vec<u8> {
        self.stdout.borrow().buffer.clone()
    }

    /// Everything read from the child's stderr so far.
    pub fn stderr(&self) -> Vec<u8> {
        self.stderr.borrow().buffer.clone()
    }

    /// Process id of the spawned child.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Exit status, once the child has been reaped.
    pub fn status(&self) -> Option<ExitStatus> {
        self.status
    }

    /// Final status, available after [`report`](Task::report).
    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    /// Completion ordinal, available after [`report`](Task::report).
    pub fn ordinal(&self) -> Option<usize> {
        self.ordinal
    }

    fn attach(
        &self,
        iomap: &mut IoMap,
        writer: Option<&WriteHandle>,
        capture: &Rc<RefCell<Capture>>,
        pipe: OwnedFd,
        dir: Option<&PathBuf>,
    ) -> Result<()> {
        let fd = pipe.as_raw_fd();
        sys_set_nonblocking(fd)?;

        {
            let mut capture = capture.borrow_mut();
            capture.pipe = Some(File::from(pipe));
            if let (Some(writer), Some(dir)) = (writer, dir) {
                capture.dest = Some(writer.create(dir.join(&self.name)));
                capture.writer = Some(writer.clone());
            }
        }

        let shared = capture.clone();
        iomap.register(
            fd,
            move |fd: RawFd, _: Ready, iomap: &mut IoMap| shared.borrow_mut().on_ready(fd, iomap),
            Interest::READABLE,
        )
    }

    /// Kills the child's process group and reaps the child.
    fn kill(&mut self, reason: Outcome) {
        if self.killed.is_some() {
            return;
        }

        if let Some(child) = self.child.as_mut() {
            // The group also holds grandchildren that inherited the pipes.
            let open = self.stdout.borrow().is_open() || self.stderr.borrow().is_open();
            if self.status.is_none() || open {
                let rc = unsafe { libc::kill(-(child.id() as libc::pid_t), libc::SIGKILL) };
                if rc < 0 {
                    let err = io::Error::last_os_error();
                    tracing::debug!(task = %self.name, "killing process group failed: {}", err);
                    if self.status.is_none() {
                        let _ = child.kill();
                    }
                }
            }

            if self.status.is_none() {
                match child.wait() {
                    Ok(status) => self.status = Some(status),
                    Err(err) => tracing::debug!(task = %self.name, "reaping failed: {}", err),
                }
            }
        }

        tracing::debug!(task = %self.name, %reason, "stopping task");
        self.killed = Some(reason);
    }

    fn resolve(&mut self) -> Outcome {
        if let Some(outcome) = self.outcome.take() {
            return outcome;
        }
        if let Some(reason) = self.killed.clone() {
            return reason;
        }

        match self.status {
            Some(status) if status.success() => Outcome::Success,
            Some(status) => Outcome::Failed(status),
            None => Outcome::Error("exit status unavailable".into()),
        }
    }
}

impl Task for ProcessTask {
    fn start(&mut self, iomap: &mut IoMap, writer: Option<&WriteHandle>) -> Result<()> {
        self.started = Some(Instant::now());

        self.command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);

        let mut child = match self.command.spawn() {
            Ok(child) => child,
            Err(err) => {
                tracing::debug!(task = %self.name, "spawn failed: {}", err);
                self.outcome = Some(Outcome::Error(err.to_string()));
                return Ok(());
            }
        };

        self.pid = Some(child.id());
        let stdout = child.stdout.take().map(OwnedFd::from);
        let stderr = child.stderr.take().map(OwnedFd::from);
        self.child = Some(child);

        if let Some(pipe) = stdout {
            let dir = self.outdir.clone();
            self.attach(iomap, writer, &self.stdout, pipe, dir.as_ref())?;
        }
        if let Some(pipe) = stderr {
            let dir = self.errdir.clone();
            self.attach(iomap, writer, &self.stderr, pipe, dir.as_ref())?;
        }

        tracing::debug!(task = %self.name, "spawned");
        Ok(())
    }

    fn running(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };

        if self.status.is_none() {
            match child.try_wait() {
                Ok(Some(status)) => self.status = Some(status),
                Ok(None) => return true,
                Err(err) => {
                    self.outcome = Some(Outcome::Error(err.to_string()));
                    return false;
                }
            }
        }

        // Pipes of a killed task are collected in `release`.
        self.killed.is_none() && (self.stdout.borrow().is_open() || self.stderr.borrow().is_open())
    }

    fn elapsed(&self) -> Duration {
        self.started.map(|at| at.elapsed()).unwrap_or_default()
    }

    fn timedout(&mut self) {
        self.kill(Outcome::TimedOut);
    }

    fn interrupted(&mut self) {
        self.kill(Outcome::Interrupted);
    }

    fn cancel(&mut self) {
        self.outcome = Some(Outcome::Cancelled);
    }

    fn release(&mut self, iomap: &mut IoMap) {
        self.stdout.borrow_mut().release(iomap);
        self.stderr.borrow_mut().release(iomap);
    }

    fn report(&mut self, ordinal: usize) {
        let outcome = self.resolve();
        let label = if outcome.is_success() {
            "SUCCESS"
        } else {
            "FAILURE"
        };

        if outcome.is_success() {
            println!("[{ordinal}] [{label}] {}", self.name);
        } else {
            println!("[{ordinal}] [{label}] {} {outcome}", self.name);
        }
        tracing::info!(ordinal, task = %self.name, %outcome, "{label}");

        self.ordinal = Some(ordinal);
        self.outcome = Some(outcome);
    }

    fn needs_writer(&self) -> bool {
        self.outdir.is_some() || self.errdir.is_some()
    }
}

impl fmt::Debug for ProcessTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessTask")
            .field("name", &self.name)
            .field("status", &self.status)
            .field("outcome", &self.outcome)
            .field("ordinal", &self.ordinal)
            .finish()
    }
}
