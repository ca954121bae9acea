//! # fleetrun
//!
//! **fleetrun** is the execution engine behind a fleet command runner: it
//! launches many independent units of work (typically one remote command
//! per host), bounds how many run at once, enforces a per-task timeout,
//! multiplexes their I/O on a single thread, and reports every completion
//! with a deterministic ordinal.
//!
//! The engine is built from three parts:
//!
//! - A **manager** ([`Manager`]) that admits queued tasks in FIFO order up to
//!   a concurrency limit, drives the reactor with an adaptive wait, asks
//!   timed-out tasks to terminate, and turns SIGINT into a graceful abort
//! - A **reactor** ([`IoMap`]) mapping descriptors to handlers on top of
//!   `epoll` (Linux) or `poll(2)` (other Unix targets)
//! - A **writer** ([`Writer`]) thread that performs the blocking file writes
//!   the reactor thread must never do itself
//!
//! Tasks plug in through the [`Task`] trait. [`ProcessTask`] runs a local
//! [`Command`](std::process::Command) and is a complete example of the
//! contract.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fleetrun::{Manager, ManagerBuilder, ProcessTask};
//! use std::process::Command;
//! use std::time::Duration;
//!
//! fn main() -> fleetrun::Result<()> {
//!     let mut manager: Manager<ProcessTask> = ManagerBuilder::new()
//!         .limit(32)
//!         .timeout(Duration::from_secs(60))
//!         .build()?;
//!
//!     for host in ["web1", "web2", "db1"] {
//!         let mut command = Command::new("ssh");
//!         command.arg(host).arg("uptime");
//!         manager.add_task(ProcessTask::new(host, command).outdir("out"));
//!     }
//!
//!     manager.run()
//! }
//! ```
//!
//! ## Threads
//!
//! The manager loop and every handler run on the thread calling
//! [`Manager::run`]. The writer thread, spawned only when a task asks for
//! file output, is the only other thread; the two share nothing but the
//! writer's request channel.

mod error;
mod manager;
mod process;
mod reactor;
mod writer;

pub use error::{Error, Result};
pub use manager::{AbortHandle, Manager, ManagerBuilder, Task};
pub use process::{Outcome, ProcessTask};
pub use reactor::{Handler, Interest, IoMap, Ready};
pub use writer::{Destination, WriteHandle, Writer};
