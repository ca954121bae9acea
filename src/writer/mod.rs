//! Blocking-write offload thread.
//!
//! Ordinary files have no non-blocking write, so a write to one would stall
//! the reactor thread. The [`Writer`] owns a single background thread that
//! performs every such write. Producers enqueue through a cloneable
//! [`WriteHandle`] in constant time and never touch the file themselves.
//!
//! One consumer drains one FIFO channel, so the writes of a destination are
//! applied in the order they were submitted. There is no ordering between
//! different destinations beyond that.
//!
//! A failing destination is logged and quarantined until it is closed: its
//! later writes are discarded while every other destination keeps being
//! served. A sink that panics is treated as a failing one.

mod command;

use crate::error::{Error, Result};
use command::Request;

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread::{self, JoinHandle};

/// Identifier of an output destination owned by the writer thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Destination(u64);

impl Destination {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Cloneable, thread-safe producer side of the writer.
///
/// All methods return immediately. Once the writer has shut down,
/// further requests are silently dropped.
#[derive(Clone)]
pub struct WriteHandle {
    sender: Sender<Request>,
    next_id: Arc<AtomicU64>,
}

impl WriteHandle {
    /// Hands an already opened sink to the writer thread.
    pub fn open<W>(&self, sink: W) -> Destination
    where
        W: Write + Send + 'static,
    {
        let dest = self.allocate();
        self.send(Request::Open {
            dest,
            sink: Box::new(sink),
        });
        dest
    }

    /// Asks the writer thread to create (or truncate) the file at `path`.
    ///
    /// The file is opened on the writer thread. If that fails, the error is
    /// logged there and every write to the returned destination is dropped.
    pub fn create(&self, path: impl Into<PathBuf>) -> Destination {
        let dest = self.allocate();
        self.send(Request::Create {
            dest,
            path: path.into(),
        });
        dest
    }

    /// Enqueues `payload` for `dest`.
    pub fn write(&self, dest: Destination, payload: impl Into<Vec<u8>>) {
        self.send(Request::Data {
            dest,
            payload: payload.into(),
        });
    }

    /// Closes `dest` once everything queued before this call is written.
    pub fn close(&self, dest: Destination) {
        self.send(Request::Close { dest });
    }

    fn allocate(&self) -> Destination {
        Destination(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn send(&self, request: Request) {
        if self.sender.send(request).is_err() {
            tracing::trace!("writer is gone, dropping request");
        }
    }
}

/// The writer thread.
///
/// Spawned once per run when at least one task writes to files, and
/// joined through [`shutdown`](Self::shutdown) so that every queued write
/// has reached its destination before the run returns.
pub struct Writer {
    handle: WriteHandle,

    thread: Option<JoinHandle<()>>,
}

impl Writer {
    /// Starts the writer thread.
    pub fn spawn() -> Result<Self> {
        let (sender, receiver) = channel();

        let thread = thread::Builder::new()
            .name("fleetrun-writer".into())
            .spawn(move || Worker::new(receiver).run())?;

        Ok(Self {
            handle: WriteHandle {
                sender,
                next_id: Arc::new(AtomicU64::new(0)),
            },
            thread: Some(thread),
        })
    }

    /// Returns a producer handle.
    pub fn handle(&self) -> WriteHandle {
        self.handle.clone()
    }

    /// Requests shutdown and waits for the thread to exit.
    ///
    /// Requests enqueued before this call are processed first.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> Result<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };

        self.handle.send(Request::Shutdown);
        thread.join().map_err(|_| Error::WriterPanicked)
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// State of a destination as seen by the writer thread.
enum Slot {
    Open(Box<dyn Write + Send>),

    /// Failed; later writes are discarded until the destination is closed.
    Retired,
}

/// Consumer side, running on the writer thread.
struct Worker {
    receiver: Receiver<Request>,
    slots: HashMap<Destination, Slot>,
}

impl Worker {
    fn new(receiver: Receiver<Request>) -> Self {
        Self {
            receiver,
            slots: HashMap::new(),
        }
    }

    fn run(mut self) {
        while let Ok(request) = self.receiver.recv() {
            match request {
                Request::Open { dest, sink } => {
                    self.slots.insert(dest, Slot::Open(sink));
                }
                Request::Create { dest, path } => match File::create(&path) {
                    Ok(file) => {
                        tracing::debug!(dest = dest.0, path = %path.display(), "created output file");
                        self.slots
                            .insert(dest, Slot::Open(Box::new(BufWriter::new(file))));
                    }
                    Err(err) => {
                        tracing::warn!(path = %path.display(), "failed to create output file: {}", err);
                        self.slots.insert(dest, Slot::Retired);
                    }
                },
                Request::Data { dest, payload } => self.write(dest, &payload),
                Request::Close { dest } => self.close(dest),
                Request::Shutdown => break,
            }
        }

        self.flush_all();
    }

    fn write(&mut self, dest: Destination, payload: &[u8]) {
        let Some(Slot::Open(sink)) = self.slots.get_mut(&dest) else {
            tracing::trace!(dest = dest.0, "discarding write to inactive destination");
            return;
        };

        if let Err(err) = guarded(|| sink.write_all(payload)) {
            tracing::warn!(dest = dest.0, "write failed, dropping destination: {}", err);
            self.slots.insert(dest, Slot::Retired);
        }
    }

    fn close(&mut self, dest: Destination) {
        if let Some(Slot::Open(mut sink)) = self.slots.remove(&dest) {
            if let Err(err) = guarded(|| sink.flush()) {
                tracing::warn!(dest = dest.0, "flush on close failed: {}", err);
            }
            tracing::debug!(dest = dest.0, "closed destination");
        }
    }

    fn flush_all(&mut self) {
        for (dest, slot) in self.slots.drain() {
            if let Slot::Open(mut sink) = slot {
                if let Err(err) = guarded(|| sink.flush()) {
                    tracing::warn!(dest = dest.0, "flush on shutdown failed: {}", err);
                }
            }
        }
    }
}

/// Runs one sink operation, turning a panic into an error.
fn guarded<F>(op: F) -> io::Result<()>
where
    F: FnOnce() -> io::Result<()>,
{
    panic::catch_unwind(AssertUnwindSafe(op))
        .unwrap_or_else(|_| Err(io::Error::other("sink panicked")))
}
