use super::Destination;

use std::io::Write;
use std::path::PathBuf;

/// A request processed by the writer thread.
///
/// Requests are handled strictly in submission order.
pub(crate) enum Request {
    /// Attach an already opened sink to `dest`.
    Open {
        dest: Destination,
        sink: Box<dyn Write + Send>,
    },

    /// Create (truncate) the file at `path` and attach it to `dest`.
    Create { dest: Destination, path: PathBuf },

    /// Append `payload` to `dest`.
    Data {
        dest: Destination,
        payload: Vec<u8>,
    },

    /// Flush and close `dest`.
    Close { dest: Destination },

    /// Stop the writer loop. Requests queued behind it are dropped.
    Shutdown,
}
