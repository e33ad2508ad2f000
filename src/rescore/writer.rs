//! The output writer: accepts a serialized record buffer keyed by query, and
//! is expected to be safely shareable across worker threads
//! (`spec.md §1`/`§5`). Mirrors the `AlignmentWriterThreaded` pattern used for
//! SAM output elsewhere in this codebase, generalized to an arbitrary
//! `(queryKey, buffer)` sink instead of one fixed record format.

use std::io::Write;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

/// Accepts a query's fully serialized record buffer.
///
/// Implementations must tolerate concurrent calls from different worker
/// threads (`spec.md §5`: "Writers are thread-safe by key").
pub trait ResultWriter: Send {
    type Error: std::error::Error;

    /// Writes `buffer` (already newline-terminated per record) for `query_key`.
    fn write_query(&mut self, query_key: u32, buffer: String) -> Result<(), Self::Error>;
}

/// An error writing through [`ThreadedResultWriter`].
#[derive(Debug)]
pub enum ThreadedWriteError {
    /// An IO error from the dedicated writer thread, surfaced once it is
    /// known (e.g. by joining the thread after the channel breaks).
    Io(std::io::Error),
    /// The writer thread's receiver is gone and the cause could not be
    /// determined (e.g. the writer was already flushed).
    ReceiverDeallocated,
}

impl std::fmt::Display for ThreadedWriteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "{e}"),
            Self::ReceiverDeallocated => write!(f, "writer thread receiver has been deallocated"),
        }
    }
}

impl std::error::Error for ThreadedWriteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::ReceiverDeallocated => None,
        }
    }
}

/// A clonable writer that funnels every query's buffer through an [`mpsc`]
/// channel to a single dedicated writer thread, so concurrent worker threads
/// never interleave output.
///
/// The thread handle lives only on the originally constructed copy; later
/// clones share the sender. Call [`flush`](Self::flush) on the original to
/// finalize the thread and propagate any I/O error.
pub struct ThreadedResultWriter {
    sender:        mpsc::Sender<(u32, String)>,
    writer_thread: Option<JoinHandle<std::io::Result<()>>>,
}

impl Clone for ThreadedResultWriter {
    fn clone(&self) -> Self {
        Self {
            sender:        self.sender.clone(),
            writer_thread: None,
        }
    }
}

impl ThreadedResultWriter {
    /// Spawns the dedicated writer thread over `sink`. The query key is
    /// written as a prefix comment line so the output stream remains
    /// self-addressing even though buffers can arrive out of query order
    /// (`spec.md §5`: "no ordering guarantee... each record is self-addressed
    /// by query key").
    #[must_use]
    pub fn from_writer<W>(mut sink: W) -> Self
    where
        W: Write + Send + 'static, {
        let (sender, receiver) = mpsc::channel::<(u32, String)>();
        let writer_thread = thread::spawn(move || -> std::io::Result<()> {
            while let Ok((_query_key, buffer)) = receiver.recv() {
                sink.write_all(buffer.as_bytes())?;
            }
            sink.flush()
        });

        Self {
            sender,
            writer_thread: Some(writer_thread),
        }
    }

    /// Finalizes the writer, joining the dedicated thread and propagating
    /// any I/O error it encountered.
    ///
    /// Must be called on at least the originally constructed writer.
    pub fn flush(self) -> std::io::Result<()> {
        if let Some(thread) = self.writer_thread {
            drop(self.sender);
            thread.join().unwrap()
        } else {
            Ok(())
        }
    }
}

impl ResultWriter for ThreadedResultWriter {
    type Error = ThreadedWriteError;

    fn write_query(&mut self, query_key: u32, buffer: String) -> Result<(), Self::Error> {
        self.sender.send((query_key, buffer)).map_err(|_| {
            if let Some(thread) = std::mem::take(&mut self.writer_thread) {
                match thread.join().unwrap() {
                    Ok(()) => ThreadedWriteError::ReceiverDeallocated,
                    Err(e) => ThreadedWriteError::Io(e),
                }
            } else {
                ThreadedWriteError::ReceiverDeallocated
            }
        })
    }
}

/// An in-memory [`ResultWriter`] collecting `(queryKey, buffer)` pairs,
/// useful for driver/orchestrator tests that need to assert on exact output.
#[derive(Debug, Default)]
pub struct InMemoryWriter {
    pub records: Vec<(u32, String)>,
}

impl InMemoryWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultWriter for InMemoryWriter {
    type Error = std::convert::Infallible;

    fn write_query(&mut self, query_key: u32, buffer: String) -> Result<(), Self::Error> {
        self.records.push((query_key, buffer));
        Ok(())
    }
}
