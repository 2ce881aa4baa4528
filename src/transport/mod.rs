//! Transport seam — the byte-stream the engine writes responses into.
//!
//! The engine never owns a socket. It is handed a [`Transport`] on every
//! event and writes as much as the transport's *currently reported* capacity
//! allows; everything else waits for the next event. [`WindowTransport`] is
//! the bundled implementation: a bounded in-memory queue standing in for a
//! TCP send buffer, drained by whoever owns the real I/O (the Tokio adapter
//! in [`crate::server`], or a test harness).

use bytes::BytesMut;
use thiserror::Error;
use tracing::trace;

/// Errors produced by [`Transport::write`] and [`Transport::close`].
#[derive(Debug, Error)]
pub enum WriteError {
    /// Transient resource exhaustion: the write did not fit right now.
    /// The caller shrinks the request or defers to the next event.
    #[error("transport capacity exhausted")]
    Exhausted,

    /// The transport is no longer usable.
    #[error("transport closed")]
    Closed,
}

/// A flow-controlled byte sink.
///
/// Capacity is a *moment-in-time* measurement: it shrinks as writes are
/// queued and grows back when the peer acknowledges data. Callers must
/// re-query it on every cycle and never assume it is stable across calls.
pub trait Transport {
    /// Bytes the transport can currently accept without unbounded queuing.
    fn capacity(&self) -> usize;

    /// Maximum segment size. Writes are additionally clamped to a small
    /// multiple of this by the send scheduler.
    fn mss(&self) -> usize;

    /// Queues `data` for transmission.
    ///
    /// # Errors
    ///
    /// [`WriteError::Exhausted`] if the data does not fit right now — the
    /// caller halves and retries. [`WriteError::Closed`] if the transport
    /// is gone.
    fn write(&mut self, data: &[u8]) -> Result<(), WriteError>;

    /// Pushes queued data toward the network. Called once per drive cycle
    /// after all writes, never per write.
    fn flush(&mut self);

    /// Requests an orderly close.
    ///
    /// # Errors
    ///
    /// Close failures are logged by the caller, never retried.
    fn close(&mut self) -> Result<(), WriteError>;
}

/// A bounded in-memory send window.
///
/// Models the original raw-TCP send buffer: `capacity()` is the window minus
/// the queued backlog, and the queue only shrinks when the owner drains it
/// (via [`take_queued`](Self::take_queued)) and feeds the resulting
/// acknowledgment back into the connection.
///
/// # Examples
///
/// ```
/// use tinyhttpd::transport::{Transport, WindowTransport};
///
/// let mut link = WindowTransport::new(8, 4);
/// assert_eq!(link.capacity(), 8);
/// link.write(b"hello").unwrap();
/// assert_eq!(link.capacity(), 3);
/// assert!(link.write(b"worldwide").is_err()); // over the window
///
/// let drained = link.take_queued();
/// assert_eq!(&drained[..], b"hello");
/// assert_eq!(link.capacity(), 8);
/// ```
#[derive(Debug)]
pub struct WindowTransport {
    queue: BytesMut,
    window: usize,
    mss: usize,
    flush_requested: bool,
    close_requested: bool,
}

impl WindowTransport {
    /// Creates a window of `window` bytes with the given segment size.
    pub fn new(window: usize, mss: usize) -> Self {
        Self {
            queue: BytesMut::with_capacity(window),
            window,
            mss,
            flush_requested: false,
            close_requested: false,
        }
    }

    /// Returns `true` if a flush was requested since the last drain.
    pub fn flush_requested(&self) -> bool {
        self.flush_requested
    }

    /// Returns `true` if the engine asked for an orderly close.
    pub fn close_requested(&self) -> bool {
        self.close_requested
    }

    /// Returns `true` if any bytes are queued.
    pub fn has_queued(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Drains and returns everything queued so far, restoring the full
    /// window. The owner writes the returned bytes to the real stream and
    /// then reports the acknowledgment to the connection.
    pub fn take_queued(&mut self) -> BytesMut {
        self.flush_requested = false;
        let len = self.queue.len();
        let out = self.queue.split_to(len);
        trace!(drained = len, "send window drained");
        out
    }

    /// Drains at most `max` queued bytes, simulating a peer that
    /// acknowledges in pieces. Used by tests exercising partial progress.
    pub fn take_queued_at_most(&mut self, max: usize) -> BytesMut {
        let len = self.queue.len().min(max);
        if len == self.queue.len() {
            self.flush_requested = false;
        }
        self.queue.split_to(len)
    }
}

impl Transport for WindowTransport {
    fn capacity(&self) -> usize {
        self.window.saturating_sub(self.queue.len())
    }

    fn mss(&self) -> usize {
        self.mss
    }

    fn write(&mut self, data: &[u8]) -> Result<(), WriteError> {
        if self.close_requested {
            return Err(WriteError::Closed);
        }
        if data.len() > self.capacity() {
            return Err(WriteError::Exhausted);
        }
        self.queue.extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) {
        self.flush_requested = true;
    }

    fn close(&mut self) -> Result<(), WriteError> {
        self.close_requested = true;
        Ok(())
    }
}
