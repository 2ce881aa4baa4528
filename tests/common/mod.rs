//! Shared helpers for the integration tests: a capacity-limited transport
//! with failure injection, and a driver that pumps a connection to
//! completion the way an embedding event loop would.

use tinyhttpd::conn::{ConnState, Connection};
use tinyhttpd::transport::{Transport, WindowTransport, WriteError};

/// Wraps a [`WindowTransport`] and rejects any write larger than
/// `reject_over`, even when it fits the window. Models the transient
/// allocation failures that force the scheduler's halving retry.
pub struct FlakyTransport {
    inner: WindowTransport,
    reject_over: usize,
}

impl FlakyTransport {
    pub fn new(window: usize, mss: usize, reject_over: usize) -> Self {
        Self {
            inner: WindowTransport::new(window, mss),
            reject_over,
        }
    }

    pub fn has_queued(&self) -> bool {
        self.inner.has_queued()
    }

    pub fn take_queued(&mut self) -> Vec<u8> {
        self.inner.take_queued().to_vec()
    }
}

impl Transport for FlakyTransport {
    fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    fn mss(&self) -> usize {
        self.inner.mss()
    }

    fn write(&mut self, data: &[u8]) -> Result<(), WriteError> {
        if data.len() > self.reject_over {
            return Err(WriteError::Exhausted);
        }
        self.inner.write(data)
    }

    fn flush(&mut self) {
        self.inner.flush();
    }

    fn close(&mut self) -> Result<(), WriteError> {
        self.inner.close()
    }
}

/// Feeds the request, then drains and acknowledges until the connection
/// closes. Panics if the engine stops making progress.
pub fn serve_once(
    conn: &mut Connection,
    link: &mut WindowTransport,
    request: &[u8],
) -> Vec<u8> {
    conn.on_received(link, request);
    let mut out = Vec::new();
    for _ in 0..100_000 {
        if link.has_queued() {
            out.extend_from_slice(&link.take_queued());
            conn.on_acknowledged(link);
        } else if conn.state() == ConnState::Closed {
            return out;
        } else {
            conn.on_poll(link);
            assert!(
                link.has_queued() || conn.state() == ConnState::Closed,
                "engine stalled with nothing queued"
            );
        }
    }
    panic!("connection did not complete");
}
