//! Per-connection state and lifecycle.
//!
//! One [`Connection`] exists per accepted transport connection. It is driven
//! entirely by events the embedder forwards from the transport layer:
//! received data, acknowledged data, periodic idle polls, and error
//! notification. All waiting is expressed by returning from the event
//! handler; nothing blocks.
//!
//! The send path (the scheduler and its tag-scanning interleave) lives in
//! [`send`], implemented on `Connection`.

mod send;

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::config::ServerConfig;
use crate::headers::HeaderSet;
use crate::resolve::{self, ResolvedResource};
use crate::ssi::TagScanner;
use crate::store::ContentFile;
use crate::transport::Transport;

/// Connection lifecycle state.
///
/// Acceptance is construction: a freshly built record is already registered
/// and awaiting its request line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Waiting for the first received block carrying the request.
    AwaitingRequest,
    /// Request resolved; the send scheduler streams the resource.
    Serving,
    /// Torn down. No further transport calls are made.
    Closed,
}

/// Per-connection record.
///
/// Exclusively owned by the embedder's per-connection driver; every method
/// must be called from that single context.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use tinyhttpd::conn::{ConnState, Connection};
/// use tinyhttpd::config::ServerConfig;
/// use tinyhttpd::store::MemStore;
/// use tinyhttpd::transport::WindowTransport;
///
/// let mut store = MemStore::new();
/// store.insert("/hi.html", &b"<html>hi</html>"[..]);
/// let config = Arc::new(ServerConfig::builder(store).build());
///
/// let mut conn = Connection::new(config);
/// let mut link = WindowTransport::new(4096, 1460);
/// conn.on_received(&mut link, b"GET /hi.html HTTP/1.0\r\n\r\n");
/// assert_eq!(conn.state(), ConnState::Serving);
/// assert!(link.has_queued());
/// ```
pub struct Connection {
    config: Arc<ServerConfig>,
    state: ConnState,
    /// Open resource; at most one per record.
    file: Option<Box<dyn ContentFile>>,
    /// Read buffer; sized lazily at first refill.
    buf: Vec<u8>,
    /// Offset of the first unsent byte in `buf`.
    cursor: usize,
    /// Bytes of `buf` holding valid content.
    filled: usize,
    /// Consecutive idle polls without acknowledged progress.
    retries: u8,
    /// Synthesized response headers with send progress.
    headers: HeaderSet,
    /// Whether the resource is scanned for substitution tags.
    tag_check: bool,
    /// Offset of the first unscanned byte; `cursor <= scan_cursor <= filled`.
    scan_cursor: usize,
    /// Offset where the in-progress tag candidate began.
    tag_start: usize,
    scanner: TagScanner,
    /// Substitution text for the recognized tag. One slot per connection;
    /// a new tag cannot start until this one is fully emitted.
    insert: Vec<u8>,
    insert_sent: usize,
    /// Raw bytes up to this offset (the tag's first byte) are flushed
    /// before any substitution byte.
    emit_boundary: usize,
}

impl Connection {
    /// Allocates the record for a freshly accepted connection.
    pub fn new(config: Arc<ServerConfig>) -> Self {
        let max_tag = config.tuning().max_tag_name_len;
        let max_insert = config.tuning().max_insert_len;
        Self {
            config,
            state: ConnState::AwaitingRequest,
            file: None,
            buf: Vec::new(),
            cursor: 0,
            filled: 0,
            retries: 0,
            headers: HeaderSet::none(),
            tag_check: false,
            scan_cursor: 0,
            tag_start: 0,
            scanner: TagScanner::new(max_tag),
            insert: Vec::with_capacity(max_insert),
            insert_sent: 0,
            emit_boundary: 0,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnState {
        self.state
    }

    /// Consecutive no-progress poll ticks so far.
    pub fn retries(&self) -> u8 {
        self.retries
    }

    /// Data arrived on the connection.
    ///
    /// The first block while awaiting the request is resolved; success moves
    /// to `Serving` and immediately drives the scheduler once, failure
    /// closes the connection. Data received while already serving is ignored
    /// — the in-scope protocol subset has no pipelined requests.
    pub fn on_received(&mut self, transport: &mut dyn Transport, data: &[u8]) {
        match self.state {
            ConnState::AwaitingRequest => match resolve::resolve(&self.config, data) {
                Ok(resolved) => {
                    self.install(resolved);
                    self.state = ConnState::Serving;
                    self.drive_send(transport);
                }
                Err(err) => {
                    debug!(%err, "request not resolvable, closing");
                    self.teardown(transport);
                }
            },
            ConnState::Serving => {
                trace!(len = data.len(), "data received while serving, ignored");
            }
            ConnState::Closed => {}
        }
    }

    /// The transport acknowledged previously written bytes: forward progress,
    /// so the retry counter resets and the scheduler runs again.
    ///
    /// `drive_send` is idempotent, so no re-entrancy guard is needed around
    /// this call.
    pub fn on_acknowledged(&mut self, transport: &mut dyn Transport) {
        if self.state == ConnState::Closed {
            return;
        }
        self.retries = 0;
        self.drive_send(transport);
    }

    /// Periodic idle poll.
    ///
    /// Counts quiet ticks toward the retry ceiling and, while a resource is
    /// open, retries sends that previously stalled on capacity.
    pub fn on_poll(&mut self, transport: &mut dyn Transport) {
        if self.state == ConnState::Closed {
            return;
        }
        self.retries = self.retries.saturating_add(1);
        if self.retries >= self.config.tuning().max_retries {
            debug!(
                retries = self.retries,
                "no progress across retry ceiling, force-closing"
            );
            self.teardown(transport);
            return;
        }
        if self.file.is_some() {
            trace!("idle poll, retrying send");
            self.drive_send(transport);
        }
    }

    /// The transport reported a fatal error; the connection object on its
    /// side is already gone. Releases local state only — no further
    /// transport calls are made.
    pub fn on_error(&mut self) {
        debug!("transport error, releasing connection state");
        self.file = None;
        self.buf = Vec::new();
        self.state = ConnState::Closed;
    }

    /// Wires a resolved resource into the record.
    fn install(&mut self, resolved: ResolvedResource) {
        self.headers = if self.config.dynamic_headers() {
            HeaderSet::for_resource(resolved.name.as_deref())
        } else {
            HeaderSet::none()
        };
        self.file = resolved.file;
        self.tag_check = resolved.tag_check;
        self.retries = 0;
        self.cursor = 0;
        self.filled = 0;
        self.scan_cursor = 0;
        self.tag_start = 0;
        self.insert_sent = 0;
        self.emit_boundary = 0;
    }

    /// Orderly teardown: releases the resource and the read buffer, then
    /// requests a transport close. A close failure is logged, not retried.
    pub(crate) fn teardown(&mut self, transport: &mut dyn Transport) {
        if self.state == ConnState::Closed {
            return;
        }
        debug!("closing connection");
        self.file = None;
        self.buf = Vec::new();
        self.state = ConnState::Closed;
        if let Err(err) = transport.close() {
            warn!(%err, "transport close failed");
        }
    }
}
