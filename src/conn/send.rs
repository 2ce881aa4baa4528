//! The send scheduler: emits headers, raw content, and tag substitutions
//! within whatever capacity the transport currently reports.
//!
//! One call to [`Connection::drive_send`] is one cycle. A cycle writes at
//! most what fits, flushes once at the end if anything was queued, and
//! leaves every cursor positioned so the next driving event (acknowledgment
//! or idle poll) resumes exactly where this one stopped.

use tracing::{debug, trace};

use crate::ssi::{ScanStep, TagState};
use crate::store::ReadOutcome;
use crate::transport::{Transport, WriteError};

use super::{ConnState, Connection};

/// Bookkeeping for one drive cycle.
#[derive(Default)]
struct Cycle {
    /// Whether any bytes were queued on the transport this cycle.
    queued: bool,
}

/// Outcome of a buffer refill attempt.
enum Refill {
    /// New content is buffered; cursors were reset.
    Filled,
    /// Nothing could be done this cycle (no buffer memory); retry on the
    /// next driving event.
    Stalled,
    /// The resource ended and the connection was torn down.
    Finished,
}

/// Writes `data`, halving the length on transient exhaustion until a write
/// succeeds or the length reaches zero. Returns the number of bytes queued.
fn write_shrinking(transport: &mut dyn Transport, data: &[u8], cycle: &mut Cycle) -> usize {
    let mut len = data.len();
    while len > 0 {
        match transport.write(&data[..len]) {
            Ok(()) => {
                cycle.queued = true;
                return len;
            }
            Err(WriteError::Exhausted) => len /= 2,
            Err(err) => {
                debug!(%err, "write failed, deferring");
                return 0;
            }
        }
    }
    0
}

impl Connection {
    /// Runs one send cycle: emits as much as the transport's current
    /// capacity allows and flushes if anything was queued.
    ///
    /// Idempotent and safe to call from any event handler; a cycle with no
    /// room to make progress simply returns.
    pub fn drive_send(&mut self, transport: &mut dyn Transport) {
        if self.state != ConnState::Serving {
            return;
        }
        let mut cycle = Cycle::default();

        if !self.headers.is_done() {
            self.send_headers(transport, &mut cycle);
            // Headers still pending, or there is no resource at all (the
            // built-in notice): nothing more this cycle. With the notice,
            // the next cycle's refill performs the teardown.
            if !self.headers.is_done() || self.file.is_none() {
                finish_cycle(transport, &cycle);
                return;
            }
        }

        // A block can be consumed entirely by tag matching without queuing
        // a single byte; keep pulling blocks within the cycle until
        // something reaches the wire (or the resource ends), so wire-level
        // progress — and with it the acknowledgment that resets the retry
        // counter — is never starved by scanning.
        loop {
            if self.needs_refill() {
                match self.refill(transport) {
                    Refill::Filled => {}
                    Refill::Stalled | Refill::Finished => break,
                }
            }

            let before = (self.cursor, self.scan_cursor);
            if self.tag_check {
                self.drive_scanned(transport, &mut cycle);
            } else {
                self.send_raw_chunk(transport, &mut cycle);
            }

            if cycle.queued || (self.cursor, self.scan_cursor) == before {
                break;
            }
        }

        finish_cycle(transport, &cycle);
    }

    /// Sends pending header strings within current capacity.
    fn send_headers(&mut self, transport: &mut dyn Transport, cycle: &mut Cycle) {
        while let Some(chunk) = self.headers.remaining() {
            let len = chunk.len().min(transport.capacity());
            if len == 0 {
                return;
            }
            let sent = write_shrinking(transport, &chunk[..len], cycle);
            if sent == 0 {
                return;
            }
            self.headers.advance(sent);
        }
    }

    /// Returns `true` when every buffered byte has been fully consumed and
    /// a new content block is needed.
    ///
    /// With scanning enabled this additionally requires that scanning
    /// caught up and no substitution is in flight — the one-token slot must
    /// drain before its backing buffer may be replaced.
    fn needs_refill(&self) -> bool {
        if self.tag_check {
            self.scan_cursor == self.filled
                && self.cursor == self.raw_frontier()
                && !self.scanner.is_emitting()
        } else {
            self.cursor == self.filled
        }
    }

    /// Reads the next content block into the buffer.
    fn refill(&mut self, transport: &mut dyn Transport) -> Refill {
        if self.file.is_none() {
            self.teardown(transport);
            return Refill::Finished;
        }
        if !self.ensure_buffer(transport.mss()) {
            return Refill::Stalled;
        }

        // A tag candidate still being matched keeps its bytes: they are
        // moved to the front so the match can continue into the new block,
        // and they ship verbatim if the match later fails.
        let pending = if self.tag_check && self.scanner.in_match() {
            let len = self.filled - self.tag_start;
            self.buf.copy_within(self.tag_start..self.filled, 0);
            self.tag_start = 0;
            len
        } else {
            0
        };

        let Some(file) = self.file.as_mut() else {
            return Refill::Stalled;
        };
        match file.read(&mut self.buf[pending..]) {
            ReadOutcome::End => {
                if pending > 0 {
                    // The resource ended inside a candidate, so it can
                    // never complete; its bytes become ordinary content.
                    self.scanner.abort_match();
                    self.cursor = 0;
                    self.scan_cursor = pending;
                    self.filled = pending;
                    Refill::Filled
                } else {
                    trace!("end of resource");
                    self.teardown(transport);
                    Refill::Finished
                }
            }
            ReadOutcome::Data(n) => {
                trace!(bytes = n, "content block read");
                self.cursor = 0;
                self.scan_cursor = pending;
                self.filled = pending + n;
                Refill::Filled
            }
        }
    }

    /// Sizes the read buffer at first use: the tuning override or twice the
    /// MSS, halving under allocation pressure down to the configured floor.
    fn ensure_buffer(&mut self, mss: usize) -> bool {
        if !self.buf.is_empty() {
            return true;
        }
        let tuning = self.config.tuning();
        let floor = tuning.read_buffer_floor.max(1);
        let mut count = tuning.read_buffer_size.unwrap_or(2 * mss).max(1);
        loop {
            match self.buf.try_reserve_exact(count) {
                Ok(()) => {
                    self.buf.resize(count, 0);
                    trace!(bytes = count, "read buffer sized");
                    return true;
                }
                Err(_) if count / 2 >= floor => count /= 2,
                Err(_) => {
                    debug!("no memory for a read buffer, deferring");
                    return false;
                }
            }
        }
    }

    /// Non-scanned content: one chunk per cycle, clamped to capacity and
    /// the segment multiple.
    fn send_raw_chunk(&mut self, transport: &mut dyn Transport, cycle: &mut Cycle) {
        let avail = self.filled - self.cursor;
        let len = avail.min(transport.capacity()).min(2 * transport.mss());
        if len == 0 {
            return;
        }
        let sent = write_shrinking(transport, &self.buf[self.cursor..self.cursor + len], cycle);
        self.cursor += sent;
    }

    /// First raw byte that may not be sent yet: scanning never lags behind
    /// sent bytes, and a tag candidate's bytes are withheld until its fate
    /// is known.
    fn raw_frontier(&self) -> usize {
        if self.scanner.in_match() || self.scanner.is_emitting() {
            self.tag_start
        } else {
            self.scan_cursor
        }
    }

    /// Sends already-scanned raw bytes up to the current frontier.
    fn send_scanned_backlog(&mut self, transport: &mut dyn Transport, cycle: &mut Cycle) {
        while self.cursor < self.raw_frontier() {
            let avail = self.raw_frontier() - self.cursor;
            let len = avail.min(transport.capacity()).min(2 * transport.mss());
            if len == 0 {
                return;
            }
            let sent =
                write_shrinking(transport, &self.buf[self.cursor..self.cursor + len], cycle);
            if sent == 0 {
                return;
            }
            self.cursor += sent;
        }
    }

    /// Scanned content: drain any in-flight substitution, ship the scanned
    /// backlog, then scan forward, emitting substitutions as tags complete.
    fn drive_scanned(&mut self, transport: &mut dyn Transport, cycle: &mut Cycle) {
        // A candidate spanning the entire buffer can never complete — there
        // is no room left to match into. Ship it as ordinary content.
        if self.scanner.in_match()
            && self.tag_start == 0
            && self.filled > 0
            && self.filled == self.buf.len()
        {
            trace!("tag candidate fills the buffer, treating as content");
            self.scanner.abort_match();
        }

        if self.scanner.is_emitting() && !self.emit_substitution(transport, cycle) {
            return;
        }

        self.send_scanned_backlog(transport, cycle);
        if transport.capacity() == 0 {
            return;
        }

        while self.scan_cursor < self.filled {
            let byte = self.buf[self.scan_cursor];
            let was_idle = self.scanner.state() == TagState::Idle;
            let step = self.scanner.step(byte);
            if was_idle && self.scanner.state() != TagState::Idle {
                self.tag_start = self.scan_cursor;
            }
            self.scan_cursor += 1;

            if step == ScanStep::TagComplete {
                let tag = self.scanner.tag_name().into_owned();
                trace!(tag = %tag, "substituting");
                self.config.substitute(&tag, &mut self.insert);
                self.insert_sent = 0;
                self.emit_boundary = self.tag_start;
                if !self.emit_substitution(transport, cycle) {
                    return;
                }
            }
        }

        if !self.scanner.is_emitting() {
            self.send_scanned_backlog(transport, cycle);
        }
    }

    /// Emits a recognized tag's output: raw bytes up to the emission
    /// boundary strictly first, then the substitution itself. Returns
    /// `false` if capacity ran out with emission still pending.
    fn emit_substitution(&mut self, transport: &mut dyn Transport, cycle: &mut Cycle) -> bool {
        while self.cursor < self.emit_boundary {
            let avail = self.emit_boundary - self.cursor;
            let len = avail.min(transport.capacity()).min(2 * transport.mss());
            if len == 0 {
                return false;
            }
            let sent =
                write_shrinking(transport, &self.buf[self.cursor..self.cursor + len], cycle);
            if sent == 0 {
                return false;
            }
            self.cursor += sent;
        }

        while self.insert_sent < self.insert.len() {
            let avail = self.insert.len() - self.insert_sent;
            let len = avail.min(transport.capacity()).min(2 * transport.mss());
            if len == 0 {
                return false;
            }
            let sent = write_shrinking(
                transport,
                &self.insert[self.insert_sent..self.insert_sent + len],
                cycle,
            );
            if sent == 0 {
                return false;
            }
            self.insert_sent += sent;
        }

        // The marker bytes themselves are skipped: the substitution stands
        // in for the whole tag on the wire.
        self.cursor = self.scan_cursor;
        self.scanner.finish_emission();
        true
    }
}

/// Flushes queued data toward the network at the end of a cycle.
fn finish_cycle(transport: &mut dyn Transport, cycle: &Cycle) {
    if cycle.queued {
        transport.flush();
    }
}
