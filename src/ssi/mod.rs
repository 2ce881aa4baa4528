//! Server-side-include tag scanner.
//!
//! A byte-at-a-time automaton that recognizes `<!--#name-->` markers in
//! served content. The scanner holds no buffer of its own beyond the bounded
//! token accumulator, so a marker split across content-block refills at any
//! byte is recognized identically to one presented whole: the caller simply
//! keeps feeding bytes as they arrive.
//!
//! Whitespace is permitted between the leadin and the name and between the
//! name and the leadout. Names longer than the configured maximum abort the
//! tag; the consumed bytes then ship as ordinary content.

use std::borrow::Cow;

use tracing::trace;

/// Fixed byte sequence opening a tag.
pub const TAG_LEADIN: &[u8] = b"<!--#";

/// Fixed byte sequence closing a tag.
pub const TAG_LEADOUT: &[u8] = b"-->";

/// Scanner state. One token is in flight at a time: a new tag cannot begin
/// until [`TagScanner::finish_emission`] returns the scanner to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagState {
    /// Watching for the first leadin byte.
    Idle,
    /// Matching the remainder of the leadin sequence.
    LeadIn,
    /// Accumulating the tag name.
    Name,
    /// Matching the leadout sequence.
    LeadOut,
    /// A complete tag was recognized; its substitution is being emitted.
    Emitting,
}

/// Outcome of consuming one byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStep {
    /// Byte consumed; keep feeding.
    Consumed,
    /// Byte consumed and a complete tag is now available via
    /// [`TagScanner::tag_name`]. The scanner is in [`TagState::Emitting`]
    /// and must not be fed again until `finish_emission`.
    TagComplete,
}

/// The tag-recognition automaton.
///
/// # Examples
///
/// ```
/// use tinyhttpd::ssi::{ScanStep, TagScanner};
///
/// let mut scanner = TagScanner::new(8);
/// let mut found = None;
/// for &b in b"body <!--#title--> tail" {
///     if scanner.step(b) == ScanStep::TagComplete {
///         found = Some(scanner.tag_name().into_owned());
///         scanner.finish_emission();
///     }
/// }
/// assert_eq!(found.as_deref(), Some("title"));
/// ```
#[derive(Debug)]
pub struct TagScanner {
    state: TagState,
    /// Position within the leadin/leadout sequence currently being matched.
    match_index: usize,
    token: Vec<u8>,
    max_name_len: usize,
}

fn is_tag_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\r' | b'\n')
}

impl TagScanner {
    /// Creates a scanner accepting tag names up to `max_name_len` bytes.
    pub fn new(max_name_len: usize) -> Self {
        Self {
            state: TagState::Idle,
            match_index: 0,
            token: Vec::with_capacity(max_name_len),
            max_name_len,
        }
    }

    /// Current state.
    pub fn state(&self) -> TagState {
        self.state
    }

    /// Returns `true` while a recognized tag's substitution is being emitted.
    pub fn is_emitting(&self) -> bool {
        self.state == TagState::Emitting
    }

    /// Returns `true` while a tag candidate is partially matched (leadin,
    /// name, or leadout in progress).
    pub fn in_match(&self) -> bool {
        matches!(
            self.state,
            TagState::LeadIn | TagState::Name | TagState::LeadOut
        )
    }

    /// Abandons the current candidate: its bytes are ordinary content.
    ///
    /// Used when the candidate can no longer complete — the resource ended
    /// inside it, or it outgrew the read buffer.
    pub fn abort_match(&mut self) {
        debug_assert!(self.in_match());
        self.state = TagState::Idle;
        self.match_index = 0;
        self.token.clear();
    }

    /// The completed tag name. Meaningful from [`ScanStep::TagComplete`]
    /// until [`finish_emission`](Self::finish_emission).
    pub fn tag_name(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.token)
    }

    /// Marks the current substitution fully emitted and resumes scanning.
    pub fn finish_emission(&mut self) {
        debug_assert_eq!(self.state, TagState::Emitting);
        self.state = TagState::Idle;
        self.match_index = 0;
        self.token.clear();
    }

    /// Consumes one content byte.
    ///
    /// Must not be called while [`is_emitting`](Self::is_emitting) — the
    /// single substitution slot is busy until the connection drains it.
    pub fn step(&mut self, byte: u8) -> ScanStep {
        match self.state {
            TagState::Idle => {
                if byte == TAG_LEADIN[0] {
                    self.state = TagState::LeadIn;
                    self.match_index = 1;
                }
                ScanStep::Consumed
            }

            TagState::LeadIn => {
                if byte == TAG_LEADIN[self.match_index] {
                    self.match_index += 1;
                    if self.match_index == TAG_LEADIN.len() {
                        self.state = TagState::Name;
                        self.match_index = 0;
                        self.token.clear();
                    }
                } else {
                    self.state = TagState::Idle;
                }
                ScanStep::Consumed
            }

            TagState::Name => {
                if self.token.is_empty() && is_tag_whitespace(byte) {
                    // Whitespace between leadin and the first name byte.
                    return ScanStep::Consumed;
                }
                if byte == TAG_LEADOUT[0] || is_tag_whitespace(byte) {
                    if self.token.is_empty() {
                        // Zero-length name: not a tag.
                        self.state = TagState::Idle;
                    } else {
                        // If the terminator was the first leadout byte, the
                        // leadout match starts one byte in.
                        self.state = TagState::LeadOut;
                        self.match_index = usize::from(byte == TAG_LEADOUT[0]);
                    }
                } else if self.token.len() < self.max_name_len {
                    self.token.push(byte);
                } else {
                    // Name too long: abort, bytes pass through as content.
                    trace!(limit = self.max_name_len, "tag name over limit, abandoned");
                    self.state = TagState::Idle;
                    self.token.clear();
                }
                ScanStep::Consumed
            }

            TagState::LeadOut => {
                if self.match_index == 0 && is_tag_whitespace(byte) {
                    // Whitespace between the name and the leadout.
                    return ScanStep::Consumed;
                }
                if byte == TAG_LEADOUT[self.match_index] {
                    self.match_index += 1;
                    if self.match_index == TAG_LEADOUT.len() {
                        return self.complete();
                    }
                } else {
                    self.state = TagState::Idle;
                    self.token.clear();
                }
                ScanStep::Consumed
            }

            TagState::Emitting => {
                debug_assert!(false, "step() called while emitting");
                ScanStep::Consumed
            }
        }
    }

    fn complete(&mut self) -> ScanStep {
        trace!(tag = %self.tag_name(), "tag recognized");
        self.state = TagState::Emitting;
        self.match_index = 0;
        ScanStep::TagComplete
    }
}
