//! Content store — the resource backing behind served URIs.
//!
//! The engine never touches the filesystem directly; it opens named
//! resources through [`ContentStore`] and pulls bytes through
//! [`ContentFile`]. [`MemStore`] is the bundled in-memory implementation,
//! suitable for embedded-style deployments where the served site is baked
//! into the binary, and for tests.

use std::collections::HashMap;

use bytes::Bytes;
use thiserror::Error;

/// Errors produced when opening a resource.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no resource named {name:?}")]
    NotFound { name: String },
}

/// Result of a single [`ContentFile::read`] call.
///
/// `End` is a distinct signal rather than `Data(0)`: a zero-byte read still
/// refills (and resets) the connection's buffer cursors, while `End` tells
/// the engine the resource is finished and the connection can be torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes were copied into the destination buffer.
    Data(usize),
    /// The resource has no more data.
    End,
}

/// A named, read-only resource backing.
///
/// Implementations must be cheap to call from event-handler context: `open`
/// may not block.
pub trait ContentStore: Send + Sync {
    /// Opens the resource with the given name.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if no resource has that name.
    fn open(&self, name: &str) -> Result<Box<dyn ContentFile>, StoreError>;
}

/// An open resource handle. Closing is dropping.
pub trait ContentFile: Send {
    /// Copies up to `buf.len()` bytes into `buf`.
    ///
    /// Returns [`ReadOutcome::End`] once all data has been consumed by
    /// earlier reads. Must not block.
    fn read(&mut self, buf: &mut [u8]) -> ReadOutcome;

    /// Total resource length in bytes, if known up front.
    fn len(&self) -> Option<usize> {
        None
    }
}

/// In-memory content store: a map from resource name to payload.
///
/// Payloads are stored as [`Bytes`], so opening a resource is a cheap
/// reference-counted clone rather than a copy.
///
/// # Examples
///
/// ```
/// use tinyhttpd::store::{ContentStore, MemStore, ReadOutcome};
///
/// let mut store = MemStore::new();
/// store.insert("/index.html", &b"<html>hi</html>"[..]);
///
/// let mut file = store.open("/index.html").unwrap();
/// let mut buf = [0u8; 64];
/// assert_eq!(file.read(&mut buf), ReadOutcome::Data(15));
/// assert_eq!(file.read(&mut buf), ReadOutcome::End);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemStore {
    files: HashMap<String, Bytes>,
    chunk_limit: Option<usize>,
}

impl MemStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a resource.
    pub fn insert(&mut self, name: impl Into<String>, data: impl Into<Bytes>) {
        self.files.insert(name.into(), data.into());
    }

    /// Caps every read at `limit` bytes, regardless of how much room the
    /// destination buffer has. Models a backing that delivers data in small
    /// blocks and forces the engine's refill path at arbitrary offsets.
    pub fn set_chunk_limit(&mut self, limit: usize) {
        self.chunk_limit = Some(limit.max(1));
    }

    /// Returns `true` if a resource with that name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }
}

impl ContentStore for MemStore {
    fn open(&self, name: &str) -> Result<Box<dyn ContentFile>, StoreError> {
        match self.files.get(name) {
            Some(data) => Ok(Box::new(MemFile {
                data: data.clone(),
                pos: 0,
                chunk_limit: self.chunk_limit,
            })),
            None => Err(StoreError::NotFound {
                name: name.to_owned(),
            }),
        }
    }
}

/// Open handle into a [`MemStore`] resource.
struct MemFile {
    data: Bytes,
    pos: usize,
    chunk_limit: Option<usize>,
}

impl ContentFile for MemFile {
    fn read(&mut self, buf: &mut [u8]) -> ReadOutcome {
        if self.pos >= self.data.len() {
            return ReadOutcome::End;
        }
        let mut n = buf.len().min(self.data.len() - self.pos);
        if let Some(limit) = self.chunk_limit {
            n = n.min(limit);
        }
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        ReadOutcome::Data(n)
    }

    fn len(&self) -> Option<usize> {
        Some(self.data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_missing_resource() {
        let store = MemStore::new();
        assert!(matches!(
            store.open("/nope"),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn read_in_small_chunks() {
        let mut store = MemStore::new();
        store.insert("/a", &b"abcdef"[..]);
        let mut file = store.open("/a").unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(file.read(&mut buf), ReadOutcome::Data(4));
        assert_eq!(&buf, b"abcd");
        assert_eq!(file.read(&mut buf), ReadOutcome::Data(2));
        assert_eq!(&buf[..2], b"ef");
        assert_eq!(file.read(&mut buf), ReadOutcome::End);
        // End is sticky
        assert_eq!(file.read(&mut buf), ReadOutcome::End);
    }

    #[test]
    fn len_reports_full_size() {
        let mut store = MemStore::new();
        store.insert("/a", &b"abc"[..]);
        let file = store.open("/a").unwrap();
        assert_eq!(file.len(), Some(3));
    }

    #[test]
    fn chunk_limit_caps_each_read() {
        let mut store = MemStore::new();
        store.insert("/a", &b"abcdef"[..]);
        store.set_chunk_limit(2);
        let mut file = store.open("/a").unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(file.read(&mut buf), ReadOutcome::Data(2));
        assert_eq!(&buf[..2], b"ab");
        assert_eq!(file.read(&mut buf), ReadOutcome::Data(2));
        assert_eq!(file.read(&mut buf), ReadOutcome::Data(2));
        assert_eq!(file.read(&mut buf), ReadOutcome::End);
    }

    #[test]
    fn empty_resource_ends_immediately() {
        let mut store = MemStore::new();
        store.insert("/empty", &b""[..]);
        let mut file = store.open("/empty").unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(file.read(&mut buf), ReadOutcome::End);
    }
}
