//! Server configuration — built once, immutable for the process lifetime.
//!
//! Everything the original design kept in process-wide mutable globals
//! (dispatch table, substitution handler, default-document list) lives in a
//! [`ServerConfig`] constructed through [`ConfigBuilder`] and shared by
//! reference afterwards. Reconfiguration during active service is
//! unsupported by construction.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::resolve::QueryParam;
use crate::store::ContentStore;

/// CGI handler: receives its index in the dispatch table and the parsed
/// query parameters, returns the resource name to open instead.
///
/// Handlers never write to the response directly — the returned name is
/// resolved against the content store like any other URI.
pub type CgiHandler = Arc<dyn Fn(usize, &[QueryParam<'_>]) -> String + Send + Sync>;

/// SSI substitution handler: receives the index of the matched tag in the
/// registered tag list, the tag name, and the output buffer to fill.
///
/// Output beyond [`Tuning::max_insert_len`] is truncated by the engine.
pub type SsiHandler = Arc<dyn Fn(usize, &str, &mut Vec<u8>) + Send + Sync>;

/// A default-document candidate tried when the root URI is requested.
#[derive(Debug, Clone)]
pub struct DefaultDocument {
    /// Resource name, e.g. `/index.html`.
    pub name: String,
    /// Whether the document is scanned for substitution tags.
    pub scanned: bool,
}

/// The documents tried, in order, for a root (`/`) request.
const DEFAULT_DOCUMENTS: &[(&str, bool)] = &[
    ("/index.shtml", true),
    ("/index.ssi", true),
    ("/index.shtm", true),
    ("/index.html", false),
    ("/index.htm", false),
];

/// Resource-name suffixes that enable tag scanning.
const SCANNED_EXTENSIONS: &[&str] = &[".shtml", ".shtm", ".ssi", ".xml"];

/// Tunable limits and timings.
///
/// All fields have working defaults; deployments that need to deviate can
/// deserialize a partial JSON object thanks to `#[serde(default)]`.
///
/// # Examples
///
/// ```
/// use tinyhttpd::config::Tuning;
///
/// let t = Tuning::from_json(r#"{"max_retries": 8, "mss": 536}"#).unwrap();
/// assert_eq!(t.max_retries, 8);
/// assert_eq!(t.mss, 536);
/// assert_eq!(t.max_tag_name_len, 8); // default
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    /// Consecutive no-progress poll ticks before the connection is
    /// force-closed.
    pub max_retries: u8,
    /// Poll tick period in milliseconds.
    pub poll_interval_ms: u64,
    /// Maximum tag name length; longer names abort the tag.
    pub max_tag_name_len: usize,
    /// Maximum substitution length; handler output is truncated beyond it.
    pub max_insert_len: usize,
    /// Maximum query parameters extracted for a CGI dispatch.
    pub max_cgi_params: usize,
    /// Smallest read buffer the engine will shrink to under allocation
    /// pressure before giving up for the cycle.
    pub read_buffer_floor: usize,
    /// Read buffer size override; defaults to twice the transport MSS.
    pub read_buffer_size: Option<usize>,
    /// Send window granted to each connection by the socket adapter.
    pub send_window: usize,
    /// Maximum segment size reported by the socket adapter's transport.
    pub mss: usize,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            max_retries: 4,
            poll_interval_ms: 2000,
            max_tag_name_len: 8,
            max_insert_len: 192,
            max_cgi_params: 16,
            read_buffer_floor: 128,
            read_buffer_size: None,
            send_window: 4096,
            mss: 1460,
        }
    }
}

impl Tuning {
    /// Deserializes tuning knobs from a JSON object; absent fields keep
    /// their defaults.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`serde_json::Error`] for malformed input.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// SSI registration: the recognized tag list plus the substitution handler.
#[derive(Clone)]
pub(crate) struct SsiRegistration {
    tags: Vec<String>,
    handler: SsiHandler,
}

impl SsiRegistration {
    /// Looks the tag up in the registered list and fills `out` with the
    /// substitution text, truncated to `max_len`.
    ///
    /// Unregistered tags are echoed back with an error marker so a missing
    /// handler is visible in the rendered page rather than silent.
    pub(crate) fn substitute(&self, tag: &str, out: &mut Vec<u8>, max_len: usize) {
        out.clear();
        if let Some(index) = self.tags.iter().position(|t| t == tag) {
            (self.handler)(index, tag, out);
        } else {
            out.extend_from_slice(b"<b>***UNKNOWN TAG ");
            out.extend_from_slice(tag.as_bytes());
            out.extend_from_slice(b"***</b>");
        }
        out.truncate(max_len);
    }
}

/// Immutable server configuration.
///
/// Construct with [`ServerConfig::builder`]; share via [`Arc`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use tinyhttpd::config::ServerConfig;
/// use tinyhttpd::store::MemStore;
///
/// let mut store = MemStore::new();
/// store.insert("/index.html", &b"<html></html>"[..]);
///
/// let config = ServerConfig::builder(store)
///     .ssi_handler(["counter"], |_idx, _tag, out: &mut Vec<u8>| {
///         out.extend_from_slice(b"42");
///     })
///     .cgi("/leds.cgi", |_idx, _params| "/index.html".to_owned())
///     .build();
/// let config = Arc::new(config);
/// assert!(config.is_templated("/status.shtml"));
/// ```
pub struct ServerConfig {
    store: Arc<dyn ContentStore>,
    default_documents: Vec<DefaultDocument>,
    scanned_extensions: Vec<String>,
    ssi: Option<SsiRegistration>,
    cgi: Vec<(String, CgiHandler)>,
    dynamic_headers: bool,
    tuning: Tuning,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("default_documents", &self.default_documents)
            .field("scanned_extensions", &self.scanned_extensions)
            .field("ssi_tags", &self.ssi.as_ref().map(|s| s.tags.clone()))
            .field(
                "cgi",
                &self.cgi.iter().map(|(n, _)| n.clone()).collect::<Vec<_>>(),
            )
            .field("dynamic_headers", &self.dynamic_headers)
            .field("tuning", &self.tuning)
            .finish()
    }
}

impl ServerConfig {
    /// Starts a builder over the given content store.
    pub fn builder(store: impl ContentStore + 'static) -> ConfigBuilder {
        ConfigBuilder {
            store: Arc::new(store),
            default_documents: DEFAULT_DOCUMENTS
                .iter()
                .map(|&(name, scanned)| DefaultDocument {
                    name: name.to_owned(),
                    scanned,
                })
                .collect(),
            scanned_extensions: SCANNED_EXTENSIONS.iter().map(|&e| e.to_owned()).collect(),
            ssi: None,
            cgi: Vec::new(),
            dynamic_headers: true,
            tuning: Tuning::default(),
        }
    }

    /// The content store resources are opened against.
    pub fn store(&self) -> &dyn ContentStore {
        &*self.store
    }

    /// Default documents tried, in order, for a root request.
    pub fn default_documents(&self) -> &[DefaultDocument] {
        &self.default_documents
    }

    /// Returns `true` if an SSI handler is registered.
    pub fn ssi_enabled(&self) -> bool {
        self.ssi.is_some()
    }

    /// Returns `true` if resources with this name are scanned for tags.
    ///
    /// Always `false` when no SSI handler is registered.
    pub fn is_templated(&self, name: &str) -> bool {
        self.ssi.is_some()
            && self
                .scanned_extensions
                .iter()
                .any(|ext| name.ends_with(ext.as_str()))
    }

    /// Exact-match CGI dispatch lookup on the pre-query resource name.
    pub fn cgi_lookup(&self, name: &str) -> Option<(usize, &CgiHandler)> {
        self.cgi
            .iter()
            .position(|(n, _)| n == name)
            .map(|i| (i, &self.cgi[i].1))
    }

    /// Fills `out` with the substitution for `tag`, truncated to
    /// [`Tuning::max_insert_len`]. No-op when SSI is not registered.
    pub fn substitute(&self, tag: &str, out: &mut Vec<u8>) {
        if let Some(ssi) = &self.ssi {
            ssi.substitute(tag, out, self.tuning.max_insert_len);
        } else {
            out.clear();
        }
    }

    /// Whether status/server/content-type headers are synthesized.
    pub fn dynamic_headers(&self) -> bool {
        self.dynamic_headers
    }

    /// Tunable limits and timings.
    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }
}

/// Builder for [`ServerConfig`].
pub struct ConfigBuilder {
    store: Arc<dyn ContentStore>,
    default_documents: Vec<DefaultDocument>,
    scanned_extensions: Vec<String>,
    ssi: Option<SsiRegistration>,
    cgi: Vec<(String, CgiHandler)>,
    dynamic_headers: bool,
    tuning: Tuning,
}

impl ConfigBuilder {
    /// Replaces the default-document list.
    #[must_use]
    pub fn default_documents(
        mut self,
        docs: impl IntoIterator<Item = DefaultDocument>,
    ) -> Self {
        self.default_documents = docs.into_iter().collect();
        self
    }

    /// Replaces the set of resource-name suffixes that enable scanning.
    #[must_use]
    pub fn scanned_extensions(
        mut self,
        exts: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.scanned_extensions = exts.into_iter().map(Into::into).collect();
        self
    }

    /// Registers the SSI tag list and substitution handler.
    #[must_use]
    pub fn ssi_handler(
        mut self,
        tags: impl IntoIterator<Item = impl Into<String>>,
        handler: impl Fn(usize, &str, &mut Vec<u8>) + Send + Sync + 'static,
    ) -> Self {
        self.ssi = Some(SsiRegistration {
            tags: tags.into_iter().map(Into::into).collect(),
            handler: Arc::new(handler),
        });
        self
    }

    /// Registers a CGI handler for an exact resource name.
    ///
    /// Handlers are matched in registration order.
    #[must_use]
    pub fn cgi(
        mut self,
        name: impl Into<String>,
        handler: impl Fn(usize, &[QueryParam<'_>]) -> String + Send + Sync + 'static,
    ) -> Self {
        self.cgi.push((name.into(), Arc::new(handler)));
        self
    }

    /// Enables or disables dynamic header synthesis.
    ///
    /// When disabled the content store is assumed to bake headers into each
    /// resource, as the original filesystem-image generator could.
    #[must_use]
    pub fn dynamic_headers(mut self, enabled: bool) -> Self {
        self.dynamic_headers = enabled;
        self
    }

    /// Replaces the tuning knobs.
    #[must_use]
    pub fn tuning(mut self, tuning: Tuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// Finalizes the configuration.
    pub fn build(self) -> ServerConfig {
        ServerConfig {
            store: self.store,
            default_documents: self.default_documents,
            scanned_extensions: self.scanned_extensions,
            ssi: self.ssi,
            cgi: self.cgi,
            dynamic_headers: self.dynamic_headers,
            tuning: self.tuning,
        }
    }
}
