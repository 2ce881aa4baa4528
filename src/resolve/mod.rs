//! Request resolution — from a received byte block to an open resource.
//!
//! The resolver runs once per connection, against the first received block
//! only (the in-scope protocol subset assumes the whole request head arrives
//! in one segment). It extracts the target URI, applies the default-document
//! and not-found fallback chains, and optionally dispatches to a registered
//! CGI handler selected by exact resource name.
//!
//! Paths are opaque names into the content store. No traversal or escaping
//! checks are performed here; protecting the store against hostile names is
//! explicitly out of scope.

use thiserror::Error;
use tracing::{debug, trace};

use crate::config::ServerConfig;
use crate::store::ContentFile;

/// A single parsed query parameter. `value` is `None` when the pair had no
/// `=` separator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryParam<'a> {
    pub name: &'a str,
    pub value: Option<&'a str>,
}

/// Errors that fail resolution and close the connection.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The first block did not contain a complete, well-formed request head.
    #[error("malformed request line")]
    BadRequestLine,

    /// Parsed fine, but the method is outside the GET-only subset.
    #[error("unsupported method {0:?}")]
    UnsupportedMethod(String),
}

/// The outcome of a successful resolution.
///
/// `file` is `None` only for the built-in not-found notice, in which case
/// `name` is also `None` and the synthesized headers are the entire
/// response.
pub struct ResolvedResource {
    /// Open handle into the content store.
    pub file: Option<Box<dyn ContentFile>>,
    /// The resource name actually opened (after default-document, CGI, and
    /// not-found substitution). `None` means the built-in notice.
    pub name: Option<String>,
    /// Whether the resource content is scanned for substitution tags.
    pub tag_check: bool,
}

impl std::fmt::Debug for ResolvedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedResource")
            .field("file", &self.file.as_ref().map(|_| "<content file>"))
            .field("name", &self.name)
            .field("tag_check", &self.tag_check)
            .finish()
    }
}

/// Alternate names tried when the requested resource does not exist.
const NOT_FOUND_CHAIN: &[&str] = &["/404.html", "/404.htm"];

/// Maximum request headers accepted by the parser.
const MAX_HEADERS: usize = 32;

/// Resolves the first received block into an open resource.
///
/// # Errors
///
/// [`ResolveError`] when the request head is incomplete, malformed, or uses
/// a method other than GET. Open failures are never errors — they fall back
/// through the not-found chain to the built-in notice.
pub fn resolve(config: &ServerConfig, data: &[u8]) -> Result<ResolvedResource, ResolveError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);

    match req.parse(data) {
        Ok(httparse::Status::Complete(_)) => {}
        // The whole head must sit in this block; a partial parse is treated
        // the same as a malformed one.
        Ok(httparse::Status::Partial) | Err(_) => return Err(ResolveError::BadRequestLine),
    }

    let method = req.method.ok_or(ResolveError::BadRequestLine)?;
    if method != "GET" {
        return Err(ResolveError::UnsupportedMethod(method.to_owned()));
    }
    let target = req.path.ok_or(ResolveError::BadRequestLine)?;
    trace!(target, "resolving request");

    if target == "/" {
        return Ok(resolve_default_document(config));
    }
    Ok(resolve_named(config, target))
}

/// Tries the configured default documents, in order, for a root request.
fn resolve_default_document(config: &ServerConfig) -> ResolvedResource {
    for doc in config.default_documents() {
        if let Ok(file) = config.store().open(&doc.name) {
            debug!(name = %doc.name, "default document opened");
            return ResolvedResource {
                file: Some(file),
                name: Some(doc.name.clone()),
                tag_check: doc.scanned && config.ssi_enabled(),
            };
        }
    }
    not_found_fallback(config)
}

/// Resolves an explicit resource name, with CGI dispatch.
fn resolve_named(config: &ServerConfig, target: &str) -> ResolvedResource {
    let (base, query) = match target.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (target, None),
    };

    let name = match config.cgi_lookup(base) {
        Some((index, handler)) => {
            let params = parse_query(query.unwrap_or(""), config.tuning().max_cgi_params);
            let replacement = handler(index, &params);
            debug!(cgi = base, replacement = %replacement, "cgi dispatched");
            replacement
        }
        // No handler: the URI is passed to the store as received, query
        // string and all.
        None => target.to_owned(),
    };

    match config.store().open(&name) {
        Ok(file) => {
            let base_name = name.split('?').next().unwrap_or(&name);
            let tag_check = config.is_templated(base_name);
            ResolvedResource {
                file: Some(file),
                name: Some(name),
                tag_check,
            }
        }
        Err(_) => not_found_fallback(config),
    }
}

/// Walks the not-found chain; `name: None` signals the built-in notice.
fn not_found_fallback(config: &ServerConfig) -> ResolvedResource {
    for candidate in NOT_FOUND_CHAIN {
        if let Ok(file) = config.store().open(candidate) {
            debug!(name = %candidate, "serving not-found page");
            return ResolvedResource {
                file: Some(file),
                name: Some((*candidate).to_owned()),
                tag_check: false,
            };
        }
    }
    debug!("no not-found page in store, using built-in notice");
    ResolvedResource {
        file: None,
        name: None,
        tag_check: false,
    }
}

/// Parses a query string into at most `max` name/value pairs.
///
/// Best-effort: input is truncated at the first whitespace byte, pairs
/// beyond `max` are ignored, and a pair without `=` yields a `None` value.
pub(crate) fn parse_query(query: &str, max: usize) -> Vec<QueryParam<'_>> {
    let end = query
        .find([' ', '\t', '\r', '\n'])
        .unwrap_or(query.len());
    let query = &query[..end];
    if query.is_empty() {
        return Vec::new();
    }

    query
        .split('&')
        .take(max)
        .map(|pair| match pair.split_once('=') {
            Some((name, value)) => QueryParam {
                name,
                value: Some(value),
            },
            None => QueryParam {
                name: pair,
                value: None,
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::store::MemStore;

    fn store_with(names: &[&str]) -> MemStore {
        let mut store = MemStore::new();
        for name in names {
            store.insert(*name, &b"data"[..]);
        }
        store
    }

    fn ssi_config(store: MemStore) -> ServerConfig {
        ServerConfig::builder(store)
            .ssi_handler(["t"], |_i, _t, _o: &mut Vec<u8>| {})
            .build()
    }

    // ── parse_query ───────────────────────────────────────────────────────

    #[test]
    fn query_well_formed_pairs_in_order() {
        let params = parse_query("a=1&b=2", 16);
        assert_eq!(
            params,
            vec![
                QueryParam { name: "a", value: Some("1") },
                QueryParam { name: "b", value: Some("2") },
            ]
        );
    }

    #[test]
    fn query_missing_value_is_none() {
        let params = parse_query("a=1&b", 16);
        assert_eq!(params[1], QueryParam { name: "b", value: None });
    }

    #[test]
    fn query_empty_yields_no_pairs() {
        assert!(parse_query("", 16).is_empty());
    }

    #[test]
    fn query_truncated_at_whitespace() {
        let params = parse_query("a=1&b=2 trailing garbage", 16);
        assert_eq!(params.len(), 2);
        assert_eq!(params[1].value, Some("2"));
    }

    #[test]
    fn query_pairs_beyond_limit_ignored() {
        let params = parse_query("a=1&b=2&c=3", 2);
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn query_first_equals_splits() {
        let params = parse_query("expr=1=2", 16);
        assert_eq!(params[0].value, Some("1=2"));
    }

    // ── resolve ───────────────────────────────────────────────────────────

    #[test]
    fn malformed_request_line_fails() {
        let config = ssi_config(store_with(&[]));
        let err = resolve(&config, b"GET /index.html\r\n").unwrap_err();
        assert!(matches!(err, ResolveError::BadRequestLine));
    }

    #[test]
    fn non_get_method_fails() {
        let config = ssi_config(store_with(&["/a.html"]));
        let err = resolve(&config, b"POST /a.html HTTP/1.0\r\n\r\n").unwrap_err();
        assert!(matches!(err, ResolveError::UnsupportedMethod(_)));
    }

    #[test]
    fn root_prefers_templated_default_document() {
        let config = ssi_config(store_with(&["/index.shtml", "/index.html"]));
        let resolved = resolve(&config, b"GET / HTTP/1.0\r\n\r\n").unwrap();
        assert_eq!(resolved.name.as_deref(), Some("/index.shtml"));
        assert!(resolved.tag_check);
    }

    #[test]
    fn root_falls_through_to_plain_html() {
        // index.shtml absent, index.html present: the html document is
        // selected and not scanned.
        let config = ssi_config(store_with(&["/index.html"]));
        let resolved = resolve(&config, b"GET / HTTP/1.0\r\n\r\n").unwrap();
        assert_eq!(resolved.name.as_deref(), Some("/index.html"));
        assert!(!resolved.tag_check);
    }

    #[test]
    fn explicit_templated_resource_is_scanned() {
        let config = ssi_config(store_with(&["/status.shtml"]));
        let resolved = resolve(&config, b"GET /status.shtml HTTP/1.0\r\n\r\n").unwrap();
        assert!(resolved.tag_check);
    }

    #[test]
    fn scanning_disabled_without_ssi_registration() {
        let config = ServerConfig::builder(store_with(&["/status.shtml"])).build();
        let resolved = resolve(&config, b"GET /status.shtml HTTP/1.0\r\n\r\n").unwrap();
        assert!(!resolved.tag_check);
    }

    #[test]
    fn cgi_handler_supplies_replacement() {
        let config = ServerConfig::builder(store_with(&["/result.html"]))
            .cgi("/leds.cgi", |_i, params| {
                assert_eq!(params[0], QueryParam { name: "led", value: Some("2") });
                "/result.html".to_owned()
            })
            .build();
        let resolved =
            resolve(&config, b"GET /leds.cgi?led=2 HTTP/1.0\r\n\r\n").unwrap();
        assert_eq!(resolved.name.as_deref(), Some("/result.html"));
    }

    #[test]
    fn cgi_handler_receives_table_index() {
        let config = ServerConfig::builder(store_with(&["/b.html"]))
            .cgi("/a.cgi", |_i, _p| "/a.html".to_owned())
            .cgi("/b.cgi", |i, _p| {
                assert_eq!(i, 1);
                "/b.html".to_owned()
            })
            .build();
        let resolved = resolve(&config, b"GET /b.cgi HTTP/1.0\r\n\r\n").unwrap();
        assert_eq!(resolved.name.as_deref(), Some("/b.html"));
    }

    #[test]
    fn unmatched_query_uri_keeps_its_query() {
        // No CGI handler: the store sees the URI exactly as requested. The
        // name with the query attached does not exist, so the fallback runs.
        let config = ServerConfig::builder(store_with(&["/page.html"])).build();
        let resolved =
            resolve(&config, b"GET /page.html?x=1 HTTP/1.0\r\n\r\n").unwrap();
        assert_eq!(resolved.name, None);
    }

    #[test]
    fn missing_resource_uses_not_found_page() {
        let config = ServerConfig::builder(store_with(&["/404.html"])).build();
        let resolved = resolve(&config, b"GET /nope.html HTTP/1.0\r\n\r\n").unwrap();
        assert_eq!(resolved.name.as_deref(), Some("/404.html"));
        assert!(resolved.file.is_some());
    }

    #[test]
    fn not_found_chain_tries_second_name() {
        let config = ServerConfig::builder(store_with(&["/404.htm"])).build();
        let resolved = resolve(&config, b"GET /nope.html HTTP/1.0\r\n\r\n").unwrap();
        assert_eq!(resolved.name.as_deref(), Some("/404.htm"));
    }

    #[test]
    fn empty_store_yields_builtin_notice() {
        let config = ServerConfig::builder(store_with(&[])).build();
        let resolved = resolve(&config, b"GET /nope.html HTTP/1.0\r\n\r\n").unwrap();
        assert!(resolved.file.is_none());
        assert_eq!(resolved.name, None);
    }
}
