//! Dynamic response headers.
//!
//! When enabled, the engine prefixes each resource with up to three header
//! strings: a status line, the server identity, and a content-type chosen by
//! file extension. Stores whose resources already embed their headers (the
//! original filesystem-image generator could bake them in) disable this and
//! the engine streams the resource verbatim.
//!
//! The status line is chosen by a name heuristic kept from the original
//! design: any resolved resource whose name contains `404` is assumed to be
//! the not-found page.

/// Status line for a served resource.
const HDR_OK: &str = "HTTP/1.0 200 OK\r\n";

/// Status line for the not-found page.
const HDR_NOT_FOUND: &str = "HTTP/1.0 404 File not found\r\n";

/// Server identity line.
const HDR_SERVER: &str = "Server: tinyhttpd/0.1\r\n";

/// Body sent when no 404 page exists in the store.
const NOT_FOUND_BODY: &str =
    "\r\n<html><body><h2>404: The requested file cannot be found.</h2></body></html>\r\n";

const CT_HTML: &str = "Content-type: text/html\r\n\r\n";
/// Templated pages must not be cached: the substitutions change per request.
const CT_SSI: &str = "Content-type: text/html\r\nExpires: Fri, 10 Apr 2008 14:00:00 GMT\r\nPragma: no-cache\r\n\r\n";
const CT_GIF: &str = "Content-type: image/gif\r\n\r\n";
const CT_PNG: &str = "Content-type: image/png\r\n\r\n";
const CT_JPG: &str = "Content-type: image/jpeg\r\n\r\n";
const CT_BMP: &str = "Content-type: image/bmp\r\n\r\n";
const CT_ICO: &str = "Content-type: image/x-icon\r\n\r\n";
const CT_APP: &str = "Content-type: application/octet-stream\r\n\r\n";
const CT_JS: &str = "Content-type: application/x-javascript\r\n\r\n";
const CT_CSS: &str = "Content-type: text/css\r\n\r\n";
const CT_SWF: &str = "Content-type: application/x-shockwave-flash\r\n\r\n";
const CT_XML: &str = "Content-type: text/xml\r\n\r\n";
const CT_DEFAULT: &str = "Content-type: text/plain\r\n\r\n";

/// Extension → content-type header, first match wins.
const CONTENT_TYPES: &[(&str, &str)] = &[
    ("html", CT_HTML),
    ("htm", CT_HTML),
    ("shtml", CT_SSI),
    ("shtm", CT_SSI),
    ("ssi", CT_SSI),
    ("gif", CT_GIF),
    ("png", CT_PNG),
    ("jpg", CT_JPG),
    ("bmp", CT_BMP),
    ("ico", CT_ICO),
    ("class", CT_APP),
    ("cls", CT_APP),
    ("js", CT_JS),
    ("ram", CT_JS),
    ("css", CT_CSS),
    ("swf", CT_SWF),
    ("xml", CT_XML),
];

/// The ordered header strings for one response, with send progress.
///
/// At most three lines. `index` past the end means everything (possibly
/// nothing) has been sent; a set constructed with [`HeaderSet::none`] starts
/// in that state.
#[derive(Debug)]
pub struct HeaderSet {
    lines: Vec<&'static str>,
    index: usize,
    offset: usize,
}

impl HeaderSet {
    /// An already-complete set: no headers are sent for this response.
    pub fn none() -> Self {
        Self {
            lines: Vec::new(),
            index: 0,
            offset: 0,
        }
    }

    /// Synthesizes headers for the resolved resource name.
    ///
    /// `None` means no resource could be opened at all and the built-in 404
    /// notice (status + server + default HTML body) is the whole response.
    ///
    /// A name with no file extension is treated as a control URL and gets no
    /// headers, matching the original behavior.
    pub fn for_resource(name: Option<&str>) -> Self {
        let Some(name) = name else {
            return Self {
                lines: vec![HDR_NOT_FOUND, HDR_SERVER, NOT_FOUND_BODY],
                index: 0,
                offset: 0,
            };
        };

        let status = if name.contains("404") {
            HDR_NOT_FOUND
        } else {
            HDR_OK
        };

        // Extension lookup ignores any query string.
        let base = name.split('?').next().unwrap_or(name);
        let Some(ext) = base.rsplit_once('.').map(|(_, ext)| ext) else {
            return Self::none();
        };

        let content_type = CONTENT_TYPES
            .iter()
            .find(|(e, _)| *e == ext)
            .map(|(_, ct)| *ct)
            .unwrap_or(CT_DEFAULT);

        Self {
            lines: vec![status, HDR_SERVER, content_type],
            index: 0,
            offset: 0,
        }
    }

    /// Returns `true` once every header byte has been handed to the
    /// transport.
    pub fn is_done(&self) -> bool {
        self.index >= self.lines.len()
    }

    /// The unsent remainder of the current header string, if any.
    pub(crate) fn remaining(&self) -> Option<&'static [u8]> {
        self.lines
            .get(self.index)
            .map(|line| &line.as_bytes()[self.offset..])
    }

    /// Records `n` header bytes as sent, moving to the next string when the
    /// current one is exhausted.
    pub(crate) fn advance(&mut self, n: usize) {
        self.offset += n;
        if let Some(line) = self.lines.get(self.index) {
            debug_assert!(self.offset <= line.len());
            if self.offset == line.len() {
                self.index += 1;
                self.offset = 0;
            }
        }
    }
}
