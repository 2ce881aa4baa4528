//! # tinyhttpd
//!
//! An embeddable, flow-control-aware HTTP response engine with
//! server-side-include substitution, written as a per-connection state
//! machine driven entirely by transport events.
//!
//! The engine serves static and templated content out of a pluggable
//! [`store::ContentStore`] over a pluggable [`transport::Transport`] whose
//! write capacity is bounded and changes dynamically. All buffering is
//! small and bounded; a `<!--#tag-->` marker split across content-block
//! refills at any byte is recognized and substituted identically to one
//! arriving whole.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tinyhttpd::config::ServerConfig;
//! use tinyhttpd::server::Server;
//! use tinyhttpd::store::MemStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut store = MemStore::new();
//!     store.insert("/index.shtml", &b"<html>Up for <!--#uptime--></html>"[..]);
//!
//!     let config = Arc::new(
//!         ServerConfig::builder(store)
//!             .ssi_handler(["uptime"], |_idx, _tag, out: &mut Vec<u8>| {
//!                 out.extend_from_slice(b"42 seconds");
//!             })
//!             .build(),
//!     );
//!
//!     let server = Server::bind("127.0.0.1:8080", config).await?;
//!     println!("Listening on http://127.0.0.1:8080");
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! The engine itself ([`conn::Connection`]) has no dependency on Tokio or
//! sockets; [`server::Server`] is one adapter over it. Embedders with their
//! own event loop feed [`conn::Connection`]'s event methods directly.

pub mod config;
pub mod conn;
pub mod headers;
pub mod resolve;
pub mod server;
pub mod ssi;
pub mod store;
pub mod transport;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use config::{ServerConfig, Tuning};
pub use conn::{ConnState, Connection};
pub use server::{Server, ServerError};
pub use store::{ContentFile, ContentStore, MemStore, ReadOutcome};
pub use transport::{Transport, WindowTransport, WriteError};
