//! Async TCP adapter using Tokio.
//!
//! Bridges real sockets to the event-driven engine: each accepted
//! connection gets one task that owns the socket, a [`WindowTransport`]
//! send window, and the [`Connection`] record. The task turns socket I/O
//! and timer ticks into engine events — received data, acknowledgment
//! (a completed drain of the window to the socket), and idle polls — so
//! every engine method runs from a single context per connection, exactly
//! as the engine requires.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::conn::{ConnState, Connection};
use crate::transport::WindowTransport;

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Read buffer capacity for the request head.
const REQUEST_BUF_SIZE: usize = 1024;

/// The tinyhttpd socket server.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use tinyhttpd::config::ServerConfig;
/// use tinyhttpd::server::Server;
/// use tinyhttpd::store::MemStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut store = MemStore::new();
///     store.insert("/index.html", &b"<html>hello</html>"[..]);
///     let config = Arc::new(ServerConfig::builder(store).build());
///
///     let server = Server::bind("127.0.0.1:8080", config).await?;
///     server.run().await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: Arc<ServerConfig>,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(
        addr: impl AsRef<str>,
        config: Arc<ServerConfig>,
    ) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            config,
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Starts accepting connections.
    ///
    /// This method runs until the process is terminated or an unrecoverable
    /// listener error occurs.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn run(self) -> Result<(), ServerError> {
        info!(address = %self.local_addr, "tinyhttpd listening");

        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let config = Arc::clone(&self.config);

            tokio::spawn(async move {
                if let Err(e) = serve_connection(stream, peer_addr, config).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

/// Drives one connection over its lifetime.
///
/// The loop alternates between draining the engine's send window to the
/// socket (each completed drain is the acknowledgment event) and waiting
/// for the next input: received data or a poll tick.
async fn serve_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<ServerConfig>,
) -> Result<(), std::io::Error> {
    let tuning = config.tuning().clone();
    let mut conn = Connection::new(config);
    let mut link = WindowTransport::new(tuning.send_window, tuning.mss);

    let period = Duration::from_millis(tuning.poll_interval_ms.max(1));
    let mut poll = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    let mut buf = BytesMut::with_capacity(REQUEST_BUF_SIZE);

    loop {
        while link.has_queued() {
            let chunk = link.take_queued();
            stream.write_all(&chunk).await?;
            stream.flush().await?;
            conn.on_acknowledged(&mut link);
        }

        if conn.state() == ConnState::Closed {
            debug!(peer = %peer_addr, "connection closed");
            let _ = stream.shutdown().await;
            return Ok(());
        }

        tokio::select! {
            read = stream.read_buf(&mut buf) => {
                match read {
                    Ok(0) => {
                        debug!(peer = %peer_addr, "peer closed connection");
                        let _ = stream.shutdown().await;
                        return Ok(());
                    }
                    Ok(_) => {
                        // The whole request head is assumed to arrive in
                        // one segment; the engine ignores later data.
                        conn.on_received(&mut link, &buf);
                        buf.clear();
                    }
                    Err(e) => {
                        conn.on_error();
                        return Err(e);
                    }
                }
            }
            _ = poll.tick() => {
                conn.on_poll(&mut link);
            }
        }
    }
}
