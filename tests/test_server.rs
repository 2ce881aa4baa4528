//! Socket-level tests for the Tokio adapter: a real TCP round trip through
//! the engine.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use tinyhttpd::config::{ServerConfig, Tuning};
use tinyhttpd::server::Server;
use tinyhttpd::store::MemStore;

async fn spawn_server(config: Arc<ServerConfig>) -> std::net::SocketAddr {
    let server = Server::bind("127.0.0.1:0", config).await.unwrap();
    let addr = server.local_addr();
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    addr
}

async fn fetch(addr: std::net::SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    out
}

fn demo_config() -> Arc<ServerConfig> {
    let mut store = MemStore::new();
    store.insert(
        "/index.shtml",
        &b"<html>host: <!--#host--></html>"[..],
    );
    store.insert("/logo.png", &b"\x89PNG fake image bytes"[..]);
    Arc::new(
        ServerConfig::builder(store)
            .ssi_handler(["host"], |_idx, _tag, out: &mut Vec<u8>| {
                out.extend_from_slice(b"localhost");
            })
            .build(),
    )
}

#[tokio::test]
async fn serves_templated_root_over_tcp() {
    let addr = spawn_server(demo_config()).await;
    let out = fetch(addr, b"GET / HTTP/1.0\r\nHost: localhost\r\n\r\n").await;
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("HTTP/1.0 200 OK\r\n"));
    assert!(text.contains("Pragma: no-cache"));
    assert!(text.ends_with("<html>host: localhost</html>"));
}

#[tokio::test]
async fn serves_binary_resource_over_tcp() {
    let addr = spawn_server(demo_config()).await;
    let out = fetch(addr, b"GET /logo.png HTTP/1.0\r\n\r\n").await;
    let text = String::from_utf8_lossy(&out);
    assert!(text.starts_with("HTTP/1.0 200 OK\r\n"));
    assert!(text.contains("Content-type: image/png\r\n"));
    assert!(out.ends_with(b"\x89PNG fake image bytes"));
}

#[tokio::test]
async fn missing_resource_gets_builtin_notice_over_tcp() {
    let addr = spawn_server(demo_config()).await;
    let out = fetch(addr, b"GET /nope.html HTTP/1.0\r\n\r\n").await;
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("HTTP/1.0 404 File not found\r\n"));
    assert!(text.contains("cannot be found"));
}

#[tokio::test]
async fn malformed_request_closes_with_no_bytes() {
    let addr = spawn_server(demo_config()).await;
    let out = fetch(addr, b"BOGUS\r\n\r\n").await;
    assert!(out.is_empty());
}

#[tokio::test]
async fn small_window_still_delivers_whole_resource() {
    let mut store = MemStore::new();
    store.insert("/index.shtml", &b"<html>n: <!--#n--></html>"[..]);
    let mut tuning = Tuning::default();
    tuning.send_window = 8;
    tuning.mss = 4;
    tuning.read_buffer_size = Some(16);
    let config = Arc::new(
        ServerConfig::builder(store)
            .ssi_handler(["n"], |_idx, _tag, out: &mut Vec<u8>| {
                out.extend_from_slice(b"12345");
            })
            .tuning(tuning)
            .build(),
    );
    let addr = spawn_server(config).await;
    let out = fetch(addr, b"GET / HTTP/1.0\r\n\r\n").await;
    let text = String::from_utf8(out).unwrap();
    assert!(text.ends_with("<html>n: 12345</html>"));
}
