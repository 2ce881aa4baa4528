//! Runnable demo: an in-memory site with SSI substitution and CGI dispatch.
//!
//! ```sh
//! cargo run --example ssi_demo
//! curl http://127.0.0.1:8080/
//! curl http://127.0.0.1:8080/leds.cgi?led=1&led=2
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tinyhttpd::config::ServerConfig;
use tinyhttpd::server::Server;
use tinyhttpd::store::MemStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tinyhttpd=debug".into()),
        )
        .init();

    let mut store = MemStore::new();
    store.insert(
        "/index.shtml",
        &b"<html><body>\
           <h1>tinyhttpd demo</h1>\
           <p>Uptime: <!--#uptime--></p>\
           <p>Requests served: <!--#hits--></p>\
           <p><a href=\"/leds.cgi?led=1\">toggle led 1</a></p>\
           </body></html>"[..],
    );
    store.insert(
        "/leds.html",
        &b"<html><body><p>LED state updated.</p></body></html>"[..],
    );
    store.insert(
        "/404.html",
        &b"<html><body><h2>Nothing here.</h2></body></html>"[..],
    );

    let started = Instant::now();
    let hits = Arc::new(AtomicU64::new(0));
    let hits_for_ssi = Arc::clone(&hits);

    let config = Arc::new(
        ServerConfig::builder(store)
            .ssi_handler(["uptime", "hits"], move |idx, _tag, out: &mut Vec<u8>| {
                let text = match idx {
                    0 => format!("{}s", started.elapsed().as_secs()),
                    _ => hits_for_ssi.fetch_add(1, Ordering::Relaxed).to_string(),
                };
                out.extend_from_slice(text.as_bytes());
            })
            .cgi("/leds.cgi", |_idx, params| {
                for p in params {
                    println!("led {} -> {}", p.name, p.value.unwrap_or("on"));
                }
                "/leds.html".to_owned()
            })
            .build(),
    );

    let server = Server::bind("127.0.0.1:8080", config).await?;
    println!("Listening on http://{}", server.local_addr());
    server.run().await?;
    Ok(())
}
