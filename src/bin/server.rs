//! Binary entry point: wires up logging and runs [`keelson::server::Server`]
//! (SPEC_FULL §A.1 — `RUST_LOG`-driven `tracing_subscriber::EnvFilter`,
//! `info!` on bind).

use std::net::SocketAddr;

use keelson::server::Server;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let addr: SocketAddr = std::env::var("KEELSON_ADDR")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 6379)));

    let server = Server::new();
    if let Err(error) = server.run(addr).await {
        tracing::error!(%error, "server exited");
        std::process::exit(1);
    }
}
