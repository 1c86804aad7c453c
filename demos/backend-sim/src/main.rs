//! Simulated FlickTok backend.
//!
//! Serves what the shell expects from a local development setup:
//! - `GET /api/healthcheck` and the `/ws` event link on the backend port
//! - placeholder host and overlay pages on the client port
//! - an `action-detected` event every few seconds
//!
//! Run:
//!   cargo run -p backend-sim -- --port 8000 --client-port 8001 --action-every 5
//!   cargo run -p flicktok-shell

mod protocol;
mod server;

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "backend-sim", about = "Simulated FlickTok backend")]
struct Args {
    /// Port for the health check and the event link.
    #[arg(long, default_value_t = 8000)]
    port: u16,
    /// Port for the placeholder host and overlay pages.
    #[arg(long, default_value_t = 8001)]
    client_port: u16,
    /// Seconds between `action-detected` events.
    #[arg(long, default_value_t = 5)]
    action_every: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("backend_sim=info".parse()?))
        .init();

    let args = Args::parse();

    tracing::info!(
        "Backend on port {}, UI pages on port {}",
        args.port,
        args.client_port
    );

    server::run(args.port, args.client_port, args.action_every).await
}
