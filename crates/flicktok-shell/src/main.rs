//! FlickTok desktop shell.
//!
//! Runs against the headless toolkit: surface messages are read from stdin
//! as JSON lines and everything posted to a surface is written to stdout.
//!
//! Run against the simulated backend:
//!   cargo run -p backend-sim
//!   cargo run -p flicktok-shell -- --config flicktok.toml

use clap::Parser;
use flicktok_shell::{Config, HeadlessBackend, Orchestrator, event, stdio};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flicktok", version, about = "FlickTok desktop shell")]
struct Cli {
    /// TOML config file. Defaults apply when omitted.
    #[arg(long, env = "FLICKTOK_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long)]
    server_host: Option<String>,

    #[arg(long)]
    server_port: Option<u16>,

    #[arg(long)]
    client_host: Option<String>,

    #[arg(long)]
    client_port: Option<u16>,
}

impl Cli {
    fn apply(self, config: &mut Config) {
        if let Some(host) = self.server_host {
            config.server.host = host;
        }
        if let Some(port) = self.server_port {
            config.server.port = port;
        }
        if let Some(host) = self.client_host {
            config.client.host = host;
        }
        if let Some(port) = self.client_port {
            config.client.port = port;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries surface traffic.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("flicktok=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.validate()?;

    tracing::info!(
        "Waiting for backend at {} and UI at {}",
        config.server_url(),
        config.client_url()
    );

    let (events, inbox) = event::channel();
    let (posted_tx, posted_rx) = mpsc::unbounded_channel();
    let backend = HeadlessBackend::new()
        .with_output(posted_tx)
        .with_events(events.clone());

    tokio::spawn(stdio::print_posted(posted_rx));
    tokio::spawn(stdio::pump_stdin(events.clone()));

    Orchestrator::new(config, backend, (events, inbox))?.run().await?;
    Ok(())
}
