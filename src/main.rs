//! Server binary: parse the command line, set up logging, run the server.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use duelhall::{GameServer, ServerConfig, DEFAULT_TURN_TIMEOUT, VERSION};

#[derive(Parser, Debug)]
#[command(name = "duelhall-server", version, about = "Turn-based game server")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:1234")]
    bind: SocketAddr,

    /// Default per-move deadline, in seconds.
    #[arg(long, default_value_t = DEFAULT_TURN_TIMEOUT.as_secs())]
    turn_timeout: u64,

    /// Maximum concurrent client connections.
    #[arg(long, default_value_t = 1000)]
    max_connections: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!("Duelhall server v{}", VERSION);

    let server = GameServer::new(ServerConfig {
        bind_addr: args.bind,
        max_connections: args.max_connections,
        turn_timeout: Duration::from_secs(args.turn_timeout),
    });
    server.run().await?;
    Ok(())
}
