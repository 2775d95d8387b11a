//! Binary WebSocket server for the playground.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use playground_core::{MemoryStore, TimedStore, World};
use playground_server::{server, Config, ConnectionRegistry, Hub, WorldSeed};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(name = "playground-server")]
#[clap(about = "Real-time server for the playground virtual space")]
struct Cli {
    /// TOML configuration file
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// TOML world seed (overrides `world_file`)
    #[clap(short, long)]
    world: Option<PathBuf>,

    /// Address to bind
    #[clap(long)]
    bind: Option<String>,

    #[clap(short, long)]
    port: Option<u16>,

    /// Log filter, e.g. `debug` or `playground_server=trace` (default: $RUST_LOG, then `info`)
    #[clap(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match &cli.log_level {
        Some(level) => EnvFilter::try_new(level).context("invalid --log-level")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(world) = cli.world {
        config.world_file = Some(world);
    }

    // Store → World → Registry → Hub.
    let store = TimedStore::new(MemoryStore::new(), config.store_timeout());
    let world = World::new(Arc::new(store));

    match &config.world_file {
        Some(path) => {
            let seed = WorldSeed::from_file(path)?;
            seed.apply(&world).await.context("seeding world")?;
        }
        None => warn!("no world file configured; starting with an empty world"),
    }

    let registry = Arc::new(ConnectionRegistry::new(config.outbound_buffer));
    let hub = Arc::new(Hub::new(world, registry));

    info!(
        addr = %config.socket_addr_string(),
        max_clients = config.max_clients,
        "starting playground-server"
    );

    tokio::select! {
        res = server::run(&config, hub.clone()) => res?,
        _ = tokio::signal::ctrl_c() => info!("interrupt received"),
    }

    hub.shutdown().await;
    Ok(())
}
