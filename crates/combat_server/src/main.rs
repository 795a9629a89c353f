//! # combat_server
//!
//! The authority is the single source of truth for combat state. It owns
//! the world, runs every skill and status effect, and streams skill signals
//! and replication deltas to connected peers.
//!
//! ## Startup Sequence
//!
//! 1. Connect to NATS (first argument, else `NATS_URL`, default
//!    `nats://localhost:4222`).
//! 2. Subscribe to `combat.authority.join` and `combat.authority.inbox`.
//! 3. Enter the fixed-timestep tick loop (`COMBAT_TICK_RATE`, default 30;
//!    `COMBAT_MAX_TICKS`, default unlimited).

mod config;
mod content;
mod inbound;
mod registry;
mod tick;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use combat_net::NatsConnection;
use combat_sim::Simulation;
use config::ServerConfig;
use registry::PeerRegistry;
use tick::TickLoop;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("combat_server=info".parse()?))
        .init();

    let mut config = ServerConfig::from_env();
    if let Some(url) = std::env::args().nth(1) {
        config = config.with_nats_url(url);
    }
    info!(tick_rate = config.tick_rate, "combat authority starting");

    let conn = NatsConnection::connect_to(&config.nats_url()).await?;
    let registry = Arc::new(PeerRegistry::new());
    let mut inbound = inbound::spawn(&conn, registry.clone()).await?;

    let mut sim = Simulation::new()?;
    content::register(&mut sim);

    let mut tick_loop = TickLoop::new(config, sim);
    tick_loop.run_async(&conn, &mut inbound).await?;

    info!(
        ticks = tick_loop.tick_id(),
        entities = tick_loop.simulation().world().entity_count(),
        peers = ?registry.ids(),
        "combat authority shut down"
    );
    Ok(())
}
