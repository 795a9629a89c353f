//! Authority tick loop.
//!
//! Each tick:
//!
//! 1. Apply peer hellos and frames received since the last tick.
//! 2. Step the simulation (gating, status effects, replication).
//! 3. Publish everything the step queued for peers.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use combat_ecs::EntityId;
use combat_net::{AuthorityMessage, NatsConnection, PeerId};
use combat_sim::Simulation;

use crate::config::ServerConfig;
use crate::content;
use crate::inbound::Inbound;

/// The authority's tick loop state.
#[derive(Debug)]
pub struct TickLoop {
    /// Current tick counter.
    tick_id: u64,
    /// Tick configuration.
    config: ServerConfig,
    /// The authoritative simulation.
    sim: Simulation,
    /// Character controlled by each joined peer.
    characters: HashMap<PeerId, EntityId>,
}

impl TickLoop {
    /// Create a new tick loop around a configured simulation.
    #[must_use]
    pub fn new(config: ServerConfig, sim: Simulation) -> Self {
        Self {
            tick_id: 0,
            config,
            sim,
            characters: HashMap::new(),
        }
    }

    /// Returns the current tick counter.
    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.tick_id
    }

    /// Returns a reference to the simulation.
    #[must_use]
    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    /// The character a peer controls.
    #[must_use]
    pub fn character(&self, peer: PeerId) -> Option<EntityId> {
        self.characters.get(&peer).copied()
    }

    /// Apply one inbound event.
    pub fn handle_inbound(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Joined(peer) => {
                if let Some(entity) = self.character(peer) {
                    debug!(%peer, %entity, "peer already has a character");
                    return;
                }
                self.sim.connect_peer(peer);
                match content::spawn_for(&mut self.sim, peer) {
                    Ok(entity) => {
                        self.characters.insert(peer, entity);
                        info!(%peer, %entity, "character spawned for peer");
                    }
                    Err(err) => warn!(%peer, %err, "failed to spawn character"),
                }
            }
            Inbound::Frame(frame) => {
                if let Err(err) = self.sim.handle_peer_frame(&frame) {
                    debug!(
                        peer = %frame.peer,
                        message = ?frame.message,
                        %err,
                        "peer action refused"
                    );
                }
            }
        }
    }

    /// Run one tick and return the messages it produced.
    pub fn tick(&mut self, dt: f64) -> Vec<(PeerId, AuthorityMessage)> {
        self.tick_id += 1;
        self.sim.step(dt);
        let outbound = self.sim.drain_outbox();
        debug!(tick_id = self.tick_id, dt, messages = outbound.len(), "tick");
        outbound
    }

    fn over_budget(&self, elapsed: Duration, budget: Duration) {
        warn!(
            tick_id = self.tick_id,
            elapsed_ms = elapsed.as_millis() as u64,
            budget_ms = budget.as_millis() as u64,
            "tick exceeded time budget"
        );
    }

    fn finished(&self) -> bool {
        self.config.max_ticks > 0 && self.tick_id >= self.config.max_ticks
    }

    /// Run the tick loop locally, discarding peer-bound messages.
    ///
    /// This is a blocking loop intended for local testing.
    #[cfg(test)]
    pub fn run(&mut self) {
        let tick_duration = self.config.tick_duration();
        info!(
            tick_rate = self.config.tick_rate,
            max_ticks = self.config.max_ticks,
            "starting local tick loop"
        );

        loop {
            let start = Instant::now();
            self.tick(tick_duration.as_secs_f64());
            if self.finished() {
                info!(ticks = self.tick_id, "tick loop complete");
                break;
            }

            let elapsed = start.elapsed();
            if elapsed < tick_duration {
                std::thread::sleep(tick_duration - elapsed);
            } else {
                self.over_budget(elapsed, tick_duration);
            }
        }
    }

    /// Run the tick loop against NATS.
    ///
    /// # Errors
    ///
    /// Returns an error if publishing to a peer fails.
    pub async fn run_async(
        &mut self,
        conn: &NatsConnection,
        inbound: &mut UnboundedReceiver<Inbound>,
    ) -> Result<()> {
        let tick_duration = self.config.tick_duration();
        let mut interval = tokio::time::interval(tick_duration);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            tick_rate = self.config.tick_rate,
            max_ticks = self.config.max_ticks,
            "starting tick loop"
        );

        loop {
            interval.tick().await;
            let start = Instant::now();

            while let Ok(event) = inbound.try_recv() {
                self.handle_inbound(event);
            }
            for (peer, message) in self.tick(tick_duration.as_secs_f64()) {
                conn.send_to_peer(peer, &message).await?;
            }

            let elapsed = start.elapsed();
            if elapsed > tick_duration {
                self.over_budget(elapsed, tick_duration);
            }
            if self.finished() {
                info!(ticks = self.tick_id, "tick loop complete");
                break;
            }
        }

        conn.flush().await?;
        Ok(())
    }
}
