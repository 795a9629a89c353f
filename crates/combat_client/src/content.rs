//! Peer halves of the skills the authority ships with.
//!
//! Routines record what they observe in an [`EventLog`] so the binary can
//! report it and tests can assert on it.

use std::cell::RefCell;
use std::rc::Rc;

use combat_ecs::EntityId;
use combat_net::SlotIndex;
use combat_sim::PeerSkillDef;
use serde::Deserialize;
use tracing::{debug, info};

/// Instant hit; resolves on `impact`.
pub const STRIKE: &str = "Strike";
/// Channelled skill; resolves on `pulse`.
pub const CHANNEL: &str = "Channel";

/// Something a peer routine observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// A strike landed.
    Impact { entity: EntityId, damage: u32 },
    /// A channel pulsed.
    Pulse { entity: EntityId, count: u32 },
    /// The authority rejected or paused the slot.
    Interrupted {
        entity: EntityId,
        slot: SlotIndex,
        paused: bool,
    },
    /// The authority stopped the slot.
    Stopped { entity: EntityId, slot: SlotIndex },
}

/// Shared record of [`PeerEvent`]s.
pub type EventLog = Rc<RefCell<Vec<PeerEvent>>>;

#[derive(Debug, Deserialize)]
struct Impact {
    damage: u32,
}

/// Peer definitions for every shipped skill, recording into `log`.
#[must_use]
pub fn skills(log: &EventLog) -> Vec<PeerSkillDef> {
    vec![strike(log), channel(log)]
}

fn strike(log: &EventLog) -> PeerSkillDef {
    let started = log.clone();
    let interrupted = log.clone();
    PeerSkillDef::new(STRIKE)
        .on_start(move |ctx| {
            let log = started.clone();
            async move {
                let result = ctx.await_message("impact").await;
                match result.decode::<Impact>() {
                    Some(impact) => {
                        info!(entity = %ctx.entity(), damage = impact.damage, "strike landed");
                        log.borrow_mut().push(PeerEvent::Impact {
                            entity: ctx.entity(),
                            damage: impact.damage,
                        });
                    }
                    None => debug!(
                        entity = %ctx.entity(),
                        rejected = result.is_rejected(),
                        "strike fizzled"
                    ),
                }
            }
        })
        .on_cancel(move |ctx, paused| {
            interrupted.borrow_mut().push(PeerEvent::Interrupted {
                entity: ctx.entity(),
                slot: ctx.slot(),
                paused,
            });
        })
}

fn channel(log: &EventLog) -> PeerSkillDef {
    let started = log.clone();
    let interrupted = log.clone();
    let stopped = log.clone();
    PeerSkillDef::new(CHANNEL)
        .on_start(move |ctx| {
            let log = started.clone();
            async move {
                if let Some(count) = ctx.await_message("pulse").await.decode::<u32>() {
                    log.borrow_mut().push(PeerEvent::Pulse {
                        entity: ctx.entity(),
                        count,
                    });
                }
            }
        })
        .on_cancel(move |ctx, paused| {
            interrupted.borrow_mut().push(PeerEvent::Interrupted {
                entity: ctx.entity(),
                slot: ctx.slot(),
                paused,
            });
        })
        .on_stop(move |ctx| {
            stopped.borrow_mut().push(PeerEvent::Stopped {
                entity: ctx.entity(),
                slot: ctx.slot(),
            });
        })
}
