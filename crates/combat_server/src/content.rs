//! Skills and status effects the authority ships with, and the character
//! every joining peer controls.

use combat_ecs::{ComponentData, EntityId};
use combat_net::PeerId;
use combat_sim::{Character, SkillDef, SkillError, Simulation, StatusEffectDef};
use serde_json::json;
use tracing::debug;

/// Instant hit with a cooldown; the peer waits for `impact`.
pub const STRIKE: &str = "Strike";
/// Channelled skill that pulses while active; pausable by `Frozen`.
pub const CHANNEL: &str = "Channel";
/// Blocks and cancels every shipped skill.
pub const STUN: &str = "Stun";
/// Pauses channelled skills.
pub const FROZEN: &str = "Frozen";
/// Stacking damage over time.
pub const BURN: &str = "Burn";

/// Register the shipped skills and effects.
pub fn register(sim: &mut Simulation) {
    sim.register_skill(
        SkillDef::new(STRIKE)
            .stunned_by(STUN)
            .on_start(|ctx| {
                ctx.set_cooldown(1.5);
                if let Err(err) = ctx.send_message("impact", &json!({ "damage": 12 })) {
                    debug!(%err, "impact not sent");
                }
            }),
    );
    sim.register_skill(
        SkillDef::new(CHANNEL)
            .stunned_by(STUN)
            .paused_by(FROZEN)
            .cancel_parallel(false)
            .on_start(|ctx| {
                if let Err(err) = ctx.send_message("pulse", &1u32) {
                    debug!(%err, "pulse not sent");
                }
            })
            .on_cancel(|ctx| {
                if !ctx.is_paused() {
                    ctx.increment_cooldown(2.0);
                }
            })
            .on_stop(|ctx| ctx.increment_cooldown(0.5)),
    );

    sim.register_effect(StatusEffectDef::new(STUN));
    sim.register_effect(StatusEffectDef::new(FROZEN));
    sim.register_effect(StatusEffectDef::new(BURN).on_stack(|_, instance, application| {
        instance.stacks = (instance.stacks + 1).min(5);
        instance.remaining = instance.remaining.max(application.remaining());
    }));
}

/// Spawn the character a peer controls, with the shipped skills bound.
///
/// # Errors
///
/// Returns [`SkillError`] if spawning or binding fails.
pub fn spawn_for(sim: &mut Simulation, peer: PeerId) -> Result<EntityId, SkillError> {
    let character = (sim.types().character, Some(Box::new(Character(peer.0)) as ComponentData));
    let entity = sim.spawn_character(Some(peer), vec![character])?;
    sim.set_slot(entity, 0, STRIKE)?;
    sim.set_slot(entity, 1, CHANNEL)?;
    Ok(entity)
}

#[cfg(test)]
mod tests {
    use combat_net::{PeerFrame, PeerMessage, SkillAction};
    use combat_sim::{Application, SlotState};

    use super::*;

    #[test]
    fn test_spawned_character_has_both_slots() {
        let mut sim = Simulation::new().unwrap();
        register(&mut sim);
        let entity = spawn_for(&mut sim, PeerId(4)).unwrap();
        assert_eq!(sim.slot_state(entity, 0), Some(SlotState::Idle));
        assert_eq!(sim.slot_state(entity, 1), Some(SlotState::Idle));
        assert_eq!(sim.world().component::<Character>(entity), Some(&Character(4)));
    }

    #[test]
    fn test_burn_stacks_are_capped() {
        let mut sim = Simulation::new().unwrap();
        register(&mut sim);
        let entity = spawn_for(&mut sim, PeerId(4)).unwrap();
        for _ in 0..8 {
            sim.apply_effect(entity, BURN, &Application::timed(3.0).with_data(json!({ "dps": 2 })))
                .unwrap();
        }
        assert_eq!(sim.effect(entity, BURN).unwrap().stacks, 5);
    }

    #[test]
    fn test_strike_cooldown_starts_on_confirm() {
        let mut sim = Simulation::new().unwrap();
        register(&mut sim);
        let entity = spawn_for(&mut sim, PeerId(4)).unwrap();
        assert_eq!(sim.start_skill(entity, 0).unwrap(), SlotState::Pending);
        assert_eq!(sim.get_cooldown_remaining(entity, 0).unwrap(), 0.0);

        let confirm = PeerFrame {
            peer: PeerId(4),
            message: PeerMessage::Action {
                entity,
                slot: 0,
                action: SkillAction::Confirm,
            },
        };
        sim.handle_peer_frame(&confirm).unwrap();
        assert!((sim.get_cooldown_remaining(entity, 0).unwrap() - 1.5).abs() < 1e-9);
    }
}
