//! Authority ↔ peer scenarios over an in-process loopback.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use combat_ecs::{EntityId, World};
use combat_net::{AuthorityMessage, PeerId};
use combat_sim::{
    Application, PeerOwner, PeerSkillDef, PeerSkillHost, ReplicationMirror, SkillDef, SkillError,
    Skills, SlotEnd, SlotState, Simulation, register_builtin,
};

const PEER: PeerId = PeerId(0xC0FFEE);

struct Loopback {
    sim: Simulation,
    host: PeerSkillHost,
    mirror: ReplicationMirror,
    errors: Vec<SkillError>,
}

impl Loopback {
    fn new(def: SkillDef, peer_def: PeerSkillDef) -> (Self, EntityId) {
        let skill = def.name().to_string();
        let mut sim = Simulation::new().unwrap();
        sim.register_skill(def);
        let entity = sim.spawn_character(Some(PEER), Vec::new()).unwrap();
        sim.set_slot(entity, 0, &skill).unwrap();

        let mut host = PeerSkillHost::new(PEER);
        host.register(peer_def);

        let mut shadow = World::new();
        register_builtin(&mut shadow).unwrap();
        let mut mirror = ReplicationMirror::new(shadow);
        mirror.index_by::<PeerOwner, _>(|owner| owner.0.0);

        sim.connect_peer(PEER);
        let mut loopback = Self {
            sim,
            host,
            mirror,
            errors: Vec::new(),
        };
        loopback.pump();
        (loopback, entity)
    }

    /// Deliver traffic both ways until neither side has anything to send.
    fn pump(&mut self) {
        for _ in 0..64 {
            let outbound = self.sim.drain_outbox();
            let mut progressed = !outbound.is_empty();
            for (peer, message) in outbound {
                assert_eq!(peer, PEER);
                if let AuthorityMessage::Replication(replication) = &message {
                    self.mirror.apply(replication);
                }
                self.host.handle(&message);
            }

            let frames = self.host.drain_outbox();
            progressed |= !frames.is_empty();
            for frame in frames {
                if let Err(err) = self.sim.handle_peer_frame(&frame) {
                    self.errors.push(err);
                }
            }
            if !progressed {
                return;
            }
        }
        panic!("loopback did not settle");
    }

    fn step(&mut self, dt: f64) {
        self.sim.step(dt);
        self.pump();
    }

    fn state(&self, entity: EntityId) -> Option<SlotState> {
        self.sim.slot_state(entity, 0)
    }
}

fn counting_def(name: &str, counter: &Arc<AtomicUsize>) -> SkillDef {
    let counter = counter.clone();
    SkillDef::new(name).on_start(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn test_authority_start_handshake() {
    let authority_starts = Arc::new(AtomicUsize::new(0));
    let peer_starts = Rc::new(Cell::new(0));
    let seen = peer_starts.clone();
    let peer_def = PeerSkillDef::new("Slash").on_start(move |_| {
        seen.set(seen.get() + 1);
        async {}
    });
    let (mut lb, entity) = Loopback::new(counting_def("Slash", &authority_starts), peer_def);

    assert_eq!(lb.sim.start_skill(entity, 0).unwrap(), SlotState::Pending);
    assert_eq!(authority_starts.load(Ordering::SeqCst), 0);

    lb.pump();
    assert_eq!(lb.state(entity), Some(SlotState::Active));
    assert_eq!(authority_starts.load(Ordering::SeqCst), 1);
    assert_eq!(peer_starts.get(), 1);
    assert!(lb.errors.is_empty());
}

#[test]
fn test_peer_request_starts_immediately() {
    let authority_starts = Arc::new(AtomicUsize::new(0));
    let (mut lb, entity) = Loopback::new(
        counting_def("Dash", &authority_starts),
        PeerSkillDef::new("Dash"),
    );

    lb.host.request_start(entity, 0);
    lb.pump();
    assert_eq!(lb.state(entity), Some(SlotState::Active));
    assert_eq!(authority_starts.load(Ordering::SeqCst), 1);
    assert!(lb.errors.is_empty());
}

#[test]
fn test_messages_arrive_in_order() {
    let def = SkillDef::new("Combo").on_start(|ctx| {
        for hit in 1u32..=3 {
            ctx.send_message("hit", &hit).unwrap();
        }
    });
    let received = Rc::new(RefCell::new(Vec::new()));
    let sink = received.clone();
    let peer_def = PeerSkillDef::new("Combo").on_start(move |ctx| {
        let sink = sink.clone();
        async move {
            for _ in 0..3 {
                if let Some(hit) = ctx.await_message("hit").await.decode::<u32>() {
                    sink.borrow_mut().push(hit);
                }
            }
        }
    });
    let (mut lb, entity) = Loopback::new(def, peer_def);

    lb.host.request_start(entity, 0);
    lb.pump();
    assert_eq!(*received.borrow(), vec![1, 2, 3]);
}

#[test]
fn test_reject_while_pending() {
    let authority_starts = Arc::new(AtomicUsize::new(0));
    let cancelled = Rc::new(Cell::new(None));
    let flag = cancelled.clone();
    let peer_def = PeerSkillDef::new("Slash").on_cancel(move |_, paused| flag.set(Some(paused)));
    let (mut lb, entity) = Loopback::new(counting_def("Slash", &authority_starts), peer_def);

    lb.sim.start_skill(entity, 0).unwrap();
    lb.sim.reject_skill(entity, 0).unwrap();
    let outbound = lb.sim.drain_outbox();
    let rejects = outbound
        .iter()
        .filter(|(_, message)| matches!(message, AuthorityMessage::SkillReject { .. }))
        .count();
    assert_eq!(rejects, 1);

    // The peer starts, confirms, then sees the reject; the late confirm is ignored.
    for (_, message) in &outbound {
        lb.host.handle(message);
    }
    for frame in lb.host.drain_outbox() {
        lb.sim.handle_peer_frame(&frame).unwrap();
    }
    assert_eq!(cancelled.get(), Some(false));
    assert_eq!(lb.state(entity), Some(SlotState::Idle));
    assert_eq!(authority_starts.load(Ordering::SeqCst), 0);
}

#[test]
fn test_stun_rejects_every_outstanding_await() {
    let def = SkillDef::new("Channel").stunned_by("Stun");
    let rejected = Rc::new(Cell::new(0));
    let cancelled = Rc::new(Cell::new(None));
    let (count, flag) = (rejected.clone(), cancelled.clone());
    let peer_def = PeerSkillDef::new("Channel")
        .on_start(move |ctx| {
            let count = count.clone();
            async move {
                let (a, b, c) = futures::join!(
                    ctx.await_message("pulse"),
                    ctx.await_message("pulse"),
                    ctx.await_message("pulse")
                );
                count.set([a, b, c].iter().filter(|result| result.is_rejected()).count());
            }
        })
        .on_cancel(move |_, paused| flag.set(Some(paused)));
    let (mut lb, entity) = Loopback::new(def, peer_def);

    lb.host.request_start(entity, 0);
    lb.pump();
    assert_eq!(lb.host.pending_awaits(entity, 0), 3);

    lb.sim
        .apply_effect(entity, "Stun", &Application::timed(1.0))
        .unwrap();
    lb.step(0.1);
    assert_eq!(rejected.get(), 3);
    assert_eq!(cancelled.get(), Some(false));
    assert_eq!(lb.state(entity), Some(SlotState::Idle));
    let skills = lb.sim.world().component::<Skills>(entity).unwrap();
    assert_eq!(skills.slots[0].last_end, Some(SlotEnd::Rejected));

    lb.host.request_start(entity, 0);
    lb.pump();
    assert!(matches!(lb.errors.as_slice(), [SkillError::Blocked { effect }] if effect == "Stun"));

    lb.step(1.0);
    lb.host.request_start(entity, 0);
    lb.pump();
    assert_eq!(lb.state(entity), Some(SlotState::Active));
}

#[test]
fn test_pause_then_resume_reruns_handshake() {
    let authority_starts = Arc::new(AtomicUsize::new(0));
    let def = counting_def("Channel", &authority_starts).paused_by("Frozen");
    let peer_starts = Rc::new(Cell::new(0));
    let pauses = Rc::new(RefCell::new(Vec::new()));
    let (seen, log) = (peer_starts.clone(), pauses.clone());
    let peer_def = PeerSkillDef::new("Channel")
        .on_start(move |_| {
            seen.set(seen.get() + 1);
            async {}
        })
        .on_cancel(move |_, paused| log.borrow_mut().push(paused));
    let (mut lb, entity) = Loopback::new(def, peer_def);

    lb.host.request_start(entity, 0);
    lb.pump();
    lb.sim
        .apply_effect(entity, "Frozen", &Application::permanent())
        .unwrap();
    lb.step(0.1);
    assert_eq!(lb.state(entity), Some(SlotState::Paused));
    assert_eq!(*pauses.borrow(), vec![true]);

    lb.step(0.1);
    assert_eq!(lb.state(entity), Some(SlotState::Paused));

    lb.sim.remove_effect(entity, "Frozen").unwrap();
    lb.step(0.1);
    assert_eq!(lb.state(entity), Some(SlotState::Active));
    assert_eq!(authority_starts.load(Ordering::SeqCst), 2);
    assert_eq!(peer_starts.get(), 2);
    assert!(lb.errors.is_empty());
}

#[test]
fn test_stun_during_pause_drops_resume() {
    let def = SkillDef::new("Channel")
        .paused_by("Frozen")
        .stunned_by("Stun");
    let cancels = Rc::new(RefCell::new(Vec::new()));
    let log = cancels.clone();
    let peer_def =
        PeerSkillDef::new("Channel").on_cancel(move |_, paused| log.borrow_mut().push(paused));
    let (mut lb, entity) = Loopback::new(def, peer_def);

    lb.host.request_start(entity, 0);
    lb.pump();
    lb.sim
        .apply_effect(entity, "Frozen", &Application::permanent())
        .unwrap();
    lb.step(0.1);
    lb.sim
        .apply_effect(entity, "Stun", &Application::permanent())
        .unwrap();
    lb.sim.remove_effect(entity, "Frozen").unwrap();
    lb.step(0.1);

    assert_eq!(lb.state(entity), Some(SlotState::Idle));
    assert_eq!(*cancels.borrow(), vec![true, false]);
    assert!(!lb.host.is_running(entity, 0));
}

#[test]
fn test_cooldown_gates_peer_requests() {
    let def = SkillDef::new("Bolt").on_start(|ctx| ctx.set_cooldown(3.0));
    let stopped = Rc::new(Cell::new(false));
    let flag = stopped.clone();
    let peer_def = PeerSkillDef::new("Bolt").on_stop(move |_| flag.set(true));
    let (mut lb, entity) = Loopback::new(def, peer_def);

    lb.host.request_start(entity, 0);
    lb.pump();
    lb.host.request_stop(entity, 0);
    lb.pump();
    assert!(stopped.get());
    assert_eq!(lb.state(entity), Some(SlotState::Idle));

    lb.step(1.0);
    let remaining = lb.sim.get_cooldown_remaining(entity, 0).unwrap();
    assert!((remaining - 2.0).abs() < 1e-9);
    lb.host.request_start(entity, 0);
    lb.pump();
    assert!(matches!(lb.errors.as_slice(), [SkillError::OnCooldown { .. }]));

    lb.step(1.0);
    lb.step(1.0);
    assert_eq!(lb.sim.get_cooldown_remaining(entity, 0).unwrap(), 0.0);
    lb.host.request_start(entity, 0);
    lb.pump();
    assert_eq!(lb.state(entity), Some(SlotState::Active));
}

#[test]
fn test_mirror_tracks_owned_character() {
    let (mut lb, entity) = Loopback::new(SkillDef::new("Dash"), PeerSkillDef::new("Dash"));
    let local = lb.mirror.entity_for::<PeerOwner>(PEER.0).unwrap();
    assert_eq!(lb.mirror.remote_id(local), Some(entity));

    lb.host.request_start(entity, 0);
    lb.pump();
    lb.sim.replicate();
    lb.pump();
    let skills = lb.mirror.world().component::<Skills>(local).unwrap();
    assert_eq!(skills.slots[0].state, SlotState::Active);
    assert_eq!(skills.slots[0].skill.as_deref(), Some("Dash"));
}

#[test]
fn test_destroy_resolves_peer_awaits() {
    let outcome = Rc::new(Cell::new(None));
    let sink = outcome.clone();
    let peer_def = PeerSkillDef::new("Channel").on_start(move |ctx| {
        let sink = sink.clone();
        async move {
            sink.set(Some(ctx.await_message("never").await.is_rejected()));
        }
    });
    let (mut lb, entity) = Loopback::new(SkillDef::new("Channel"), peer_def);

    lb.host.request_start(entity, 0);
    lb.pump();
    lb.sim.destroy(entity).unwrap();
    lb.step(0.1);

    assert_eq!(outcome.get(), Some(true));
    assert_eq!(lb.mirror.entity_for::<PeerOwner>(PEER.0), None);
    assert_eq!(lb.mirror.world().entity_count(), 0);
}
