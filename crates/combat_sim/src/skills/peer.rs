//! Peer-side skill host.
//!
//! The host mirrors the authority's slot signals for the entities a peer
//! controls. `SkillStart` spawns the peer routine on a single-threaded
//! executor and answers with `Confirm`; `SkillMessage` feeds the slot's
//! [`Mailbox`]; `SkillReject`, `SkillPause` and `SkillStop` close the mailbox
//! and run the matching callback. Routines only make progress inside
//! [`PeerSkillHost::handle`] and [`PeerSkillHost::run_until_stalled`], so a
//! test can drive them step by step.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::rc::Rc;

use combat_ecs::EntityId;
use combat_net::{AuthorityMessage, PeerFrame, PeerId, PeerMessage, SkillAction, SlotIndex};
use futures::FutureExt;
use futures::executor::{LocalPool, LocalSpawner};
use futures::future::LocalBoxFuture;
use futures::task::LocalSpawnExt;
use tracing::{debug, trace, warn};

use super::mailbox::{Mailbox, MessageResult};

type StartFn = Rc<dyn Fn(PeerSkillContext) -> LocalBoxFuture<'static, ()>>;
type CancelFn = Rc<dyn Fn(&PeerSkillContext, bool)>;
type StopFn = Rc<dyn Fn(&PeerSkillContext)>;

/// Peer half of a skill: an async start routine plus cancel/stop callbacks.
#[derive(Clone)]
pub struct PeerSkillDef {
    name: String,
    on_start: Option<StartFn>,
    on_cancel: Option<CancelFn>,
    on_stop: Option<StopFn>,
}

impl PeerSkillDef {
    /// A peer skill with no routines.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            on_start: None,
            on_cancel: None,
            on_stop: None,
        }
    }

    /// Routine spawned on every `SkillStart`, including resumes.
    #[must_use]
    pub fn on_start<F, Fut>(mut self, routine: F) -> Self
    where
        F: Fn(PeerSkillContext) -> Fut + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        self.on_start = Some(Rc::new(move |ctx| routine(ctx).boxed_local()));
        self
    }

    /// Callback for `SkillReject` (`false`) and `SkillPause` (`true`).
    #[must_use]
    pub fn on_cancel<F>(mut self, callback: F) -> Self
    where
        F: Fn(&PeerSkillContext, bool) + 'static,
    {
        self.on_cancel = Some(Rc::new(callback));
        self
    }

    /// Callback for `SkillStop`.
    #[must_use]
    pub fn on_stop<F>(mut self, callback: F) -> Self
    where
        F: Fn(&PeerSkillContext) + 'static,
    {
        self.on_stop = Some(Rc::new(callback));
        self
    }

    /// Registered name, matching the authority definition.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for PeerSkillDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerSkillDef")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Handle given to a peer routine.
#[derive(Clone)]
pub struct PeerSkillContext {
    entity: EntityId,
    slot: SlotIndex,
    skill: Rc<str>,
    mailbox: Rc<RefCell<Mailbox>>,
    outbox: Rc<RefCell<Vec<PeerMessage>>>,
}

impl PeerSkillContext {
    /// Authority identifier of the entity.
    #[must_use]
    pub fn entity(&self) -> EntityId {
        self.entity
    }

    /// The slot.
    #[must_use]
    pub fn slot(&self) -> SlotIndex {
        self.slot
    }

    /// The skill name.
    #[must_use]
    pub fn skill(&self) -> &str {
        &self.skill
    }

    /// Wait for the next message called `name` on this slot.
    ///
    /// Resolves to [`MessageResult::Rejected`] once the run has ended.
    pub async fn await_message(&self, name: &str) -> MessageResult {
        let rx = self.mailbox.borrow_mut().wait(name);
        rx.await.unwrap_or(MessageResult::Rejected)
    }

    /// `true` once this run was rejected, paused or stopped.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.mailbox.borrow().is_closed()
    }

    /// Ask the authority to stop this skill.
    pub fn request_stop(&self) {
        self.outbox.borrow_mut().push(PeerMessage::Action {
            entity: self.entity,
            slot: self.slot,
            action: SkillAction::Stop,
        });
    }
}

impl std::fmt::Debug for PeerSkillContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerSkillContext")
            .field("entity", &self.entity)
            .field("slot", &self.slot)
            .field("skill", &self.skill)
            .finish_non_exhaustive()
    }
}

struct PeerSlot {
    def: Option<Rc<PeerSkillDef>>,
    ctx: PeerSkillContext,
}

impl PeerSlot {
    fn close(&self) -> usize {
        self.ctx.mailbox.borrow_mut().close()
    }
}

/// Runs peer skill routines for one peer.
pub struct PeerSkillHost {
    peer: PeerId,
    defs: HashMap<String, Rc<PeerSkillDef>>,
    slots: BTreeMap<(EntityId, SlotIndex), PeerSlot>,
    pool: LocalPool,
    spawner: LocalSpawner,
    outbox: Rc<RefCell<Vec<PeerMessage>>>,
}

impl PeerSkillHost {
    /// A host for `peer` with no skills registered.
    #[must_use]
    pub fn new(peer: PeerId) -> Self {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Self {
            peer,
            defs: HashMap::new(),
            slots: BTreeMap::new(),
            pool,
            spawner,
            outbox: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// The peer this host acts for.
    #[must_use]
    pub fn peer(&self) -> PeerId {
        self.peer
    }

    /// Register a peer skill definition, replacing any with the same name.
    pub fn register(&mut self, def: PeerSkillDef) {
        self.defs.insert(def.name.clone(), Rc::new(def));
    }

    /// Ask the authority to start a slot.
    pub fn request_start(&mut self, entity: EntityId, slot: SlotIndex) {
        self.push_action(entity, slot, SkillAction::Start);
    }

    /// Ask the authority to stop a slot.
    pub fn request_stop(&mut self, entity: EntityId, slot: SlotIndex) {
        self.push_action(entity, slot, SkillAction::Stop);
    }

    fn push_action(&self, entity: EntityId, slot: SlotIndex, action: SkillAction) {
        self.outbox.borrow_mut().push(PeerMessage::Action {
            entity,
            slot,
            action,
        });
    }

    /// Frames queued for the authority, tagged with this peer's id.
    pub fn drain_outbox(&mut self) -> Vec<PeerFrame> {
        let peer = self.peer;
        self.outbox
            .borrow_mut()
            .drain(..)
            .map(|message| PeerFrame { peer, message })
            .collect()
    }

    /// Apply one authority signal and let routines run until they block.
    ///
    /// Replication messages are ignored here except `Destroyed`, which drops
    /// every slot of the entity.
    pub fn handle(&mut self, message: &AuthorityMessage) {
        match message {
            AuthorityMessage::SkillStart {
                entity,
                slot,
                skill,
            } => self.start(*entity, *slot, skill),
            AuthorityMessage::SkillMessage {
                entity,
                slot,
                name,
                payload,
            } => match self.slots.get(&(*entity, *slot)) {
                Some(running) => {
                    running.ctx.mailbox.borrow_mut().deliver(name, payload.clone());
                }
                None => trace!(%entity, slot, %name, "message for idle slot dropped"),
            },
            AuthorityMessage::SkillReject { entity, slot } => {
                if let Some(running) = self.slots.remove(&(*entity, *slot)) {
                    running.close();
                    let callback = running.def.as_ref().and_then(|def| def.on_cancel.as_ref());
                    if let Some(callback) = callback {
                        callback(&running.ctx, false);
                    }
                    debug!(%entity, slot, "skill rejected");
                }
            }
            AuthorityMessage::SkillPause { entity, slot } => {
                if let Some(running) = self.slots.get(&(*entity, *slot)) {
                    running.close();
                    let callback = running.def.as_ref().and_then(|def| def.on_cancel.as_ref());
                    if let Some(callback) = callback {
                        callback(&running.ctx, true);
                    }
                    debug!(%entity, slot, "skill paused");
                }
            }
            AuthorityMessage::SkillStop { entity, slot } => {
                if let Some(running) = self.slots.remove(&(*entity, *slot)) {
                    running.close();
                    let callback = running.def.as_ref().and_then(|def| def.on_stop.as_ref());
                    if let Some(callback) = callback {
                        callback(&running.ctx);
                    }
                    debug!(%entity, slot, "skill stopped");
                }
            }
            AuthorityMessage::Replication(combat_net::ReplicationMessage::Destroyed { entity }) => {
                self.drop_entity(*entity);
            }
            AuthorityMessage::Replication(_) => {}
        }
        self.run_until_stalled();
    }

    fn start(&mut self, entity: EntityId, slot: SlotIndex, skill: &str) {
        if let Some(previous) = self.slots.remove(&(entity, slot)) {
            previous.close();
        }
        let def = self.defs.get(skill).cloned();
        if def.is_none() {
            warn!(%entity, slot, skill, "no peer routine registered");
        }
        let ctx = PeerSkillContext {
            entity,
            slot,
            skill: Rc::from(skill),
            mailbox: Rc::new(RefCell::new(Mailbox::new())),
            outbox: self.outbox.clone(),
        };
        if let Some(routine) = def.as_ref().and_then(|def| def.on_start.clone()) {
            if let Err(err) = self.spawner.spawn_local(routine(ctx.clone())) {
                warn!(%entity, slot, skill, %err, "failed to spawn peer routine");
            }
        }
        self.slots.insert((entity, slot), PeerSlot { def, ctx });
        self.run_until_stalled();
        self.push_action(entity, slot, SkillAction::Confirm);
        debug!(%entity, slot, skill, "skill started");
    }

    /// Close every slot of a destroyed entity without running callbacks.
    pub fn drop_entity(&mut self, entity: EntityId) {
        let keys: Vec<_> = self
            .slots
            .range((entity, SlotIndex::MIN)..=(entity, SlotIndex::MAX))
            .map(|(key, _)| *key)
            .collect();
        for key in keys {
            if let Some(running) = self.slots.remove(&key) {
                running.close();
            }
        }
    }

    /// Drive spawned routines until none can make progress.
    pub fn run_until_stalled(&mut self) {
        self.pool.run_until_stalled();
    }

    /// Returns `true` while a slot has an open run.
    #[must_use]
    pub fn is_running(&self, entity: EntityId, slot: SlotIndex) -> bool {
        self.slots
            .get(&(entity, slot))
            .is_some_and(|running| !running.ctx.is_cancelled())
    }

    /// Awaits parked on a slot.
    #[must_use]
    pub fn pending_awaits(&self, entity: EntityId, slot: SlotIndex) -> usize {
        self.slots
            .get(&(entity, slot))
            .map_or(0, |running| running.ctx.mailbox.borrow().pending())
    }
}

impl std::fmt::Debug for PeerSkillHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerSkillHost")
            .field("peer", &self.peer)
            .field("skills", &self.defs.len())
            .field("slots", &self.slots.len())
            .finish_non_exhaustive()
    }
}
