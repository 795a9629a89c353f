//! Status effects: application, stacking, ticking and expiry.
//!
//! Each entity holds at most one instance per effect name in its
//! [`StatusEffects`] component. Applying an active effect stacks into the
//! existing instance; [`StatusEngine::tick`] runs `on_tick`, counts down the
//! remaining time and removes instances that reach zero. Effects without a
//! registered definition use the default behaviour.
//!
//! Hooks run with the instance detached from the component, so a hook sees
//! the world without the instance it is called for.

use std::collections::HashMap;
use std::sync::Arc;

use combat_ecs::{EcsError, EntityId, QueryDescriptor, World};
use serde_json::Value;
use tracing::{debug, trace};

use crate::components::{PERMANENT, StatusEffectInstance, StatusEffects};
use crate::error::SkillError;

/// Parameters of one application.
#[derive(Debug, Clone, PartialEq)]
pub struct Application {
    /// Seconds the effect lasts; `None` means permanent.
    pub duration: Option<f64>,
    /// Effect-specific data.
    pub data: Value,
}

impl Application {
    /// A permanent application with no data.
    #[must_use]
    pub fn permanent() -> Self {
        Self {
            duration: None,
            data: Value::Null,
        }
    }

    /// An application lasting `seconds`.
    #[must_use]
    pub fn timed(seconds: f64) -> Self {
        Self {
            duration: Some(seconds),
            data: Value::Null,
        }
    }

    /// Attach effect data.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// The instance duration, with permanence encoded as a negative value.
    #[must_use]
    pub fn remaining(&self) -> f64 {
        self.duration.unwrap_or(PERMANENT)
    }
}

/// World access for status-effect hooks.
pub struct EffectContext<'w> {
    /// The affected entity.
    pub entity: EntityId,
    /// The authority world.
    pub world: &'w mut World,
}

type AppliedFn =
    Arc<dyn Fn(&mut EffectContext<'_>, &Application) -> StatusEffectInstance + Send + Sync>;
type StackFn =
    Arc<dyn Fn(&mut EffectContext<'_>, &mut StatusEffectInstance, &Application) + Send + Sync>;
type TickFn = Arc<dyn Fn(&mut EffectContext<'_>, &mut StatusEffectInstance, f64) + Send + Sync>;
type RemovedFn = Arc<dyn Fn(&mut EffectContext<'_>, &StatusEffectInstance) + Send + Sync>;

/// Hooks of a named status effect. Every hook is optional.
#[derive(Clone, Default)]
pub struct StatusEffectDef {
    name: String,
    on_applied: Option<AppliedFn>,
    on_stack: Option<StackFn>,
    on_tick: Option<TickFn>,
    on_removed: Option<RemovedFn>,
}

impl StatusEffectDef {
    /// An effect with default behaviour.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Build the first instance from an application.
    #[must_use]
    pub fn on_applied<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut EffectContext<'_>, &Application) -> StatusEffectInstance + Send + Sync + 'static,
    {
        self.on_applied = Some(Arc::new(hook));
        self
    }

    /// Merge a new application into the active instance.
    #[must_use]
    pub fn on_stack<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut EffectContext<'_>, &mut StatusEffectInstance, &Application)
            + Send
            + Sync
            + 'static,
    {
        self.on_stack = Some(Arc::new(hook));
        self
    }

    /// Called every step with the step's `dt`, before the countdown.
    #[must_use]
    pub fn on_tick<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut EffectContext<'_>, &mut StatusEffectInstance, f64) + Send + Sync + 'static,
    {
        self.on_tick = Some(Arc::new(hook));
        self
    }

    /// Called when the instance is removed or expires.
    #[must_use]
    pub fn on_removed<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut EffectContext<'_>, &StatusEffectInstance) + Send + Sync + 'static,
    {
        self.on_removed = Some(Arc::new(hook));
        self
    }

    /// Registered name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for StatusEffectDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusEffectDef")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Default stacking: one more stack, duration refreshed to the new
/// application, object data merged key by key.
pub fn default_stack(instance: &mut StatusEffectInstance, application: &Application) {
    instance.stacks = instance.stacks.saturating_add(1);
    instance.remaining = application.remaining();
    match (&mut instance.data, &application.data) {
        (Value::Object(current), Value::Object(incoming)) => {
            for (key, value) in incoming {
                current.insert(key.clone(), value.clone());
            }
        }
        (_, Value::Null) => {}
        (current, incoming) => *current = incoming.clone(),
    }
}

/// Applies, stacks, ticks and removes status effects.
#[derive(Debug, Default)]
pub struct StatusEngine {
    defs: HashMap<String, StatusEffectDef>,
}

impl StatusEngine {
    /// An engine with no effects registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register hooks for an effect name.
    pub fn register(&mut self, def: StatusEffectDef) {
        self.defs.insert(def.name.clone(), def);
    }

    /// Apply `name` to `entity`, stacking onto an active instance.
    ///
    /// Entities without a [`StatusEffects`] component get one.
    ///
    /// # Errors
    ///
    /// Returns an ECS error if the entity is invalid or the component kind
    /// is not registered.
    pub fn apply(
        &self,
        world: &mut World,
        entity: EntityId,
        name: &str,
        application: &Application,
    ) -> Result<(), SkillError> {
        if !world.is_valid(entity) {
            return Err(EcsError::InvalidEntity(entity).into());
        }
        if world.component::<StatusEffects>(entity).is_none() {
            world.insert(entity, StatusEffects::default())?;
        }

        let def = self.defs.get(name);
        let existing = detach(world, entity, name);
        let mut ctx = EffectContext { entity, world: &mut *world };
        let instance = match existing {
            Some(mut instance) => {
                match def.and_then(|def| def.on_stack.as_ref()) {
                    Some(hook) => hook(&mut ctx, &mut instance, application),
                    None => default_stack(&mut instance, application),
                }
                debug!(%entity, effect = name, stacks = instance.stacks, "status effect stacked");
                instance
            }
            None => {
                let instance = match def.and_then(|def| def.on_applied.as_ref()) {
                    Some(hook) => hook(&mut ctx, application),
                    None => {
                        StatusEffectInstance::new(application.remaining(), application.data.clone())
                    }
                };
                debug!(
                    %entity,
                    effect = name,
                    remaining = instance.remaining,
                    "status effect applied"
                );
                instance
            }
        };
        attach(world, entity, name, instance);
        Ok(())
    }

    /// Remove `name` from `entity`, running `on_removed`.
    ///
    /// Returns `false` if the effect was not active.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidEntity`].
    pub fn remove(
        &self,
        world: &mut World,
        entity: EntityId,
        name: &str,
    ) -> Result<bool, SkillError> {
        if !world.is_valid(entity) {
            return Err(EcsError::InvalidEntity(entity).into());
        }
        let Some(instance) = detach(world, entity, name) else {
            return Ok(false);
        };
        self.removed(world, entity, name, &instance);
        Ok(true)
    }

    /// Remove every effect from `entity` in name order.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidEntity`].
    pub fn remove_all(&self, world: &mut World, entity: EntityId) -> Result<usize, SkillError> {
        let names = effect_names(world, entity);
        let mut removed = 0;
        for name in names {
            if self.remove(world, entity, &name)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Advance every instance by `dt` seconds.
    ///
    /// `on_tick` runs first; timed instances whose remaining time reaches
    /// zero are then removed with `on_removed`.
    pub fn tick(&self, world: &mut World, dt: f64) {
        let Some(ty) = world.type_of::<StatusEffects>() else {
            return;
        };
        for entity in world.query(&QueryDescriptor::new().with(ty)) {
            for name in effect_names(world, entity) {
                let Some(mut instance) = detach(world, entity, &name) else {
                    continue;
                };
                let def = self.defs.get(&name);
                let permanent = instance.is_permanent();
                if let Some(hook) = def.and_then(|def| def.on_tick.as_ref()) {
                    hook(&mut EffectContext { entity, world: &mut *world }, &mut instance, dt);
                }
                if !permanent {
                    instance.remaining -= dt;
                    if instance.remaining <= 0.0 {
                        trace!(%entity, effect = %name, "status effect expired");
                        self.removed(world, entity, &name, &instance);
                        continue;
                    }
                }
                attach(world, entity, &name, instance);
            }
        }
    }

    fn removed(
        &self,
        world: &mut World,
        entity: EntityId,
        name: &str,
        instance: &StatusEffectInstance,
    ) {
        if let Some(hook) = self.defs.get(name).and_then(|def| def.on_removed.as_ref()) {
            hook(&mut EffectContext { entity, world: &mut *world }, instance);
        }
        debug!(%entity, effect = name, "status effect removed");
    }
}

/// Borrow an active instance.
#[must_use]
pub fn effect<'w>(
    world: &'w World,
    entity: EntityId,
    name: &str,
) -> Option<&'w StatusEffectInstance> {
    world.component::<StatusEffects>(entity)?.effects.get(name)
}

fn effect_names(world: &World, entity: EntityId) -> Vec<String> {
    world
        .component::<StatusEffects>(entity)
        .map(|effects| effects.effects.keys().cloned().collect())
        .unwrap_or_default()
}

fn detach(world: &mut World, entity: EntityId, name: &str) -> Option<StatusEffectInstance> {
    world.component_mut::<StatusEffects>(entity)?.effects.remove(name)
}

fn attach(world: &mut World, entity: EntityId, name: &str, instance: StatusEffectInstance) {
    match world.component_mut::<StatusEffects>(entity) {
        Some(effects) => {
            effects.effects.insert(name.to_string(), instance);
        }
        None => trace!(%entity, effect = name, "status effects gone during hook"),
    }
}
