//! Authority-side skill definitions and their registry.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use super::context::SkillContext;

/// An authority-side skill routine.
pub type AuthorityRoutine = Arc<dyn Fn(&mut SkillContext<'_>) + Send + Sync>;

/// A named skill: gating rules plus the authority routines.
#[derive(Clone)]
pub struct SkillDef {
    name: String,
    stun_states: Vec<String>,
    pause_states: Vec<String>,
    cancel_parallel: bool,
    on_start: Option<AuthorityRoutine>,
    on_stop: Option<AuthorityRoutine>,
    on_cancel: Option<AuthorityRoutine>,
}

impl SkillDef {
    /// A skill with no gating and no routines. Cancel and stop routines run
    /// together by default.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stun_states: Vec::new(),
            pause_states: Vec::new(),
            cancel_parallel: true,
            on_start: None,
            on_stop: None,
            on_cancel: None,
        }
    }

    /// Block and cancel the skill while the named effect is active.
    #[must_use]
    pub fn stunned_by(mut self, effect: impl Into<String>) -> Self {
        self.stun_states.push(effect.into());
        self
    }

    /// Pause the skill while the named effect is active.
    #[must_use]
    pub fn paused_by(mut self, effect: impl Into<String>) -> Self {
        self.pause_states.push(effect.into());
        self
    }

    /// Choose whether the cancel and stop routines see the same slot state
    /// (`true`) or run one after the other (`false`).
    #[must_use]
    pub fn cancel_parallel(mut self, parallel: bool) -> Self {
        self.cancel_parallel = parallel;
        self
    }

    /// Routine run when the skill becomes active.
    #[must_use]
    pub fn on_start<F>(mut self, routine: F) -> Self
    where
        F: Fn(&mut SkillContext<'_>) + Send + Sync + 'static,
    {
        self.on_start = Some(Arc::new(routine));
        self
    }

    /// Routine run when the skill stops or is cancelled.
    #[must_use]
    pub fn on_stop<F>(mut self, routine: F) -> Self
    where
        F: Fn(&mut SkillContext<'_>) + Send + Sync + 'static,
    {
        self.on_stop = Some(Arc::new(routine));
        self
    }

    /// Routine run when the skill is cancelled or paused.
    #[must_use]
    pub fn on_cancel<F>(mut self, routine: F) -> Self
    where
        F: Fn(&mut SkillContext<'_>) + Send + Sync + 'static,
    {
        self.on_cancel = Some(Arc::new(routine));
        self
    }

    /// Registered name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Effects that block and cancel the skill.
    #[must_use]
    pub fn stun_states(&self) -> &[String] {
        &self.stun_states
    }

    /// Effects that pause the skill.
    #[must_use]
    pub fn pause_states(&self) -> &[String] {
        &self.pause_states
    }

    /// Whether cancel and stop routines share one slot snapshot.
    #[must_use]
    pub fn is_cancel_parallel(&self) -> bool {
        self.cancel_parallel
    }

    pub(crate) fn start_routine(&self) -> Option<&AuthorityRoutine> {
        self.on_start.as_ref()
    }

    pub(crate) fn stop_routine(&self) -> Option<&AuthorityRoutine> {
        self.on_stop.as_ref()
    }

    pub(crate) fn cancel_routine(&self) -> Option<&AuthorityRoutine> {
        self.on_cancel.as_ref()
    }
}

impl std::fmt::Debug for SkillDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkillDef")
            .field("name", &self.name)
            .field("stun_states", &self.stun_states)
            .field("pause_states", &self.pause_states)
            .field("cancel_parallel", &self.cancel_parallel)
            .finish_non_exhaustive()
    }
}

/// Skill definitions by name.
#[derive(Debug, Default)]
pub struct SkillRegistry {
    defs: HashMap<String, Arc<SkillDef>>,
}

impl SkillRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition, replacing any previous one with the same name.
    pub fn register(&mut self, def: SkillDef) {
        let name = def.name.clone();
        if self.defs.insert(name.clone(), Arc::new(def)).is_some() {
            warn!(skill = %name, "replaced skill definition");
        }
    }

    /// Look up a definition.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<SkillDef>> {
        self.defs.get(name).cloned()
    }

    /// Returns `true` if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.defs.contains_key(name)
    }

    /// Number of registered definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let def = SkillDef::new("Fireball");
        assert!(def.is_cancel_parallel());
        assert!(def.stun_states().is_empty());
        assert!(def.start_routine().is_none());
    }

    #[test]
    fn test_builder_collects_states() {
        let def = SkillDef::new("Channel")
            .stunned_by("Stun")
            .stunned_by("Silence")
            .paused_by("Frozen")
            .cancel_parallel(false);
        assert_eq!(def.stun_states(), ["Stun", "Silence"]);
        assert_eq!(def.pause_states(), ["Frozen"]);
        assert!(!def.is_cancel_parallel());
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = SkillRegistry::new();
        registry.register(SkillDef::new("Dash"));
        registry.register(SkillDef::new("Dash").stunned_by("Root"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("Dash").unwrap().stun_states(), ["Root"]);
        assert!(registry.get("Blink").is_none());
    }
}
