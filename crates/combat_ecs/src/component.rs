//! Component type registration: factories, options, and lifecycle hooks.
//!
//! Component data is stored type-erased as [`ComponentData`]. Every component
//! kind is registered once with a [`ComponentDescriptor`] that holds an
//! immutable table of function references: a factory that builds a complete
//! default-filled value, an optional serialise/deserialise pair used by
//! replication, and optional `on_added`/`on_removed` hooks.
//!
//! Rust types implementing [`Component`] get a descriptor derived from their
//! `Default` and `serde` implementations via [`ComponentDescriptor::of`].

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::entity::EntityId;
use crate::error::EcsError;

/// A type-erased component value.
pub type ComponentValue = dyn Any + Send + Sync;

/// Owned, type-erased component data as stored in the [`World`](crate::World).
pub type ComponentData = Box<ComponentValue>;

/// Builds a complete component value from optional caller-supplied data.
pub type FactoryFn = Arc<dyn Fn(Option<ComponentData>) -> ComponentData + Send + Sync>;

/// Serialises a component value to bytes.
pub type SerializeFn = Arc<dyn Fn(&ComponentValue) -> Result<Vec<u8>, EcsError> + Send + Sync>;

/// Rebuilds a component value from bytes produced by the matching [`SerializeFn`].
pub type DeserializeFn = Arc<dyn Fn(&[u8]) -> Result<ComponentData, EcsError> + Send + Sync>;

/// Lifecycle hook invoked with the owning entity and the component value.
pub type HookFn = Arc<dyn Fn(EntityId, &ComponentValue) + Send + Sync>;

static NEXT_TYPE_ID: AtomicU32 = AtomicU32::new(1);

/// A process-wide unique handle for a registered component kind.
///
/// Handles are assigned from a global counter at registration time and are
/// never reused, even when the same name is registered in two worlds. The
/// wire identity of a component kind is its registered name, not this handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentTypeId(u32);

impl ComponentTypeId {
    pub(crate) fn next() -> Self {
        Self(NEXT_TYPE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw handle value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ComponentTypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ComponentType({})", self.0)
    }
}

/// Registration options for a component kind.
#[derive(Clone, Default)]
pub struct ComponentOptions {
    /// Whether the replication layer mirrors this kind to peers.
    pub replicated: bool,
    /// Serialiser used for replication.
    pub serialize: Option<SerializeFn>,
    /// Deserialiser used by peers applying replicated data.
    pub deserialize: Option<DeserializeFn>,
    /// Called after a value has been constructed and stored.
    pub on_added: Option<HookFn>,
    /// Called before a stored value is dropped.
    pub on_removed: Option<HookFn>,
}

impl ComponentOptions {
    /// Checks the option set for consistency.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidComponentOptions`] when only one half of the
    /// serialise/deserialise pair is given, or when a replicated kind has no
    /// serialiser.
    pub fn validate(&self, name: &str) -> Result<(), EcsError> {
        if self.serialize.is_some() != self.deserialize.is_some() {
            return Err(EcsError::InvalidComponentOptions(format!(
                "'{name}': serialize and deserialize must be given together"
            )));
        }
        if self.replicated && self.serialize.is_none() {
            return Err(EcsError::InvalidComponentOptions(format!(
                "'{name}': replicated components need serialize/deserialize"
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for ComponentOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentOptions")
            .field("replicated", &self.replicated)
            .field("serialize", &self.serialize.is_some())
            .field("deserialize", &self.deserialize.is_some())
            .field("on_added", &self.on_added.is_some())
            .field("on_removed", &self.on_removed.is_some())
            .finish()
    }
}

/// Everything the [`World`](crate::World) needs to register a component kind.
#[derive(Clone)]
pub struct ComponentDescriptor {
    /// Human-readable, wire-stable name (e.g. `"Health"`).
    pub name: String,
    /// Builds a complete value from optional initial data.
    pub factory: FactoryFn,
    /// Replication flag, serde pair and hooks.
    pub options: ComponentOptions,
}

impl ComponentDescriptor {
    /// Describe a component kind backed by an arbitrary factory.
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(Option<ComponentData>) -> ComponentData + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
            options: ComponentOptions::default(),
        }
    }

    /// Describe the Rust component type `T`.
    ///
    /// The factory accepts a boxed `T` as initial data and falls back to
    /// `T::default()` for anything else. The serialise pair uses MessagePack.
    #[must_use]
    pub fn of<T: Component>() -> Self {
        let mut descriptor = Self::new(T::type_name(), |init: Option<ComponentData>| {
            let value: T = init
                .and_then(|data| data.downcast::<T>().ok())
                .map_or_else(T::default, |boxed| *boxed);
            Box::new(value) as ComponentData
        });
        descriptor.options.serialize = Some(Arc::new(|value: &ComponentValue| {
            let value = value
                .downcast_ref::<T>()
                .ok_or_else(|| EcsError::TypeMismatch(T::type_name().to_string()))?;
            Ok(rmp_serde::to_vec_named(value)?)
        }));
        descriptor.options.deserialize = Some(Arc::new(|bytes: &[u8]| {
            let value: T = rmp_serde::from_slice(bytes)?;
            Ok(Box::new(value) as ComponentData)
        }));
        descriptor
    }

    /// Replace the option set wholesale.
    #[must_use]
    pub fn with_options(mut self, options: ComponentOptions) -> Self {
        self.options = options;
        self
    }

    /// Mark the kind as replicated to peers.
    #[must_use]
    pub fn replicated(mut self) -> Self {
        self.options.replicated = true;
        self
    }

    /// Install an `on_added` hook.
    #[must_use]
    pub fn on_added<F>(mut self, hook: F) -> Self
    where
        F: Fn(EntityId, &ComponentValue) + Send + Sync + 'static,
    {
        self.options.on_added = Some(Arc::new(hook));
        self
    }

    /// Install an `on_removed` hook.
    #[must_use]
    pub fn on_removed<F>(mut self, hook: F) -> Self
    where
        F: Fn(EntityId, &ComponentValue) + Send + Sync + 'static,
    {
        self.options.on_removed = Some(Arc::new(hook));
        self
    }
}

impl std::fmt::Debug for ComponentDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("name", &self.name)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// A statically typed component.
///
/// # Examples
///
/// ```rust
/// use serde::{Serialize, Deserialize};
/// use combat_ecs::Component;
///
/// #[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// struct Health {
///     current: f32,
///     max: f32,
/// }
///
/// impl Component for Health {
///     fn type_name() -> &'static str { "Health" }
/// }
/// ```
pub trait Component: Default + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// A wire-stable name for this component kind.
    fn type_name() -> &'static str;

    /// Returns the registration descriptor for this component kind.
    fn descriptor() -> ComponentDescriptor {
        ComponentDescriptor::of::<Self>()
    }
}
