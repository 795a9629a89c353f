//! # combat_ecs
//!
//! Entity and component storage for the combat authority layer.
//!
//! This crate provides:
//!
//! - [`EntityId`] / [`EntityRegistry`]: generational identifiers with slot
//!   recycling.
//! - [`ComponentDescriptor`]: registration table entry for a component kind:
//!   factory, serde pair and lifecycle hooks.
//! - [`ComponentStore`]: type-erased records keyed by entity and kind.
//! - [`QueryDescriptor`]: component presence predicates.
//! - [`World`]: the validated facade over all of the above.

pub mod component;
pub mod entity;
pub mod error;
pub mod query;
pub mod store;
pub mod world;

pub use component::{
    Component, ComponentData, ComponentDescriptor, ComponentOptions, ComponentTypeId,
    ComponentValue, DeserializeFn, FactoryFn, HookFn, SerializeFn,
};
pub use entity::{EntityId, EntityRegistry};
pub use error::EcsError;
pub use query::{QueryDescriptor, QueryFilter};
pub use store::ComponentStore;
pub use world::{ComponentMap, World};
