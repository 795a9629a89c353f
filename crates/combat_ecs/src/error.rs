//! Error types for entity and component operations.

use crate::component::ComponentTypeId;
use crate::entity::EntityId;

/// Errors returned by the [`World`](crate::World).
///
/// All variants are local and recoverable; none leaves the world in a
/// partially mutated state.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// The entity identifier is stale or was never issued.
    #[error("invalid entity: {0}")]
    InvalidEntity(EntityId),

    /// The component type handle was not registered with this world.
    #[error("unknown component type: {0}")]
    UnknownComponentType(ComponentTypeId),

    /// No component kind with this name is registered.
    #[error("unknown component name: {0}")]
    UnknownComponentName(String),

    /// The entity already carries a component of this type.
    #[error("{entity} already has component {component}")]
    DuplicateComponent {
        /// The target entity.
        entity: EntityId,
        /// The component type that is already present.
        component: ComponentTypeId,
    },

    /// The registration options are inconsistent.
    #[error("invalid component options: {0}")]
    InvalidComponentOptions(String),

    /// A stored value did not have the type expected by its serialiser.
    #[error("component value is not a {0}")]
    TypeMismatch(String),

    /// Failed to encode a component value.
    #[error("failed to encode component: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Failed to decode a component value.
    #[error("failed to decode component: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}
