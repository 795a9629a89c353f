//! Query descriptors over component-type predicates.
//!
//! A [`QueryDescriptor`] lists the component kinds an entity must carry and
//! the kinds it must not carry. [`World::query`](crate::World::query) returns
//! the matching entities in ascending slot order.

use crate::component::ComponentTypeId;

/// A filter that narrows the set of entities matched by a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryFilter {
    /// Only match entities that have this component.
    With(ComponentTypeId),
    /// Only match entities that do NOT have this component.
    Without(ComponentTypeId),
}

impl QueryFilter {
    /// Evaluates the filter against a presence test.
    #[must_use]
    pub fn matches(self, has: impl Fn(ComponentTypeId) -> bool) -> bool {
        match self {
            Self::With(ty) => has(ty),
            Self::Without(ty) => !has(ty),
        }
    }
}

/// Declarative entity selection by component presence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryDescriptor {
    /// Filters that must all hold for an entity to match.
    pub filters: Vec<QueryFilter>,
}

impl QueryDescriptor {
    /// Create an empty query that matches every live entity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a component kind.
    #[must_use]
    pub fn with(mut self, ty: ComponentTypeId) -> Self {
        self.filters.push(QueryFilter::With(ty));
        self
    }

    /// Exclude entities carrying a component kind.
    #[must_use]
    pub fn without(mut self, ty: ComponentTypeId) -> Self {
        self.filters.push(QueryFilter::Without(ty));
        self
    }

    /// Returns the kinds this query requires.
    #[must_use]
    pub fn required_types(&self) -> Vec<ComponentTypeId> {
        self.filters
            .iter()
            .filter_map(|filter| match filter {
                QueryFilter::With(ty) => Some(*ty),
                QueryFilter::Without(_) => None,
            })
            .collect()
    }

    /// Returns `true` if an entity with the given presence test matches.
    #[must_use]
    pub fn matches(&self, has: impl Fn(ComponentTypeId) -> bool) -> bool {
        self.filters.iter().all(|filter| filter.matches(&has))
    }
}
