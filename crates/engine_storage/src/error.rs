//! Storage error types.
//!
//! Every recoverable failure in the storage surfaces as a [`StorageError`].
//! Programming errors (metadata lookups for unregistered component types,
//! layout requests for components an archetype does not contain, duplicate
//! component types in a `foreach` query) indicate a mismatch between caller
//! assumptions and the registered schema and abort with a panic instead;
//! callers cannot meaningfully recover from them.

use thiserror::Error;

use crate::entity::Entity;

/// Errors reported by [`Storage`](crate::storage::Storage) operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StorageError {
    /// The entity was deleted, or its identity was never assigned.
    #[error("entity {0} not found")]
    EntityNotFound(Entity),

    /// The entity is alive but its archetype does not contain the
    /// requested component type.
    #[error("entity {entity} has no component '{component}'")]
    MissingComponent {
        entity: Entity,
        component: &'static str,
    },

    /// The same component type appeared more than once in a single
    /// `add_entity` call. Rejected before any allocation occurs.
    #[error("duplicate component type '{0}' in a single bundle")]
    DuplicateComponent(&'static str),

    /// An archetype slot index was at or past the logical instance count.
    #[error("slot {slot} out of range for archetype with {len} instances")]
    SlotOutOfRange { slot: usize, len: usize },
}
