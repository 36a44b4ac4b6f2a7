//! Entity type and allocation utilities.
//!
//! An [`Entity`] is a lightweight `u64` identifier with no inherent data.
//! Identities are assigned monotonically by the owning [`Storage`]'s
//! allocator and are never reused, so an `Entity` stays a valid key for
//! error reporting even after deletion.
//!
//! [`Storage`]: crate::storage::Storage

use serde::{Deserialize, Serialize};

/// A unique entity identifier.
///
/// Entities are pure identifiers; they carry no data of their own and no
/// type information. Components are attached to entities through the
/// storage to give them meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity(pub u64);

impl Entity {
    /// Create an entity from a raw `u64` identifier.
    #[must_use]
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw `u64` identifier.
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

/// Allocates monotonically increasing entity IDs, starting from 0.
///
/// Identities are never recycled: a deleted entity's ID stays retired for
/// the lifetime of the storage, which is what lets the location map mark
/// deletion with a tombstone instead of a generation counter.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    next_id: u64,
}

impl EntityAllocator {
    /// Creates a new allocator.
    #[must_use]
    pub fn new() -> Self {
        Self { next_id: 0 }
    }

    /// Allocates a fresh entity ID.
    pub fn allocate(&mut self) -> Entity {
        let id = self.next_id;
        self.next_id += 1;
        Entity(id)
    }

    /// Returns the number of entities allocated so far. Since IDs start at
    /// 0 and are never reused, this is also one past the highest assigned ID.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.next_id
    }
}
