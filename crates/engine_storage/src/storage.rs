//! The top-level entity/component store.
//!
//! [`Storage`] owns a set of [`Archetype`]s, one per distinct component
//! signature, and a location map from entity ID to the archetype and slot
//! holding it. Entity IDs index the map directly: they are dense,
//! monotonic, and never reused, so a deleted entity is marked with a
//! tombstone rather than removed.

use tracing::trace;

use crate::archetype::Archetype;
use crate::bundle::{Bundle, ComponentSet};
use crate::entity::{Entity, EntityAllocator};
use crate::error::StorageError;
use crate::query::Query;
use crate::registry::{Component, component_id_of};

/// Where an entity's components live, indexed by entity ID.
#[derive(Debug, Clone, Copy)]
enum Location {
    Alive { archetype: usize, slot: usize },
    Deleted,
}

/// Archetype-organised entity/component storage.
#[derive(Debug, Default)]
pub struct Storage {
    archetypes: Vec<Archetype>,
    locations: Vec<Location>,
    allocator: EntityAllocator,
}

impl Storage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an entity holding the bundle's component values and returns
    /// its identity.
    ///
    /// The entity lands in the archetype matching the bundle's signature
    /// exactly; the archetype is created on first use. Fails with
    /// [`StorageError::DuplicateComponent`] before anything is allocated if
    /// the bundle lists the same component type twice.
    pub fn add_entity<B: Bundle>(&mut self, bundle: B) -> Result<Entity, StorageError> {
        let signature = B::signature()?;
        B::register_components();

        let index = match self
            .archetypes
            .iter()
            .position(|archetype| archetype.signature() == signature)
        {
            Some(index) => index,
            None => {
                self.archetypes.push(Archetype::new(&B::component_ids()));
                self.archetypes.len() - 1
            }
        };

        let entity = self.allocator.allocate();
        let archetype = &mut self.archetypes[index];
        // SAFETY: the slot is reserved and immediately fully written by a
        // bundle whose signature matches the archetype.
        let slot = unsafe {
            let slot = archetype.push_uninit(entity);
            bundle.write(archetype, slot);
            slot
        };
        self.locations.push(Location::Alive {
            archetype: index,
            slot,
        });
        trace!(%entity, archetype = index, slot, "entity added");
        Ok(entity)
    }

    /// Deletes an entity, dropping its component values.
    ///
    /// The vacated slot is back-filled by the archetype's last instance and
    /// the relocated entity's location is updated. Deleting an already
    /// deleted or never-assigned entity fails with
    /// [`StorageError::EntityNotFound`].
    pub fn delete_entity(&mut self, entity: Entity) -> Result<(), StorageError> {
        let (index, slot) = self.location(entity)?;
        let relocated = self.archetypes[index].erase(slot)?;
        if let Some(moved) = relocated {
            self.locations[moved.id() as usize] = Location::Alive {
                archetype: index,
                slot,
            };
        }
        self.locations[entity.id() as usize] = Location::Deleted;
        trace!(%entity, archetype = index, slot, "entity deleted");
        Ok(())
    }

    /// Shared reference to `entity`'s component of type `T`.
    pub fn get_component<T: Component>(&self, entity: Entity) -> Result<&T, StorageError> {
        let (index, slot) = self.location(entity)?;
        let archetype = &self.archetypes[index];
        if archetype.offset_of(component_id_of::<T>()).is_none() {
            return Err(StorageError::MissingComponent {
                entity,
                component: std::any::type_name::<T>(),
            });
        }
        Ok(archetype.component_at::<T>(slot))
    }

    /// Exclusive reference to `entity`'s component of type `T`.
    pub fn get_component_mut<T: Component>(
        &mut self,
        entity: Entity,
    ) -> Result<&mut T, StorageError> {
        let (index, slot) = self.location(entity)?;
        let archetype = &mut self.archetypes[index];
        if archetype.offset_of(component_id_of::<T>()).is_none() {
            return Err(StorageError::MissingComponent {
                entity,
                component: std::any::type_name::<T>(),
            });
        }
        Ok(archetype.component_at_mut::<T>(slot))
    }

    /// Returns `true` if the entity's archetype holds every component type
    /// in `S`. Superset semantics: extra components do not disqualify.
    pub fn has_components<S: ComponentSet>(&self, entity: Entity) -> Result<bool, StorageError> {
        let (index, _) = self.location(entity)?;
        Ok(self.archetypes[index]
            .signature()
            .is_superset_of(S::signature()))
    }

    /// Returns `true` if `entity` was assigned by this storage and has not
    /// been deleted.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        matches!(
            self.locations.get(entity.id() as usize),
            Some(Location::Alive { .. })
        )
    }

    /// Runs `f` over every entity whose archetype holds at least the
    /// component types named by `Q`.
    ///
    /// Matching is by signature superset, so entities with extra components
    /// are visited too. Offsets are resolved once per matching archetype.
    /// The storage is exclusively borrowed for the whole scan, so entities
    /// cannot be added or deleted from inside the closure.
    pub fn foreach<Q: Query, F>(&mut self, mut f: F)
    where
        F: for<'a> FnMut(Q::Item<'a>),
    {
        let signature = Q::signature();
        for archetype in &mut self.archetypes {
            if archetype.signature().is_superset_of(signature) {
                Q::for_each_in(archetype, &mut f);
            }
        }
    }

    /// Runs `f` over every entity identity this storage ever assigned, in
    /// ascending ID order.
    ///
    /// This enumerates identities, not live entities: deleted entities are
    /// visited too, since IDs are never retired from the sequence. Filter
    /// with [`is_alive`](Self::is_alive) when only live entities matter.
    pub fn foreach_entity<F: FnMut(Entity)>(&self, mut f: F) {
        for id in 0..self.allocator.count() {
            f(Entity::from_raw(id));
        }
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.archetypes.iter().map(Archetype::len).sum()
    }

    /// Number of entity identities ever assigned, deleted ones included.
    #[must_use]
    pub fn allocated_count(&self) -> u64 {
        self.allocator.count()
    }

    /// Number of distinct archetypes created so far.
    #[must_use]
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    fn location(&self, entity: Entity) -> Result<(usize, usize), StorageError> {
        match self.locations.get(entity.id() as usize) {
            Some(Location::Alive { archetype, slot }) => Ok((*archetype, *slot)),
            _ => Err(StorageError::EntityNotFound(entity)),
        }
    }
}
