//! Component type identity, metadata, and the process-wide registry.
//!
//! Every distinct component type is assigned a stable, small-integer
//! [`ComponentId`] the first time it is seen. IDs are process-wide (not
//! per-storage) and constant for the lifetime of the process, which is what
//! makes [`Signature`] bitsets comparable across storages.
//!
//! The registry also records per-type metadata ([`ComponentInfo`]): byte
//! size, alignment, and the type-erased lifecycle operations archetypes use
//! to drop and relocate component values after the static type is no longer
//! visible. Metadata must be registered before any archetype referencing
//! the type is constructed; looking up metadata for an unregistered ID is a
//! programming error and panics.

use std::any::{TypeId, type_name};
use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Maximum number of distinct component types. One bit per type in a
/// [`Signature`].
pub const MAX_COMPONENT_TYPES: usize = 64;

/// A stable small-integer identifier for a component type.
pub type ComponentId = usize;

/// Marker trait for types that can be stored as components.
///
/// Blanket-implemented for every `Send + Sync + 'static` type: plain data
/// structs are components without any registration ceremony. Metadata is
/// captured lazily the first time a type participates in archetype
/// construction.
pub trait Component: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Component for T {}

/// A fixed-size bitset with one bit per [`ComponentId`].
///
/// Uniquely identifies an archetype's component-type set; no two archetypes
/// in a storage share a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Signature(u64);

impl Signature {
    /// The signature with no component bits set.
    pub const EMPTY: Signature = Signature(0);

    /// Set the bit for `id`.
    pub fn set(&mut self, id: ComponentId) {
        debug_assert!(id < MAX_COMPONENT_TYPES);
        self.0 |= 1 << id;
    }

    /// Returns `true` if the bit for `id` is set.
    #[must_use]
    pub fn has(self, id: ComponentId) -> bool {
        self.0 & (1 << id) != 0
    }

    /// Returns `true` if every bit of `other` is also set in `self`.
    /// Equal signatures match.
    #[must_use]
    pub fn is_superset_of(self, other: Signature) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if no bits are set.
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Type-erased lifecycle operations for a component type.
///
/// Captured once per registered type and stored in the metadata table so
/// archetypes can manage values whose static type is no longer visible.
///
/// Rust moves are destructive: both move operations leave the source slot
/// logically uninitialised, and the caller must not drop it afterwards.
/// This replaces the move-then-destruct pairing a C++-style design needs.
#[derive(Debug, Clone, Copy)]
pub struct ComponentOps {
    /// Drop the value at `target` in place.
    pub drop: unsafe fn(target: *mut u8),
    /// Move the value at `src` into the uninitialised slot at `dst`,
    /// consuming `src`.
    pub move_construct: unsafe fn(dst: *mut u8, src: *mut u8),
    /// Drop the value at `dst`, then move the value at `src` into its
    /// place, consuming `src`.
    pub move_assign: unsafe fn(dst: *mut u8, src: *mut u8),
}

impl ComponentOps {
    fn of<T>() -> Self {
        Self {
            drop: drop_erased::<T>,
            move_construct: move_construct_erased::<T>,
            move_assign: move_assign_erased::<T>,
        }
    }
}

/// # Safety
/// `target` must point to a valid, initialised `T` that is dropped exactly
/// once.
unsafe fn drop_erased<T>(target: *mut u8) {
    unsafe { std::ptr::drop_in_place(target.cast::<T>()) }
}

/// # Safety
/// `src` must point to a valid `T`, `dst` to uninitialised memory for a
/// `T`; the regions must not overlap. `src` is consumed.
unsafe fn move_construct_erased<T>(dst: *mut u8, src: *mut u8) {
    unsafe { std::ptr::copy_nonoverlapping(src.cast::<T>(), dst.cast::<T>(), 1) }
}

/// # Safety
/// `dst` and `src` must both point to valid `T` values and must not
/// overlap. The old value at `dst` is dropped; `src` is consumed.
unsafe fn move_assign_erased<T>(dst: *mut u8, src: *mut u8) {
    unsafe {
        std::ptr::drop_in_place(dst.cast::<T>());
        std::ptr::copy_nonoverlapping(src.cast::<T>(), dst.cast::<T>(), 1);
    }
}

/// Metadata about a registered component type.
#[derive(Debug, Clone, Copy)]
pub struct ComponentInfo {
    /// The stable identifier assigned by the registry.
    pub id: ComponentId,
    /// Rust type name, for diagnostics.
    pub name: &'static str,
    /// Size of one component value in bytes.
    pub size: usize,
    /// Alignment of the component type in bytes.
    pub align: usize,
    /// Type-erased lifecycle operations.
    pub ops: ComponentOps,
}

struct Registry {
    next_id: ComponentId,
    by_type: HashMap<TypeId, ComponentId>,
    infos: [Option<ComponentInfo>; MAX_COMPONENT_TYPES],
}

impl Registry {
    fn id_for(&mut self, key: TypeId) -> ComponentId {
        if let Some(&id) = self.by_type.get(&key) {
            return id;
        }
        let id = self.next_id;
        assert!(
            id < MAX_COMPONENT_TYPES,
            "exceeded the component type capacity of {MAX_COMPONENT_TYPES}"
        );
        self.next_id += 1;
        self.by_type.insert(key, id);
        id
    }
}

static REGISTRY: OnceLock<RwLock<Registry>> = OnceLock::new();

fn registry() -> &'static RwLock<Registry> {
    REGISTRY.get_or_init(|| {
        RwLock::new(Registry {
            next_id: 0,
            by_type: HashMap::new(),
            infos: [None; MAX_COMPONENT_TYPES],
        })
    })
}

/// Returns the stable [`ComponentId`] for `T`, lazily assigning a fresh one
/// on the first call per distinct type.
///
/// # Panics
/// Panics if [`MAX_COMPONENT_TYPES`] distinct types have already been seen.
pub fn component_id_of<T: Component>() -> ComponentId {
    let key = TypeId::of::<T>();
    if let Some(&id) = registry()
        .read()
        .expect("component registry lock poisoned")
        .by_type
        .get(&key)
    {
        return id;
    }
    registry()
        .write()
        .expect("component registry lock poisoned")
        .id_for(key)
}

/// Registers metadata for `T` if absent and returns its [`ComponentId`].
/// Repeated calls for the same type are no-ops.
pub fn register_component<T: Component>() -> ComponentId {
    let key = TypeId::of::<T>();
    let mut reg = registry()
        .write()
        .expect("component registry lock poisoned");
    let id = reg.id_for(key);
    if reg.infos[id].is_none() {
        let info = ComponentInfo {
            id,
            name: type_name::<T>(),
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
            ops: ComponentOps::of::<T>(),
        };
        reg.infos[id] = Some(info);
        debug!(
            id,
            name = info.name,
            size = info.size,
            align = info.align,
            "component metadata registered"
        );
    }
    id
}

/// Returns the metadata for a registered component ID.
///
/// # Panics
/// Panics if no metadata was registered for `id`. This is a fatal invariant
/// violation: it means an archetype was built from a type that was never
/// registered, which cannot happen through the public storage API.
#[must_use]
pub fn component_info(id: ComponentId) -> ComponentInfo {
    registry()
        .read()
        .expect("component registry lock poisoned")
        .infos
        .get(id)
        .copied()
        .flatten()
        .unwrap_or_else(|| panic!("metadata for component id {id} was never registered"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Position {
        #[allow(dead_code)]
        x: f32,
    }

    #[derive(Debug)]
    struct Velocity {
        #[allow(dead_code)]
        dx: f32,
    }

    struct Unregistered;

    #[test]
    fn test_component_id_is_stable() {
        let a = component_id_of::<Position>();
        let b = component_id_of::<Position>();
        assert_eq!(a, b);
    }

    #[test]
    fn test_distinct_types_get_distinct_ids() {
        assert_ne!(component_id_of::<Position>(), component_id_of::<Velocity>());
    }

    #[test]
    fn test_register_is_idempotent() {
        let first = register_component::<Position>();
        let second = register_component::<Position>();
        assert_eq!(first, second);
        let info = component_info(first);
        assert_eq!(info.id, first);
        assert_eq!(info.size, std::mem::size_of::<Position>());
        assert_eq!(info.align, std::mem::align_of::<Position>());
    }

    #[test]
    #[should_panic(expected = "never registered")]
    fn test_info_for_unregistered_id_panics() {
        // Assigns an ID without storing metadata.
        let id = component_id_of::<Unregistered>();
        let _ = component_info(id);
    }

    #[test]
    fn test_signature_superset() {
        let mut small = Signature::default();
        small.set(1);
        let mut big = Signature::default();
        big.set(1);
        big.set(3);
        assert!(big.is_superset_of(small));
        assert!(big.is_superset_of(big));
        assert!(!small.is_superset_of(big));
        assert!(big.is_superset_of(Signature::EMPTY));
    }

    #[test]
    fn test_signature_has() {
        let mut sig = Signature::default();
        assert!(sig.is_empty());
        sig.set(5);
        assert!(sig.has(5));
        assert!(!sig.has(4));
        assert!(!sig.is_empty());
    }
}
