//! Typed iteration over archetype contents.
//!
//! A [`Query`] describes what each visited entity yields to a `foreach`
//! closure: a single [`QueryParam`] or a tuple of them. Parameters are
//! shared references (`&T`), exclusive references (`&mut T`), or the
//! visited [`Entity`] itself. The query's component signature selects every
//! archetype whose signature is a superset, and per-archetype byte offsets
//! are resolved once before the slot loop, not per instance.
//!
//! `Entity` parameters contribute nothing to the signature; a query of only
//! `Entity` matches every archetype.

use crate::archetype::Archetype;
use crate::entity::Entity;
use crate::registry::{Component, ComponentId, Signature, component_id_of};

/// One position in a query tuple.
///
/// Sealed in practice: the storage only drives the three provided
/// implementations, and the `fetch` contract is internal to the crate.
pub trait QueryParam {
    /// What this parameter yields per visited instance.
    type Item<'a>;

    /// The component this parameter reads or writes, or `None` for
    /// parameters with no component column (the entity itself).
    fn component_id() -> Option<ComponentId>;

    /// Byte offset of this parameter's column inside `archetype`'s
    /// instance records.
    ///
    /// # Panics
    /// Panics if the archetype lacks the column. Archetypes are selected by
    /// signature superset before offsets are resolved, so this only fires
    /// on a caller bypassing that selection.
    fn resolve_offset(archetype: &Archetype) -> usize;

    /// Produces the item for `slot`.
    ///
    /// # Safety
    /// `archetype` must be valid and unaliased for the duration of the
    /// borrow, `slot` must hold an initialised instance, `offset` must come
    /// from [`resolve_offset`](Self::resolve_offset) on the same archetype,
    /// and no other parameter in the same query may touch this component.
    unsafe fn fetch<'a>(archetype: *mut Archetype, slot: usize, offset: usize) -> Self::Item<'a>;
}

impl<'q, T: Component> QueryParam for &'q T {
    type Item<'a> = &'a T;

    fn component_id() -> Option<ComponentId> {
        Some(component_id_of::<T>())
    }

    fn resolve_offset(archetype: &Archetype) -> usize {
        archetype
            .offset_of(component_id_of::<T>())
            .unwrap_or_else(|| panic!("archetype has no column for {}", std::any::type_name::<T>()))
    }

    unsafe fn fetch<'a>(archetype: *mut Archetype, slot: usize, offset: usize) -> &'a T {
        // SAFETY: the caller guarantees an initialised, correctly offset
        // slot and that no exclusive borrow of this component exists.
        unsafe { &*(*archetype).component_ptr(slot, offset).cast::<T>() }
    }
}

impl<'q, T: Component> QueryParam for &'q mut T {
    type Item<'a> = &'a mut T;

    fn component_id() -> Option<ComponentId> {
        Some(component_id_of::<T>())
    }

    fn resolve_offset(archetype: &Archetype) -> usize {
        archetype
            .offset_of(component_id_of::<T>())
            .unwrap_or_else(|| panic!("archetype has no column for {}", std::any::type_name::<T>()))
    }

    unsafe fn fetch<'a>(archetype: *mut Archetype, slot: usize, offset: usize) -> &'a mut T {
        // SAFETY: the caller guarantees an initialised, correctly offset
        // slot and that this is the only borrow of this component.
        unsafe { &mut *(*archetype).component_ptr(slot, offset).cast::<T>() }
    }
}

impl QueryParam for Entity {
    type Item<'a> = Entity;

    fn component_id() -> Option<ComponentId> {
        None
    }

    fn resolve_offset(_archetype: &Archetype) -> usize {
        0
    }

    unsafe fn fetch<'a>(archetype: *mut Archetype, slot: usize, _offset: usize) -> Self::Item<'a> {
        // SAFETY: the caller guarantees a valid archetype and an occupied
        // slot; the entity is copied out.
        unsafe { (*archetype).entity_at(slot) }
    }
}

/// A complete query: one [`QueryParam`] or a tuple of up to eight.
pub trait Query {
    /// What the closure receives per visited entity.
    type Item<'a>;

    /// The set of component types the query reads or writes.
    ///
    /// # Panics
    /// Panics if the same component type appears twice; two parameters over
    /// one component could otherwise alias an exclusive borrow.
    fn signature() -> Signature;

    /// Runs `f` over every instance in `archetype`, in slot order.
    ///
    /// The archetype's signature must be a superset of
    /// [`signature`](Self::signature).
    fn for_each_in<F>(archetype: &mut Archetype, f: &mut F)
    where
        F: for<'a> FnMut(Self::Item<'a>);
}

macro_rules! impl_single_query {
    ($param:ty, [$($generics:tt)*]) => {
        impl<$($generics)*> Query for $param {
            type Item<'a> = <$param as QueryParam>::Item<'a>;

            fn signature() -> Signature {
                let mut signature = Signature::default();
                if let Some(id) = <$param as QueryParam>::component_id() {
                    signature.set(id);
                }
                signature
            }

            fn for_each_in<Func>(archetype: &mut Archetype, f: &mut Func)
            where
                Func: for<'a> FnMut(Self::Item<'a>),
            {
                let offset = <$param as QueryParam>::resolve_offset(archetype);
                let len = archetype.len();
                let raw: *mut Archetype = archetype;
                for slot in 0..len {
                    // SAFETY: raw is derived from an exclusive borrow held
                    // for the whole loop, slot is below len, and the offset
                    // was resolved on this archetype.
                    f(unsafe { <$param as QueryParam>::fetch(raw, slot, offset) });
                }
            }
        }
    };
}

impl_single_query!(&'q T, ['q, T: Component]);
impl_single_query!(&'q mut T, ['q, T: Component]);
impl_single_query!(Entity, []);

macro_rules! impl_tuple_query {
    ($($name:ident),+) => {
        #[allow(non_snake_case)]
        impl<$($name: QueryParam),+> Query for ($($name,)+) {
            type Item<'a> = ($($name::Item<'a>,)+);

            fn signature() -> Signature {
                let mut signature = Signature::default();
                $(
                    if let Some(id) = $name::component_id() {
                        assert!(
                            !signature.has(id),
                            "component type {} appears twice in one query",
                            std::any::type_name::<$name>(),
                        );
                        signature.set(id);
                    }
                )+
                signature
            }

            fn for_each_in<Func>(archetype: &mut Archetype, f: &mut Func)
            where
                Func: for<'a> FnMut(Self::Item<'a>),
            {
                let _ = Self::signature();
                $(let $name = $name::resolve_offset(archetype);)+
                let len = archetype.len();
                let raw: *mut Archetype = archetype;
                for slot in 0..len {
                    // SAFETY: raw is derived from an exclusive borrow held
                    // for the whole loop, slot is below len, offsets were
                    // resolved on this archetype, and the duplicate check in
                    // signature() guarantees the fetched components are
                    // pairwise distinct.
                    f(unsafe { ($($name::fetch(raw, slot, $name),)+) });
                }
            }
        }
    };
}

impl_tuple_query!(A);
impl_tuple_query!(A, B);
impl_tuple_query!(A, B, C);
impl_tuple_query!(A, B, C, D);
impl_tuple_query!(A, B, C, D, E);
impl_tuple_query!(A, B, C, D, E, F);
impl_tuple_query!(A, B, C, D, E, F, G);
impl_tuple_query!(A, B, C, D, E, F, G, H);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::register_component;

    #[derive(Debug, PartialEq)]
    struct Position {
        x: f32,
    }

    #[derive(Debug, PartialEq)]
    struct Velocity {
        dx: f32,
    }

    fn seeded_archetype() -> Archetype {
        let pos = register_component::<Position>();
        let vel = register_component::<Velocity>();
        let mut archetype = Archetype::new(&[pos, vel]);
        for i in 0..4u64 {
            // SAFETY: both columns are written before the slot is used.
            unsafe {
                let slot = archetype.push_uninit(Entity::from_raw(i));
                archetype.write_component(slot, Position { x: i as f32 });
                archetype.write_component(slot, Velocity { dx: 1.0 });
            }
        }
        archetype
    }

    #[test]
    fn test_entity_param_contributes_no_signature_bits() {
        assert!(<Entity as Query>::signature().is_empty());
        assert!(!<(Entity, &Position) as Query>::signature().is_empty());
    }

    #[test]
    fn test_shared_read_visits_all_slots() {
        let mut archetype = seeded_archetype();
        let mut seen = Vec::new();
        <&Position as Query>::for_each_in(&mut archetype, &mut |p: &Position| seen.push(p.x));
        assert_eq!(seen, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_mutation_through_query_is_visible() {
        let mut archetype = seeded_archetype();
        <(&mut Position, &Velocity)>::for_each_in(&mut archetype, &mut |(p, v)| {
            p.x += v.dx;
        });
        let mut seen = Vec::new();
        <&Position as Query>::for_each_in(&mut archetype, &mut |p: &Position| seen.push(p.x));
        assert_eq!(seen, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_entity_param_pairs_with_components() {
        let mut archetype = seeded_archetype();
        let mut seen = Vec::new();
        <(Entity, &Position)>::for_each_in(&mut archetype, &mut |(e, p)| {
            seen.push((e.id(), p.x));
        });
        assert_eq!(seen, vec![(0, 0.0), (1, 1.0), (2, 2.0), (3, 3.0)]);
    }

    #[test]
    #[should_panic(expected = "appears twice")]
    fn test_aliasing_query_panics() {
        let _ = <(&mut Position, &Position) as Query>::signature();
    }
}
