//! Tuples of components, for insertion and membership tests.
//!
//! A [`Bundle`] is a tuple of component values handed to
//! [`Storage::add_entity`]; it knows its own signature and how to write
//! itself into a reserved archetype slot. A [`ComponentSet`] is the
//! type-level counterpart used by [`Storage::has_components`], where only
//! the set of types matters, not any values.
//!
//! Both traits are implemented for tuples up to arity 8.
//!
//! [`Storage::add_entity`]: crate::storage::Storage::add_entity
//! [`Storage::has_components`]: crate::storage::Storage::has_components

use crate::archetype::Archetype;
use crate::error::StorageError;
use crate::registry::{
    Component, ComponentId, Signature, component_id_of, register_component,
};

/// A tuple of component values that can be inserted as one entity.
pub trait Bundle {
    /// The signature covering every component type in the bundle.
    ///
    /// Fails with [`StorageError::DuplicateComponent`] if the same type
    /// appears more than once; an entity holds at most one value per type.
    fn signature() -> Result<Signature, StorageError>;

    /// Component IDs in tuple order.
    fn component_ids() -> Vec<ComponentId>;

    /// Registers metadata for every component type in the bundle.
    fn register_components();

    /// Writes the bundle's values into `slot`.
    ///
    /// # Safety
    /// `slot` must be freshly reserved in an archetype whose signature
    /// matches this bundle, with every column uninitialised.
    unsafe fn write(self, archetype: &mut Archetype, slot: usize);
}

/// A tuple of component types used as a membership test.
pub trait ComponentSet {
    /// The signature covering every component type in the set.
    fn signature() -> Signature;
}

macro_rules! impl_bundle {
    ($($name:ident),+) => {
        #[allow(non_snake_case)]
        impl<$($name: Component),+> Bundle for ($($name,)+) {
            fn signature() -> Result<Signature, StorageError> {
                let mut signature = Signature::default();
                $(
                    let id = component_id_of::<$name>();
                    if signature.has(id) {
                        return Err(StorageError::DuplicateComponent(
                            std::any::type_name::<$name>(),
                        ));
                    }
                    signature.set(id);
                )+
                Ok(signature)
            }

            fn component_ids() -> Vec<ComponentId> {
                vec![$(component_id_of::<$name>()),+]
            }

            fn register_components() {
                $(register_component::<$name>();)+
            }

            unsafe fn write(self, archetype: &mut Archetype, slot: usize) {
                let ($($name,)+) = self;
                // SAFETY: the caller guarantees a freshly reserved slot in a
                // matching archetype, so each column is written exactly once.
                unsafe { $(archetype.write_component(slot, $name);)+ }
            }
        }

        impl<$($name: Component),+> ComponentSet for ($($name,)+) {
            fn signature() -> Signature {
                let mut signature = Signature::default();
                $(signature.set(component_id_of::<$name>());)+
                signature
            }
        }
    };
}

impl_bundle!(A);
impl_bundle!(A, B);
impl_bundle!(A, B, C);
impl_bundle!(A, B, C, D);
impl_bundle!(A, B, C, D, E);
impl_bundle!(A, B, C, D, E, F);
impl_bundle!(A, B, C, D, E, F, G);
impl_bundle!(A, B, C, D, E, F, G, H);
