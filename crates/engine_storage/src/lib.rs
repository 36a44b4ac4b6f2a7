//! # engine_storage
//!
//! Archetype-organised, runtime-typed entity/component storage.
//!
//! Entities are plain `u64` identities. Component values live in
//! [`Archetype`]s, one per distinct component-type set, stored interleaved
//! in a single byte buffer per archetype. A [`Storage`] maps each entity to
//! its archetype and slot, deletes by swap-remove, and drives typed
//! iteration through tuple [`Query`]s.
//!
//! ```
//! use engine_storage::Storage;
//!
//! #[derive(Debug)]
//! struct Position { x: f32, y: f32 }
//! #[derive(Debug)]
//! struct Velocity { dx: f32, dy: f32 }
//!
//! let mut storage = Storage::new();
//! let e = storage
//!     .add_entity((Position { x: 0.0, y: 0.0 }, Velocity { dx: 1.0, dy: 0.0 }))
//!     .unwrap();
//!
//! storage.foreach::<(&mut Position, &Velocity), _>(|(p, v)| {
//!     p.x += v.dx;
//!     p.y += v.dy;
//! });
//!
//! assert_eq!(storage.get_component::<Position>(e).unwrap().x, 1.0);
//! storage.delete_entity(e).unwrap();
//! ```

mod archetype;
mod bundle;
mod entity;
mod error;
mod query;
mod registry;
mod storage;

pub use archetype::{ARCHETYPE_START_CAPACITY, Archetype};
pub use bundle::{Bundle, ComponentSet};
pub use entity::{Entity, EntityAllocator};
pub use error::StorageError;
pub use query::{Query, QueryParam};
pub use registry::{
    Component, ComponentId, ComponentInfo, ComponentOps, MAX_COMPONENT_TYPES, Signature,
    component_id_of, component_info, register_component,
};
pub use storage::Storage;
