//! Archetype storage: interleaved component buffers for one signature.
//!
//! An [`Archetype`] owns every entity whose component-type set matches its
//! [`Signature`] exactly. Component values are stored interleaved: one
//! contiguous byte buffer holds `capacity` fixed-size instance records, and
//! each component type lives at a fixed byte offset inside every record.
//! Offsets are assigned in ascending component-id order and aligned up to
//! each type's alignment, and the record stride is aligned to the largest
//! component alignment, so every in-buffer value is properly aligned for a
//! Rust reference.
//!
//! All value manipulation goes through the type-erased [`ComponentOps`]
//! captured at registration, so the archetype never needs the static types
//! of its columns.
//!
//! [`ComponentOps`]: crate::registry::ComponentOps

use std::alloc::{Layout, alloc, dealloc, handle_alloc_error};
use std::ptr::NonNull;

use tracing::{debug, trace};

use crate::entity::Entity;
use crate::error::StorageError;
use crate::registry::{
    Component, ComponentId, ComponentOps, Signature, component_id_of, component_info,
};

/// Instance capacity of a freshly created archetype.
pub const ARCHETYPE_START_CAPACITY: usize = 32;

/// Layout of one component column inside an instance record.
#[derive(Debug, Clone, Copy)]
struct ComponentColumn {
    id: ComponentId,
    /// Byte offset of this component within each instance record.
    offset: usize,
    ops: ComponentOps,
}

/// Storage for all entities sharing one exact component-type set.
pub struct Archetype {
    signature: Signature,
    columns: Vec<ComponentColumn>,
    /// Entity at each occupied slot; `entities.len() == len`.
    entities: Vec<Entity>,
    /// Byte stride of one instance record.
    instance_size: usize,
    max_align: usize,
    len: usize,
    capacity: usize,
    data: NonNull<u8>,
}

// SAFETY: the buffer is uniquely owned and every stored value is a
// `Component`, which requires `Send + Sync`.
unsafe impl Send for Archetype {}
unsafe impl Sync for Archetype {}

fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

impl Archetype {
    /// Creates an empty archetype for the given component IDs.
    ///
    /// Metadata for every ID must already be registered. The initial buffer
    /// holds [`ARCHETYPE_START_CAPACITY`] instances.
    ///
    /// # Panics
    /// Panics if metadata for any ID was never registered.
    #[must_use]
    pub fn new(ids: &[ComponentId]) -> Self {
        // Canonical column order, so bundles listing the same types in a
        // different order produce an identical layout.
        let mut sorted: Vec<ComponentId> = ids.to_vec();
        sorted.sort_unstable();

        let mut signature = Signature::default();
        let mut columns = Vec::with_capacity(sorted.len());
        let mut offset = 0;
        let mut max_align = 1;
        for &id in &sorted {
            let info = component_info(id);
            signature.set(id);
            offset = align_up(offset, info.align);
            columns.push(ComponentColumn {
                id,
                offset,
                ops: info.ops,
            });
            offset += info.size;
            max_align = max_align.max(info.align);
        }
        let instance_size = align_up(offset, max_align);

        let capacity = ARCHETYPE_START_CAPACITY;
        let data = Self::allocate(instance_size, max_align, capacity);

        debug!(
            ?signature,
            components = columns.len(),
            instance_size,
            capacity,
            "archetype created"
        );

        Self {
            signature,
            columns,
            entities: Vec::with_capacity(capacity),
            instance_size,
            max_align,
            len: 0,
            capacity,
            data,
        }
    }

    fn allocate(instance_size: usize, max_align: usize, capacity: usize) -> NonNull<u8> {
        if instance_size == 0 {
            // Zero-sized records need no buffer. A dangling pointer with the
            // record alignment keeps reference fetches well-aligned.
            return NonNull::new(std::ptr::without_provenance_mut(max_align))
                .expect("alignment is non-zero");
        }
        let layout = Layout::from_size_align(instance_size * capacity, max_align)
            .expect("archetype buffer layout");
        // SAFETY: the layout has non-zero size.
        let ptr = unsafe { alloc(layout) };
        NonNull::new(ptr).unwrap_or_else(|| handle_alloc_error(layout))
    }

    /// The exact component-type set stored here.
    #[must_use]
    pub fn signature(&self) -> Signature {
        self.signature
    }

    /// Number of live instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no instances are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current instance capacity of the buffer.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entities in slot order.
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// The entity occupying `slot`.
    ///
    /// # Panics
    /// Panics if `slot` is out of range.
    #[must_use]
    pub fn entity_at(&self, slot: usize) -> Entity {
        self.entities[slot]
    }

    /// Byte offset of component `id` within each instance record, or `None`
    /// if this archetype has no such column.
    #[must_use]
    pub fn offset_of(&self, id: ComponentId) -> Option<usize> {
        self.columns
            .iter()
            .find(|column| column.id == id)
            .map(|column| column.offset)
    }

    /// Raw pointer to the component bytes at `offset` inside `slot`'s
    /// record. The pointer is only valid to dereference while `slot` holds
    /// an initialised instance.
    pub(crate) fn component_ptr(&self, slot: usize, offset: usize) -> *mut u8 {
        debug_assert!(slot < self.capacity);
        // SAFETY: slot is within the allocated buffer (or the buffer is
        // zero-sized and the dangling base pointer is returned unchanged).
        unsafe { self.data.as_ptr().add(slot * self.instance_size + offset) }
    }

    /// Reserves the next slot for `entity` and returns its index, growing
    /// the buffer if full.
    ///
    /// # Safety
    /// The returned slot's component memory is uninitialised. The caller
    /// must write every column of the slot before any other archetype
    /// operation runs.
    pub(crate) unsafe fn push_uninit(&mut self, entity: Entity) -> usize {
        if self.len == self.capacity {
            self.grow();
        }
        let slot = self.len;
        self.entities.push(entity);
        self.len += 1;
        slot
    }

    /// Writes `value` into `slot`'s column for `T`.
    ///
    /// # Panics
    /// Panics if this archetype has no column for `T`.
    ///
    /// # Safety
    /// `slot` must be reserved and its column for `T` must be
    /// uninitialised; the previous value (if any) is not dropped.
    pub(crate) unsafe fn write_component<T: Component>(&mut self, slot: usize, value: T) {
        let id = component_id_of::<T>();
        let offset = self
            .offset_of(id)
            .unwrap_or_else(|| panic!("archetype has no column for {}", std::any::type_name::<T>()));
        // SAFETY: slot is reserved, the offset is in-record, and the caller
        // guarantees the destination is uninitialised.
        unsafe { self.component_ptr(slot, offset).cast::<T>().write(value) }
    }

    /// Removes the instance at `slot` by swap-remove.
    ///
    /// The last instance is moved into the vacated slot and the buffer
    /// shrinks logically by one. Returns the entity that was relocated into
    /// `slot`, or `None` when `slot` held the last instance and nothing
    /// moved.
    pub fn erase(&mut self, slot: usize) -> Result<Option<Entity>, StorageError> {
        if slot >= self.len {
            return Err(StorageError::SlotOutOfRange {
                slot,
                len: self.len,
            });
        }
        let last = self.len - 1;
        if slot == last {
            for column in &self.columns {
                // SAFETY: slot holds an initialised instance and is being
                // retired, so each value is dropped exactly once.
                unsafe { (column.ops.drop)(self.component_ptr(slot, column.offset)) }
            }
            self.entities.pop();
            self.len = last;
            return Ok(None);
        }
        for column in &self.columns {
            let dst = self.component_ptr(slot, column.offset);
            let src = self.component_ptr(last, column.offset);
            // SAFETY: slot and last are distinct initialised instances; the
            // old value at dst is dropped and src is consumed by the move,
            // after which the last slot is treated as uninitialised.
            unsafe { (column.ops.move_assign)(dst, src) }
        }
        self.entities.swap_remove(slot);
        self.len = last;
        Ok(Some(self.entities[slot]))
    }

    /// Shared reference to `slot`'s component of type `T`.
    ///
    /// # Panics
    /// Panics if `slot` is out of range or this archetype has no column
    /// for `T`.
    #[must_use]
    pub fn component_at<T: Component>(&self, slot: usize) -> &T {
        assert!(slot < self.len, "slot {slot} out of range ({} instances)", self.len);
        let offset = self
            .offset_of(component_id_of::<T>())
            .unwrap_or_else(|| panic!("archetype has no column for {}", std::any::type_name::<T>()));
        // SAFETY: slot holds an initialised instance, the offset is aligned
        // for T, and the shared borrow of self prevents mutation.
        unsafe { &*self.component_ptr(slot, offset).cast::<T>() }
    }

    /// Exclusive reference to `slot`'s component of type `T`.
    ///
    /// # Panics
    /// Panics if `slot` is out of range or this archetype has no column
    /// for `T`.
    #[must_use]
    pub fn component_at_mut<T: Component>(&mut self, slot: usize) -> &mut T {
        assert!(slot < self.len, "slot {slot} out of range ({} instances)", self.len);
        let offset = self
            .offset_of(component_id_of::<T>())
            .unwrap_or_else(|| panic!("archetype has no column for {}", std::any::type_name::<T>()));
        // SAFETY: slot holds an initialised instance, the offset is aligned
        // for T, and the exclusive borrow of self prevents aliasing.
        unsafe { &mut *self.component_ptr(slot, offset).cast::<T>() }
    }

    fn grow(&mut self) {
        let new_capacity = (self.capacity + 1).next_power_of_two();
        trace!(
            signature = ?self.signature,
            old_capacity = self.capacity,
            new_capacity,
            "archetype buffer grown"
        );
        if self.instance_size == 0 {
            self.capacity = new_capacity;
            return;
        }
        let new_data = Self::allocate(self.instance_size, self.max_align, new_capacity);
        for i in 0..self.len {
            for column in &self.columns {
                // SAFETY: the old slot holds an initialised value and the new
                // buffer is uninitialised; the move consumes the old slot.
                unsafe {
                    let src = self.data.as_ptr().add(i * self.instance_size + column.offset);
                    let dst = new_data.as_ptr().add(i * self.instance_size + column.offset);
                    (column.ops.move_construct)(dst, src);
                }
            }
        }
        let old_layout = Layout::from_size_align(self.instance_size * self.capacity, self.max_align)
            .expect("archetype buffer layout");
        // SAFETY: the old buffer was allocated with this exact layout and
        // every value in it has been moved out.
        unsafe { dealloc(self.data.as_ptr(), old_layout) }
        self.data = new_data;
        self.capacity = new_capacity;
    }
}

impl Drop for Archetype {
    fn drop(&mut self) {
        for slot in 0..self.len {
            for column in &self.columns {
                // SAFETY: every slot below len holds an initialised instance.
                unsafe { (column.ops.drop)(self.component_ptr(slot, column.offset)) }
            }
        }
        if self.instance_size != 0 {
            let layout = Layout::from_size_align(self.instance_size * self.capacity, self.max_align)
                .expect("archetype buffer layout");
            // SAFETY: the buffer was allocated with this exact layout.
            unsafe { dealloc(self.data.as_ptr(), layout) }
        }
    }
}

impl std::fmt::Debug for Archetype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archetype")
            .field("signature", &self.signature)
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .field("instance_size", &self.instance_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::registry::register_component;

    #[derive(Debug, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Debug, PartialEq)]
    struct Health(u8);

    static DROPS: AtomicUsize = AtomicUsize::new(0);

    struct Tracked(#[allow(dead_code)] u64);

    impl Drop for Tracked {
        fn drop(&mut self) {
            DROPS.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn position_health_archetype() -> Archetype {
        let pos = register_component::<Position>();
        let health = register_component::<Health>();
        Archetype::new(&[pos, health])
    }

    fn push(archetype: &mut Archetype, entity: Entity, pos: Position, health: Health) -> usize {
        // SAFETY: both columns are written before the slot is used.
        unsafe {
            let slot = archetype.push_uninit(entity);
            archetype.write_component(slot, pos);
            archetype.write_component(slot, health);
            slot
        }
    }

    #[test]
    fn test_push_and_read_back() {
        let mut archetype = position_health_archetype();
        let slot = push(
            &mut archetype,
            Entity::from_raw(0),
            Position { x: 1.0, y: 2.0 },
            Health(50),
        );
        assert_eq!(archetype.len(), 1);
        assert_eq!(
            archetype.component_at::<Position>(slot),
            &Position { x: 1.0, y: 2.0 }
        );
        assert_eq!(archetype.component_at::<Health>(slot), &Health(50));
        assert_eq!(archetype.entity_at(slot), Entity::from_raw(0));
    }

    #[test]
    fn test_offsets_are_aligned() {
        let archetype = position_health_archetype();
        let pos_offset = archetype
            .offset_of(component_id_of::<Position>())
            .expect("Position column");
        let health_offset = archetype
            .offset_of(component_id_of::<Health>())
            .expect("Health column");
        assert_eq!(pos_offset % std::mem::align_of::<Position>(), 0);
        assert_eq!(health_offset % std::mem::align_of::<Health>(), 0);
        assert!(archetype.offset_of(component_id_of::<Tracked>()).is_none());
    }

    #[test]
    fn test_erase_last_slot_relocates_nothing() {
        let mut archetype = position_health_archetype();
        push(
            &mut archetype,
            Entity::from_raw(0),
            Position { x: 0.0, y: 0.0 },
            Health(1),
        );
        let relocated = archetype.erase(0).expect("erase");
        assert_eq!(relocated, None);
        assert!(archetype.is_empty());
    }

    #[test]
    fn test_erase_middle_slot_swaps_in_last() {
        let mut archetype = position_health_archetype();
        for i in 0..3 {
            push(
                &mut archetype,
                Entity::from_raw(i),
                Position {
                    x: i as f32,
                    y: 0.0,
                },
                Health(i as u8),
            );
        }
        let relocated = archetype.erase(0).expect("erase");
        assert_eq!(relocated, Some(Entity::from_raw(2)));
        assert_eq!(archetype.len(), 2);
        // The former last instance now occupies slot 0 with its value intact.
        assert_eq!(
            archetype.component_at::<Position>(0),
            &Position { x: 2.0, y: 0.0 }
        );
        assert_eq!(archetype.component_at::<Health>(0), &Health(2));
        assert_eq!(archetype.entity_at(0), Entity::from_raw(2));
    }

    #[test]
    fn test_erase_out_of_range_is_an_error() {
        let mut archetype = position_health_archetype();
        assert_eq!(
            archetype.erase(0),
            Err(StorageError::SlotOutOfRange { slot: 0, len: 0 })
        );
    }

    #[test]
    fn test_growth_preserves_values() {
        let mut archetype = position_health_archetype();
        assert_eq!(archetype.capacity(), ARCHETYPE_START_CAPACITY);
        for i in 0..(ARCHETYPE_START_CAPACITY as u64 + 1) {
            push(
                &mut archetype,
                Entity::from_raw(i),
                Position {
                    x: i as f32,
                    y: -(i as f32),
                },
                Health(i as u8),
            );
        }
        assert_eq!(archetype.capacity(), ARCHETYPE_START_CAPACITY * 2);
        for i in 0..(ARCHETYPE_START_CAPACITY + 1) {
            assert_eq!(
                archetype.component_at::<Position>(i),
                &Position {
                    x: i as f32,
                    y: -(i as f32),
                }
            );
        }
    }

    #[test]
    fn test_every_value_dropped_exactly_once() {
        let tracked = register_component::<Tracked>();
        DROPS.store(0, Ordering::SeqCst);
        {
            let mut archetype = Archetype::new(&[tracked]);
            for i in 0..40 {
                // SAFETY: the single column is written before use.
                unsafe {
                    let slot = archetype.push_uninit(Entity::from_raw(i));
                    archetype.write_component(slot, Tracked(i));
                }
            }
            archetype.erase(5).expect("erase");
            archetype.erase(39 - 1).expect("erase last");
        }
        assert_eq!(DROPS.load(Ordering::SeqCst), 40);
    }
}
