//! Sparse, generation-checked storage for a single component type.
//!
//! Slots are keyed by entity index and remember the generation of the entity
//! that wrote them. Every read and targeted write compares that generation
//! with the caller's handle, so a stale handle into a recycled slot sees
//! nothing. Entity destruction goes through `remove_by_index`, which ignores
//! generations.

use std::any::Any;
use std::collections::BTreeMap;

use keel_common::EntityId;

use crate::component::{Component, ComponentTypeId};

#[derive(Debug, Clone)]
struct ComponentSlot<T> {
    generation: u32,
    value: T,
    changed_at: u64,
}

/// Storage for one component type.
///
/// Uses BTreeMap so iteration is always in ascending entity index order.
#[derive(Debug, Clone)]
pub struct ComponentStore<T> {
    slots: BTreeMap<u32, ComponentSlot<T>>,
}

impl<T> Default for ComponentStore<T> {
    fn default() -> Self {
        Self {
            slots: BTreeMap::new(),
        }
    }
}

impl<T: Component> ComponentStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `value` for `entity`, overwriting whatever the slot held
    /// (including data from an older generation) and stamping `tick`.
    pub fn add(&mut self, entity: EntityId, value: T, tick: u64) {
        self.slots.insert(
            entity.index,
            ComponentSlot {
                generation: entity.generation,
                value,
                changed_at: tick,
            },
        );
    }

    /// Remove the component for `entity`. A generation mismatch is a no-op.
    pub fn remove(&mut self, entity: EntityId) -> Option<T> {
        if !self.has(entity) {
            return None;
        }
        self.slots.remove(&entity.index).map(|slot| slot.value)
    }

    /// Remove whatever occupies `index`, regardless of generation.
    pub fn remove_by_index(&mut self, index: u32) -> Option<T> {
        self.slots.remove(&index).map(|slot| slot.value)
    }

    pub fn get(&self, entity: EntityId) -> Option<&T> {
        self.slot(entity).map(|slot| &slot.value)
    }

    /// Mutable access without touching the change stamp. Callers that want
    /// change detection go through `World::modify`.
    pub fn get_mut(&mut self, entity: EntityId) -> Option<&mut T> {
        self.slots
            .get_mut(&entity.index)
            .filter(|slot| slot.generation == entity.generation)
            .map(|slot| &mut slot.value)
    }

    pub fn has(&self, entity: EntityId) -> bool {
        self.slot(entity).is_some()
    }

    /// Tick at which the component for `entity` was last written.
    pub fn changed_at(&self, entity: EntityId) -> Option<u64> {
        self.slot(entity).map(|slot| slot.changed_at)
    }

    pub(crate) fn stamp(&mut self, entity: EntityId, tick: u64) {
        if let Some(slot) = self
            .slots
            .get_mut(&entity.index)
            .filter(|slot| slot.generation == entity.generation)
        {
            slot.changed_at = tick;
        }
    }

    /// `(entity, value)` pairs in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &T)> + '_ {
        self.slots
            .iter()
            .map(|(index, slot)| (EntityId::new(*index, slot.generation), &slot.value))
    }

    /// Entities holding this component, ascending by index.
    pub fn sorted_entities(&self) -> Vec<EntityId> {
        self.slots
            .iter()
            .map(|(index, slot)| EntityId::new(*index, slot.generation))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot(&self, entity: EntityId) -> Option<&ComponentSlot<T>> {
        self.slots
            .get(&entity.index)
            .filter(|slot| slot.generation == entity.generation)
    }
}

/// Type-erased view of a `ComponentStore<T>` held in the World's store table.
pub(crate) trait AnyStore {
    fn component_type(&self) -> ComponentTypeId;
    fn remove_by_index(&mut self, index: u32) -> bool;
    fn contains(&self, entity: EntityId) -> bool;
    fn changed_at(&self, entity: EntityId) -> Option<u64>;
    fn sorted_entities(&self) -> Vec<EntityId>;
    fn get_any(&self, entity: EntityId) -> Option<&dyn Any>;
    fn len(&self) -> usize;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component> AnyStore for ComponentStore<T> {
    fn component_type(&self) -> ComponentTypeId {
        ComponentTypeId::of::<T>()
    }

    fn remove_by_index(&mut self, index: u32) -> bool {
        ComponentStore::remove_by_index(self, index).is_some()
    }

    fn contains(&self, entity: EntityId) -> bool {
        self.has(entity)
    }

    fn changed_at(&self, entity: EntityId) -> Option<u64> {
        ComponentStore::changed_at(self, entity)
    }

    fn sorted_entities(&self) -> Vec<EntityId> {
        ComponentStore::sorted_entities(self)
    }

    fn get_any(&self, entity: EntityId) -> Option<&dyn Any> {
        self.get(entity).map(|value| value as &dyn Any)
    }

    fn len(&self) -> usize {
        ComponentStore::len(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    fn pos(x: f32, y: f32) -> Position {
        Position { x, y }
    }

    #[test]
    fn add_and_get() {
        let mut store = ComponentStore::new();
        let e = EntityId::new(0, 0);
        store.add(e, pos(1.0, 2.0), 1);
        assert_eq!(store.get(e), Some(&pos(1.0, 2.0)));
        assert_eq!(store.changed_at(e), Some(1));
        assert!(store.has(e));
    }

    #[test]
    fn stale_handle_sees_nothing() {
        let mut store = ComponentStore::new();
        let old = EntityId::new(3, 0);
        let new = EntityId::new(3, 1);
        store.add(new, pos(5.0, 5.0), 4);

        assert!(store.get(old).is_none());
        assert!(!store.has(old));
        assert!(store.get_mut(old).is_none());
        assert_eq!(store.changed_at(old), None);
    }

    #[test]
    fn remove_with_stale_handle_is_noop() {
        let mut store = ComponentStore::new();
        let old = EntityId::new(3, 0);
        let new = EntityId::new(3, 1);
        store.add(new, pos(5.0, 5.0), 4);

        assert!(store.remove(old).is_none());
        assert_eq!(store.get(new), Some(&pos(5.0, 5.0)));
        assert_eq!(store.remove(new), Some(pos(5.0, 5.0)));
        assert!(store.is_empty());
    }

    #[test]
    fn remove_by_index_ignores_generation() {
        let mut store = ComponentStore::new();
        store.add(EntityId::new(2, 7), pos(0.0, 0.0), 1);
        assert!(store.remove_by_index(2).is_some());
        assert!(store.is_empty());
    }

    #[test]
    fn add_overwrites_generation_value_and_tick() {
        let mut store = ComponentStore::new();
        store.add(EntityId::new(1, 0), pos(1.0, 1.0), 2);
        store.add(EntityId::new(1, 1), pos(9.0, 9.0), 8);
        assert_eq!(store.len(), 1);
        assert!(store.get(EntityId::new(1, 0)).is_none());
        assert_eq!(store.changed_at(EntityId::new(1, 1)), Some(8));
    }

    #[test]
    fn iteration_is_ascending_by_index() {
        let mut store = ComponentStore::new();
        for index in [9u32, 2, 5, 0, 7] {
            store.add(EntityId::new(index, 0), pos(index as f32, 0.0), 1);
        }
        let order: Vec<u32> = store.iter().map(|(e, _)| e.index).collect();
        assert_eq!(order, vec![0, 2, 5, 7, 9]);
        let sorted: Vec<u32> = store.sorted_entities().iter().map(|e| e.index).collect();
        assert_eq!(sorted, order);
    }

    #[test]
    fn erased_view_downcasts() {
        let mut store = ComponentStore::new();
        let e = EntityId::new(0, 0);
        store.add(e, pos(3.0, 4.0), 1);
        let erased: &dyn AnyStore = &store;
        assert!(erased.contains(e));
        let value = erased.get_any(e).and_then(|v| v.downcast_ref::<Position>());
        assert_eq!(value, Some(&pos(3.0, 4.0)));
        assert_eq!(erased.component_type(), ComponentTypeId::of::<Position>());
    }
}
