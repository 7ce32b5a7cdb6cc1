//! Generational entity allocation.
//!
//! Slots live in a flat table. Destroying an entity bumps the slot's
//! generation and pushes the index on a free list; the next `create` pops it.

use keel_common::EntityId;

#[derive(Debug, Clone, Copy)]
struct Slot {
    generation: u32,
    alive: bool,
}

/// Allocator for generational entity ids with free-list recycling.
#[derive(Debug, Clone, Default)]
pub struct EntityManager {
    slots: Vec<Slot>,
    free: Vec<u32>,
    alive: usize,
}

impl EntityManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an entity. Reuses the most recently freed index with its
    /// already-bumped generation, or appends a fresh slot at generation 0.
    pub fn create(&mut self) -> EntityId {
        self.alive += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.alive = true;
            return EntityId::new(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            alive: true,
        });
        EntityId::new(index, 0)
    }

    /// Destroy an entity. Returns false (and does nothing) when the handle is
    /// already dead or stale.
    pub fn destroy(&mut self, entity: EntityId) -> bool {
        if !self.is_alive(entity) {
            return false;
        }
        let slot = &mut self.slots[entity.index as usize];
        slot.alive = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(entity.index);
        self.alive -= 1;
        true
    }

    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.slots
            .get(entity.index as usize)
            .is_some_and(|slot| slot.alive && slot.generation == entity.generation)
    }

    /// Current generation stored for a slot, alive or not.
    pub fn generation(&self, index: u32) -> Option<u32> {
        self.slots.get(index as usize).map(|slot| slot.generation)
    }

    /// Lazily walk alive slots in ascending index order.
    ///
    /// Each call starts over from the current table. The borrow prevents
    /// mutation while a walk is in progress; callers that need to mutate
    /// should collect first.
    pub fn iter_alive(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.alive)
            .map(|(index, slot)| EntityId::new(index as u32, slot.generation))
    }

    pub fn alive_count(&self) -> usize {
        self.alive
    }

    /// Number of slots ever allocated.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_ids_start_at_generation_zero() {
        let mut entities = EntityManager::new();
        let a = entities.create();
        let b = entities.create();
        assert_eq!(a, EntityId::new(0, 0));
        assert_eq!(b, EntityId::new(1, 0));
        assert_eq!(entities.alive_count(), 2);
    }

    #[test]
    fn destroy_then_create_recycles_with_bumped_generation() {
        let mut entities = EntityManager::new();
        let a = entities.create();
        assert!(entities.destroy(a));
        let b = entities.create();
        assert_eq!(b.index, a.index);
        assert_eq!(b.generation, a.generation + 1);
        assert!(!entities.is_alive(a));
        assert!(entities.is_alive(b));
    }

    #[test]
    fn destroy_is_idempotent() {
        let mut entities = EntityManager::new();
        let a = entities.create();
        assert!(entities.destroy(a));
        assert!(!entities.destroy(a));
        assert_eq!(entities.alive_count(), 0);
        assert_eq!(entities.generation(a.index), Some(1));
    }

    #[test]
    fn stale_handle_cannot_destroy_new_occupant() {
        let mut entities = EntityManager::new();
        let a = entities.create();
        entities.destroy(a);
        let b = entities.create();
        assert!(!entities.destroy(a));
        assert!(entities.is_alive(b));
    }

    #[test]
    fn out_of_range_index_is_dead() {
        let entities = EntityManager::new();
        assert!(!entities.is_alive(EntityId::new(7, 0)));
        assert_eq!(entities.generation(7), None);
    }

    #[test]
    fn free_list_reuses_most_recent_first() {
        let mut entities = EntityManager::new();
        let a = entities.create();
        let b = entities.create();
        entities.destroy(a);
        entities.destroy(b);
        assert_eq!(entities.create().index, b.index);
        assert_eq!(entities.create().index, a.index);
        assert_eq!(entities.capacity(), 2);
    }

    #[test]
    fn generation_wraps() {
        let mut entities = EntityManager::new();
        let a = entities.create();
        entities.slots[0].generation = u32::MAX;
        let stale = EntityId::new(a.index, u32::MAX);
        assert!(entities.destroy(stale));
        assert_eq!(entities.generation(0), Some(0));
    }

    #[test]
    fn iter_alive_skips_dead_and_restarts() {
        let mut entities = EntityManager::new();
        let a = entities.create();
        let b = entities.create();
        let c = entities.create();
        entities.destroy(b);
        let alive: Vec<EntityId> = entities.iter_alive().collect();
        assert_eq!(alive, vec![a, c]);

        let d = entities.create();
        let alive: Vec<EntityId> = entities.iter_alive().collect();
        assert_eq!(alive, vec![a, d, c]);
    }
}
