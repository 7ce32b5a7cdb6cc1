use std::collections::HashMap;
use std::fmt;

use keel_common::EntityId;

use crate::command::{CommandBuffer, DeferredEntity};
use crate::component::{Component, ComponentTypeId};
use crate::entity::EntityManager;
use crate::query::Query;
use crate::resource::ResourceMap;
use crate::storage::{AnyStore, ComponentStore};

/// The entity-component data store.
///
/// Owns the entity allocator, one [`ComponentStore`] per component type, the
/// [`ResourceMap`], and a monotonic change tick. Every structural mutation
/// (spawn, destroy, add, remove) bumps the tick; component writes stamp the
/// written slot with the post-increment value.
///
/// Stale or dead handles never error: mutations through them are silent
/// no-ops and reads return `None`.
#[derive(Default)]
pub struct World {
    entities: EntityManager,
    stores: HashMap<ComponentTypeId, Box<dyn AnyStore>>,
    resources: ResourceMap,
    change_tick: u64,
    placeholders: HashMap<DeferredEntity, EntityId>,
    spawned_from: HashMap<EntityId, DeferredEntity>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of the world-wide change tick.
    pub fn change_tick(&self) -> u64 {
        self.change_tick
    }

    fn bump_tick(&mut self) -> u64 {
        self.change_tick += 1;
        self.change_tick
    }

    pub fn spawn_entity(&mut self) -> EntityId {
        self.bump_tick();
        let entity = self.entities.create();
        tracing::trace!(%entity, tick = self.change_tick, "entity spawned");
        entity
    }

    /// Destroy an entity and drop its components from every store.
    ///
    /// Returns false when the handle was already dead.
    pub fn destroy(&mut self, entity: EntityId) -> bool {
        if !self.entities.is_alive(entity) {
            return false;
        }
        for store in self.stores.values_mut() {
            store.remove_by_index(entity.index);
        }
        self.entities.destroy(entity);
        if let Some(placeholder) = self.spawned_from.remove(&entity) {
            self.placeholders.remove(&placeholder);
        }
        self.bump_tick();
        tracing::trace!(%entity, tick = self.change_tick, "entity destroyed");
        true
    }

    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.entities.is_alive(entity)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.alive_count()
    }

    /// Alive entities in ascending index order. See
    /// [`EntityManager::iter_alive`] for the iteration contract.
    pub fn iter_alive(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.iter_alive()
    }

    pub fn entities(&self) -> &EntityManager {
        &self.entities
    }

    /// Attach or overwrite a component. No-op on a dead handle.
    pub fn add_component<T: Component>(&mut self, entity: EntityId, value: T) -> bool {
        if !self.entities.is_alive(entity) {
            return false;
        }
        let tick = self.bump_tick();
        self.store_mut_or_insert::<T>().add(entity, value, tick);
        true
    }

    /// Detach a component. No-op on a dead handle; the tick is bumped for any
    /// alive handle even when the component was not present.
    pub fn remove_component<T: Component>(&mut self, entity: EntityId) -> Option<T> {
        if !self.entities.is_alive(entity) {
            return None;
        }
        self.bump_tick();
        self.store_mut::<T>()?.remove(entity)
    }

    /// Write to a component in place and stamp it as changed.
    ///
    /// Returns false when the entity is dead or lacks the component.
    pub fn modify<T: Component>(&mut self, entity: EntityId, f: impl FnOnce(&mut T)) -> bool {
        if !self.has::<T>(entity) || !self.entities.is_alive(entity) {
            return false;
        }
        let tick = self.bump_tick();
        let Some(store) = self.store_mut::<T>() else {
            return false;
        };
        if let Some(value) = store.get_mut(entity) {
            f(value);
        }
        store.stamp(entity, tick);
        true
    }

    pub fn get<T: Component>(&self, entity: EntityId) -> Option<&T> {
        self.store::<T>()?.get(entity)
    }

    /// Mutable access without change stamping. Prefer [`World::modify`] when
    /// `changed` queries should observe the write.
    pub fn get_mut<T: Component>(&mut self, entity: EntityId) -> Option<&mut T> {
        self.store_mut::<T>()?.get_mut(entity)
    }

    pub fn has<T: Component>(&self, entity: EntityId) -> bool {
        self.store::<T>().is_some_and(|store| store.has(entity))
    }

    pub fn store<T: Component>(&self) -> Option<&ComponentStore<T>> {
        self.stores
            .get(&ComponentTypeId::of::<T>())
            .and_then(|store| store.as_any().downcast_ref())
    }

    fn store_mut<T: Component>(&mut self) -> Option<&mut ComponentStore<T>> {
        self.stores
            .get_mut(&ComponentTypeId::of::<T>())
            .and_then(|store| store.as_any_mut().downcast_mut())
    }

    fn store_mut_or_insert<T: Component>(&mut self) -> &mut ComponentStore<T> {
        let store = self
            .stores
            .entry(ComponentTypeId::of::<T>())
            .or_insert_with(|| Box::new(ComponentStore::<T>::new()));
        match store.as_any_mut().downcast_mut() {
            Some(store) => store,
            None => unreachable!("store table keyed by the wrong component type"),
        }
    }

    pub(crate) fn erased_store(&self, ty: ComponentTypeId) -> Option<&dyn AnyStore> {
        self.stores.get(&ty).map(|store| store.as_ref())
    }

    /// Component types that have a store, sorted by type name.
    pub fn component_types(&self) -> Vec<ComponentTypeId> {
        let mut types: Vec<ComponentTypeId> = self
            .stores
            .values()
            .map(|store| store.component_type())
            .collect();
        types.sort_by_key(|ty| ty.name());
        types
    }

    /// Whether `entity` holds a component of the given erased type.
    pub fn has_component_type(&self, entity: EntityId, ty: ComponentTypeId) -> bool {
        self.erased_store(ty)
            .is_some_and(|store| store.contains(entity))
    }

    /// Number of components stored for the given erased type.
    pub fn component_count(&self, ty: ComponentTypeId) -> usize {
        self.erased_store(ty).map_or(0, |store| store.len())
    }

    /// A fresh filter over this world's entities.
    pub fn query(&self) -> Query {
        Query::new()
    }

    /// Entity a flushed spawn placeholder stands for. `None` before the spawn
    /// is flushed and after the entity is destroyed.
    pub fn resolve_placeholder(&self, placeholder: DeferredEntity) -> Option<EntityId> {
        self.placeholders.get(&placeholder).copied()
    }

    pub(crate) fn bind_placeholder(&mut self, placeholder: DeferredEntity, entity: EntityId) {
        self.placeholders.insert(placeholder, entity);
        self.spawned_from.insert(entity, placeholder);
    }

    /// A fresh, empty command buffer. Apply it with [`CommandBuffer::flush`].
    pub fn commands(&self) -> CommandBuffer {
        CommandBuffer::new()
    }

    pub fn resources(&self) -> &ResourceMap {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut ResourceMap {
        &mut self.resources
    }
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("entities", &self.entities.alive_count())
            .field("component_types", &self.component_types())
            .field("resources", &self.resources)
            .field("change_tick", &self.change_tick)
            .finish()
    }
}
