//! Stateful entity filters.
//!
//! A [`Query`] is built once and reused across frames. Its `changed` filter
//! compares component stamps against a watermark stored on the query itself,
//! so a fresh query per frame reports every component as changed.

use std::any::Any;
use std::fmt;

use keel_common::EntityId;

use crate::component::{Component, ComponentTypeId};
use crate::world::World;

/// Fluent filter over a [`World`].
#[derive(Debug, Clone, Default)]
pub struct Query {
    with: Vec<ComponentTypeId>,
    without: Vec<ComponentTypeId>,
    optional: Vec<ComponentTypeId>,
    changed: Vec<ComponentTypeId>,
    last_iterated_tick: u64,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `T`. The first required type seeds the candidate list, so put
    /// the most selective one first.
    pub fn with<T: Component>(mut self) -> Self {
        self.with.push(ComponentTypeId::of::<T>());
        self
    }

    /// Reject entities holding `T`.
    pub fn without<T: Component>(mut self) -> Self {
        self.without.push(ComponentTypeId::of::<T>());
        self
    }

    /// Report `T` when present without filtering on it.
    pub fn optional<T: Component>(mut self) -> Self {
        self.optional.push(ComponentTypeId::of::<T>());
        self
    }

    /// Only match entities whose `T` was written after this query's last
    /// complete iteration. Multiple `changed` filters must all hold.
    pub fn changed<T: Component>(mut self) -> Self {
        self.changed.push(ComponentTypeId::of::<T>());
        self
    }

    /// World tick recorded at the end of the last fully drained iteration.
    pub fn last_iterated_tick(&self) -> u64 {
        self.last_iterated_tick
    }

    /// Start an iteration. Candidates are collected now; entities spawned
    /// while the iterator is live are not visited.
    ///
    /// The watermark only advances once the iterator has returned `None`.
    /// Dropping it early leaves the watermark where it was.
    pub fn iter<'w, 'q>(&'q mut self, world: &'w World) -> QueryIter<'w, 'q> {
        let candidates = self.collect_candidates(world);
        QueryIter {
            world,
            query: self,
            candidates: candidates.into_iter(),
            finished: false,
        }
    }

    /// Drain and collect matching entities.
    pub fn entities(&mut self, world: &World) -> Vec<EntityId> {
        self.iter(world).map(|item| item.entity).collect()
    }

    /// Drain and count matching entities.
    pub fn count(&mut self, world: &World) -> usize {
        self.iter(world).count()
    }

    fn collect_candidates(&self, world: &World) -> Vec<EntityId> {
        match self.with.first() {
            None => world.iter_alive().collect(),
            Some(&seed) => world
                .erased_store(seed)
                .map(|store| store.sorted_entities())
                .unwrap_or_default(),
        }
    }

    fn matches(&self, world: &World, entity: EntityId) -> bool {
        if !world.is_alive(entity) {
            return false;
        }
        if !self
            .with
            .iter()
            .all(|&ty| world.has_component_type(entity, ty))
        {
            return false;
        }
        if self
            .without
            .iter()
            .any(|&ty| world.has_component_type(entity, ty))
        {
            return false;
        }
        self.changed.iter().all(|&ty| {
            world
                .erased_store(ty)
                .and_then(|store| store.changed_at(entity))
                .is_some_and(|tick| tick > self.last_iterated_tick)
        })
    }

    fn components<'w>(&self, world: &'w World, entity: EntityId) -> Components<'w> {
        let values = self
            .with
            .iter()
            .chain(&self.optional)
            .filter_map(|&ty| {
                let value = world.erased_store(ty)?.get_any(entity)?;
                Some((ty, value))
            })
            .collect();
        Components { values }
    }
}

/// Iterator returned by [`Query::iter`].
pub struct QueryIter<'w, 'q> {
    world: &'w World,
    query: &'q mut Query,
    candidates: std::vec::IntoIter<EntityId>,
    finished: bool,
}

impl<'w> Iterator for QueryIter<'w, '_> {
    type Item = QueryItem<'w>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        for entity in self.candidates.by_ref() {
            if self.query.matches(self.world, entity) {
                return Some(QueryItem {
                    entity,
                    components: self.query.components(self.world, entity),
                });
            }
        }
        self.finished = true;
        self.query.last_iterated_tick = self.world.change_tick();
        None
    }
}

/// One matching entity and the values of its declared component types.
#[derive(Debug)]
pub struct QueryItem<'w> {
    pub entity: EntityId,
    pub components: Components<'w>,
}

impl<'w> QueryItem<'w> {
    pub fn get<T: Component>(&self) -> Option<&'w T> {
        self.components.get::<T>()
    }
}

/// Component values captured for a [`QueryItem`].
///
/// Holds every `with` type and every present `optional` type.
pub struct Components<'w> {
    values: Vec<(ComponentTypeId, &'w dyn Any)>,
}

impl<'w> Components<'w> {
    pub fn get<T: Component>(&self) -> Option<&'w T> {
        let ty = ComponentTypeId::of::<T>();
        self.values
            .iter()
            .find(|(stored, _)| *stored == ty)
            .and_then(|(_, value)| value.downcast_ref())
    }

    pub fn contains<T: Component>(&self) -> bool {
        self.get::<T>().is_some()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn types(&self) -> impl Iterator<Item = ComponentTypeId> + '_ {
        self.values.iter().map(|(ty, _)| *ty)
    }
}

impl fmt::Debug for Components<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.types()).finish()
    }
}
