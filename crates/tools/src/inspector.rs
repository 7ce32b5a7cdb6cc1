use std::fmt;

use keel_ecs::{EntityId, World};
use serde::Serialize;

/// World inspector for developer tooling.
///
/// Read-only views over a [`World`] for debugging output and the CLI.
pub struct WorldInspector;

impl WorldInspector {
    /// Produce a summary of the world state.
    pub fn summary(world: &World) -> WorldSummary {
        WorldSummary {
            change_tick: world.change_tick(),
            entity_count: world.entity_count(),
            component_stores: world.component_types().len(),
            resource_count: world.resources().len(),
        }
    }

    /// Which stores hold a component for `id`. `None` for dead handles.
    pub fn inspect_entity(world: &World, id: EntityId) -> Option<EntityInfo> {
        if !world.is_alive(id) {
            return None;
        }
        let components = world
            .component_types()
            .into_iter()
            .filter(|ty| world.has_component_type(id, *ty))
            .map(|ty| ty.short_name())
            .collect();
        Some(EntityInfo { id, components })
    }

    /// Alive entities in ascending index order.
    pub fn list_entities(world: &World) -> Vec<EntityId> {
        world.iter_alive().collect()
    }

    /// Installed resource labels, oldest insert first.
    pub fn list_resources(world: &World) -> Vec<String> {
        world
            .resources()
            .types()
            .iter()
            .map(|ty| ty.label().to_string())
            .collect()
    }
}

/// Summary of world state for the inspector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorldSummary {
    pub change_tick: u64,
    pub entity_count: usize,
    pub component_stores: usize,
    pub resource_count: usize,
}

impl fmt::Display for WorldSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "World: tick={} entities={} stores={} resources={}",
            self.change_tick, self.entity_count, self.component_stores, self.resource_count
        )
    }
}

/// Component listing for a single entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityInfo {
    pub id: EntityId,
    pub components: Vec<&'static str>,
}

impl fmt::Display for EntityInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity [{}] {}", self.id, self.components.join(", "))
    }
}
