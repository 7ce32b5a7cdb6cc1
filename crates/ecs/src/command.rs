//! Deferred structural mutation.
//!
//! Systems record spawns, destroys and component changes into a
//! [`CommandBuffer`] while they iterate; the buffer is applied to the
//! [`World`] in one FIFO pass by [`CommandBuffer::flush`]. Until then the
//! World is untouched.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use keel_common::EntityId;

use crate::component::{Component, ComponentTypeId};
use crate::world::World;

static NEXT_PLACEHOLDER: AtomicU64 = AtomicU64::new(0);

/// Placeholder for an entity whose spawn is still queued.
///
/// Ids are unique across every buffer in the process, so a placeholder
/// issued by one stage's buffer can be targeted from another. Once the spawn
/// is flushed the World maps it to the real entity until that entity is
/// destroyed; see [`World::resolve_placeholder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeferredEntity(u64);

impl DeferredEntity {
    fn next() -> Self {
        Self(NEXT_PLACEHOLDER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DeferredEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deferred#{}", self.0)
    }
}

/// Target of a queued command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRef {
    Resolved(EntityId),
    Deferred(DeferredEntity),
}

impl From<EntityId> for EntityRef {
    fn from(entity: EntityId) -> Self {
        Self::Resolved(entity)
    }
}

impl From<DeferredEntity> for EntityRef {
    fn from(placeholder: DeferredEntity) -> Self {
        Self::Deferred(placeholder)
    }
}

type InsertFn = Box<dyn FnOnce(&mut World, EntityId) -> bool>;
type RemoveFn = fn(&mut World, EntityId) -> bool;

/// A component value waiting to be written.
pub struct BufferedComponent {
    ty: ComponentTypeId,
    insert: InsertFn,
}

impl BufferedComponent {
    pub fn new<T: Component>(value: T) -> Self {
        Self {
            ty: ComponentTypeId::of::<T>(),
            insert: Box::new(move |world, entity| world.add_component(entity, value)),
        }
    }

    pub fn component_type(&self) -> ComponentTypeId {
        self.ty
    }

    fn apply(self, world: &mut World, entity: EntityId) -> bool {
        (self.insert)(world, entity)
    }
}

impl fmt::Debug for BufferedComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BufferedComponent").field(&self.ty).finish()
    }
}

/// One queued operation.
pub enum Command {
    Spawn {
        placeholder: DeferredEntity,
        components: Vec<BufferedComponent>,
    },
    Destroy(EntityRef),
    AddComponent {
        target: EntityRef,
        component: BufferedComponent,
    },
    RemoveComponent {
        target: EntityRef,
        ty: ComponentTypeId,
        remove: RemoveFn,
    },
}

impl Command {
    pub fn destroy(target: impl Into<EntityRef>) -> Self {
        Self::Destroy(target.into())
    }

    pub fn add_component<T: Component>(target: impl Into<EntityRef>, value: T) -> Self {
        Self::AddComponent {
            target: target.into(),
            component: BufferedComponent::new(value),
        }
    }

    pub fn remove_component<T: Component>(target: impl Into<EntityRef>) -> Self {
        Self::RemoveComponent {
            target: target.into(),
            ty: ComponentTypeId::of::<T>(),
            remove: |world, entity| world.remove_component::<T>(entity).is_some(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Spawn { .. } => "spawn",
            Self::Destroy(_) => "destroy",
            Self::AddComponent { .. } => "add_component",
            Self::RemoveComponent { .. } => "remove_component",
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn {
                placeholder,
                components,
            } => f
                .debug_struct("Spawn")
                .field("placeholder", placeholder)
                .field("components", components)
                .finish(),
            Self::Destroy(target) => f.debug_tuple("Destroy").field(target).finish(),
            Self::AddComponent { target, component } => f
                .debug_struct("AddComponent")
                .field("target", target)
                .field("component", component)
                .finish(),
            Self::RemoveComponent { target, ty, .. } => f
                .debug_struct("RemoveComponent")
                .field("target", target)
                .field("ty", ty)
                .finish(),
        }
    }
}

/// Outcome of a [`CommandBuffer::flush`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Commands that changed the World.
    pub applied: usize,
    /// Commands whose target did not resolve to a live entity, or that had
    /// nothing to do.
    pub skipped: usize,
    /// Placeholders resolved during this flush, in spawn order.
    pub spawned: Vec<(DeferredEntity, EntityId)>,
}

impl FlushReport {
    /// Real entity a placeholder resolved to during this flush.
    pub fn resolve(&self, placeholder: DeferredEntity) -> Option<EntityId> {
        self.spawned
            .iter()
            .find(|(deferred, _)| *deferred == placeholder)
            .map(|(_, entity)| *entity)
    }
}

/// FIFO queue of deferred World mutations.
#[derive(Debug, Default)]
pub struct CommandBuffer {
    queue: Vec<Command>,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a placeholder without queueing its spawn. Pair it with a
    /// manually pushed [`Command::Spawn`].
    pub fn reserve(&mut self) -> DeferredEntity {
        DeferredEntity::next()
    }

    /// Queue a spawn and return a builder for its initial components.
    pub fn spawn(&mut self) -> EntityCommands<'_> {
        let placeholder = self.reserve();
        self.queue.push(Command::Spawn {
            placeholder,
            components: Vec::new(),
        });
        let slot = self.queue.len() - 1;
        EntityCommands {
            buffer: self,
            placeholder,
            slot,
        }
    }

    pub fn destroy(&mut self, target: impl Into<EntityRef>) {
        self.queue.push(Command::destroy(target));
    }

    pub fn add_component<T: Component>(&mut self, target: impl Into<EntityRef>, value: T) {
        self.queue.push(Command::add_component(target, value));
    }

    pub fn remove_component<T: Component>(&mut self, target: impl Into<EntityRef>) {
        self.queue.push(Command::remove_component::<T>(target));
    }

    pub fn push(&mut self, command: Command) {
        self.queue.push(command);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drop every queued command without applying it.
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Apply every queued command to `world` in FIFO order, then empty the
    /// queue.
    ///
    /// Placeholders resolve as their spawn command is reached and stay bound
    /// on the World afterwards, so later flushes of any buffer can target
    /// them. A command whose placeholder has not been spawned yet, or whose
    /// entity is gone, is skipped.
    pub fn flush(&mut self, world: &mut World) -> FlushReport {
        let mut report = FlushReport::default();
        if self.queue.is_empty() {
            return report;
        }
        let total = self.queue.len();

        for command in self.queue.drain(..) {
            let kind = command.kind();
            let applied = match command {
                Command::Spawn {
                    placeholder,
                    components,
                } => {
                    let entity = world.spawn_entity();
                    for component in components {
                        component.apply(world, entity);
                    }
                    world.bind_placeholder(placeholder, entity);
                    report.spawned.push((placeholder, entity));
                    true
                }
                Command::Destroy(target) => {
                    resolve(world, target).is_some_and(|entity| world.destroy(entity))
                }
                Command::AddComponent { target, component } => resolve(world, target)
                    .is_some_and(|entity| component.apply(world, entity)),
                Command::RemoveComponent { target, remove, .. } => {
                    resolve(world, target).is_some_and(|entity| remove(world, entity))
                }
            };
            if applied {
                report.applied += 1;
            } else {
                tracing::trace!(command = kind, "command skipped");
                report.skipped += 1;
            }
        }

        tracing::debug!(
            total,
            applied = report.applied,
            skipped = report.skipped,
            spawned = report.spawned.len(),
            "command buffer flushed"
        );
        report
    }
}

fn resolve(world: &World, target: EntityRef) -> Option<EntityId> {
    match target {
        EntityRef::Resolved(entity) => Some(entity),
        EntityRef::Deferred(placeholder) => world.resolve_placeholder(placeholder),
    }
}

/// Builder returned by [`CommandBuffer::spawn`].
pub struct EntityCommands<'a> {
    buffer: &'a mut CommandBuffer,
    placeholder: DeferredEntity,
    slot: usize,
}

impl EntityCommands<'_> {
    /// Buffer an initial component, written right after the spawn.
    pub fn insert<T: Component>(self, value: T) -> Self {
        if let Some(Command::Spawn { components, .. }) = self.buffer.queue.get_mut(self.slot) {
            components.push(BufferedComponent::new(value));
        }
        self
    }

    pub fn id(&self) -> DeferredEntity {
        self.placeholder
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

    #[derive(Debug, Clone, PartialEq)]
    struct Health(u32);

    #[test]
    fn nothing_happens_before_flush() {
        let mut world = World::new();
        let existing = world.spawn_entity();
        let tick = world.change_tick();

        let mut commands = world.commands();
        commands.spawn().insert(Health(10));
        commands.destroy(existing);
        commands.add_component(existing, Position { x: 1.0, y: 1.0 });

        assert_eq!(commands.len(), 3);
        assert_eq!(world.entity_count(), 1);
        assert!(world.is_alive(existing));
        assert!(!world.has::<Position>(existing));
        assert_eq!(world.change_tick(), tick);
    }

    #[test]
    fn flush_applies_in_fifo_order() {
        let mut world = World::new();
        let e = world.spawn_entity();
        let mut commands = CommandBuffer::new();
        commands.add_component(e, Health(1));
        commands.add_component(e, Health(2));
        commands.remove_component::<Health>(e);
        commands.add_component(e, Health(3));

        let report = commands.flush(&mut world);
        assert_eq!(report.applied, 4);
        assert_eq!(report.skipped, 0);
        assert_eq!(world.get::<Health>(e), Some(&Health(3)));
        assert!(commands.is_empty());
    }

    #[test]
    fn spawn_resolves_placeholder_with_initial_components() {
        let mut world = World::new();
        let mut commands = CommandBuffer::new();
        let placeholder = commands
            .spawn()
            .insert(Position { x: 1.0, y: 2.0 })
            .insert(Health(5))
            .id();
        commands.add_component(placeholder, Health(7));

        let report = commands.flush(&mut world);
        let entity = report.resolve(placeholder).unwrap();
        assert_eq!(entity, EntityId::new(0, 0));
        assert_eq!(world.get::<Position>(entity), Some(&Position { x: 1.0, y: 2.0 }));
        assert_eq!(world.get::<Health>(entity), Some(&Health(7)));
        assert_eq!(report.spawned, vec![(placeholder, entity)]);
    }

    #[test]
    fn placeholders_resolve_in_spawn_order() {
        let mut world = World::new();
        let mut commands = CommandBuffer::new();
        let a = commands.spawn().id();
        let b = commands.spawn().id();
        commands.destroy(a);

        let report = commands.flush(&mut world);
        let a_id = report.resolve(a).unwrap();
        let b_id = report.resolve(b).unwrap();
        assert!(a_id.index < b_id.index);
        assert!(!world.is_alive(a_id));
        assert!(world.is_alive(b_id));
    }

    #[test]
    fn unresolved_placeholder_is_skipped() {
        let mut world = World::new();
        let mut commands = CommandBuffer::new();
        let placeholder = commands.reserve();
        commands.push(Command::add_component(placeholder, Health(1)));
        commands.push(Command::Spawn {
            placeholder,
            components: Vec::new(),
        });

        let report = commands.flush(&mut world);
        assert_eq!(report.applied, 1);
        assert_eq!(report.skipped, 1);
        let entity = report.resolve(placeholder).unwrap();
        assert!(!world.has::<Health>(entity));
    }

    #[test]
    fn stale_targets_are_skipped() {
        let mut world = World::new();
        let e = world.spawn_entity();
        world.destroy(e);
        let mut commands = CommandBuffer::new();
        commands.destroy(e);
        commands.add_component(e, Health(1));
        commands.remove_component::<Health>(e);

        let report = commands.flush(&mut world);
        assert_eq!(report.applied, 0);
        assert_eq!(report.skipped, 3);
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn placeholder_stays_resolvable_for_later_buffers() {
        let mut world = World::new();
        let mut spawner = CommandBuffer::new();
        let placeholder = spawner.spawn().insert(Health(1)).id();
        spawner.flush(&mut world);
        let entity = world.resolve_placeholder(placeholder).unwrap();

        let mut later = CommandBuffer::new();
        later.add_component(placeholder, Position { x: 3.0, y: 4.0 });
        let report = later.flush(&mut world);
        assert_eq!(report.applied, 1);
        assert_eq!(world.get::<Position>(entity), Some(&Position { x: 3.0, y: 4.0 }));

        later.destroy(placeholder);
        later.flush(&mut world);
        assert!(!world.is_alive(entity));
        assert!(world.resolve_placeholder(placeholder).is_none());

        later.add_component(placeholder, Health(2));
        assert_eq!(later.flush(&mut world).skipped, 1);
    }

    #[test]
    fn placeholders_are_unique_across_buffers() {
        let mut a = CommandBuffer::new();
        let mut b = CommandBuffer::new();
        let first = a.spawn().id();
        let second = b.spawn().id();
        assert_ne!(first, second);
        assert_ne!(a.reserve(), first);
    }

    #[test]
    fn clear_discards_without_applying() {
        let mut world = World::new();
        let mut commands = CommandBuffer::new();
        commands.spawn();
        commands.clear();
        assert_eq!(commands.flush(&mut world), FlushReport::default());
        assert_eq!(world.entity_count(), 0);
    }
}
