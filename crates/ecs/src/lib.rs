//! Entity-component data store for the keel engine core.
//!
//! Entities are generational handles, components live in sparse per-type
//! stores, and global values live in a versioned [`ResourceMap`]. Structural
//! changes made while iterating go through a [`CommandBuffer`].
//!
//! # Invariants
//! - An [`EntityId`] is alive only while its slot is alive and the slot's
//!   generation equals the handle's generation.
//! - Stale handles never error. Mutations through them are no-ops and reads
//!   return `None`.
//! - Every structural mutation bumps the World's change tick. Component
//!   writes are stamped with the post-increment tick.
//! - Component iteration is in ascending entity index order.
//! - A rejected resource insert leaves the [`ResourceMap`] unchanged.

mod command;
mod component;
mod entity;
mod query;
mod resource;
mod storage;
mod world;

pub use command::{
    BufferedComponent, Command, CommandBuffer, DeferredEntity, EntityCommands, EntityRef,
    FlushReport,
};
pub use component::{Component, ComponentTypeId};
pub use entity::EntityManager;
pub use keel_common::{EntityId, Symbol};
pub use query::{Components, Query, QueryItem, QueryIter};
pub use resource::{
    ResourceDependency, ResourceError, ResourceMap, ResourceMeta, ResourceToken, ResourceType,
};
pub use storage::ComponentStore;
pub use world::World;

pub fn crate_info() -> &'static str {
    concat!("keel-ecs v", env!("CARGO_PKG_VERSION"))
}
