//! The narrow world interface the scheduler drives.

use keel_ecs::{CommandBuffer, ResourceMap, World};

/// What a [`Scheduler`](crate::Scheduler) needs from the world it steps.
///
/// Each stage owns one `Commands` buffer; systems record into it and the
/// stage hands it back to [`SimWorld::flush`] once every system has run.
pub trait SimWorld: 'static {
    type Commands: Default + 'static;

    fn resources(&self) -> &ResourceMap;

    fn resources_mut(&mut self) -> &mut ResourceMap;

    fn flush(&mut self, commands: &mut Self::Commands);
}

impl SimWorld for World {
    type Commands = CommandBuffer;

    fn resources(&self) -> &ResourceMap {
        World::resources(self)
    }

    fn resources_mut(&mut self) -> &mut ResourceMap {
        World::resources_mut(self)
    }

    fn flush(&mut self, commands: &mut CommandBuffer) {
        commands.flush(self);
    }
}
