//! Particle demo used by `simulate` and `validate`.
//!
//! Particles are seeded at boot, emitted in `PreUpdate`, moved in
//! `FixedUpdate`, tallied in `Update` and "presented" by an async `Render`
//! system. All randomness comes from the world's `SeededRng` resource.

use futures::FutureExt;
use glam::Vec2;
use keel_ecs::{EntityId, Query, World};
use keel_kernel::{
    EventQueue, Scheduler, SchedulerConfig, SeededRng, StageLabel, System, SystemContext,
};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position(pub Vec2);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Velocity(pub Vec2);

/// Seconds left before the particle expires.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lifetime(pub f32);

#[derive(Debug, Clone, Copy)]
pub struct Gravity(pub Vec2);

#[derive(Debug, Clone, Default)]
pub struct DemoStats {
    pub spawned: u64,
    pub expired: u64,
    pub moved_last_frame: usize,
    pub frames_presented: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParticleEvent {
    Expired(EntityId),
}

const INITIAL_PARTICLES: usize = 64;
const EMIT_CHANCE: f64 = 0.5;

pub fn build(config: &SchedulerConfig, seed: u32) -> anyhow::Result<Scheduler<World>> {
    let mut world = World::new();
    let resources = world.resources_mut();
    resources.insert_resource(SeededRng::new(seed));
    resources.insert_resource(Gravity(Vec2::new(0.0, -9.8)));
    resources.insert_resource(DemoStats::default());

    let mut scheduler = Scheduler::from_config(world, config)?;
    scheduler.set_event_bus(EventQueue::<ParticleEvent>::new());

    scheduler.add_system(System::<World>::new("seed-particles", StageLabel::Boot, |ctx| {
        for _ in 0..INITIAL_PARTICLES {
            spawn_particle(ctx)?;
        }
        Ok(())
    }))?;

    scheduler.add_system(System::<World>::new("emit", StageLabel::PreUpdate, |ctx| {
        let emit = ctx
            .resources_mut()
            .resource_mut::<SeededRng>()?
            .chance(EMIT_CHANCE);
        if emit {
            spawn_particle(ctx)?;
        }
        Ok(())
    }))?;

    let mut falling = Query::new().with::<Velocity>();
    scheduler.add_system(
        System::<World>::new("gravity", StageLabel::FixedUpdate, move |ctx| {
            let gravity = ctx.resources().resource::<Gravity>()?.0;
            let dt = ctx.delta_time as f32;
            for entity in falling.entities(ctx.world) {
                ctx.world
                    .modify::<Velocity>(entity, |v| v.0 += gravity * dt);
            }
            Ok(())
        })
        .writes::<Velocity>(),
    )?;

    let mut moving = Query::new().with::<Velocity>().with::<Position>();
    scheduler.add_system(
        System::<World>::new("integrate", StageLabel::FixedUpdate, move |ctx| {
            let dt = ctx.delta_time as f32;
            let updates: Vec<(EntityId, Vec2)> = moving
                .iter(ctx.world)
                .filter_map(|item| {
                    let Position(p) = item.get::<Position>()?;
                    let Velocity(v) = item.get::<Velocity>()?;
                    Some((item.entity, *p + *v * dt))
                })
                .collect();
            for (entity, next) in updates {
                ctx.world.modify::<Position>(entity, |p| p.0 = next);
            }
            Ok(())
        })
        .with_order(1)
        .reads::<Velocity>()
        .writes::<Position>(),
    )?;

    let mut aging = Query::new().with::<Lifetime>();
    scheduler.add_system(
        System::<World>::new("age", StageLabel::FixedUpdate, move |ctx| {
            let dt = ctx.delta_time as f32;
            for entity in aging.entities(ctx.world) {
                ctx.world.modify::<Lifetime>(entity, |l| l.0 -= dt);
                let expired = ctx.world.get::<Lifetime>(entity).is_some_and(|l| l.0 <= 0.0);
                if expired {
                    ctx.commands.destroy(entity);
                    if let Some(events) = ctx.events_mut::<EventQueue<ParticleEvent>>() {
                        events.send(ParticleEvent::Expired(entity));
                    }
                }
            }
            Ok(())
        })
        .with_order(2)
        .writes::<Lifetime>(),
    )?;

    let mut moved = Query::new().changed::<Position>();
    scheduler.add_system(
        System::<World>::new("tally", StageLabel::Update, move |ctx| {
            let moved_count = moved.count(ctx.world);
            let expired = ctx
                .events_mut::<EventQueue<ParticleEvent>>()
                .map_or(0, |events| events.drain().len());
            let stats = ctx.resources_mut().resource_mut::<DemoStats>()?;
            stats.moved_last_frame = moved_count;
            stats.expired += expired as u64;
            Ok(())
        })
        .reads::<Position>(),
    )?;

    scheduler.add_system(System::<World>::new_async("present", StageLabel::Render, |ctx| {
        async move {
            let particles = ctx.world.entity_count();
            let stats = ctx.world.resources_mut().resource_mut::<DemoStats>()?;
            stats.frames_presented += 1;
            tracing::trace!(particles, frame = stats.frames_presented, "frame presented");
            Ok::<(), anyhow::Error>(())
        }
        .boxed_local()
    }))?;

    scheduler.add_system(System::<World>::new("report", StageLabel::Shutdown, |ctx| {
        let stats = ctx.resources().resource::<DemoStats>()?;
        tracing::info!(
            spawned = stats.spawned,
            expired = stats.expired,
            presented = stats.frames_presented,
            "simulation finished"
        );
        Ok(())
    }))?;

    Ok(scheduler)
}

fn spawn_particle(ctx: &mut SystemContext<'_, World>) -> anyhow::Result<()> {
    let rng = ctx.resources_mut().resource_mut::<SeededRng>()?;
    let position = Vec2::new(
        rng.range_f64(-10.0, 10.0) as f32,
        rng.range_f64(0.0, 10.0) as f32,
    );
    let velocity = Vec2::new(
        rng.range_f64(-2.0, 2.0) as f32,
        rng.range_f64(0.0, 8.0) as f32,
    );
    let lifetime = rng.range_f64(0.5, 3.0) as f32;

    ctx.resources_mut().resource_mut::<DemoStats>()?.spawned += 1;
    ctx.commands
        .spawn()
        .insert(Position(position))
        .insert(Velocity(velocity))
        .insert(Lifetime(lifetime));
    Ok(())
}

/// SHA-256 over every particle's id and position bits, in index order.
pub fn world_hash(world: &World) -> String {
    let mut hasher = Sha256::new();
    for item in Query::new().with::<Position>().iter(world) {
        let Some(Position(p)) = item.get::<Position>() else {
            continue;
        };
        hasher.update(item.entity.index.to_le_bytes());
        hasher.update(item.entity.generation.to_le_bytes());
        hasher.update(p.x.to_bits().to_le_bytes());
        hasher.update(p.y.to_bits().to_le_bytes());
    }
    format!("{:x}", hasher.finalize())
}
