use std::hint::black_box;
use std::time::Instant;

use glam::Vec3;
use keel_ecs::{CommandBuffer, Query, World};

#[derive(Debug, Clone, Copy)]
struct Position(Vec3);

#[derive(Debug, Clone, Copy)]
struct Velocity(Vec3);

fn make_world(entity_count: usize) -> World {
    let mut world = World::new();
    for i in 0..entity_count {
        let e = world.spawn_entity();
        world.add_component(e, Position(Vec3::new(i as f32, 0.0, 0.0)));
        if i % 2 == 0 {
            world.add_component(e, Velocity(Vec3::X));
        }
    }
    world
}

fn bench_spawn(entity_count: usize, iterations: usize) {
    let start = Instant::now();
    for _ in 0..iterations {
        black_box(make_world(black_box(entity_count)));
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "  spawn+add ({entity_count} entities, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}"
    );
}

fn bench_query(entity_count: usize, iterations: usize) {
    let world = make_world(entity_count);
    let mut query = Query::new().with::<Velocity>().with::<Position>();

    let start = Instant::now();
    for _ in 0..iterations {
        let mut sum = Vec3::ZERO;
        for item in query.iter(black_box(&world)) {
            if let Some(Position(p)) = item.get::<Position>() {
                sum += *p;
            }
        }
        black_box(sum);
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "  query with<Velocity,Position> ({entity_count} entities, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}"
    );
}

fn bench_flush(command_count: usize, iterations: usize) {
    let start = Instant::now();
    for _ in 0..iterations {
        let mut world = World::new();
        let mut commands = CommandBuffer::new();
        for i in 0..command_count {
            commands
                .spawn()
                .insert(Position(Vec3::splat(i as f32)))
                .insert(Velocity(Vec3::Y));
        }
        black_box(commands.flush(&mut world));
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "  flush ({command_count} spawns, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}"
    );
}

fn main() {
    println!("=== World Benchmarks ===\n");

    println!("Spawn:");
    bench_spawn(100, 1000);
    bench_spawn(1000, 100);
    bench_spawn(10000, 10);

    println!("\nQuery iteration:");
    bench_query(1000, 1000);
    bench_query(10000, 100);

    println!("\nCommand flush:");
    bench_flush(100, 1000);
    bench_flush(1000, 100);

    println!("\n=== Done ===");
}
