use queen_ecs::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Velocity {
    x: f32,
}

#[test]
fn command_buffer_spawn_is_invisible_until_flush() {
    let mut world = World::new();
    let mut commands = CommandBuffer::new();

    let index = commands.spawn().with(Position { x: 1.0, y: 2.0 }).build();
    assert_eq!(world.entity_count(), 0);
    assert!(commands.get_spawned_entity(index).is_none());

    commands.flush(&mut world).unwrap();
    assert_eq!(world.entity_count(), 1);
    let entity = commands.get_spawned_entity(index).unwrap();
    assert!(world.is_alive(entity));
    assert_eq!(world.get_component::<Position>(entity), Some(&Position { x: 1.0, y: 2.0 }));
}

#[test]
fn command_buffer_despawn_and_add_component_replay_in_order() {
    let mut world = World::new();
    let a = world.spawn((Position { x: 0.0, y: 0.0 },));
    let b = world.spawn((Position { x: 0.0, y: 0.0 },));

    let mut commands = CommandBuffer::new();
    commands.despawn(a);
    commands.add_component(b, Velocity { x: 5.0 });
    commands.flush(&mut world).unwrap();

    assert!(!world.is_alive(a));
    assert!(world.has_component::<Velocity>(b));
}

#[test]
fn command_buffer_despawn_of_dead_entity_is_silently_skipped() {
    let mut world = World::new();
    let a = world.spawn((Position { x: 0.0, y: 0.0 },));
    world.despawn(a);

    let mut commands = CommandBuffer::new();
    commands.despawn(a);
    assert!(commands.flush(&mut world).is_ok());
}

#[test]
fn system_each_runs_over_every_matching_row_per_update() {
    let mut world = World::new();
    world.spawn((Position { x: 0.0, y: 0.0 }, Velocity { x: 1.0 }));
    world.spawn((Position { x: 10.0, y: 0.0 }, Velocity { x: -1.0 }));
    world.spawn((Position { x: 0.0, y: 0.0 },));

    world.add_system(System::<(Write<Position>, Read<Velocity>)>::new("integrate").each(|(mut pos, vel)| {
        pos.x += vel.x;
    }));

    world.update();

    let positions: Vec<f32> = world.query::<(Read<Position>, Read<Velocity>)>().map(|(p, _)| p.x).collect();
    assert_eq!(positions.len(), 2);
    assert!(positions.contains(&1.0));
    assert!(positions.contains(&9.0));
}

#[test]
fn disabling_a_system_stops_it_from_running_on_the_next_update() {
    let mut world = World::new();
    world.spawn((Position { x: 0.0, y: 0.0 },));

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    let id = world.add_system(System::<(Read<Position>,)>::new("counter").each(move |_| {
        calls_clone.fetch_add(1, Ordering::SeqCst);
    }));

    world.update();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    world.set_system_enabled(id, false);
    world.update();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn resources_are_independent_of_entity_storage() {
    let mut world = World::new();
    world.insert_resource(42u32);
    assert_eq!(world.resource::<u32>(), Some(&42));

    *world.resource_mut::<u32>().unwrap() += 1;
    assert_eq!(world.resource::<u32>(), Some(&43));

    assert_eq!(world.remove_resource::<u32>(), Some(43));
    assert!(!world.has_resource::<u32>());
}

#[test]
fn on_add_and_on_remove_observers_fire_around_structural_changes() {
    let mut world = World::new();
    let added = Arc::new(AtomicUsize::new(0));
    let removed = Arc::new(AtomicUsize::new(0));

    let added_clone = added.clone();
    world.on_add::<Position>("track_add", move |_entity, _pos| {
        added_clone.fetch_add(1, Ordering::SeqCst);
    });
    let removed_clone = removed.clone();
    world.on_remove::<Position>("track_remove", move |_entity, _pos| {
        removed_clone.fetch_add(1, Ordering::SeqCst);
    });

    let e = world.spawn((Position { x: 0.0, y: 0.0 },));
    assert_eq!(added.load(Ordering::SeqCst), 1);

    world.remove_component::<Position>(e).unwrap();
    assert_eq!(removed.load(Ordering::SeqCst), 1);
}
