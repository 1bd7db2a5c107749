// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Deferred command buffer. Structural changes observed while iterating a
//! query can't be applied immediately (it would invalidate the iteration),
//! so callers queue them here and flush after the query completes.

use crate::component::{Bundle, Component};
use crate::entity::EntityId;
use crate::error::Result;
use crate::world::World;

type Closure = Box<dyn FnOnce(&mut World) -> Result<()> + Send>;
type SpawnClosure = Box<dyn FnOnce(&mut World) -> Result<EntityId> + Send>;

enum Command {
    /// Carries the spawn's stable index so `flush` can record the resulting
    /// entity into `CommandBuffer::spawned` itself; the closure only ever
    /// sees `&mut World`, so it has no way to write that back on its own.
    Spawn(usize, SpawnClosure),
    Despawn(EntityId),
    Mutate(Closure),
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Spawn(index, _) => f.debug_tuple("Spawn").field(index).finish(),
            Command::Despawn(e) => f.debug_tuple("Despawn").field(e).finish(),
            Command::Mutate(_) => write!(f, "Mutate(...)"),
        }
    }
}

/// Queues world mutations for replay after the current iteration finishes.
///
/// Spawns get a stable `spawn_index`, assigned in queue order, that the
/// caller can use to retrieve the resulting live entity after `flush`, even
/// though the entity doesn't exist until flush actually runs.
#[derive(Default)]
pub struct CommandBuffer {
    commands: Vec<Command>,
    spawned: Vec<EntityId>,
}

/// Accumulates components for a deferred spawn. Produced by
/// [`CommandBuffer::spawn`], consumed by [`SpawnBuilder::build`].
pub struct SpawnBuilder<'a> {
    buffer: &'a mut CommandBuffer,
    writers: Vec<Box<dyn FnOnce(&mut World, EntityId) -> Result<()> + Send>>,
    spawn_index: usize,
}

impl<'a> SpawnBuilder<'a> {
    pub fn with<T: Component>(mut self, component: T) -> Self {
        self.writers
            .push(Box::new(move |world, entity| world.add_component(entity, component)));
        self
    }

    /// Finalizes the queued spawn and returns its stable index. The live
    /// entity is retrievable via [`CommandBuffer::get_spawned_entity`] only
    /// after the buffer has been flushed.
    pub fn build(self) -> usize {
        let index = self.spawn_index;
        let writers = self.writers;
        self.buffer.commands.push(Command::Spawn(
            index,
            Box::new(move |world| {
                let entity = world.spawn(());
                for writer in writers {
                    writer(world, entity)?;
                }
                Ok(entity)
            }),
        ));
        index
    }
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            commands: Vec::with_capacity(capacity),
            spawned: Vec::new(),
        }
    }

    /// Begins a deferred spawn. Chain `.with(component)` calls, then
    /// `.build()` to queue it and obtain its stable spawn index.
    pub fn spawn(&mut self) -> SpawnBuilder<'_> {
        let spawn_index = self.spawned.len();
        self.spawned.push(EntityId::NULL);
        SpawnBuilder {
            buffer: self,
            writers: Vec::new(),
            spawn_index,
        }
    }

    /// Convenience for queuing a spawn of a whole bundle at once.
    pub fn spawn_bundle<B: Bundle>(&mut self, bundle: B) -> usize {
        let spawn_index = self.spawned.len();
        self.spawned.push(EntityId::NULL);
        self.commands
            .push(Command::Spawn(spawn_index, Box::new(move |world| Ok(world.spawn(bundle)))));
        spawn_index
    }

    pub fn despawn(&mut self, entity: EntityId) {
        self.commands.push(Command::Despawn(entity));
    }

    pub fn add_component<T: Component>(&mut self, entity: EntityId, component: T) {
        self.commands.push(Command::Mutate(Box::new(move |world| {
            world.add_component(entity, component)
        })));
    }

    pub fn remove_component<T: Component>(&mut self, entity: EntityId) {
        self.commands.push(Command::Mutate(Box::new(move |world| {
            world.remove_component::<T>(entity).map(|_| ())
        })));
    }

    pub fn set_component<T: Component>(&mut self, entity: EntityId, component: T) {
        self.add_component(entity, component);
    }

    /// Queues an arbitrary world mutation, for cases the typed helpers above
    /// don't cover.
    pub fn add<F>(&mut self, f: F)
    where
        F: FnOnce(&mut World) -> Result<()> + Send + 'static,
    {
        self.commands.push(Command::Mutate(Box::new(f)));
    }

    /// Looks up the live entity produced by a queued spawn, by its stable
    /// index. Returns `None` until `flush` has run.
    pub fn get_spawned_entity(&self, spawn_index: usize) -> Option<EntityId> {
        self.spawned.get(spawn_index).copied().filter(|e| !e.is_null())
    }

    /// Replays every queued command against `world` in FIFO order, then
    /// clears the buffer. Commands targeting a dead entity are silently
    /// skipped rather than erroring. Flushing an empty buffer is a no-op.
    pub fn flush(&mut self, world: &mut World) -> Result<()> {
        for command in self.commands.drain(..) {
            match command {
                Command::Spawn(index, f) => {
                    let entity = f(world)?;
                    self.spawned[index] = entity;
                }
                Command::Despawn(entity) => {
                    if world.is_alive(entity) {
                        world.despawn(entity);
                    }
                }
                Command::Mutate(f) => f(world)?,
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
        self.spawned.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::World;

    #[derive(Debug, Clone, Copy)]
    struct Pos {
        x: f32,
    }

    #[test]
    fn empty_buffer_reports_empty() {
        let mut buffer = CommandBuffer::new();
        assert!(buffer.is_empty());
        buffer.despawn(EntityId::NULL);
        assert!(!buffer.is_empty());
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn clear_resets_queue_and_spawn_table() {
        let mut buffer = CommandBuffer::new();
        buffer.despawn(EntityId::NULL);
        buffer.clear();
        assert_eq!(buffer.len(), 0);
    }

    #[test]
    fn deferred_spawn_is_resolved_after_flush() {
        let mut world = World::new();
        let mut buffer = CommandBuffer::new();
        let index = buffer.spawn().with(Pos { x: 1.0 }).build();
        assert!(buffer.get_spawned_entity(index).is_none());
        buffer.flush(&mut world).unwrap();
        let entity = buffer.get_spawned_entity(index).expect("spawn resolved");
        assert!(world.is_alive(entity));
    }

    #[test]
    fn despawn_on_dead_entity_is_a_noop() {
        let mut world = World::new();
        let mut buffer = CommandBuffer::new();
        buffer.despawn(EntityId::NULL);
        assert!(buffer.flush(&mut world).is_ok());
    }

    #[test]
    fn flushing_twice_is_idempotent() {
        let mut world = World::new();
        let mut buffer = CommandBuffer::new();
        buffer.spawn_bundle((Pos { x: 2.0 },));
        buffer.flush(&mut world).unwrap();
        assert_eq!(world.entity_count(), 1);
        buffer.flush(&mut world).unwrap();
        assert_eq!(world.entity_count(), 1);
    }
}
