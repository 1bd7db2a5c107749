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

//! `World` ties every other module together: entity identity, archetype
//! storage, queries, systems, observers, resources and hierarchy all hang
//! off this one struct. It's the only type application code constructs
//! directly.

use std::any::{Any, TypeId};

use ahash::AHashMap;
#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::component::{Bundle, Component};
use crate::entity::{EntityAllocator, EntityId, EntityLocation};
use crate::error::{EcsError, Result};
use crate::archetype::ComponentColumn;
use crate::graph::{ArchetypeGraph, GraphStats};
use crate::hierarchy::{Children, Parent};
use crate::observer::{ObserverId, ObserverRegistry, Trigger};
use crate::query::{Mut, QueryIter, QueryTerms};
use crate::system::{RunnableSystem, SystemDescriptor, SystemId};
use crate::tick::{ComponentTicks, Tick};

/// A batch spawn larger than this is almost certainly a caller bug (an
/// iterator sized by something that should never reach the ECS), not a
/// legitimate workload.
const MAX_BATCH_SPAWN: usize = 10_000_000;

/// Type-erased singleton store, one value per type, for state that doesn't
/// belong to any single entity (e.g. a frame counter or an asset table).
#[derive(Default)]
struct Resources {
    values: AHashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Resources {
    fn insert<T: Send + Sync + 'static>(&mut self, value: T) {
        self.values.insert(TypeId::of::<T>(), Box::new(value));
    }

    fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.values.get(&TypeId::of::<T>()).and_then(|v| v.downcast_ref())
    }

    fn get_mut<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.values.get_mut(&TypeId::of::<T>()).and_then(|v| v.downcast_mut())
    }

    fn remove<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.values
            .remove(&TypeId::of::<T>())
            .map(|v| *v.downcast::<T>().unwrap_or_else(|_| unreachable!("type-keyed by TypeId")))
    }

    fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.values.contains_key(&TypeId::of::<T>())
    }
}

/// The ECS world: entities, their components, systems, observers and
/// resources, all in one place.
pub struct World {
    allocator: EntityAllocator,
    graph: ArchetypeGraph,
    resources: Resources,
    observers: ObserverRegistry,
    systems: Vec<Box<dyn RunnableSystem>>,
    current_tick: Tick,
    /// Set while dispatching an observer callback. Structural entry points
    /// assert this is clear, since an observer mutating the archetype it
    /// was invoked over would invalidate the caller's in-flight row index.
    in_observer: bool,
}

impl World {
    pub fn new() -> Self {
        Self {
            allocator: EntityAllocator::new(),
            graph: ArchetypeGraph::new(),
            resources: Resources::default(),
            observers: ObserverRegistry::new(),
            systems: Vec::new(),
            current_tick: Tick::new(1),
            in_observer: false,
        }
    }

    fn assert_not_in_observer(&self, op: &str) {
        debug_assert!(
            !self.in_observer,
            "structural mutation ({op}) from inside an observer callback is not allowed"
        );
    }

    // ---- entity lifecycle -------------------------------------------------

    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.allocator.is_alive(entity)
    }

    pub fn entity_count(&self) -> usize {
        self.allocator.alive_count()
    }

    /// Diagnostic snapshot of the archetype graph's shape (archetype and
    /// cached-edge counts), for a profiling dashboard or a test assertion,
    /// never consulted by query execution itself.
    pub fn graph_stats(&self) -> GraphStats {
        self.graph.stats()
    }

    pub fn archetype_count(&self) -> usize {
        self.graph.len()
    }

    /// Exposes the archetype graph for read-only iteration, used by world
    /// serialization to walk every entity's components without going through
    /// a query.
    pub(crate) fn graph(&self) -> &ArchetypeGraph {
        &self.graph
    }

    pub fn current_tick(&self) -> Tick {
        self.current_tick
    }

    /// Advances the world tick by one and returns the new value. `update`
    /// calls this itself; exposed separately for callers driving ticks
    /// without a full system pass (e.g. tests pinning a tick before a
    /// change-filter query).
    pub fn increment_tick(&mut self) -> Tick {
        self.current_tick = Tick::new(self.current_tick.0.wrapping_add(1));
        self.current_tick
    }

    /// Spawns an entity with the given bundle of components, firing
    /// `OnAdd<T>` for each component type after the row is fully written.
    pub fn spawn<B: Bundle>(&mut self, bundle: B) -> EntityId {
        #[cfg(feature = "profiling")]
        let _span = info_span!("world_spawn").entered();

        self.assert_not_in_observer("spawn");
        let type_ids = B::type_ids();
        let archetype_id = self
            .graph
            .get_or_create_with(&type_ids, |archetype| B::register_components(archetype));

        let entity = self.allocator.allocate(EntityLocation {
            archetype_id,
            archetype_row: 0,
        });

        let archetype = self.graph.get_mut(archetype_id);
        let row = archetype.allocate_row(entity);
        let tick = self.current_tick;
        let mut ptrs: Vec<*mut u8> = Vec::with_capacity(type_ids.len());
        for type_id in &type_ids {
            ptrs.push(archetype.init_column_row(*type_id, ComponentTicks::new(tick)));
        }
        unsafe { bundle.write_components(&ptrs) };

        self.allocator.set_location(entity, EntityLocation { archetype_id, archetype_row: row });

        self.in_observer = true;
        for (type_id, ptr) in type_ids.iter().zip(ptrs.iter()) {
            self.observers.dispatch(Trigger::OnAdd, *type_id, entity, *ptr as *const u8);
        }
        self.in_observer = false;

        entity
    }

    /// Spawns one entity per bundle. Rejects the whole batch up front if
    /// `bundles` reports a size above [`MAX_BATCH_SPAWN`], rather than
    /// partially spawning and then erroring midway through.
    pub fn spawn_batch<B, I>(&mut self, bundles: I) -> Result<Vec<EntityId>>
    where
        B: Bundle,
        I: IntoIterator<Item = B>,
        I::IntoIter: ExactSizeIterator,
    {
        let iter = bundles.into_iter();
        if iter.len() > MAX_BATCH_SPAWN {
            return Err(EcsError::BatchTooLarge);
        }
        Ok(iter.map(|bundle| self.spawn(bundle)).collect())
    }

    /// Despawns `entity`, firing `OnRemove<T>` for every component it holds
    /// just before the row is dropped. No-op on a dead or stale handle.
    pub fn despawn(&mut self, entity: EntityId) {
        self.assert_not_in_observer("despawn");
        let Some(location) = self.allocator.location(entity) else {
            return;
        };

        let metas = self.graph.get(location.archetype_id).component_metas();
        self.in_observer = true;
        for meta in &metas {
            let archetype = self.graph.get_mut(location.archetype_id);
            let ptr = archetype
                .get_column_mut(meta.type_id)
                .expect("meta came from this archetype's own columns")
                .get_ptr_mut(location.archetype_row);
            self.observers.dispatch(Trigger::OnRemove, meta.type_id, entity, ptr as *const u8);
        }
        self.in_observer = false;

        let archetype = self.graph.get_mut(location.archetype_id);
        let swapped = unsafe { archetype.remove_row(location.archetype_row) };
        if let Some(moved_entity) = swapped {
            self.allocator.set_location(
                moved_entity,
                EntityLocation {
                    archetype_id: location.archetype_id,
                    archetype_row: location.archetype_row,
                },
            );
        }
        self.allocator.deallocate(entity);
    }

    /// Despawns `entity` and every descendant reachable through `Children`,
    /// children first.
    pub fn despawn_recursive(&mut self, entity: EntityId) {
        for child in self.get_children(entity) {
            self.despawn_recursive(child);
        }
        self.despawn(entity);
    }

    // ---- component access ---------------------------------------------

    pub fn has_component<T: Component>(&self, entity: EntityId) -> bool {
        match self.allocator.location(entity) {
            Some(location) => self.graph.get(location.archetype_id).has_column(TypeId::of::<T>()),
            None => false,
        }
    }

    pub fn get_component<T: Component>(&self, entity: EntityId) -> Option<&T> {
        let location = self.allocator.location(entity)?;
        self.graph.get(location.archetype_id).get_column(TypeId::of::<T>())?.get::<T>(location.archetype_row)
    }

    /// Returns a write handle that marks the row's `changed` tick the
    /// moment it's dereferenced mutably. `None` if the entity is dead or
    /// doesn't have `T`.
    pub fn get_component_mut<T: Component>(&mut self, entity: EntityId) -> Option<Mut<'_, T>> {
        let location = self.allocator.location(entity)?;
        let tick = self.current_tick;
        let archetype = self.graph.get_mut(location.archetype_id);
        let column = archetype.get_column_mut(TypeId::of::<T>())? as *mut ComponentColumn;
        let value = unsafe { (*column).get_mut::<T>(location.archetype_row)? as *mut T };
        Some(Mut::from_raw(value, column, location.archetype_row, tick))
    }

    /// Adds `component` to `entity`, migrating it to the archetype reached
    /// by the cached add-edge if it doesn't already have `T`. If it does,
    /// overwrites the value in place, marks it changed, and fires
    /// `OnSet<T>` instead of `OnAdd<T>`. No-op on a dead entity.
    pub fn add_component<T: Component>(&mut self, entity: EntityId, component: T) -> Result<()> {
        self.assert_not_in_observer("add_component");
        let Some(location) = self.allocator.location(entity) else {
            return Ok(());
        };
        let type_id = TypeId::of::<T>();

        if self.graph.get(location.archetype_id).has_column(type_id) {
            let archetype = self.graph.get_mut(location.archetype_id);
            let column = archetype.get_column_mut(type_id).expect("just checked has_column");
            let ptr = column.get_ptr_mut(location.archetype_row);
            unsafe {
                std::ptr::drop_in_place(ptr as *mut T);
                std::ptr::write(ptr as *mut T, component);
            }
            column.mark_changed(location.archetype_row, self.current_tick);
            self.in_observer = true;
            self.observers.dispatch(Trigger::OnSet, type_id, entity, ptr as *const u8);
            self.in_observer = false;
            return Ok(());
        }

        let old_metas = self.graph.get(location.archetype_id).component_metas();
        let new_archetype_id = self.graph.add_edge(location.archetype_id, type_id, |dest| {
            for meta in &old_metas {
                dest.register_meta(*meta);
            }
            dest.register_component::<T>();
        });

        let new_row = self.migrate_row(entity, location.archetype_id, location.archetype_row, new_archetype_id);
        let new_ptr = {
            let dest = self.graph.get_mut(new_archetype_id);
            let ptr = dest.init_column_row(type_id, ComponentTicks::new(self.current_tick));
            unsafe { std::ptr::write(ptr as *mut T, component) };
            ptr
        };
        self.allocator.set_location(
            entity,
            EntityLocation {
                archetype_id: new_archetype_id,
                archetype_row: new_row,
            },
        );

        self.in_observer = true;
        self.observers.dispatch(Trigger::OnAdd, type_id, entity, new_ptr as *const u8);
        self.in_observer = false;
        Ok(())
    }

    /// Removes `T` from `entity`, firing `OnRemove<T>` first and migrating
    /// it to the archetype reached by the cached remove-edge. Returns the
    /// removed value, or `None` if the entity is dead or didn't have `T`.
    pub fn remove_component<T: Component>(&mut self, entity: EntityId) -> Result<Option<T>> {
        self.assert_not_in_observer("remove_component");
        let Some(location) = self.allocator.location(entity) else {
            return Ok(None);
        };
        let type_id = TypeId::of::<T>();
        if !self.graph.get(location.archetype_id).has_column(type_id) {
            return Ok(None);
        }

        let removed_ptr = self
            .graph
            .get_mut(location.archetype_id)
            .get_column_mut(type_id)
            .expect("just checked has_column")
            .get_ptr_mut(location.archetype_row);
        self.in_observer = true;
        self.observers.dispatch(Trigger::OnRemove, type_id, entity, removed_ptr as *const u8);
        self.in_observer = false;
        let removed_value = unsafe { std::ptr::read(removed_ptr as *const T) };

        let old_metas = self.graph.get(location.archetype_id).component_metas();
        let new_archetype_id = self.graph.remove_edge(location.archetype_id, type_id, |dest| {
            for meta in &old_metas {
                if meta.type_id != type_id {
                    dest.register_meta(*meta);
                }
            }
        });

        let new_row = self.migrate_row(entity, location.archetype_id, location.archetype_row, new_archetype_id);
        self.allocator.set_location(
            entity,
            EntityLocation {
                archetype_id: new_archetype_id,
                archetype_row: new_row,
            },
        );
        Ok(Some(removed_value))
    }

    /// Copies every column of `old_archetype[old_row]` that also exists in
    /// `new_archetype` into a freshly allocated row there, preserving each
    /// column's existing ticks, then swap-removes the old row without
    /// dropping anything (every transferred value's bytes were moved, and
    /// any value not present in the destination must already have been
    /// read out or dropped by the caller before this runs).
    fn migrate_row(&mut self, _entity: EntityId, old_archetype_id: usize, old_row: usize, new_archetype_id: usize) -> usize {
        let old_metas = self.graph.get(old_archetype_id).component_metas();
        let (old_archetype, new_archetype) = self.graph.get_pair_mut(old_archetype_id, new_archetype_id);

        let new_row = new_archetype.allocate_row(old_archetype.entities()[old_row]);
        for meta in &old_metas {
            if !new_archetype.has_column(meta.type_id) {
                continue;
            }
            let src_column = old_archetype.get_column_mut(meta.type_id).expect("meta came from this archetype");
            let src_ticks = src_column.ticks(old_row).expect("row within bounds");
            let src_ptr = src_column.get_ptr_mut(old_row) as *const u8;
            let dst_ptr = new_archetype.init_column_row(meta.type_id, src_ticks);
            unsafe { (meta.move_fn)(src_ptr, dst_ptr) };
        }

        let swapped = unsafe { old_archetype.remove_row_no_drop(old_row) };
        if let Some(moved_entity) = swapped {
            self.allocator.set_location(
                moved_entity,
                EntityLocation {
                    archetype_id: old_archetype_id,
                    archetype_row: old_row,
                },
            );
        }
        new_row
    }

    // ---- queries & systems ----------------------------------------------

    /// Queries with every row matching any change filter's existence check
    /// (no `last_run_tick` floor). Equivalent to `query_since(Tick::ZERO)`.
    pub fn query<'w, Q: QueryTerms<'w>>(&'w mut self) -> QueryIter<'w, Q> {
        self.query_since(Tick::ZERO)
    }

    /// Queries with change filters (`Added`/`Changed`/`AddedOrChanged`)
    /// evaluated against an explicit `last_run_tick`, for ad-hoc queries
    /// outside a registered system (which tracks its own).
    pub fn query_since<'w, Q: QueryTerms<'w>>(&'w mut self, last_run_tick: Tick) -> QueryIter<'w, Q> {
        let tick = self.current_tick;
        QueryIter::new(&mut self.graph, tick, last_run_tick)
    }

    pub fn add_system<Q, F>(&mut self, mut descriptor: SystemDescriptor<Q, F>) -> SystemId
    where
        Q: for<'a> QueryTerms<'a> + Send + Sync + 'static,
        F: for<'a> FnMut(<Q as QueryTerms<'a>>::Item) + Send + Sync + 'static,
    {
        let id = SystemId(self.systems.len() as u32);
        descriptor.set_id(id);
        self.systems.push(Box::new(descriptor));
        id
    }

    pub fn set_system_enabled(&mut self, id: SystemId, enabled: bool) -> bool {
        for system in &mut self.systems {
            if system.id() == id {
                system.set_enabled(enabled);
                return true;
            }
        }
        false
    }

    /// Advances the world tick, then runs every enabled system once, in
    /// registration order, on the main thread.
    pub fn update(&mut self) {
        let tick_now = self.increment_tick();
        let mut systems = std::mem::take(&mut self.systems);
        for system in systems.iter_mut().filter(|s| s.enabled()) {
            system.run(&mut self.graph, tick_now);
        }
        self.systems = systems;
    }

    // ---- resources ---------------------------------------------------

    pub fn insert_resource<T: Send + Sync + 'static>(&mut self, value: T) {
        self.resources.insert(value);
    }

    pub fn resource<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.resources.get::<T>()
    }

    pub fn resource_mut<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.resources.get_mut::<T>()
    }

    pub fn has_resource<T: Send + Sync + 'static>(&self) -> bool {
        self.resources.contains::<T>()
    }

    pub fn remove_resource<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.resources.remove::<T>()
    }

    // ---- observers -----------------------------------------------------

    pub fn on_add<T: Component>(&mut self, name: &str, f: impl FnMut(EntityId, &T) + Send + Sync + 'static) -> ObserverId {
        self.observers.register_with_component::<T>(Trigger::OnAdd, name, f)
    }

    pub fn on_remove<T: Component>(&mut self, name: &str, f: impl FnMut(EntityId, &T) + Send + Sync + 'static) -> ObserverId {
        self.observers.register_with_component::<T>(Trigger::OnRemove, name, f)
    }

    pub fn on_set<T: Component>(&mut self, name: &str, f: impl FnMut(EntityId, &T) + Send + Sync + 'static) -> ObserverId {
        self.observers.register_with_component::<T>(Trigger::OnSet, name, f)
    }

    pub fn set_observer_enabled(&mut self, id: ObserverId, enabled: bool) -> bool {
        self.observers.set_enabled(id, enabled)
    }

    pub fn unregister_observer(&mut self, id: ObserverId) -> bool {
        self.observers.unregister(id)
    }

    // ---- hierarchy -----------------------------------------------------

    /// Attaches `child` under `parent`, detaching it from any previous
    /// parent first. No-op if `child == parent` or either is dead.
    pub fn set_parent(&mut self, child: EntityId, parent: EntityId) {
        if child == parent || !self.is_alive(child) || !self.is_alive(parent) {
            return;
        }
        if let Some(old_parent) = self.parent_of(child) {
            if old_parent == parent {
                return;
            }
            if let Some(mut siblings) = self.get_component_mut::<Children>(old_parent) {
                siblings.remove_child(child);
            }
        }
        let _ = self.add_component(child, Parent::new(parent));
        match self.get_component_mut::<Children>(parent) {
            Some(mut children) => children.add_child(child),
            None => {
                let mut children = Children::new();
                children.add_child(child);
                let _ = self.add_component(parent, children);
            }
        }
    }

    pub fn parent_of(&self, child: EntityId) -> Option<EntityId> {
        self.get_component::<Parent>(child).map(|p| p.entity_id())
    }

    pub fn has_parent(&self, child: EntityId) -> bool {
        self.parent_of(child).is_some()
    }

    pub fn get_children(&self, entity: EntityId) -> Vec<EntityId> {
        self.get_component::<Children>(entity).map(|c| c.get_children()).unwrap_or_default()
    }

    /// Breadth-first walk of every descendant of `entity`, `entity` itself
    /// excluded.
    pub fn get_descendants(&self, entity: EntityId) -> Vec<EntityId> {
        let mut result = Vec::new();
        let mut queue = self.get_children(entity);
        while let Some(next) = queue.pop() {
            result.push(next);
            queue.extend(self.get_children(next));
        }
        result
    }

    /// Depth-first walk of `entity` and every descendant, calling `visit`
    /// with each in pre-order.
    pub fn traverse_hierarchy(&self, entity: EntityId, visit: &mut impl FnMut(EntityId)) {
        visit(entity);
        for child in self.get_children(entity) {
            self.traverse_hierarchy(child, visit);
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Read, Write};

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Pos {
        x: f32,
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Vel {
        dx: f32,
    }

    #[test]
    fn spawn_and_despawn_round_trip() {
        let mut world = World::new();
        let e = world.spawn((Pos { x: 1.0 },));
        assert!(world.is_alive(e));
        assert_eq!(world.entity_count(), 1);
        world.despawn(e);
        assert!(!world.is_alive(e));
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn despawn_is_noop_on_dead_entity() {
        let mut world = World::new();
        let e = world.spawn((Pos { x: 1.0 },));
        world.despawn(e);
        world.despawn(e);
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn add_component_migrates_to_new_archetype_and_preserves_existing_data() {
        let mut world = World::new();
        let e = world.spawn((Pos { x: 5.0 },));
        world.add_component(e, Vel { dx: 2.0 }).unwrap();
        assert_eq!(world.get_component::<Pos>(e).unwrap().x, 5.0);
        assert_eq!(world.get_component::<Vel>(e).unwrap().dx, 2.0);
        assert_eq!(world.archetype_count(), 3); // empty, {Pos}, {Pos,Vel}
    }

    #[test]
    fn add_component_on_existing_type_overwrites_and_marks_changed() {
        let mut world = World::new();
        let e = world.spawn((Pos { x: 1.0 },));
        world.update();
        world.add_component(e, Pos { x: 2.0 }).unwrap();
        assert_eq!(world.get_component::<Pos>(e).unwrap().x, 2.0);
    }

    #[test]
    fn remove_component_returns_value_and_migrates() {
        let mut world = World::new();
        let e = world.spawn((Pos { x: 1.0 }, Vel { dx: 3.0 }));
        let removed = world.remove_component::<Vel>(e).unwrap();
        assert_eq!(removed, Some(Vel { dx: 3.0 }));
        assert!(!world.has_component::<Vel>(e));
        assert!(world.has_component::<Pos>(e));
    }

    #[test]
    fn remove_component_on_missing_type_is_none() {
        let mut world = World::new();
        let e = world.spawn((Pos { x: 1.0 },));
        assert_eq!(world.remove_component::<Vel>(e).unwrap(), None);
    }

    #[test]
    fn migration_preserves_added_tick_of_untouched_component() {
        let mut world = World::new();
        let e = world.spawn((Pos { x: 1.0 },));
        let spawn_tick = world.current_tick();
        world.update();
        world.update();
        world.add_component(e, Vel { dx: 1.0 }).unwrap();

        let still_added_since_spawn = {
            let mut saw = false;
            for (pos,) in world.query::<(Read<Pos>,)>() {
                let _ = pos;
                saw = true;
            }
            saw
        };
        assert!(still_added_since_spawn);
        assert!(world.current_tick().is_newer_than(spawn_tick));
    }

    #[test]
    fn observers_fire_on_add_remove_and_set() {
        use std::sync::{Arc, Mutex};
        let mut world = World::new();
        let added = Arc::new(Mutex::new(0));
        let removed = Arc::new(Mutex::new(0));
        let set = Arc::new(Mutex::new(0));
        let (a, r, s) = (added.clone(), removed.clone(), set.clone());
        world.on_add::<Pos>("a", move |_, _| *a.lock().unwrap() += 1);
        world.on_remove::<Pos>("r", move |_, _| *r.lock().unwrap() += 1);
        world.on_set::<Pos>("s", move |_, _| *s.lock().unwrap() += 1);

        let e = world.spawn((Pos { x: 0.0 },));
        assert_eq!(*added.lock().unwrap(), 1);
        world.add_component(e, Pos { x: 1.0 }).unwrap();
        assert_eq!(*set.lock().unwrap(), 1);
        world.despawn(e);
        assert_eq!(*removed.lock().unwrap(), 1);
    }

    #[test]
    fn set_parent_keeps_children_and_parent_in_sync() {
        let mut world = World::new();
        let parent = world.spawn((Pos { x: 0.0 },));
        let child = world.spawn((Pos { x: 1.0 },));
        world.set_parent(child, parent);
        assert_eq!(world.parent_of(child), Some(parent));
        assert_eq!(world.get_children(parent), vec![child]);
    }

    #[test]
    fn despawn_recursive_removes_whole_subtree() {
        let mut world = World::new();
        let root = world.spawn((Pos { x: 0.0 },));
        let child = world.spawn((Pos { x: 1.0 },));
        let grandchild = world.spawn((Pos { x: 2.0 },));
        world.set_parent(child, root);
        world.set_parent(grandchild, child);

        world.despawn_recursive(root);
        assert!(!world.is_alive(root));
        assert!(!world.is_alive(child));
        assert!(!world.is_alive(grandchild));
    }

    #[test]
    fn resources_store_one_value_per_type() {
        let mut world = World::new();
        world.insert_resource(42i32);
        assert_eq!(*world.resource::<i32>().unwrap(), 42);
        world.insert_resource(7i32);
        assert_eq!(*world.resource::<i32>().unwrap(), 7);
        assert_eq!(world.remove_resource::<i32>(), Some(7));
        assert!(!world.has_resource::<i32>());
    }

    #[test]
    fn write_query_on_migrated_entity_still_marks_changed() {
        let mut world = World::new();
        let e = world.spawn((Pos { x: 0.0 },));
        world.add_component(e, Vel { dx: 0.0 }).unwrap();
        for (mut p,) in world.query::<(Write<Pos>,)>() {
            p.x = 10.0;
        }
        assert_eq!(world.get_component::<Pos>(e).unwrap().x, 10.0);
    }

    #[test]
    fn spawn_batch_creates_one_entity_per_bundle() {
        let mut world = World::new();
        let entities = world.spawn_batch(vec![(Pos { x: 0.0 },), (Pos { x: 1.0 },), (Pos { x: 2.0 },)]).unwrap();
        assert_eq!(entities.len(), 3);
        assert_eq!(world.entity_count(), 3);
    }

    #[test]
    fn get_component_on_dead_entity_is_none() {
        let mut world = World::new();
        let e = world.spawn((Pos { x: 1.0 },));
        world.despawn(e);
        assert!(world.get_component::<Pos>(e).is_none());
    }

    #[test]
    fn change_filter_respects_explicit_last_run_tick() {
        use crate::query::Changed;
        let mut world = World::new();
        while world.current_tick().0 < 5 {
            world.increment_tick();
        }
        world.spawn((Pos { x: 1.0 },));
        world.spawn((Pos { x: 2.0 },));

        let recent = world.query_since::<(Read<Pos>, Changed<Pos>)>(Tick::new(3)).count();
        assert_eq!(recent, 2);

        let stale = world.query_since::<(Read<Pos>, Changed<Pos>)>(Tick::new(10)).count();
        assert_eq!(stale, 0);
    }

    #[test]
    fn add_then_remove_returns_to_original_archetype_and_drops_once() {
        use std::sync::{Arc, Mutex};

        struct Counted(Arc<Mutex<u32>>);
        impl Drop for Counted {
            fn drop(&mut self) {
                *self.0.lock().unwrap() += 1;
            }
        }

        let mut world = World::new();
        let drops = Arc::new(Mutex::new(0));
        let e = world.spawn((Pos { x: 1.0 },));
        let starting_archetype = world.allocator.location(e).unwrap().archetype_id;

        world.add_component(e, Counted(drops.clone())).unwrap();
        world.remove_component::<Counted>(e).unwrap();

        assert_eq!(world.allocator.location(e).unwrap().archetype_id, starting_archetype);
        assert_eq!(*drops.lock().unwrap(), 1);
    }
}
