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

//! Named systems bound to a query shape. `World::update` runs every enabled
//! system sequentially, in registration order, on a single thread.

use std::marker::PhantomData;

use crate::graph::ArchetypeGraph;
use crate::query::{QueryIter, QueryState, QueryTerms};
use crate::tick::Tick;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SystemId(pub u32);

/// Builder for a system over query shape `Q`. `System::new(name).each(f)`
/// registers `f` to run once per matching row on every `World::update`.
pub struct System<Q> {
    name: &'static str,
    _marker: PhantomData<Q>,
}

impl<Q> System<Q> {
    pub fn new(name: &'static str) -> Self {
        Self { name, _marker: PhantomData }
    }

    pub fn each<F>(self, callback: F) -> SystemDescriptor<Q, F>
    where
        Q: for<'a> QueryTerms<'a>,
        F: for<'a> FnMut(<Q as QueryTerms<'a>>::Item) + Send + Sync + 'static,
    {
        SystemDescriptor {
            id: SystemId(0),
            name: self.name,
            enabled: true,
            last_run_tick: Tick::ZERO,
            callback,
            cached_query: QueryState::default(),
            _marker: PhantomData,
        }
    }
}

/// A system descriptor ready to be registered with `World::add_system`.
pub struct SystemDescriptor<Q, F> {
    id: SystemId,
    name: &'static str,
    enabled: bool,
    last_run_tick: Tick,
    callback: F,
    cached_query: QueryState<Q>,
    _marker: PhantomData<Q>,
}

/// Type-erased handle `World` stores and drives each tick.
pub(crate) trait RunnableSystem: Send + Sync {
    fn id(&self) -> SystemId;
    fn set_id(&mut self, id: SystemId);
    fn name(&self) -> &'static str;
    fn enabled(&self) -> bool;
    fn set_enabled(&mut self, enabled: bool);
    fn run(&mut self, graph: &mut ArchetypeGraph, tick_now: Tick);
}

impl<Q, F> RunnableSystem for SystemDescriptor<Q, F>
where
    Q: for<'a> QueryTerms<'a> + Send + Sync + 'static,
    F: for<'a> FnMut(<Q as QueryTerms<'a>>::Item) + Send + Sync,
{
    fn id(&self) -> SystemId {
        self.id
    }

    fn set_id(&mut self, id: SystemId) {
        self.id = id;
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn run(&mut self, graph: &mut ArchetypeGraph, tick_now: Tick) {
        let last_run_tick = self.last_run_tick;
        self.cached_query.update(graph);
        let archetype_ids = self.cached_query.matching_archetypes().to_vec();
        let iter = QueryIter::<Q>::with_archetypes(graph, archetype_ids, tick_now, last_run_tick);
        for item in iter {
            (self.callback)(item);
        }
        self.last_run_tick = tick_now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Read;
    use crate::world::World;

    #[derive(Debug, Clone, Copy)]
    struct Pos {
        x: f32,
    }

    #[test]
    fn system_visits_matching_rows_each_update() {
        let mut world = World::new();
        world.spawn((Pos { x: 1.0 },));
        world.spawn((Pos { x: 2.0 },));

        let seen = std::sync::Arc::new(std::sync::Mutex::new(0usize));
        let seen_clone = seen.clone();
        world.add_system(System::<(Read<Pos>,)>::new("count_positions").each(move |_| {
            *seen_clone.lock().unwrap() += 1;
        }));

        world.update();
        assert_eq!(*seen.lock().unwrap(), 2);
    }

    #[test]
    fn disabled_system_is_skipped() {
        let mut world = World::new();
        world.spawn((Pos { x: 1.0 },));

        let seen = std::sync::Arc::new(std::sync::Mutex::new(0usize));
        let seen_clone = seen.clone();
        let id = world.add_system(System::<(Read<Pos>,)>::new("noop").each(move |_| {
            *seen_clone.lock().unwrap() += 1;
        }));
        world.set_system_enabled(id, false);
        world.update();
        assert_eq!(*seen.lock().unwrap(), 0);
    }
}
