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

//! Query DSL. A query is a tuple of terms (`Read<T>`, `Write<T>`,
//! `Added<T>`, `Changed<T>`, `AddedOrChanged<T>`, `With<T>`, `Without<T>`,
//! `Entity`) that together select matching archetypes and, per row, either
//! fetch a value or filter on its change ticks.
//!
//! Iteration walks one archetype at a time. Within an archetype, each term
//! re-borrows the archetype through a raw pointer to get its own column
//! state; this is sound because distinct component types never alias the
//! same column, and the iterator holds the only live `&mut ArchetypeGraph`
//! for its whole lifetime, so no other code can mutate storage underneath it.

use std::any::TypeId;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use smallvec::SmallVec;

use crate::archetype::{Archetype, ComponentColumn};
use crate::component::Component;
use crate::entity::EntityId;
use crate::graph::ArchetypeGraph;
use crate::tick::Tick;

/// Write-access smart pointer. Marks the owning row's `changed` tick the
/// moment the value is mutated through [`DerefMut`]; reading through
/// [`Deref`] never marks anything. This is the only path by which a write
/// advances change detection — raw column pointers are never exposed to
/// query callers.
pub struct Mut<'w, T> {
    value: *mut T,
    column: *mut ComponentColumn,
    row: usize,
    tick: Tick,
    _marker: PhantomData<&'w mut T>,
}

impl<'w, T> Mut<'w, T> {
    /// Builds a `Mut` from a raw value/column pair. Used by `World` for
    /// `get_component_mut`, outside of query iteration.
    pub(crate) fn from_raw(value: *mut T, column: *mut ComponentColumn, row: usize, tick: Tick) -> Self {
        Self {
            value,
            column,
            row,
            tick,
            _marker: PhantomData,
        }
    }
}

impl<'w, T> Deref for Mut<'w, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.value }
    }
}

impl<'w, T> DerefMut for Mut<'w, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe {
            (*self.column).mark_changed(self.row, self.tick);
            &mut *self.value
        }
    }
}

/// Read-only `Read<T>` term.
pub struct Read<T>(PhantomData<T>);
/// Mutable `Write<T>` term; yields [`Mut<T>`].
pub struct Write<T>(PhantomData<T>);
/// Change filter: row matches iff `T` was added since the query's
/// `last_run_tick`.
pub struct Added<T>(PhantomData<T>);
/// Change filter: row matches iff `T` was changed since `last_run_tick`.
pub struct Changed<T>(PhantomData<T>);
/// Change filter: row matches iff `T` was added or changed since `last_run_tick`.
pub struct AddedOrChanged<T>(PhantomData<T>);
/// Archetype filter: requires `T` present, yields nothing.
pub struct With<T>(PhantomData<T>);
/// Archetype filter: requires `T` absent, yields nothing.
pub struct Without<T>(PhantomData<T>);
/// Fetches the current row's entity handle.
pub struct Entity;

type TypeVec = SmallVec<[TypeId; 8]>;

/// One element of a query tuple. Implemented for every term type and, via
/// macro, for tuples of terms up to four deep.
///
/// # Safety
/// Implementors of `prepare`/`fetch` dereference the raw `*mut Archetype`
/// they're given; callers must guarantee it is valid and not concurrently
/// aliased for the state's lifetime.
pub unsafe trait QueryTerms<'w> {
    type Item;
    type State;

    fn required_types(out: &mut TypeVec);
    fn excluded_types(out: &mut TypeVec);

    fn matches_archetype(archetype: &Archetype) -> bool {
        let mut required = TypeVec::new();
        let mut excluded = TypeVec::new();
        Self::required_types(&mut required);
        Self::excluded_types(&mut excluded);
        required.iter().all(|t| archetype.has_column(*t)) && excluded.iter().all(|t| !archetype.has_column(*t))
    }

    unsafe fn prepare(archetype: *mut Archetype) -> Self::State;
    fn row_matches(state: &Self::State, row: usize, last_run_tick: Tick) -> bool;
    unsafe fn fetch(state: &mut Self::State, row: usize, current_tick: Tick) -> Self::Item;
}

unsafe impl<'w, T: Component> QueryTerms<'w> for Read<T> {
    type Item = &'w T;
    type State = *const ComponentColumn;

    fn required_types(out: &mut TypeVec) {
        out.push(TypeId::of::<T>());
    }
    fn excluded_types(_out: &mut TypeVec) {}

    unsafe fn prepare(archetype: *mut Archetype) -> Self::State {
        (*archetype).get_column(TypeId::of::<T>()).expect("column present, checked by matches_archetype") as *const ComponentColumn
    }

    fn row_matches(_state: &Self::State, _row: usize, _last_run_tick: Tick) -> bool {
        true
    }

    unsafe fn fetch(state: &mut Self::State, row: usize, _current_tick: Tick) -> Self::Item {
        let column = &**state;
        std::mem::transmute::<&T, &'w T>(column.get::<T>(row).expect("row within column bounds"))
    }
}

unsafe impl<'w, T: Component> QueryTerms<'w> for Write<T> {
    type Item = Mut<'w, T>;
    type State = *mut ComponentColumn;

    fn required_types(out: &mut TypeVec) {
        out.push(TypeId::of::<T>());
    }
    fn excluded_types(_out: &mut TypeVec) {}

    unsafe fn prepare(archetype: *mut Archetype) -> Self::State {
        (*archetype).get_column_mut(TypeId::of::<T>()).expect("column present, checked by matches_archetype") as *mut ComponentColumn
    }

    fn row_matches(_state: &Self::State, _row: usize, _last_run_tick: Tick) -> bool {
        true
    }

    unsafe fn fetch(state: &mut Self::State, row: usize, current_tick: Tick) -> Self::Item {
        let column = &mut **state;
        let value = column.get_mut::<T>(row).expect("row within column bounds") as *mut T;
        Mut {
            value,
            column: *state,
            row,
            tick: current_tick,
            _marker: PhantomData,
        }
    }
}

macro_rules! impl_change_filter {
    ($name:ident, $predicate:ident) => {
        unsafe impl<'w, T: Component> QueryTerms<'w> for $name<T> {
            type Item = ();
            type State = *const ComponentColumn;

            fn required_types(out: &mut TypeVec) {
                out.push(TypeId::of::<T>());
            }
            fn excluded_types(_out: &mut TypeVec) {}

            unsafe fn prepare(archetype: *mut Archetype) -> Self::State {
                (*archetype).get_column(TypeId::of::<T>()).expect("column present, checked by matches_archetype") as *const ComponentColumn
            }

            fn row_matches(state: &Self::State, row: usize, last_run_tick: Tick) -> bool {
                let column = unsafe { &**state };
                match column.ticks(row) {
                    Some(ticks) => ticks.$predicate(last_run_tick),
                    None => false,
                }
            }

            unsafe fn fetch(_state: &mut Self::State, _row: usize, _current_tick: Tick) -> Self::Item {}
        }
    };
}

impl_change_filter!(Added, is_added);
impl_change_filter!(Changed, is_changed);

unsafe impl<'w, T: Component> QueryTerms<'w> for AddedOrChanged<T> {
    type Item = ();
    type State = *const ComponentColumn;

    fn required_types(out: &mut TypeVec) {
        out.push(TypeId::of::<T>());
    }
    fn excluded_types(_out: &mut TypeVec) {}

    unsafe fn prepare(archetype: *mut Archetype) -> Self::State {
        (*archetype).get_column(TypeId::of::<T>()).expect("column present, checked by matches_archetype") as *const ComponentColumn
    }

    fn row_matches(state: &Self::State, row: usize, last_run_tick: Tick) -> bool {
        let column = unsafe { &**state };
        match column.ticks(row) {
            Some(ticks) => ticks.is_added(last_run_tick) || ticks.is_changed(last_run_tick),
            None => false,
        }
    }

    unsafe fn fetch(_state: &mut Self::State, _row: usize, _current_tick: Tick) -> Self::Item {}
}

unsafe impl<'w, T: Component> QueryTerms<'w> for With<T> {
    type Item = ();
    type State = ();

    fn required_types(out: &mut TypeVec) {
        out.push(TypeId::of::<T>());
    }
    fn excluded_types(_out: &mut TypeVec) {}

    unsafe fn prepare(_archetype: *mut Archetype) -> Self::State {}
    fn row_matches(_state: &Self::State, _row: usize, _last_run_tick: Tick) -> bool {
        true
    }
    unsafe fn fetch(_state: &mut Self::State, _row: usize, _current_tick: Tick) -> Self::Item {}
}

unsafe impl<'w, T: Component> QueryTerms<'w> for Without<T> {
    type Item = ();
    type State = ();

    fn required_types(_out: &mut TypeVec) {}
    fn excluded_types(out: &mut TypeVec) {
        out.push(TypeId::of::<T>());
    }

    unsafe fn prepare(_archetype: *mut Archetype) -> Self::State {}
    fn row_matches(_state: &Self::State, _row: usize, _last_run_tick: Tick) -> bool {
        true
    }
    unsafe fn fetch(_state: &mut Self::State, _row: usize, _current_tick: Tick) -> Self::Item {}
}

unsafe impl<'w> QueryTerms<'w> for Entity {
    type Item = EntityId;
    type State = *const EntityId;

    fn required_types(_out: &mut TypeVec) {}
    fn excluded_types(_out: &mut TypeVec) {}

    unsafe fn prepare(archetype: *mut Archetype) -> Self::State {
        (*archetype).entities().as_ptr()
    }

    fn row_matches(_state: &Self::State, _row: usize, _last_run_tick: Tick) -> bool {
        true
    }

    unsafe fn fetch(state: &mut Self::State, row: usize, _current_tick: Tick) -> Self::Item {
        *state.add(row)
    }
}

macro_rules! impl_query_terms_tuple {
    ($($T:ident),+) => {
        unsafe impl<'w, $($T: QueryTerms<'w>),+> QueryTerms<'w> for ($($T,)+) {
            type Item = ($($T::Item,)+);
            type State = ($($T::State,)+);

            fn required_types(out: &mut TypeVec) {
                $($T::required_types(out);)+
            }
            fn excluded_types(out: &mut TypeVec) {
                $($T::excluded_types(out);)+
            }

            unsafe fn prepare(archetype: *mut Archetype) -> Self::State {
                ($($T::prepare(archetype),)+)
            }

            #[allow(non_snake_case)]
            fn row_matches(state: &Self::State, row: usize, last_run_tick: Tick) -> bool {
                let ($($T,)+) = state;
                $($T::row_matches($T, row, last_run_tick))&&+
            }

            #[allow(non_snake_case)]
            unsafe fn fetch(state: &mut Self::State, row: usize, current_tick: Tick) -> Self::Item {
                let ($($T,)+) = state;
                ($($T::fetch($T, row, current_tick),)+)
            }
        }
    };
}

impl_query_terms_tuple!(A);
impl_query_terms_tuple!(A, B);
impl_query_terms_tuple!(A, B, C);
impl_query_terms_tuple!(A, B, C, D);

/// Computes the candidate archetype id list for `Q` by intersecting the
/// component index on the cheapest required type, falling back to a full
/// scan when `Q` has no required types (e.g. a bare `Entity` query).
fn candidate_archetypes<'w, Q: QueryTerms<'w>>(graph: &ArchetypeGraph) -> Vec<usize> {
    let mut required = TypeVec::new();
    Q::required_types(&mut required);

    let base: Vec<usize> = match required.iter().min_by_key(|t| graph.archetypes_with_component(**t).len()) {
        Some(smallest) => graph.archetypes_with_component(*smallest).to_vec(),
        None => graph.iter().map(|(id, _)| id).collect(),
    };

    base.into_iter().filter(|&id| Q::matches_archetype(graph.get(id))).collect()
}

/// Lazy iterator over every matching row of every matching archetype.
pub struct QueryIter<'w, Q: QueryTerms<'w>> {
    graph: &'w mut ArchetypeGraph,
    archetype_ids: Vec<usize>,
    next_archetype: usize,
    current: Option<(Q::State, usize, usize)>,
    current_tick: Tick,
    last_run_tick: Tick,
}

impl<'w, Q: QueryTerms<'w>> QueryIter<'w, Q> {
    pub(crate) fn new(graph: &'w mut ArchetypeGraph, current_tick: Tick, last_run_tick: Tick) -> Self {
        let archetype_ids = candidate_archetypes::<Q>(graph);
        Self::with_archetypes(graph, archetype_ids, current_tick, last_run_tick)
    }

    /// Builds the iterator from an already-known candidate list, skipping
    /// the component-index scan `new` would otherwise do. Used by
    /// [`QueryState::update`]'s cached archetype list.
    pub(crate) fn with_archetypes(
        graph: &'w mut ArchetypeGraph,
        archetype_ids: Vec<usize>,
        current_tick: Tick,
        last_run_tick: Tick,
    ) -> Self {
        Self {
            graph,
            archetype_ids,
            next_archetype: 0,
            current: None,
            current_tick,
            last_run_tick,
        }
    }

    fn advance_archetype(&mut self) -> bool {
        while self.next_archetype < self.archetype_ids.len() {
            let id = self.archetype_ids[self.next_archetype];
            self.next_archetype += 1;
            let archetype = self.graph.get_mut(id);
            let len = archetype.len();
            if len == 0 {
                continue;
            }
            let arch_ptr: *mut Archetype = archetype;
            let state = unsafe { Q::prepare(arch_ptr) };
            self.current = Some((state, 0, len));
            return true;
        }
        false
    }
}

impl<'w, Q: QueryTerms<'w>> Iterator for QueryIter<'w, Q> {
    type Item = Q::Item;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current.is_none() && !self.advance_archetype() {
                return None;
            }
            let (state, row, len) = self.current.as_mut().unwrap();
            while *row < *len {
                let r = *row;
                *row += 1;
                if Q::row_matches(state, r, self.last_run_tick) {
                    return Some(unsafe { Q::fetch(state, r, self.current_tick) });
                }
            }
            self.current = None;
        }
    }
}

/// Persistent, incrementally-updated archetype list for a query shape,
/// owned by a [`crate::system::SystemDescriptor`] so repeated runs don't
/// recompute candidate archetypes from scratch every tick.
pub struct QueryState<Q> {
    seen_archetype_count: usize,
    cached: Vec<usize>,
    _marker: PhantomData<Q>,
}

impl<Q> Default for QueryState<Q> {
    fn default() -> Self {
        Self {
            seen_archetype_count: 0,
            cached: Vec::new(),
            _marker: PhantomData,
        }
    }
}

impl<'w, Q: QueryTerms<'w>> QueryState<Q> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rescans only the archetypes created since the last call.
    pub fn update(&mut self, graph: &ArchetypeGraph) {
        if graph.len() <= self.seen_archetype_count {
            return;
        }
        for (id, archetype) in graph.iter().skip(self.seen_archetype_count) {
            if Q::matches_archetype(archetype) {
                self.cached.push(id);
            }
        }
        self.seen_archetype_count = graph.len();
    }

    pub fn matching_archetypes(&self) -> &[usize] {
        &self.cached
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::World;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Pos {
        x: f32,
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Vel {
        dx: f32,
    }

    #[test]
    fn read_query_visits_every_matching_entity() {
        let mut world = World::new();
        world.spawn((Pos { x: 1.0 },));
        world.spawn((Pos { x: 2.0 }, Vel { dx: 0.5 }));
        world.spawn((Vel { dx: 1.0 },));

        let values: Vec<f32> = world.query::<(Read<Pos>,)>().map(|(p,)| p.x).collect();
        let mut sorted = values;
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(sorted, vec![1.0, 2.0]);
    }

    #[test]
    fn write_query_marks_changed_on_deref_mut() {
        let mut world = World::new();
        let e = world.spawn((Pos { x: 0.0 },));
        for (mut p,) in world.query::<(Write<Pos>,)>() {
            p.x = 9.0;
        }
        assert_eq!(world.get_component::<Pos>(e).unwrap().x, 9.0);
    }

    #[test]
    fn entity_term_yields_the_row_owner() {
        let mut world = World::new();
        let e = world.spawn((Pos { x: 0.0 },));
        let found: Vec<EntityId> = world.query::<(Entity, Read<Pos>)>().map(|(id, _)| id).collect();
        assert_eq!(found, vec![e]);
    }

    #[test]
    fn without_excludes_archetypes_holding_the_type() {
        let mut world = World::new();
        world.spawn((Pos { x: 1.0 }, Vel { dx: 1.0 }));
        world.spawn((Pos { x: 2.0 },));
        let count = world.query::<(Read<Pos>, Without<Vel>)>().count();
        assert_eq!(count, 1);
    }
}
