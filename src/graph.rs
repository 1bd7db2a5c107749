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

//! Archetype graph: canonicalized archetype lookup plus cached add/remove
//! edges, so repeated structural changes to the same component set reuse the
//! previously computed destination archetype instead of re-sorting a
//! signature and re-scanning the archetype table.

use std::any::TypeId;

use ahash::AHashMap;

use crate::archetype::{canonical_signature, Archetype, ArchetypeSignature};

/// One directed edge in the archetype graph: from some archetype, adding or
/// removing a specific component type leads to another archetype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct EdgeKey {
    from: usize,
    component: TypeId,
    adding: bool,
}

/// Owns every archetype in the world plus the cached transition edges
/// between them, keyed by canonical signature for O(1) lookup-or-create.
pub struct ArchetypeGraph {
    archetypes: Vec<Archetype>,
    by_signature: AHashMap<ArchetypeSignature, usize>,
    edges: AHashMap<EdgeKey, usize>,
    /// Reverse index: component type -> archetypes that contain it.
    component_index: AHashMap<TypeId, Vec<usize>>,
}

/// Archetype creation is capped to guard against runaway structural churn
/// (e.g. a bug that spawns a distinct component set every frame).
const MAX_ARCHETYPES: usize = 10_000;

/// Snapshot returned by [`ArchetypeGraph::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GraphStats {
    pub archetype_count: usize,
    pub cached_edge_count: usize,
    pub indexed_component_count: usize,
    pub live_entity_count: usize,
}

impl ArchetypeGraph {
    pub fn new() -> Self {
        let mut graph = Self {
            archetypes: Vec::with_capacity(64),
            by_signature: AHashMap::new(),
            edges: AHashMap::new(),
            component_index: AHashMap::new(),
        };
        let empty_id = graph.get_or_create(&[]);
        debug_assert_eq!(empty_id, 0);
        graph
    }

    pub fn empty_archetype_id(&self) -> usize {
        0
    }

    pub fn get(&self, id: usize) -> &Archetype {
        &self.archetypes[id]
    }

    pub fn get_mut(&mut self, id: usize) -> &mut Archetype {
        &mut self.archetypes[id]
    }

    /// Returns mutable references to two distinct archetypes at once.
    /// Panics if `a == b`; callers must special-case that themselves.
    pub fn get_pair_mut(&mut self, a: usize, b: usize) -> (&mut Archetype, &mut Archetype) {
        assert_ne!(a, b, "cannot borrow the same archetype twice");
        if a < b {
            let (left, right) = self.archetypes.split_at_mut(b);
            (&mut left[a], &mut right[0])
        } else {
            let (left, right) = self.archetypes.split_at_mut(a);
            (&mut right[0], &mut left[b])
        }
    }

    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Archetype)> {
        self.archetypes.iter().enumerate()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Archetype> {
        self.archetypes.iter_mut()
    }

    pub fn archetypes_with_component(&self, type_id: TypeId) -> &[usize] {
        self.component_index
            .get(&type_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Point-in-time read of graph shape, for diagnostics rather than any
    /// query-execution decision: how many archetypes and cached edges exist,
    /// and how many distinct component types the reverse index covers.
    pub fn stats(&self) -> GraphStats {
        GraphStats {
            archetype_count: self.archetypes.len(),
            cached_edge_count: self.edges.len(),
            indexed_component_count: self.component_index.len(),
            live_entity_count: self.archetypes.iter().map(Archetype::len).sum(),
        }
    }

    /// Finds (or creates) the archetype whose signature is the canonicalized
    /// form of `types`. `register` is called with the fresh archetype so the
    /// caller can register component metadata/columns before it's used.
    pub fn get_or_create_with(
        &mut self,
        types: &[TypeId],
        register: impl FnOnce(&mut Archetype),
    ) -> usize {
        let sig = canonical_signature(types);
        if let Some(&id) = self.by_signature.get(&sig) {
            return id;
        }
        assert!(
            self.archetypes.len() < MAX_ARCHETYPES,
            "archetype table exceeded {} entries; this usually indicates runaway structural churn",
            MAX_ARCHETYPES
        );
        let id = self.archetypes.len();
        let mut archetype = Archetype::new(sig.clone());
        register(&mut archetype);
        archetype.mark_columns_initialized();
        self.archetypes.push(archetype);
        self.by_signature.insert(sig.clone(), id);
        for type_id in &sig {
            self.component_index.entry(*type_id).or_default().push(id);
        }
        id
    }

    pub fn get_or_create(&mut self, types: &[TypeId]) -> usize {
        self.get_or_create_with(types, |_| {})
    }

    /// Looks up (or computes and caches) the archetype reached by adding
    /// `component` to the archetype at `from`. `register` runs only on a
    /// cache miss, when a new archetype must be created.
    pub fn add_edge(
        &mut self,
        from: usize,
        component: TypeId,
        register: impl FnOnce(&mut Archetype),
    ) -> usize {
        let key = EdgeKey {
            from,
            component,
            adding: true,
        };
        if let Some(&to) = self.edges.get(&key) {
            return to;
        }
        let mut sig = self.archetypes[from].signature().clone();
        if !sig.contains(&component) {
            sig.push(component);
        }
        let to = self.get_or_create_with(&sig, register);
        self.edges.insert(key, to);
        to
    }

    /// Looks up (or computes and caches) the archetype reached by removing
    /// `component` from the archetype at `from`.
    pub fn remove_edge(
        &mut self,
        from: usize,
        component: TypeId,
        register: impl FnOnce(&mut Archetype),
    ) -> usize {
        let key = EdgeKey {
            from,
            component,
            adding: false,
        };
        if let Some(&to) = self.edges.get(&key) {
            return to;
        }
        let sig: ArchetypeSignature = self.archetypes[from]
            .signature()
            .iter()
            .copied()
            .filter(|t| *t != component)
            .collect();
        let to = self.get_or_create_with(&sig, register);
        self.edges.insert(key, to);
        to
    }
}

impl Default for ArchetypeGraph {
    fn default() -> Self {
        Self::new()
    }
}
