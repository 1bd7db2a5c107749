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

//! Parent/child relationship components. `World` drives these through
//! `set_parent`/`parent_of`/`despawn_recursive`; this module just owns the
//! storage shape.

use crate::entity::EntityId;

/// Marks an entity's parent. Added/replaced by `World::set_parent`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Parent(pub EntityId);

impl Parent {
    pub fn new(parent_id: EntityId) -> Self {
        Self(parent_id)
    }

    pub fn entity_id(&self) -> EntityId {
        self.0
    }
}

/// Tracks the set of an entity's children. Kept in sync with `Parent` by
/// `World::set_parent`/`World::despawn_recursive`; never mutate directly
/// without also fixing up the matching `Parent` components.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Children {
    children: Vec<EntityId>,
}

impl Children {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_child(&mut self, child: EntityId) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    pub fn remove_child(&mut self, child: EntityId) -> bool {
        if let Some(pos) = self.children.iter().position(|&c| c == child) {
            self.children.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, child: EntityId) -> bool {
        self.children.contains(&child)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityId> {
        self.children.iter()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn clear(&mut self) {
        self.children.clear();
    }

    pub fn get_children(&self) -> Vec<EntityId> {
        self.children.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_management() {
        let id1 = EntityId::new(1, 0, 0);
        let id2 = EntityId::new(2, 0, 0);

        let mut children = Children::new();
        children.add_child(id1);
        assert!(children.contains(id1));
        assert_eq!(children.len(), 1);

        children.add_child(id2);
        assert_eq!(children.len(), 2);

        children.remove_child(id1);
        assert!(!children.contains(id1));
        assert_eq!(children.len(), 1);
    }

    #[test]
    fn children_no_duplicates() {
        let id = EntityId::new(1, 0, 0);
        let mut children = Children::new();
        children.add_child(id);
        children.add_child(id);
        assert_eq!(children.len(), 1);
    }

    #[test]
    fn parent_round_trips_entity_id() {
        let id = EntityId::new(7, 2, 0);
        let parent = Parent::new(id);
        assert_eq!(parent.entity_id(), id);
    }
}
