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

//! Entity identity. A handle packs a 32-bit free-list index, a 24-bit
//! generation counter and an 8-bit flags byte into one `u64`, so it's `Copy`
//! and fits in a register without indirection through an external slot-map
//! crate. `EntityAllocator` owns the free list and is the only thing that
//! hands out or recycles handles.

use std::fmt;

/// Where an entity's components currently live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityLocation {
    pub archetype_id: usize,
    pub archetype_row: usize,
}

const GENERATION_MASK: u64 = 0x00FF_FFFF;

/// Packed entity handle: `index:32 | generation:24 | flags:8`.
///
/// Equality and hashing use the raw bits, so a stale handle (same index,
/// older generation) never compares equal to the live one occupying that
/// slot today.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u64);

impl EntityId {
    /// Sentinel for "no entity". Never returned by `EntityAllocator::allocate`.
    pub const NULL: EntityId = EntityId(u64::MAX);

    pub fn new(index: u32, generation: u32, flags: u8) -> Self {
        let bits = (index as u64) | ((generation as u64 & GENERATION_MASK) << 32) | ((flags as u64) << 56);
        EntityId(bits)
    }

    pub fn index(self) -> u32 {
        (self.0 & 0xFFFF_FFFF) as u32
    }

    pub fn generation(self) -> u32 {
        ((self.0 >> 32) & GENERATION_MASK) as u32
    }

    pub fn flags(self) -> u8 {
        (self.0 >> 56) as u8
    }

    pub fn is_null(self) -> bool {
        self == EntityId::NULL
    }

    pub fn to_bits(self) -> u64 {
        self.0
    }

    pub fn from_bits(bits: u64) -> Self {
        EntityId(bits)
    }
}

impl serde::Serialize for EntityId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> serde::Deserialize<'de> for EntityId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = u64::deserialize(deserializer)?;
        Ok(EntityId(bits))
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "EntityId(NULL)")
        } else {
            write!(f, "EntityId({}v{})", self.index(), self.generation())
        }
    }
}

struct Slot {
    generation: u32,
    location: Option<EntityLocation>,
}

/// Free-list allocator for entity handles. Recycles indices on despawn,
/// bumping the slot's generation so any handle captured before the despawn
/// reads as dead rather than aliasing the new occupant.
#[derive(Default)]
pub struct EntityAllocator {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    alive_count: usize,
}

impl EntityAllocator {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            alive_count: 0,
        }
    }

    pub fn allocate(&mut self, location: EntityLocation) -> EntityId {
        self.alive_count += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.location = Some(location);
            EntityId::new(index, slot.generation, 0)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                location: Some(location),
            });
            EntityId::new(index, 0, 0)
        }
    }

    pub fn is_alive(&self, id: EntityId) -> bool {
        if id.is_null() {
            return false;
        }
        match self.slots.get(id.index() as usize) {
            Some(slot) => slot.generation == id.generation() && slot.location.is_some(),
            None => false,
        }
    }

    pub fn location(&self, id: EntityId) -> Option<EntityLocation> {
        if !self.is_alive(id) {
            return None;
        }
        self.slots[id.index() as usize].location
    }

    /// Overwrites the location recorded for `id`. No-op for a dead or stale
    /// handle, since a swap-remove can race with a despawn of the very
    /// entity being moved.
    pub fn set_location(&mut self, id: EntityId, location: EntityLocation) {
        if let Some(slot) = self.slots.get_mut(id.index() as usize) {
            if slot.generation == id.generation() && slot.location.is_some() {
                slot.location = Some(location);
            }
        }
    }

    /// Frees `id`'s slot and bumps its generation. Returns `false` for an
    /// already-dead or stale handle, in which case nothing happens.
    pub fn deallocate(&mut self, id: EntityId) -> bool {
        if !self.is_alive(id) {
            return false;
        }
        let idx = id.index() as usize;
        let slot = &mut self.slots[idx];
        slot.location = None;
        slot.generation = (slot.generation + 1) & (GENERATION_MASK as u32);
        self.free_list.push(id.index());
        self.alive_count -= 1;
        true
    }

    pub fn alive_count(&self) -> usize {
        self.alive_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(row: usize) -> EntityLocation {
        EntityLocation {
            archetype_id: 0,
            archetype_row: row,
        }
    }

    #[test]
    fn bits_round_trip_through_to_bits_from_bits() {
        let id = EntityId::new(7, 3, 0);
        assert_eq!(EntityId::from_bits(id.to_bits()), id);
    }

    #[test]
    fn serializes_as_its_raw_bits() {
        let id = EntityId::new(7, 3, 0);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, id.to_bits().to_string());
        let back: EntityId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn fresh_allocator_has_no_live_entities() {
        let allocator = EntityAllocator::new();
        assert_eq!(allocator.alive_count(), 0);
    }

    #[test]
    fn allocate_then_deallocate_recycles_index_with_bumped_generation() {
        let mut allocator = EntityAllocator::new();
        let first = allocator.allocate(loc(0));
        assert!(allocator.deallocate(first));
        let second = allocator.allocate(loc(0));
        assert_eq!(first.index(), second.index());
        assert_ne!(first.generation(), second.generation());
    }

    #[test]
    fn stale_handle_is_not_alive_after_recycle() {
        let mut allocator = EntityAllocator::new();
        let first = allocator.allocate(loc(0));
        allocator.deallocate(first);
        allocator.allocate(loc(0));
        assert!(!allocator.is_alive(first));
    }

    #[test]
    fn set_location_updates_only_the_matching_generation() {
        let mut allocator = EntityAllocator::new();
        let id = allocator.allocate(loc(0));
        allocator.set_location(id, loc(5));
        assert_eq!(allocator.location(id), Some(loc(5)));

        allocator.deallocate(id);
        allocator.set_location(id, loc(9));
        assert_eq!(allocator.location(id), None);
    }

    #[test]
    fn double_deallocate_is_a_noop() {
        let mut allocator = EntityAllocator::new();
        let id = allocator.allocate(loc(0));
        assert!(allocator.deallocate(id));
        assert!(!allocator.deallocate(id));
    }
}
