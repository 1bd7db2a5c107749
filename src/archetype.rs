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

//! Archetype storage: structure-of-arrays component columns, one row per
//! entity, with per-row change-detection ticks.

use std::any::TypeId;

use rustc_hash::FxHashMap;

use crate::component::{Component, ComponentMeta};
use crate::entity::EntityId;
use crate::tick::{ComponentTicks, Tick};

/// Sorted, deduplicated set of component type IDs that identifies an
/// archetype. Two bundles with the same components in different order
/// resolve to the same signature and therefore the same archetype.
pub type ArchetypeSignature = Vec<TypeId>;

pub fn canonical_signature(types: &[TypeId]) -> ArchetypeSignature {
    let mut sig: ArchetypeSignature = types.to_vec();
    sig.sort_unstable();
    sig.dedup();
    sig
}

/// Structure-of-arrays storage for every entity sharing one component set.
pub struct Archetype {
    signature: ArchetypeSignature,
    entities: Vec<EntityId>,
    components: Vec<ComponentColumn>,
    component_indices: FxHashMap<TypeId, usize>,
    columns_initialized: bool,
}

impl Archetype {
    pub fn new(signature: ArchetypeSignature) -> Self {
        Self {
            signature,
            entities: Vec::new(),
            components: Vec::new(),
            component_indices: FxHashMap::default(),
            columns_initialized: false,
        }
    }

    pub fn signature(&self) -> &ArchetypeSignature {
        &self.signature
    }

    /// Appends an entity's row index. The caller must follow up with exactly
    /// one `init_column_row` per column to keep every column's length in
    /// sync with `entities`; nothing here touches column storage, since a
    /// fresh spawn stamps every column at the current tick while a
    /// migration needs to carry each column's existing ticks forward.
    pub fn allocate_row(&mut self, entity: EntityId) -> usize {
        let row = self.entities.len();
        self.entities.push(entity);
        row
    }

    /// Grows the named column by one slot, stamping it with `ticks`, and
    /// returns a pointer to the new (uninitialized) slot for the caller to
    /// write into. Must be called exactly once per column after
    /// `allocate_row`.
    pub fn init_column_row(&mut self, type_id: TypeId, ticks: ComponentTicks) -> *mut u8 {
        let idx = *self
            .component_indices
            .get(&type_id)
            .expect("column must be registered before init_column_row");
        let column = &mut self.components[idx];
        column.push_ticks(ticks);
        let row = column.len() - 1;
        column.get_ptr_mut(row)
    }

    /// Metadata for every column, in column order. Used to recreate this
    /// archetype's columns on a different archetype during migration.
    pub fn component_metas(&self) -> Vec<ComponentMeta> {
        self.components.iter().map(|c| *c.meta()).collect()
    }

    /// Swap-removes `row`, dropping its component values. Returns the
    /// entity that was moved into `row`'s old slot, if any, so the caller
    /// can fix up its location record.
    ///
    /// # Safety
    /// `row` must be a valid index within this archetype.
    pub unsafe fn remove_row(&mut self, row: usize) -> Option<EntityId> {
        if row >= self.entities.len() {
            return None;
        }
        self.entities.swap_remove(row);
        for column in &mut self.components {
            column.swap_remove(row);
        }
        if row < self.entities.len() {
            Some(self.entities[row])
        } else {
            None
        }
    }

    /// Swap-removes `row` without dropping any component value, for use
    /// when every column's bytes have already been moved elsewhere (an
    /// add/remove-component migration) or explicitly read out by the
    /// caller. Returns the entity moved into `row`'s old slot, if any.
    ///
    /// # Safety
    /// `row` must be a valid index within this archetype, and every
    /// column's value at `row` must already be accounted for (moved or
    /// read out) so this doesn't leak or double-free it.
    pub unsafe fn remove_row_no_drop(&mut self, row: usize) -> Option<EntityId> {
        if row >= self.entities.len() {
            return None;
        }
        self.entities.swap_remove(row);
        for column in &mut self.components {
            column.swap_remove_no_drop(row);
        }
        if row < self.entities.len() {
            Some(self.entities[row])
        } else {
            None
        }
    }

    pub fn get_column(&self, type_id: TypeId) -> Option<&ComponentColumn> {
        let idx = *self.component_indices.get(&type_id)?;
        self.components.get(idx)
    }

    pub fn get_column_by_index(&self, index: usize) -> Option<&ComponentColumn> {
        self.components.get(index)
    }

    pub fn get_column_mut(&mut self, type_id: TypeId) -> Option<&mut ComponentColumn> {
        let idx = *self.component_indices.get(&type_id)?;
        self.components.get_mut(idx)
    }

    pub fn get_column_mut_by_index(&mut self, index: usize) -> Option<&mut ComponentColumn> {
        self.components.get_mut(index)
    }

    pub fn column_index(&self, type_id: TypeId) -> Option<usize> {
        self.component_indices.get(&type_id).copied()
    }

    pub fn has_column(&self, type_id: TypeId) -> bool {
        self.component_indices.contains_key(&type_id)
    }

    pub fn reserve_rows(&mut self, additional: usize) {
        self.entities.reserve(additional);
        for column in &mut self.components {
            column.reserve(additional);
        }
    }

    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Registers a column for `T` if one doesn't already exist.
    pub fn register_component<T: Component>(&mut self) {
        self.register_meta(ComponentMeta::of::<T>());
    }

    pub fn register_meta(&mut self, meta: ComponentMeta) {
        if !self.component_indices.contains_key(&meta.type_id) {
            let idx = self.components.len();
            self.components.push(ComponentColumn::new(meta));
            self.component_indices.insert(meta.type_id, idx);
        }
    }

    /// Adds a column cloned (empty) from another archetype's column, used
    /// when migrating entities between archetypes that share components.
    pub fn add_column_raw(&mut self, type_id: TypeId, column: ComponentColumn) {
        if !self.component_indices.contains_key(&type_id) {
            let idx = self.components.len();
            self.components.push(column);
            self.component_indices.insert(type_id, idx);
        }
    }

    pub fn columns_initialized(&self) -> bool {
        self.columns_initialized
    }

    pub fn mark_columns_initialized(&mut self) {
        self.columns_initialized = true;
    }
}

/// Type-erased, tick-tracked component column. Backing storage is a byte
/// buffer sized by `meta.size`; construction/destruction/moves go through
/// the function pointers in `meta` so the column never needs to be generic.
pub struct ComponentColumn {
    data: Vec<u8>,
    ticks: Vec<ComponentTicks>,
    meta: ComponentMeta,
}

impl ComponentColumn {
    pub fn new(meta: ComponentMeta) -> Self {
        Self {
            data: Vec::new(),
            ticks: Vec::new(),
            meta,
        }
    }

    pub fn meta(&self) -> &ComponentMeta {
        &self.meta
    }

    pub fn item_size(&self) -> usize {
        self.meta.size
    }

    fn push_ticks(&mut self, ticks: ComponentTicks) {
        let offset = self.data.len();
        self.data.resize(offset + self.meta.size, 0);
        self.ticks.push(ticks);
    }

    fn swap_remove(&mut self, row: usize) {
        let size = self.meta.size;
        if size == 0 {
            self.ticks.swap_remove(row);
            return;
        }
        let len = self.len();
        if row >= len {
            return;
        }
        let row_ptr = unsafe { self.data.as_mut_ptr().add(row * size) };
        if let Some(drop_fn) = self.meta.drop_fn {
            unsafe { drop_fn(row_ptr) };
        }
        let last = len - 1;
        if row != last {
            let last_ptr = unsafe { self.data.as_ptr().add(last * size) };
            unsafe { std::ptr::copy_nonoverlapping(last_ptr, row_ptr, size) };
        }
        self.data.truncate(last * size);
        self.ticks.swap_remove(row);
    }

    /// Same as `swap_remove` but never invokes the drop glue, for rows whose
    /// value has already been moved out by the caller.
    fn swap_remove_no_drop(&mut self, row: usize) {
        let size = self.meta.size;
        if size == 0 {
            self.ticks.swap_remove(row);
            return;
        }
        let len = self.len();
        if row >= len {
            return;
        }
        let row_ptr = unsafe { self.data.as_mut_ptr().add(row * size) };
        let last = len - 1;
        if row != last {
            let last_ptr = unsafe { self.data.as_ptr().add(last * size) };
            unsafe { std::ptr::copy_nonoverlapping(last_ptr, row_ptr, size) };
        }
        self.data.truncate(last * size);
        self.ticks.swap_remove(row);
    }

    pub fn reserve(&mut self, additional: usize) {
        self.data.reserve(additional * self.meta.size.max(1));
        self.ticks.reserve(additional);
    }

    /// Returns a pointer to row `index`'s storage. Row must already have
    /// been allocated via `Archetype::allocate_row` (which grows `ticks`
    /// and `data` together), so no resizing happens here.
    pub fn get_ptr_mut(&mut self, index: usize) -> *mut u8 {
        let offset = index * self.meta.size;
        unsafe { self.data.as_mut_ptr().add(offset) }
    }

    pub fn get<T: Component>(&self, index: usize) -> Option<&T> {
        if index >= self.len() {
            return None;
        }
        let offset = index * self.meta.size;
        Some(unsafe { &*(self.data.as_ptr().add(offset) as *const T) })
    }

    pub fn get_mut<T: Component>(&mut self, index: usize) -> Option<&mut T> {
        if index >= self.len() {
            return None;
        }
        let offset = index * self.meta.size;
        Some(unsafe { &mut *(self.data.as_mut_ptr().add(offset) as *mut T) })
    }

    pub fn ticks(&self, index: usize) -> Option<ComponentTicks> {
        self.ticks.get(index).copied()
    }

    pub fn mark_changed(&mut self, index: usize, tick: Tick) {
        if let Some(t) = self.ticks.get_mut(index) {
            t.changed = tick;
        }
    }

    pub fn any_changed_since(&self, since: Tick) -> bool {
        self.ticks.iter().any(|t| t.is_changed(since))
    }

    pub fn any_added_since(&self, since: Tick) -> bool {
        self.ticks.iter().any(|t| t.is_added(since))
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    /// Clones an empty column with the same component metadata, used when
    /// migrating an entity to an archetype that doesn't exist yet.
    pub fn clone_empty(&self) -> ComponentColumn {
        ComponentColumn::new(self.meta)
    }
}

impl Drop for ComponentColumn {
    fn drop(&mut self) {
        if let Some(drop_fn) = self.meta.drop_fn {
            let count = self.len();
            let size = self.meta.size;
            for i in 0..count {
                unsafe { drop_fn(self.data.as_mut_ptr().add(i * size)) };
            }
        }
    }
}
