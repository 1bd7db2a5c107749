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

//! Multiple size-classed pools behind one allocator. A request is routed to
//! the smallest size class that fits it; each class is its own
//! [`PoolAllocator`](super::pool::PoolAllocator), so allocation cost is
//! O(size classes) to find the right slab plus O(1) to pop its free list.

use std::alloc::Layout;

use super::pool::PoolAllocator;
use super::RawAllocator;

pub struct SlabAllocator {
    classes: Vec<PoolAllocator>,
}

impl SlabAllocator {
    /// `size_classes` must be sorted ascending; each gets `objects_per_slab`
    /// slots. A typical set covers common allocation sizes, e.g.
    /// `[32, 64, 128, 256, 512]`.
    pub fn new(size_classes: &[usize], objects_per_slab: usize) -> Self {
        assert!(!size_classes.is_empty(), "must provide at least one size class");
        assert!(
            size_classes.windows(2).all(|w| w[0] < w[1]),
            "size classes must be sorted and distinct"
        );
        let classes = size_classes
            .iter()
            .map(|&size| {
                let layout = Layout::from_size_align(size, 8).expect("size class must be a valid layout");
                PoolAllocator::new(layout, objects_per_slab)
            })
            .collect();
        Self { classes }
    }

    fn class_for(&self, size: usize) -> Option<usize> {
        self.classes.iter().position(|pool| pool.slot_size() >= size)
    }

    pub fn size_classes(&self) -> impl Iterator<Item = usize> + '_ {
        self.classes.iter().map(|pool| pool.slot_size())
    }

    pub fn reset(&self) {
        for pool in &self.classes {
            pool.reset();
        }
    }
}

unsafe impl RawAllocator for SlabAllocator {
    fn allocate(&self, layout: Layout) -> Option<std::ptr::NonNull<u8>> {
        let index = self.class_for(layout.size())?;
        self.classes[index].allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: std::ptr::NonNull<u8>, layout: Layout) {
        if let Some(index) = self.class_for(layout.size()) {
            unsafe { self.classes[index].deallocate(ptr, layout) };
        }
    }

    fn used_bytes(&self) -> usize {
        self.classes.iter().map(|pool| pool.used_bytes()).sum()
    }

    fn capacity_bytes(&self) -> usize {
        self.classes.iter().map(|pool| pool.capacity_bytes()).sum()
    }
}
