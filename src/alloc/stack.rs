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

//! Bump allocator with LIFO scoped frees via markers. Like
//! [`crate::alloc::linear::LinearAllocator`] but `get_marker`/`free_to_marker`
//! let a caller roll back to any earlier point instead of only all the way
//! to zero, as long as frees happen in the reverse order allocations were
//! made.

use std::alloc::Layout;
use std::cell::Cell;
use std::ptr::NonNull;

use super::RawAllocator;

pub type Marker = usize;

pub struct StackAllocator {
    block: NonNull<u8>,
    block_layout: Layout,
    capacity: usize,
    offset: Cell<usize>,
}

unsafe impl Send for StackAllocator {}

impl StackAllocator {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "stack allocator capacity must be > 0");
        let block_layout = Layout::from_size_align(capacity, 16).expect("capacity too large to align");
        let block = unsafe { std::alloc::alloc(block_layout) };
        let block = NonNull::new(block).expect("allocation of backing block failed");
        Self {
            block,
            block_layout,
            capacity,
            offset: Cell::new(0),
        }
    }

    pub fn get_marker(&self) -> Marker {
        self.offset.get()
    }

    /// Rewinds to `marker`. Every pointer allocated after `marker` was taken
    /// must not be dereferenced afterward. A `marker` newer than the current
    /// offset (from a stack that was already freed past it) is a no-op.
    pub fn free_to_marker(&self, marker: Marker) {
        if marker <= self.offset.get() {
            self.offset.set(marker);
        }
    }

    fn aligned_offset(current: usize, align: usize) -> usize {
        (current + align - 1) & !(align - 1)
    }
}

unsafe impl RawAllocator for StackAllocator {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        let start = Self::aligned_offset(self.offset.get(), layout.align());
        let end = start.checked_add(layout.size())?;
        if end > self.capacity {
            return None;
        }
        self.offset.set(end);
        let ptr = unsafe { self.block.as_ptr().add(start) };
        NonNull::new(ptr)
    }

    unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {
        // Use markers for scoped frees; an individual deallocate is a no-op.
    }

    fn used_bytes(&self) -> usize {
        self.offset.get()
    }

    fn capacity_bytes(&self) -> usize {
        self.capacity
    }
}

impl Drop for StackAllocator {
    fn drop(&mut self) {
        unsafe { std::alloc::dealloc(self.block.as_ptr(), self.block_layout) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::test_layout;

    #[test]
    fn marker_round_trip_frees_only_the_inner_scope() {
        let allocator = StackAllocator::new(1024);
        allocator.allocate(test_layout(32)).unwrap();
        let marker = allocator.get_marker();
        allocator.allocate(test_layout(64)).unwrap();
        allocator.allocate(test_layout(16)).unwrap();
        allocator.free_to_marker(marker);
        assert_eq!(allocator.used_bytes(), 32);
    }

    #[test]
    fn nested_markers_restore_independently() {
        let allocator = StackAllocator::new(1024);
        let outer = allocator.get_marker();
        allocator.allocate(test_layout(10)).unwrap();
        let inner = allocator.get_marker();
        allocator.allocate(test_layout(10)).unwrap();
        allocator.free_to_marker(inner);
        assert_eq!(allocator.used_bytes(), 10);
        allocator.free_to_marker(outer);
        assert_eq!(allocator.used_bytes(), 0);
    }

    #[test]
    fn freeing_to_a_future_marker_is_a_noop() {
        let allocator = StackAllocator::new(1024);
        allocator.allocate(test_layout(10)).unwrap();
        let stale_future_marker = allocator.get_marker() + 1000;
        allocator.free_to_marker(stale_future_marker);
        assert_eq!(allocator.used_bytes(), 10);
    }
}
