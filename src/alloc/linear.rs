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

//! Bump allocator. Allocations are served by advancing an offset into one
//! fixed backing block; there is no per-allocation free, only `reset`, which
//! rewinds the offset to zero and invalidates every outstanding pointer.
//! Good for frame-scoped scratch data with a single shared lifetime.

use std::alloc::Layout;
use std::cell::Cell;
use std::ptr::NonNull;

use super::RawAllocator;

pub struct LinearAllocator {
    block: NonNull<u8>,
    block_layout: Layout,
    capacity: usize,
    offset: Cell<usize>,
}

// SAFETY: all mutation goes through `&self` + `Cell`, so this is Sync only
// in the sense that concurrent access is serialized by the caller; there is
// no interior locking, matching the non-thread-safe guarantee documented on
// every allocator in this module. Wrap in `thread_safe::ThreadSafeAllocator`
// to share across threads.
unsafe impl Send for LinearAllocator {}

impl LinearAllocator {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "linear allocator capacity must be > 0");
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

    /// Rewinds the allocator to empty. Every pointer handed out before this
    /// call must not be dereferenced afterward.
    pub fn reset(&self) {
        self.offset.set(0);
    }

    fn aligned_offset(current: usize, align: usize) -> usize {
        (current + align - 1) & !(align - 1)
    }
}

unsafe impl RawAllocator for LinearAllocator {
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
        // Individual frees are a no-op; only `reset` reclaims space.
    }

    fn used_bytes(&self) -> usize {
        self.offset.get()
    }

    fn capacity_bytes(&self) -> usize {
        self.capacity
    }
}

impl Drop for LinearAllocator {
    fn drop(&mut self) {
        unsafe { std::alloc::dealloc(self.block.as_ptr(), self.block_layout) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::test_layout;

    #[test]
    fn allocations_advance_the_offset() {
        let allocator = LinearAllocator::new(1024);
        assert_eq!(allocator.used_bytes(), 0);
        allocator.allocate(test_layout(64)).unwrap();
        assert_eq!(allocator.used_bytes(), 64);
        allocator.allocate(test_layout(32)).unwrap();
        assert_eq!(allocator.used_bytes(), 96);
    }

    #[test]
    fn reset_reclaims_all_space() {
        let allocator = LinearAllocator::new(128);
        allocator.allocate(test_layout(100)).unwrap();
        allocator.reset();
        assert_eq!(allocator.used_bytes(), 0);
        assert!(allocator.allocate(test_layout(100)).is_some());
    }

    #[test]
    fn allocation_past_capacity_fails() {
        let allocator = LinearAllocator::new(64);
        assert!(allocator.allocate(test_layout(100)).is_none());
    }

    #[test]
    fn respects_alignment() {
        let allocator = LinearAllocator::new(256);
        allocator.allocate(test_layout(1)).unwrap();
        let layout = Layout::from_size_align(16, 16).unwrap();
        let ptr = allocator.allocate(layout).unwrap();
        assert_eq!(ptr.as_ptr() as usize % 16, 0);
    }
}
