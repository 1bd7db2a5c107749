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

//! Wraps any [`RawAllocator`] behind a mutex so it can be shared across
//! threads. None of the allocators in this module lock internally; this is
//! the one place that adds synchronization, so callers can pick it only
//! where contention is actually expected instead of paying for it
//! everywhere.

use std::alloc::Layout;
use std::ptr::NonNull;

use parking_lot::Mutex;

use super::RawAllocator;

pub struct ThreadSafeAllocator<A: RawAllocator> {
    inner: Mutex<A>,
}

impl<A: RawAllocator> ThreadSafeAllocator<A> {
    pub fn new(inner: A) -> Self {
        Self { inner: Mutex::new(inner) }
    }

    pub fn into_inner(self) -> A {
        self.inner.into_inner()
    }
}

// SAFETY: every call into `inner` happens while holding the mutex, so the
// wrapped allocator never observes concurrent access even if it isn't Sync
// itself.
unsafe impl<A: RawAllocator + Send> Sync for ThreadSafeAllocator<A> {}

unsafe impl<A: RawAllocator + Send> RawAllocator for ThreadSafeAllocator<A> {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        self.inner.lock().allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { self.inner.lock().deallocate(ptr, layout) };
    }

    fn used_bytes(&self) -> usize {
        self.inner.lock().used_bytes()
    }

    fn capacity_bytes(&self) -> usize {
        self.inner.lock().capacity_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::buddy::BuddyAllocator;
    use crate::alloc::test_layout;
    use std::sync::Arc;

    #[test]
    fn shared_across_threads_keeps_accounting_consistent() {
        let allocator = Arc::new(ThreadSafeAllocator::new(BuddyAllocator::new(1 << 16)));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let allocator = Arc::clone(&allocator);
            handles.push(std::thread::spawn(move || {
                let ptr = allocator.allocate(test_layout(64)).unwrap();
                unsafe { allocator.deallocate(ptr, test_layout(64)) };
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(allocator.used_bytes(), 0);
    }
}
