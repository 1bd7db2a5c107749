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

//! Named, registered wrapper around a [`RawAllocator`] for per-module memory
//! accounting. Every module that wants its allocations tracked separately
//! wraps its allocator in a [`TrackingAllocator`]; [`registry::snapshot`]
//! returns used/capacity bytes for every live tracker, which is what a
//! diagnostics command or a profiling dashboard would read.

use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{OnceLock, Weak};

use parking_lot::Mutex;

use super::RawAllocator;

pub struct TrackingAllocator<A: RawAllocator> {
    name: &'static str,
    inner: A,
    peak_bytes: AtomicUsize,
}

impl<A: RawAllocator + Send + Sync + 'static> TrackingAllocator<A> {
    pub fn new(name: &'static str, inner: A) -> std::sync::Arc<Self> {
        let tracker = std::sync::Arc::new(Self {
            name,
            inner,
            peak_bytes: AtomicUsize::new(0),
        });
        registry::register(name, std::sync::Arc::downgrade(&tracker) as Weak<dyn Tracked>);
        tracker
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn peak_bytes(&self) -> usize {
        self.peak_bytes.load(Ordering::Relaxed)
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }
}

unsafe impl<A: RawAllocator> RawAllocator for TrackingAllocator<A> {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        let ptr = self.inner.allocate(layout)?;
        let used = self.inner.used_bytes();
        self.peak_bytes.fetch_max(used, Ordering::Relaxed);
        #[cfg(feature = "profiling")]
        tracing::trace!(allocator = self.name, bytes = layout.size(), "allocate");
        Some(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { self.inner.deallocate(ptr, layout) };
        #[cfg(feature = "profiling")]
        tracing::trace!(allocator = self.name, bytes = layout.size(), "deallocate");
    }

    fn used_bytes(&self) -> usize {
        self.inner.used_bytes()
    }

    fn capacity_bytes(&self) -> usize {
        self.inner.capacity_bytes()
    }
}

/// Type-erased view used by the registry so trackers over different
/// concrete allocators can sit in one list.
pub(crate) trait Tracked: Send + Sync {
    fn name(&self) -> &'static str;
    fn used_bytes(&self) -> usize;
    fn capacity_bytes(&self) -> usize;
    fn peak_bytes(&self) -> usize;
}

impl<A: RawAllocator + Send + Sync + 'static> Tracked for TrackingAllocator<A> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn used_bytes(&self) -> usize {
        RawAllocator::used_bytes(self)
    }

    fn capacity_bytes(&self) -> usize {
        RawAllocator::capacity_bytes(self)
    }

    fn peak_bytes(&self) -> usize {
        self.peak_bytes()
    }
}

/// A point-in-time reading for one registered [`TrackingAllocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleStats {
    pub name: &'static str,
    pub used_bytes: usize,
    pub capacity_bytes: usize,
    pub peak_bytes: usize,
}

pub mod registry {
    use super::*;

    fn entries() -> &'static Mutex<Vec<Weak<dyn Tracked>>> {
        static ENTRIES: OnceLock<Mutex<Vec<Weak<dyn Tracked>>>> = OnceLock::new();
        ENTRIES.get_or_init(|| Mutex::new(Vec::new()))
    }

    pub(super) fn register(_name: &'static str, entry: Weak<dyn Tracked>) {
        entries().lock().push(entry);
    }

    /// Stats for every [`TrackingAllocator`] still alive, in registration
    /// order. Dropped trackers are pruned from the registry as part of the
    /// call.
    pub fn snapshot() -> Vec<ModuleStats> {
        let mut guard = entries().lock();
        guard.retain(|entry| entry.strong_count() > 0);
        guard
            .iter()
            .filter_map(|entry| entry.upgrade())
            .map(|tracked| ModuleStats {
                name: tracked.name(),
                used_bytes: tracked.used_bytes(),
                capacity_bytes: tracked.capacity_bytes(),
                peak_bytes: tracked.peak_bytes(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::linear::LinearAllocator;
    use crate::alloc::test_layout;
    use crate::alloc::thread_safe::ThreadSafeAllocator;

    #[test]
    fn tracks_peak_usage_across_allocations() {
        let tracker = TrackingAllocator::new("test-module", ThreadSafeAllocator::new(LinearAllocator::new(1024)));
        tracker.allocate(test_layout(64)).unwrap();
        tracker.allocate(test_layout(64)).unwrap();
        assert_eq!(tracker.peak_bytes(), 128);
    }

    #[test]
    fn registry_reports_live_trackers() {
        let tracker = TrackingAllocator::new("snapshot-test", ThreadSafeAllocator::new(LinearAllocator::new(256)));
        tracker.allocate(test_layout(32)).unwrap();
        let found = registry::snapshot().into_iter().find(|stats| stats.name == "snapshot-test");
        assert_eq!(found.unwrap().used_bytes, 32);
    }
}
