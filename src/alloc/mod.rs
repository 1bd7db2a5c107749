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

//! Pluggable raw memory allocators, separate from the global allocator the
//! rest of the crate uses through `Vec`/`Box`. `World` itself never needs
//! one of these directly today; they exist so the containers in
//! [`crate::collections`] can be built over a swappable backing store the
//! same way the archetype column storage is built over `Vec<u8>`.
//!
//! Every allocator here satisfies [`RawAllocator`]: allocate a block of a
//! given size/alignment, or fail and return `None`, and deallocate a block
//! previously returned by the same allocator.

pub mod buddy;
pub mod debug;
pub mod linear;
pub mod pool;
pub mod slab;
pub mod stack;
pub mod thread_safe;

use std::alloc::Layout;
use std::ptr::NonNull;

/// A raw, type-erased memory source. Implementors hand out blocks sized and
/// aligned per `layout` and take them back via `deallocate`; callers are
/// responsible for constructing/dropping whatever they put in the block,
/// same as `std::alloc::GlobalAlloc`.
///
/// # Safety
/// A pointer passed to `deallocate` must have been returned by `allocate`
/// (or `grow`/`shrink` where applicable) on the same allocator instance,
/// with the same layout it was allocated with.
pub unsafe trait RawAllocator {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// # Safety
    /// See the trait-level safety section.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);

    /// Bytes currently handed out and not yet returned. `0` for allocators
    /// that don't track this (e.g. ones that never individually free).
    fn used_bytes(&self) -> usize {
        0
    }

    /// Total bytes this allocator can ever hand out, or `usize::MAX` for an
    /// allocator with no fixed backing region.
    fn capacity_bytes(&self) -> usize {
        usize::MAX
    }
}

#[cfg(test)]
pub(crate) fn test_layout(size: usize) -> Layout {
    Layout::from_size_align(size, 8).expect("test layout is always valid")
}
