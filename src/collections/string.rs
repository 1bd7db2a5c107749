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

//! Byte string with small-string optimization over a pluggable
//! [`RawAllocator`]. Strings of 22 bytes or fewer live inline and never
//! touch the allocator; crossing that boundary promotes to a heap buffer
//! and never demotes back on its own (only `shrink_to_fit` does that).
//! Byte-agnostic: no UTF-8 validation, same as the rest of this module.

use std::alloc::Layout;
use std::ptr::NonNull;

use crate::alloc::RawAllocator;

pub const SSO_CAPACITY: usize = 22;
const INLINE_BUFFER_SIZE: usize = SSO_CAPACITY + 1;

enum Repr {
    Inline { buf: [u8; INLINE_BUFFER_SIZE], len: u8 },
    Heap { ptr: NonNull<u8>, len: usize, cap: usize },
}

pub struct SsoString<A: RawAllocator> {
    allocator: A,
    repr: Repr,
}

unsafe impl<A: RawAllocator + Send> Send for SsoString<A> {}

impl<A: RawAllocator> SsoString<A> {
    pub fn new(allocator: A) -> Self {
        Self {
            allocator,
            repr: Repr::Inline {
                buf: [0; INLINE_BUFFER_SIZE],
                len: 0,
            },
        }
    }

    pub fn from_bytes(allocator: A, bytes: &[u8]) -> Self {
        let mut s = Self::new(allocator);
        s.push_bytes(bytes);
        s
    }

    pub fn from_str(allocator: A, s: &str) -> Self {
        Self::from_bytes(allocator, s.as_bytes())
    }

    pub fn len(&self) -> usize {
        match &self.repr {
            Repr::Inline { len, .. } => *len as usize,
            Repr::Heap { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_heap(&self) -> bool {
        matches!(self.repr, Repr::Heap { .. })
    }

    pub fn capacity(&self) -> usize {
        match &self.repr {
            Repr::Inline { .. } => SSO_CAPACITY,
            Repr::Heap { cap, .. } => *cap,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match &self.repr {
            Repr::Inline { buf, len } => &buf[..*len as usize],
            Repr::Heap { ptr, len, .. } => unsafe { std::slice::from_raw_parts(ptr.as_ptr(), *len) },
        }
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(self.as_bytes()).expect("SsoString does not contain valid UTF-8")
    }

    fn heap_layout(cap: usize) -> Layout {
        Layout::array::<u8>(cap).expect("string capacity overflows a valid layout")
    }

    fn promote_to_heap(&mut self, new_cap: usize) {
        let new_cap = new_cap.max(SSO_CAPACITY * 2);
        let layout = Self::heap_layout(new_cap);
        let block = self.allocator.allocate(layout).expect("string allocation failed");
        let current = self.as_bytes();
        let len = current.len();
        unsafe { std::ptr::copy_nonoverlapping(current.as_ptr(), block.as_ptr(), len) };
        self.repr = Repr::Heap {
            ptr: block,
            len,
            cap: new_cap,
        };
    }

    pub fn reserve(&mut self, additional: usize) {
        let needed = self.len() + additional;
        match &self.repr {
            Repr::Inline { .. } => {
                if needed > SSO_CAPACITY {
                    self.promote_to_heap(needed);
                }
            }
            Repr::Heap { cap, .. } => {
                if needed > *cap {
                    self.grow_heap(needed);
                }
            }
        }
    }

    fn grow_heap(&mut self, needed: usize) {
        let (old_ptr, old_len, old_cap) = match &self.repr {
            Repr::Heap { ptr, len, cap } => (*ptr, *len, *cap),
            Repr::Inline { .. } => unreachable!("grow_heap called on an inline string"),
        };
        let new_cap = needed.max(old_cap * 2);
        let layout = Self::heap_layout(new_cap);
        let block = self.allocator.allocate(layout).expect("string allocation failed");
        unsafe { std::ptr::copy_nonoverlapping(old_ptr.as_ptr(), block.as_ptr(), old_len) };
        unsafe { self.allocator.deallocate(old_ptr, Self::heap_layout(old_cap)) };
        self.repr = Repr::Heap {
            ptr: block,
            len: old_len,
            cap: new_cap,
        };
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let new_len = self.len() + bytes.len();
        if new_len > self.capacity() {
            match &self.repr {
                Repr::Inline { .. } => self.promote_to_heap(new_len),
                Repr::Heap { .. } => self.grow_heap(new_len),
            }
        }
        match &mut self.repr {
            Repr::Inline { buf, len } => {
                buf[*len as usize..new_len].copy_from_slice(bytes);
                *len = new_len as u8;
            }
            Repr::Heap { ptr, len, .. } => {
                unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr().add(*len), bytes.len()) };
                *len = new_len;
            }
        }
    }

    pub fn push(&mut self, byte: u8) {
        self.push_bytes(&[byte]);
    }

    pub fn clear(&mut self) {
        match &mut self.repr {
            Repr::Inline { len, .. } => *len = 0,
            Repr::Heap { len, .. } => *len = 0,
        }
    }

    /// Demotes back to inline storage if the current contents fit, freeing
    /// the heap buffer; otherwise reallocates to exactly `len()`.
    pub fn shrink_to_fit(&mut self) {
        let len = self.len();
        if let Repr::Heap { ptr, cap, .. } = &self.repr {
            let ptr = *ptr;
            let cap = *cap;
            if len <= SSO_CAPACITY {
                let mut buf = [0u8; INLINE_BUFFER_SIZE];
                unsafe { std::ptr::copy_nonoverlapping(ptr.as_ptr(), buf.as_mut_ptr(), len) };
                unsafe { self.allocator.deallocate(ptr, Self::heap_layout(cap)) };
                self.repr = Repr::Inline { buf, len: len as u8 };
            } else if len < cap {
                let layout = Self::heap_layout(len);
                let block = self.allocator.allocate(layout).expect("string allocation failed");
                unsafe { std::ptr::copy_nonoverlapping(ptr.as_ptr(), block.as_ptr(), len) };
                unsafe { self.allocator.deallocate(ptr, Self::heap_layout(cap)) };
                self.repr = Repr::Heap { ptr: block, len, cap: len };
            }
        }
    }

    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        self.as_bytes().starts_with(prefix)
    }

    pub fn ends_with(&self, suffix: &[u8]) -> bool {
        self.as_bytes().ends_with(suffix)
    }

    pub fn contains(&self, needle: &[u8]) -> bool {
        self.as_bytes().windows(needle.len().max(1)).any(|w| w == needle) || needle.is_empty()
    }
}

impl<A: RawAllocator> Drop for SsoString<A> {
    fn drop(&mut self) {
        if let Repr::Heap { ptr, cap, .. } = self.repr {
            unsafe { self.allocator.deallocate(ptr, Self::heap_layout(cap)) };
        }
    }
}

impl<A: RawAllocator> PartialEq for SsoString<A> {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}
