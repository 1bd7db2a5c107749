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

//! Open-addressing hash map using Robin Hood linear probing over a
//! pluggable [`RawAllocator`]. Every bucket carries a probe sequence length
//! (PSL); on insert, a newcomer with a longer PSL than the bucket it lands
//! on steals the slot and the displaced entry keeps probing. On removal,
//! the gap is back-filled from the following run of occupied buckets so no
//! bucket ever ends up stranded behind an empty one with `psl > 0`.

use std::alloc::Layout;
use std::hash::{BuildHasher, Hash};
use std::mem::MaybeUninit;
use std::ptr::NonNull;

use ahash::RandomState;

use crate::alloc::RawAllocator;

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Empty,
    Occupied,
    Deleted,
}

struct Bucket<K, V> {
    key: MaybeUninit<K>,
    value: MaybeUninit<V>,
    state: State,
    psl: u8,
}

const MAX_LOAD_FACTOR: f32 = 0.75;

pub struct RobinHoodMap<K, V, A: RawAllocator, S = RandomState> {
    allocator: A,
    hasher: S,
    buckets: NonNull<Bucket<K, V>>,
    capacity: usize,
    count: usize,
}

unsafe impl<K: Send, V: Send, A: RawAllocator + Send, S: Send> Send for RobinHoodMap<K, V, A, S> {}

fn next_power_of_two(n: usize) -> usize {
    n.max(1).next_power_of_two()
}

impl<K: Eq + Hash, V, A: RawAllocator> RobinHoodMap<K, V, A> {
    pub fn new(allocator: A, initial_capacity: usize) -> Self {
        Self::with_hasher(allocator, initial_capacity, RandomState::default())
    }
}

impl<K, V, A: RawAllocator, S> RobinHoodMap<K, V, A, S> {
    fn bucket_layout(capacity: usize) -> Layout {
        Layout::array::<Bucket<K, V>>(capacity).expect("hash map capacity overflows a valid layout")
    }
}

impl<K: Eq + Hash, V, A: RawAllocator, S: BuildHasher> RobinHoodMap<K, V, A, S> {
    pub fn with_hasher(allocator: A, initial_capacity: usize, hasher: S) -> Self {
        let capacity = next_power_of_two(initial_capacity.max(1));
        let buckets = Self::allocate_buckets(&allocator, capacity);
        Self {
            allocator,
            hasher,
            buckets,
            capacity,
            count: 0,
        }
    }

    fn allocate_buckets(allocator: &A, capacity: usize) -> NonNull<Bucket<K, V>> {
        let layout = Self::bucket_layout(capacity);
        let block = allocator.allocate(layout).expect("hash map allocation failed");
        let ptr = block.cast::<Bucket<K, V>>();
        for i in 0..capacity {
            unsafe {
                ptr.as_ptr().add(i).write(Bucket {
                    key: MaybeUninit::uninit(),
                    value: MaybeUninit::uninit(),
                    state: State::Empty,
                    psl: 0,
                });
            }
        }
        ptr
    }

    fn bucket(&self, index: usize) -> &Bucket<K, V> {
        unsafe { &*self.buckets.as_ptr().add(index) }
    }

    fn bucket_mut(&mut self, index: usize) -> &mut Bucket<K, V> {
        unsafe { &mut *self.buckets.as_ptr().add(index) }
    }

    fn hash_index(&self, key: &K) -> usize {
        (self.hasher.hash_one(key) as usize) & (self.capacity - 1)
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn load_factor(&self) -> f32 {
        self.count as f32 / self.capacity as f32
    }

    fn should_rehash(&self) -> bool {
        self.count as f32 >= self.capacity as f32 * MAX_LOAD_FACTOR
    }

    pub fn insert(&mut self, key: K, value: V) -> bool {
        if self.should_rehash() {
            self.rehash(self.capacity * 2);
        }
        self.insert_internal(key, value)
    }

    fn insert_internal(&mut self, mut key: K, mut value: V) -> bool {
        let mut index = self.hash_index(&key);
        let mut psl: u8 = 0;
        loop {
            let state = self.bucket(index).state;
            match state {
                State::Empty | State::Deleted => {
                    let bucket = self.bucket_mut(index);
                    bucket.key.write(key);
                    bucket.value.write(value);
                    bucket.state = State::Occupied;
                    bucket.psl = psl;
                    self.count += 1;
                    return true;
                }
                State::Occupied => {
                    let existing_key = unsafe { self.bucket(index).key.assume_init_ref() };
                    if *existing_key == key {
                        return false;
                    }
                    let bucket_psl = self.bucket(index).psl;
                    if psl > bucket_psl {
                        let bucket = self.bucket_mut(index);
                        std::mem::swap(unsafe { bucket.key.assume_init_mut() }, &mut key);
                        std::mem::swap(unsafe { bucket.value.assume_init_mut() }, &mut value);
                        let swapped_psl = bucket.psl;
                        bucket.psl = psl;
                        psl = swapped_psl;
                    }
                }
            }
            psl += 1;
            index = (index + 1) & (self.capacity - 1);
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        let index = self.find_index(key)?;
        Some(unsafe { self.bucket(index).value.assume_init_ref() })
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let index = self.find_index(key)?;
        Some(unsafe { self.bucket_mut(index).value.assume_init_mut() })
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.find_index(key).is_some()
    }

    fn find_index(&self, key: &K) -> Option<usize> {
        let mut index = self.hash_index(key);
        let mut psl: u8 = 0;
        loop {
            let bucket = self.bucket(index);
            match bucket.state {
                State::Empty => return None,
                State::Occupied => {
                    if psl > bucket.psl {
                        return None;
                    }
                    if unsafe { bucket.key.assume_init_ref() } == key {
                        return Some(index);
                    }
                }
                State::Deleted => {}
            }
            psl += 1;
            index = (index + 1) & (self.capacity - 1);
        }
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let index = self.find_index(key)?;
        let bucket = self.bucket_mut(index);
        unsafe { bucket.key.assume_init_drop() };
        let value = unsafe { bucket.value.assume_init_read() };
        bucket.state = State::Deleted;
        self.count -= 1;
        self.shift_backward(index);
        Some(value)
    }

    fn shift_backward(&mut self, removed_index: usize) {
        let mut current = removed_index;
        loop {
            let next = (current + 1) & (self.capacity - 1);
            let next_bucket = self.bucket(next);
            if next_bucket.state != State::Occupied || next_bucket.psl == 0 {
                break;
            }
            let next_psl = next_bucket.psl;
            let key = unsafe { std::ptr::read(next_bucket.key.as_ptr()) };
            let value = unsafe { std::ptr::read(next_bucket.value.as_ptr()) };

            let current_bucket = self.bucket_mut(current);
            current_bucket.key.write(key);
            current_bucket.value.write(value);
            current_bucket.state = State::Occupied;
            current_bucket.psl = next_psl - 1;

            let next_bucket = self.bucket_mut(next);
            next_bucket.state = State::Empty;
            next_bucket.psl = 0;

            current = next;
        }
    }

    fn rehash(&mut self, new_capacity: usize) {
        let old_buckets = self.buckets;
        let old_capacity = self.capacity;

        self.buckets = Self::allocate_buckets(&self.allocator, new_capacity);
        self.capacity = new_capacity;
        self.count = 0;

        for i in 0..old_capacity {
            let bucket = unsafe { &mut *old_buckets.as_ptr().add(i) };
            if bucket.state == State::Occupied {
                let key = unsafe { bucket.key.assume_init_read() };
                let value = unsafe { bucket.value.assume_init_read() };
                self.insert_internal(key, value);
            }
        }

        let old_layout = Self::bucket_layout(old_capacity);
        unsafe { self.allocator.deallocate(old_buckets.cast::<u8>(), old_layout) };
    }

    pub fn clear(&mut self) {
        for i in 0..self.capacity {
            let bucket = self.bucket_mut(i);
            if bucket.state == State::Occupied {
                unsafe {
                    bucket.key.assume_init_drop();
                    bucket.value.assume_init_drop();
                }
            }
            bucket.state = State::Empty;
            bucket.psl = 0;
        }
        self.count = 0;
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        (0..self.capacity).filter_map(move |i| {
            let bucket = self.bucket(i);
            (bucket.state == State::Occupied)
                .then(|| unsafe { (bucket.key.assume_init_ref(), bucket.value.assume_init_ref()) })
        })
    }
}

impl<K, V, A: RawAllocator, S> Drop for RobinHoodMap<K, V, A, S> {
    fn drop(&mut self) {
        for i in 0..self.capacity {
            let bucket = unsafe { &mut *self.buckets.as_ptr().add(i) };
            if bucket.state == State::Occupied {
                unsafe {
                    bucket.key.assume_init_drop();
                    bucket.value.assume_init_drop();
                }
            }
        }
        let layout = Self::bucket_layout(self.capacity);
        unsafe { self.allocator.deallocate(self.buckets.cast::<u8>(), layout) };
    }
}
