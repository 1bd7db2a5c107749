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

//! Component and Bundle traits, plus the type-erased function-pointer table
//! (`ComponentMeta`) archetype columns use to construct/move/destroy values
//! without knowing their concrete type at the call site.

use std::any::TypeId;

use smallvec::{smallvec, SmallVec};

use crate::archetype::Archetype;

/// Maximum number of components supported by Bundle implementations.
pub const MAX_BUNDLE_COMPONENTS: usize = 8;

/// Marker trait for components. Components must be `'static` (no borrowed
/// data) and thread-safe, since the world and its resources are `Send`.
pub trait Component: 'static + Send + Sync {}

impl<T: 'static + Send + Sync> Component for T {}

/// Type-erased operations needed to manage a component's bytes inside a
/// column without the column itself being generic over the component type.
#[derive(Clone, Copy)]
pub struct ComponentMeta {
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub size: usize,
    pub align: usize,
    pub needs_drop: bool,
    pub drop_fn: Option<unsafe fn(*mut u8)>,
    /// Copies `count` elements from `src` to `dst` (non-overlapping, same layout).
    pub move_fn: unsafe fn(src: *const u8, dst: *mut u8),
}

impl ComponentMeta {
    pub fn of<T: Component>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
            needs_drop: std::mem::needs_drop::<T>(),
            drop_fn: if std::mem::needs_drop::<T>() {
                Some(|ptr| unsafe { std::ptr::drop_in_place(ptr as *mut T) })
            } else {
                None
            },
            move_fn: |src, dst| unsafe {
                std::ptr::copy_nonoverlapping(src as *const T, dst as *mut T, 1);
            },
        }
    }
}

/// Bundle of components spawned together. Implemented for tuples up to
/// [`MAX_BUNDLE_COMPONENTS`] elements via `impl_bundle!` below.
pub trait Bundle: Send + Sync + 'static {
    fn type_ids() -> SmallVec<[TypeId; MAX_BUNDLE_COMPONENTS]>
    where
        Self: Sized;

    fn register_components(archetype: &mut Archetype)
    where
        Self: Sized;

    /// # Safety
    /// Caller must ensure `ptrs` contains one valid, correctly aligned,
    /// uninitialized pointer per component in bundle order.
    unsafe fn write_components(self, ptrs: &[*mut u8]);
}

macro_rules! impl_bundle {
    ($($T:ident),*) => {
        impl<$($T: Component),*> Bundle for ($($T,)*) {
            fn type_ids() -> SmallVec<[TypeId; MAX_BUNDLE_COMPONENTS]> {
                smallvec![$(TypeId::of::<$T>()),*]
            }

            fn register_components(archetype: &mut Archetype) {
                $(archetype.register_component::<$T>();)*
            }

            #[allow(non_snake_case)]
            unsafe fn write_components(self, ptrs: &[*mut u8]) {
                let ($($T,)*) = self;
                let mut i = 0;
                $(
                    std::ptr::write(ptrs[i] as *mut $T, $T);
                    i += 1;
                )*
                let _ = i;
            }
        }
    };
}

impl Bundle for () {
    fn type_ids() -> SmallVec<[TypeId; MAX_BUNDLE_COMPONENTS]> {
        SmallVec::new()
    }

    fn register_components(_archetype: &mut Archetype) {}

    unsafe fn write_components(self, _ptrs: &[*mut u8]) {}
}

impl_bundle!(A);
impl_bundle!(A, B);
impl_bundle!(A, B, C);
impl_bundle!(A, B, C, D);
impl_bundle!(A, B, C, D, E);
impl_bundle!(A, B, C, D, E, F);
impl_bundle!(A, B, C, D, E, F, G);
impl_bundle!(A, B, C, D, E, F, G, H);

#[cfg(test)]
mod tests {
    #![allow(dead_code)]
    use super::*;

    #[test]
    fn single_component_bundle() {
        #[derive(Debug, Clone, Copy)]
        struct Position {
            x: f32,
            y: f32,
        }

        let type_ids = <(Position,)>::type_ids();
        assert_eq!(type_ids.len(), 1);
        assert_eq!(type_ids[0], TypeId::of::<Position>());
    }

    #[test]
    fn multi_component_bundle() {
        #[derive(Debug, Clone, Copy)]
        struct Position {
            x: f32,
        }
        #[derive(Debug, Clone, Copy)]
        struct Velocity {
            x: f32,
        }

        let type_ids = <(Position, Velocity)>::type_ids();
        assert_eq!(type_ids.len(), 2);
    }

    #[test]
    fn meta_reports_drop_glue_only_when_needed() {
        let trivial = ComponentMeta::of::<u32>();
        assert!(!trivial.needs_drop);
        assert!(trivial.drop_fn.is_none());

        let owning = ComponentMeta::of::<String>();
        assert!(owning.needs_drop);
        assert!(owning.drop_fn.is_some());
    }
}
