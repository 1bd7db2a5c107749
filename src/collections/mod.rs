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

//! Small, allocator-parameterized container primitives. Archetype columns
//! and the entity location map use `Vec`/`ahash` directly since they're on
//! the hottest paths in the crate; these containers exist for callers that
//! want the same growth/SSO/Robin-Hood characteristics over a
//! [`crate::alloc::RawAllocator`] they control themselves.

pub mod hashmap;
pub mod string;
pub mod vector;

pub use hashmap::RobinHoodMap;
pub use string::SsoString;
pub use vector::Vector;
