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

//! `queen_ecs` - archetype-based Entity-Component-System runtime, with a
//! pluggable allocator substrate and a small set of hand-built container
//! primitives underneath it instead of leaning on a general-purpose
//! slot-map or hashmap for every hot path.
//!
//! [`World`] is the entry point: spawn entities, query components, register
//! systems and observers, and save/load world state as a JSON scene.

pub mod alloc;
pub mod archetype;
pub mod collections;
pub mod command;
pub mod component;
pub mod entity;
pub mod error;
pub mod graph;
pub mod hierarchy;
pub mod observer;
pub mod query;
pub mod reflection;
pub mod serialization;
pub mod system;
pub mod tick;
pub mod world;

pub mod prelude;

pub use archetype::Archetype;
pub use command::CommandBuffer;
pub use component::{Bundle, Component};
pub use entity::EntityId;
pub use error::{EcsError, Result};
pub use graph::GraphStats;
pub use hierarchy::{Children, Parent};
pub use query::{Added, AddedOrChanged, Changed, Entity, Mut, QueryTerms, Read, With, Without, Write};
pub use reflection::Reflect;
pub use serialization::{ComponentRegistry, Scene, WorldDeserializeResult};
pub use system::{System, SystemId};
pub use world::World;
