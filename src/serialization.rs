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

//! World save/load as a JSON scene.
//!
//! A component is eligible for serialization once it's registered with
//! [`ComponentRegistry::register`], which requires `Reflect + Serialize +
//! Deserialize + Clone`. Save walks every live archetype and asks each
//! registered type for its JSON value; load is strictly additive — it spawns
//! fresh entities and never touches anything already in the world — and
//! proceeds in passes so that entity-reference fields (`target: EntityId`
//! and similar) get rewritten from the scene's serialized ids to the live
//! handles the load just produced.

use std::any::TypeId;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::entity::EntityId;
use crate::error::{EcsError, Result};
use crate::reflection::Reflect;
use crate::world::World;

/// Scene format version this build writes and accepts. Any other value in
/// an incoming scene is rejected outright rather than guessed at.
pub const SCENE_VERSION: u32 = 1;

/// Upper bound on entities per scene; guards against a malformed or hostile
/// file driving an unbounded number of spawns.
const MAX_ENTITIES: usize = 4096;

/// Upper bound on one component's serialized JSON size. A component past
/// this is skipped rather than loaded, on the assumption that legitimate
/// gameplay components are small fixed-shape structs.
const MAX_COMPONENT_BYTES: usize = 512;

/// A serializable snapshot of world state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub version: u32,
    pub entities: Vec<EntityData>,
}

/// One entity's serialized components, keyed by registered type name.
/// `serde_json::Map` is BTreeMap-backed (the `preserve_order` feature isn't
/// enabled), so keys come out canonically sorted with no extra work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityData {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub parent: Option<u64>,
    pub components: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveStats {
    pub entities_written: usize,
    pub components_written: usize,
    pub components_skipped: usize,
}

#[derive(Debug, Clone, Default)]
pub struct WorldDeserializeResult {
    pub success: bool,
    pub error: Option<String>,
    pub entities_loaded: usize,
    pub components_loaded: usize,
    pub components_skipped: usize,
}

impl WorldDeserializeResult {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            entities_loaded: 0,
            components_loaded: 0,
            components_skipped: 0,
        }
    }
}

/// Per-type hooks a registered component needs for save/load, stored as
/// plain function pointers rather than a trait object: each generic
/// instantiation of `register::<T>`'s closures is its own zero-sized
/// function item, so they coerce to `fn` pointers with no boxing.
struct ComponentRegistration {
    type_name: &'static str,
    to_json: fn(&World, EntityId) -> Option<serde_json::Value>,
    from_json: fn(&mut World, EntityId, &serde_json::Value) -> Result<()>,
    remap: fn(&mut World, EntityId, &AHashMap<u64, EntityId>),
}

/// Binds a component type to the hooks needed to save and load it. A type
/// must be registered here before `save_world`/`deserialize_world` will
/// touch it; anything else on an entity is silently left out of the scene.
#[derive(Default)]
pub struct ComponentRegistry {
    by_type: AHashMap<TypeId, ComponentRegistration>,
    by_name: AHashMap<&'static str, TypeId>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T>(&mut self)
    where
        T: Reflect + Serialize + for<'de> Deserialize<'de> + Clone,
    {
        let type_id = TypeId::of::<T>();
        let type_name = std::any::type_name::<T>();

        let registration = ComponentRegistration {
            type_name,
            to_json: |world, entity| {
                world.get_component::<T>(entity).and_then(|c| serde_json::to_value(c).ok())
            },
            from_json: |world, entity, value| {
                let component: T = serde_json::from_value(value.clone())
                    .map_err(|e| EcsError::DeserializationError(e.to_string()))?;
                world.add_component(entity, component)
            },
            remap: |world, entity, remap| {
                if let Some(mut component) = world.get_component_mut::<T>(entity) {
                    component.remap_entities(remap);
                }
            },
        };

        self.by_name.insert(type_name, type_id);
        self.by_type.insert(type_id, registration);
    }

    fn get_by_type(&self, type_id: TypeId) -> Option<&ComponentRegistration> {
        self.by_type.get(&type_id)
    }

    fn get_by_name(&self, name: &str) -> Option<&ComponentRegistration> {
        let type_id = self.by_name.get(name)?;
        self.by_type.get(type_id)
    }

    pub fn is_registered(&self, type_id: TypeId) -> bool {
        self.by_type.contains_key(&type_id)
    }
}

/// Writes every live entity's registered components into a [`Scene`].
/// Unregistered component types on an entity (internal bookkeeping like
/// `Parent`/`Children`, or a type the caller never registered) are left out
/// without affecting `SaveStats`; only a registered type that fails to
/// serialize counts as skipped.
pub fn save_world(world: &World, registry: &ComponentRegistry) -> (Scene, SaveStats) {
    let mut scene = Scene {
        version: SCENE_VERSION,
        entities: Vec::new(),
    };
    let mut stats = SaveStats::default();

    for (_, archetype) in world.graph().iter() {
        for &entity in archetype.entities() {
            let mut components = serde_json::Map::new();
            for &type_id in archetype.signature() {
                let Some(registration) = registry.get_by_type(type_id) else {
                    continue;
                };
                match (registration.to_json)(world, entity) {
                    Some(value) => {
                        components.insert(registration.type_name.to_string(), value);
                        stats.components_written += 1;
                    }
                    None => stats.components_skipped += 1,
                }
            }
            scene.entities.push(EntityData {
                id: entity.to_bits(),
                parent: world.parent_of(entity).map(|p| p.to_bits()),
                components,
            });
            stats.entities_written += 1;
        }
    }

    (scene, stats)
}

fn approximate_byte_len(value: &serde_json::Value) -> usize {
    serde_json::to_string(value).map(|s| s.len()).unwrap_or(usize::MAX)
}

/// Loads a scene into `world`, purely additively: every entity is spawned
/// fresh, nothing already in `world` is touched or removed. Fails closed —
/// on a malformed scene, wrong version, oversized entity count or raw
/// unicode escapes in the input, nothing is spawned and the returned result
/// carries the reason in `error`.
///
/// Proceeds in passes: (1) spawn one empty entity per scene entity, building
/// a serialized-id -> live-handle map; (2) load each entity's registered
/// components; (3) rewrite every loaded component's `EntityId` fields
/// through the id map; (4) reattach parent/child links. Splitting (2) and
/// (3) means a component can reference an entity defined later in the scene.
pub fn deserialize_world(world: &mut World, json: &str, registry: &ComponentRegistry) -> WorldDeserializeResult {
    if json.contains("\\u") {
        return WorldDeserializeResult::failure("scene JSON may not contain unicode escapes");
    }

    let scene: Scene = match serde_json::from_str(json) {
        Ok(scene) => scene,
        Err(e) => return WorldDeserializeResult::failure(format!("malformed scene JSON: {e}")),
    };

    if scene.version != SCENE_VERSION {
        return WorldDeserializeResult::failure(format!(
            "unsupported scene version {} (expected {})",
            scene.version, SCENE_VERSION
        ));
    }

    if scene.entities.len() > MAX_ENTITIES {
        return WorldDeserializeResult::failure(format!(
            "scene has {} entities, exceeds the limit of {}",
            scene.entities.len(),
            MAX_ENTITIES
        ));
    }

    let mut remap: AHashMap<u64, EntityId> = AHashMap::with_capacity(scene.entities.len());
    let mut pending_parents: Vec<(EntityId, u64)> = Vec::new();

    for entity_data in &scene.entities {
        let live = world.spawn(());
        remap.insert(entity_data.id, live);
        if let Some(parent_id) = entity_data.parent {
            pending_parents.push((live, parent_id));
        }
    }
    let entities_loaded = scene.entities.len();

    let mut components_loaded = 0usize;
    let mut components_skipped = 0usize;
    let mut loaded: Vec<(EntityId, &'static str)> = Vec::new();

    for entity_data in &scene.entities {
        let live = remap[&entity_data.id];
        for (type_name, value) in &entity_data.components {
            if approximate_byte_len(value) > MAX_COMPONENT_BYTES {
                components_skipped += 1;
                continue;
            }
            let Some(registration) = registry.get_by_name(type_name) else {
                components_skipped += 1;
                continue;
            };
            match (registration.from_json)(world, live, value) {
                Ok(()) => {
                    components_loaded += 1;
                    loaded.push((live, registration.type_name));
                }
                Err(_) => components_skipped += 1,
            }
        }
    }

    for (entity, type_name) in &loaded {
        if let Some(registration) = registry.get_by_name(type_name) {
            (registration.remap)(world, *entity, &remap);
        }
    }

    for (child, parent_id) in pending_parents {
        if let Some(&parent) = remap.get(&parent_id) {
            if world.is_alive(child) && world.is_alive(parent) {
                world.set_parent(child, parent);
            }
        }
    }

    WorldDeserializeResult {
        success: true,
        error: None,
        entities_loaded,
        components_loaded,
        components_skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impl_reflect;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Pos {
        x: f32,
        y: f32,
        z: f32,
    }
    impl_reflect!(Pos);

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Targeting {
        target: EntityId,
        priority: u32,
    }
    impl_reflect!(Targeting, entities: [target]);

    fn registry() -> ComponentRegistry {
        let mut registry = ComponentRegistry::new();
        registry.register::<Pos>();
        registry.register::<Targeting>();
        registry
    }

    #[test]
    fn round_trips_a_plain_component() {
        let mut world = World::new();
        world.spawn((Pos { x: 10.0, y: 20.0, z: 30.0 },));
        let registry = registry();

        let (scene, stats) = save_world(&world, &registry);
        assert_eq!(stats.entities_written, 1);
        assert_eq!(stats.components_written, 1);

        let json = serde_json::to_string(&scene).unwrap();
        let mut loaded_world = World::new();
        let result = deserialize_world(&mut loaded_world, &json, &registry);
        assert!(result.success);
        assert_eq!(result.entities_loaded, 1);
        assert_eq!(result.components_loaded, 1);

        let (_, archetype) = loaded_world.graph().iter().find(|(_, a)| !a.is_empty()).unwrap();
        let entity = archetype.entities()[0];
        assert_eq!(loaded_world.get_component::<Pos>(entity), Some(&Pos { x: 10.0, y: 20.0, z: 30.0 }));
    }

    #[test]
    fn entity_reference_is_remapped_to_the_live_handle() {
        let mut world = World::new();
        let target = world.spawn((Pos { x: 10.0, y: 20.0, z: 30.0 },));
        world.spawn((Targeting { target, priority: 5 },));
        let registry = registry();

        let (scene, _) = save_world(&world, &registry);
        let json = serde_json::to_string(&scene).unwrap();

        let mut loaded_world = World::new();
        let result = deserialize_world(&mut loaded_world, &json, &registry);
        assert!(result.success);

        let mut seeker = None;
        for (_, archetype) in loaded_world.graph().iter() {
            for &entity in archetype.entities() {
                if let Some(t) = loaded_world.get_component::<Targeting>(entity) {
                    seeker = Some(t.target);
                }
            }
        }
        let remapped_target = seeker.expect("targeting component loaded");
        assert!(loaded_world.is_alive(remapped_target));
        assert_eq!(
            loaded_world.get_component::<Pos>(remapped_target),
            Some(&Pos { x: 10.0, y: 20.0, z: 30.0 })
        );
    }

    #[test]
    fn parent_links_are_reattached() {
        let mut world = World::new();
        let parent = world.spawn((Pos { x: 0.0, y: 0.0, z: 0.0 },));
        let child = world.spawn((Pos { x: 1.0, y: 1.0, z: 1.0 },));
        world.set_parent(child, parent);
        let registry = registry();

        let (scene, _) = save_world(&world, &registry);
        let json = serde_json::to_string(&scene).unwrap();

        let mut loaded_world = World::new();
        deserialize_world(&mut loaded_world, &json, &registry);

        let mut loaded_child = None;
        for (_, archetype) in loaded_world.graph().iter() {
            for &entity in archetype.entities() {
                if loaded_world.has_parent(entity) {
                    loaded_child = Some(entity);
                }
            }
        }
        let loaded_child = loaded_child.expect("child reattached under a parent");
        assert!(loaded_world.parent_of(loaded_child).is_some());
    }

    #[test]
    fn rejects_wrong_version() {
        let scene = Scene {
            version: 99,
            entities: Vec::new(),
        };
        let json = serde_json::to_string(&scene).unwrap();
        let mut world = World::new();
        let result = deserialize_world(&mut world, &json, &registry());
        assert!(!result.success);
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn rejects_malformed_json() {
        let mut world = World::new();
        let result = deserialize_world(&mut world, "{not json", &registry());
        assert!(!result.success);
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn rejects_unicode_escapes() {
        let json = "{\"version\":1,\"entities\":[{\"id\":1,\"components\":{\"note\":\"\\u0041\"}}]}";
        let mut world = World::new();
        let result = deserialize_world(&mut world, json, &registry());
        assert!(!result.success);
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn rejects_too_many_entities() {
        let entities = (0..MAX_ENTITIES + 1)
            .map(|i| EntityData {
                id: i as u64,
                parent: None,
                components: serde_json::Map::new(),
            })
            .collect();
        let scene = Scene {
            version: SCENE_VERSION,
            entities,
        };
        let json = serde_json::to_string(&scene).unwrap();
        let mut world = World::new();
        let result = deserialize_world(&mut world, &json, &registry());
        assert!(!result.success);
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn unknown_component_name_is_skipped_not_fatal() {
        let mut components = serde_json::Map::new();
        components.insert("nonexistent::Thing".to_string(), serde_json::json!({}));
        let scene = Scene {
            version: SCENE_VERSION,
            entities: vec![EntityData {
                id: 1,
                parent: None,
                components,
            }],
        };
        let json = serde_json::to_string(&scene).unwrap();
        let mut world = World::new();
        let result = deserialize_world(&mut world, &json, &registry());
        assert!(result.success);
        assert_eq!(result.entities_loaded, 1);
        assert_eq!(result.components_loaded, 0);
        assert_eq!(result.components_skipped, 1);
    }

    #[test]
    fn oversized_component_is_skipped() {
        let mut components = serde_json::Map::new();
        let long_string = "x".repeat(MAX_COMPONENT_BYTES * 2);
        components.insert(
            std::any::type_name::<Pos>().to_string(),
            serde_json::json!({ "x": 0.0, "y": 0.0, "z": 0.0, "padding": long_string }),
        );
        let scene = Scene {
            version: SCENE_VERSION,
            entities: vec![EntityData {
                id: 1,
                parent: None,
                components,
            }],
        };
        let json = serde_json::to_string(&scene).unwrap();
        let mut world = World::new();
        let result = deserialize_world(&mut world, &json, &registry());
        assert!(result.success);
        assert_eq!(result.components_skipped, 1);
        assert_eq!(result.components_loaded, 0);
    }
}
