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

//! Typed observers. An observer is registered against a `(Trigger, TypeId)`
//! pair and invoked synchronously, in registration order, before the
//! mutating `World` call that triggered it returns.
//!
//! Observers must not perform structural mutation on the world that's
//! dispatching them; `World` enforces this with a re-entrancy flag rather
//! than this module, since the flag has to guard every structural entry
//! point (`spawn`, `despawn`, `add_component`, `remove_component`).

use std::any::TypeId;

use ahash::AHashMap;

use crate::entity::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    OnAdd,
    OnRemove,
    OnSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub u32);

enum Callback {
    WithComponent(Box<dyn FnMut(EntityId, *const u8) + Send + Sync>),
    EntityOnly(Box<dyn FnMut(EntityId) + Send + Sync>),
}

struct ObserverEntry {
    id: ObserverId,
    name: String,
    enabled: bool,
    callback: Callback,
}

/// Storage for every registered observer, keyed by `(trigger, component
/// type)`. Lookups during dispatch are a single hash-map probe plus a
/// linear scan over the (usually short) list of observers on that key.
#[derive(Default)]
pub struct ObserverRegistry {
    entries: AHashMap<(Trigger, TypeId), Vec<ObserverEntry>>,
    next_id: u32,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&mut self, trigger: Trigger, type_id: TypeId, name: &str, callback: Callback) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.entries.entry((trigger, type_id)).or_default().push(ObserverEntry {
            id,
            name: name.to_string(),
            enabled: true,
            callback,
        });
        id
    }

    pub fn register_with_component<T: 'static>(
        &mut self,
        trigger: Trigger,
        name: &str,
        mut f: impl FnMut(EntityId, &T) + Send + Sync + 'static,
    ) -> ObserverId {
        let callback = Callback::WithComponent(Box::new(move |entity, ptr| {
            let value = unsafe { &*(ptr as *const T) };
            f(entity, value);
        }));
        self.register(trigger, TypeId::of::<T>(), name, callback)
    }

    pub fn register_entity_only<T: 'static>(
        &mut self,
        trigger: Trigger,
        name: &str,
        f: impl FnMut(EntityId) + Send + Sync + 'static,
    ) -> ObserverId {
        self.register(trigger, TypeId::of::<T>(), name, Callback::EntityOnly(Box::new(f)))
    }

    pub fn set_enabled(&mut self, id: ObserverId, enabled: bool) -> bool {
        for entries in self.entries.values_mut() {
            if let Some(entry) = entries.iter_mut().find(|e| e.id == id) {
                entry.enabled = enabled;
                return true;
            }
        }
        false
    }

    pub fn unregister(&mut self, id: ObserverId) -> bool {
        for entries in self.entries.values_mut() {
            if let Some(pos) = entries.iter().position(|e| e.id == id) {
                entries.remove(pos);
                return true;
            }
        }
        false
    }

    /// Invokes every enabled observer registered for `(trigger, type_id)`,
    /// in registration order, passing `component_ptr` to those that asked
    /// for the component value.
    pub fn dispatch(&mut self, trigger: Trigger, type_id: TypeId, entity: EntityId, component_ptr: *const u8) {
        if let Some(entries) = self.entries.get_mut(&(trigger, type_id)) {
            for entry in entries.iter_mut().filter(|e| e.enabled) {
                match &mut entry.callback {
                    Callback::WithComponent(f) => f(entity, component_ptr),
                    Callback::EntityOnly(f) => f(entity),
                }
            }
        }
    }

    pub fn observer_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn names_for(&self, trigger: Trigger, type_id: TypeId) -> Vec<&str> {
        self.entries
            .get(&(trigger, type_id))
            .map(|entries| entries.iter().map(|e| e.name.as_str()).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn registry_starts_empty() {
        let registry = ObserverRegistry::new();
        assert_eq!(registry.observer_count(), 0);
    }

    #[test]
    fn dispatch_invokes_component_observer_with_value() {
        let mut registry = ObserverRegistry::new();
        let received = Arc::new(Mutex::new(0i32));
        let received_clone = received.clone();
        registry.register_with_component::<i32>(Trigger::OnAdd, "capture", move |_e, v| {
            *received_clone.lock().unwrap() = *v;
        });

        let value: i32 = 42;
        registry.dispatch(Trigger::OnAdd, TypeId::of::<i32>(), EntityId::new(0, 0, 0), &value as *const i32 as *const u8);
        assert_eq!(*received.lock().unwrap(), 42);
    }

    #[test]
    fn disabled_observer_does_not_fire() {
        let mut registry = ObserverRegistry::new();
        let calls = Arc::new(Mutex::new(0));
        let calls_clone = calls.clone();
        let id = registry.register_entity_only::<i32>(Trigger::OnRemove, "count", move |_e| {
            *calls_clone.lock().unwrap() += 1;
        });
        registry.set_enabled(id, false);
        registry.dispatch(Trigger::OnRemove, TypeId::of::<i32>(), EntityId::new(0, 0, 0), std::ptr::null());
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[test]
    fn observers_fire_in_registration_order() {
        let mut registry = ObserverRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let o1 = order.clone();
        let o2 = order.clone();
        registry.register_entity_only::<i32>(Trigger::OnAdd, "first", move |_e| o1.lock().unwrap().push(1));
        registry.register_entity_only::<i32>(Trigger::OnAdd, "second", move |_e| o2.lock().unwrap().push(2));
        registry.dispatch(Trigger::OnAdd, TypeId::of::<i32>(), EntityId::new(0, 0, 0), std::ptr::null());
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }
}
