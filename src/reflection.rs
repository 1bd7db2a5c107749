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

//! Component reflection. A component opts in by implementing [`Reflect`] (via
//! [`impl_reflect!`]), which gives world serialization enough information to
//! rewrite entity references after an additive load remaps every id. Field
//! access for JSON round-tripping itself goes through `serde`, not through
//! hand-rolled offsets — `ComponentRegistry` just needs a name, a
//! `Serialize`/`Deserialize` pair, and a way to fix up any `EntityId` fields.

use ahash::AHashMap;

use crate::entity::EntityId;

/// Primitive scalar kinds a reflected field can hold, per the binary
/// encoding in [`binary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Bool,
}

/// The shape of one reflected field. Descriptive metadata only — actual
/// get/set goes through `serde_json` on the whole component, not per field.
#[derive(Debug, Clone)]
pub enum FieldKind {
    Primitive(PrimitiveKind),
    Entity,
    Enum { variants: &'static [&'static str] },
    FixedArray { len: usize, element: Box<FieldKind> },
    FixedString { max_len: usize },
    Struct(Vec<ReflectField>),
}

#[derive(Debug, Clone)]
pub struct ReflectField {
    pub name: &'static str,
    pub offset: usize,
    pub size: usize,
    pub kind: FieldKind,
}

/// Opt-in reflection for a component type. The default is a type with no
/// entity references: `remap_entities` is a no-op. A type holding `EntityId`
/// fields (directly, or in a `Vec`) overrides it to rewrite them from
/// serialized cookies to the live handles a deserialize produced.
///
/// Implement via [`impl_reflect!`] rather than by hand in application code.
pub trait Reflect: 'static + Send + Sync {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn fields() -> &'static [ReflectField]
    where
        Self: Sized,
    {
        &[]
    }

    /// Rewrites this value's `EntityId` fields in place using `remap`
    /// (serialized id -> live handle). Ids with no entry are left untouched,
    /// since they may intentionally point outside the loaded scene.
    fn remap_entities(&mut self, remap: &AHashMap<u64, EntityId>) {
        let _ = remap;
    }
}

/// Implements [`Reflect`] for a component type.
///
/// ```ignore
/// impl_reflect!(Pos);
/// impl_reflect!(Targeting, entities: [target]);
/// impl_reflect!(Squad, entity_vecs: [members]);
/// ```
#[macro_export]
macro_rules! impl_reflect {
    ($t:ty) => {
        impl $crate::reflection::Reflect for $t {}
    };

    ($t:ty, entities: [$($field:ident),+ $(,)?]) => {
        impl $crate::reflection::Reflect for $t {
            fn remap_entities(&mut self, remap: &ahash::AHashMap<u64, $crate::entity::EntityId>) {
                $(
                    if let Some(&live) = remap.get(&self.$field.to_bits()) {
                        self.$field = live;
                    }
                )+
            }
        }
    };

    ($t:ty, entity_vecs: [$($field:ident),+ $(,)?]) => {
        impl $crate::reflection::Reflect for $t {
            fn remap_entities(&mut self, remap: &ahash::AHashMap<u64, $crate::entity::EntityId>) {
                $(
                    for entity in self.$field.iter_mut() {
                        if let Some(&live) = remap.get(&entity.to_bits()) {
                            *entity = live;
                        }
                    }
                )+
            }
        }
    };
}

/// Binary encoding for reflected fields, independent of the JSON scene
/// format. Little-endian; matches the wire shape a non-Rust peer would
/// produce from the same reflection metadata.
pub mod binary {
    use crate::entity::EntityId;

    /// Max payload length for the default `FixedString` encoding.
    pub const FIXED_STRING_MAX_LEN: usize = 22;

    pub fn write_bool(out: &mut Vec<u8>, value: bool) {
        out.push(value as u8);
    }

    pub fn write_i32(out: &mut Vec<u8>, value: i32) {
        out.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32(out: &mut Vec<u8>, value: u32) {
        out.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f32(out: &mut Vec<u8>, value: f32) {
        out.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f64(out: &mut Vec<u8>, value: f64) {
        out.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_entity(out: &mut Vec<u8>, entity: EntityId) {
        out.extend_from_slice(&entity.to_bits().to_le_bytes());
    }

    pub fn read_entity(bytes: &[u8]) -> Option<(EntityId, &[u8])> {
        if bytes.len() < 8 {
            return None;
        }
        let (head, rest) = bytes.split_at(8);
        let bits = u64::from_le_bytes(head.try_into().ok()?);
        Some((EntityId::from_bits(bits), rest))
    }

    /// Length-prefixed UTF-8 bytes, no null terminator. `s` longer than
    /// [`FIXED_STRING_MAX_LEN`] is truncated at a char boundary.
    pub fn write_fixed_string(out: &mut Vec<u8>, s: &str) {
        let mut len = s.len().min(FIXED_STRING_MAX_LEN);
        while len > 0 && !s.is_char_boundary(len) {
            len -= 1;
        }
        out.push(len as u8);
        out.extend_from_slice(&s.as_bytes()[..len]);
    }

    pub fn read_fixed_string(bytes: &[u8]) -> Option<(String, &[u8])> {
        let (&len, rest) = bytes.split_first()?;
        if rest.len() < len as usize {
            return None;
        }
        let (data, rest) = rest.split_at(len as usize);
        let s = std::str::from_utf8(data).ok()?.to_string();
        Some((s, rest))
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn fixed_string_round_trips_under_the_limit() {
            let mut buf = Vec::new();
            write_fixed_string(&mut buf, "hello");
            let (s, rest) = read_fixed_string(&buf).unwrap();
            assert_eq!(s, "hello");
            assert!(rest.is_empty());
        }

        #[test]
        fn fixed_string_truncates_past_the_limit() {
            let long = "x".repeat(40);
            let mut buf = Vec::new();
            write_fixed_string(&mut buf, &long);
            assert_eq!(buf[0] as usize, FIXED_STRING_MAX_LEN);
            assert_eq!(buf.len(), 1 + FIXED_STRING_MAX_LEN);
        }

        #[test]
        fn entity_round_trips_through_bytes() {
            let mut buf = Vec::new();
            let id = EntityId::new(3, 1, 0);
            write_entity(&mut buf, id);
            let (back, rest) = read_entity(&buf).unwrap();
            assert_eq!(back, id);
            assert!(rest.is_empty());
        }
    }
}
