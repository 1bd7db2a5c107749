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

//! Error types.
//!
//! Precondition violations (dead entity passed to a component accessor,
//! borrowing the same archetype twice) assert in debug rather than
//! returning an error here; liveness-gated operations return `Option`/
//! `bool`/no-op instead. This enum only covers the handful of genuinely
//! fallible operations a caller needs to recover from at runtime.

use std::fmt;

/// ECS error type
#[derive(Debug, Clone)]
pub enum EcsError {
    /// A registered component failed to deserialize from a scene's JSON value.
    DeserializationError(String),

    /// `spawn_batch` was asked to spawn more entities than `MAX_BATCH_SPAWN`
    /// in one call.
    BatchTooLarge,
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::DeserializationError(msg) => write!(f, "deserialization error: {msg}"),
            EcsError::BatchTooLarge => write!(f, "batch size exceeds the maximum allowed per spawn_batch call"),
        }
    }
}

impl std::error::Error for EcsError {}

/// Result type alias
pub type Result<T> = std::result::Result<T, EcsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_stable() {
        assert_eq!(EcsError::BatchTooLarge.to_string(), "batch size exceeds the maximum allowed per spawn_batch call");
        assert_eq!(
            EcsError::DeserializationError("bad field".into()).to_string(),
            "deserialization error: bad field"
        );
    }
}
