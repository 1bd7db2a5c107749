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

//! Wrap-aware tick counters used for change detection.
//!
//! `World::update` increments the world tick once before running systems, so
//! a component written during tick N carries `changed == N` and a query
//! evaluated later that same tick sees it as changed relative to the
//! system's `last_run_tick` captured at the previous tick boundary.

use std::cmp::Ordering;

/// A single point in logical time. Wraps around `u32::MAX` via two's
/// complement subtraction, so comparisons stay correct across overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tick(pub u32);

impl Tick {
    pub const ZERO: Tick = Tick(0);

    pub fn new(value: u32) -> Self {
        Tick(value)
    }

    /// True if `self` is strictly newer than `other`, wrap-aware.
    pub fn is_newer_than(self, other: Tick) -> bool {
        (self.0.wrapping_sub(other.0) as i32) > 0
    }
}

impl PartialOrd for Tick {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tick {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.0 == other.0 {
            Ordering::Equal
        } else if self.is_newer_than(*other) {
            Ordering::Greater
        } else {
            Ordering::Less
        }
    }
}

/// Per-row bookkeeping for change detection: the tick a component was last
/// added at and the tick it was last structurally written through.
#[derive(Debug, Clone, Copy)]
pub struct ComponentTicks {
    pub added: Tick,
    pub changed: Tick,
}

impl ComponentTicks {
    pub fn new(tick: Tick) -> Self {
        Self {
            added: tick,
            changed: tick,
        }
    }

    pub fn is_added(&self, since: Tick) -> bool {
        self.added.is_newer_than(since)
    }

    pub fn is_changed(&self, since: Tick) -> bool {
        self.changed.is_newer_than(since)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_than_handles_wraparound() {
        let a = Tick(u32::MAX);
        let b = Tick(0);
        assert!(b.is_newer_than(a));
        assert!(!a.is_newer_than(b));
    }

    #[test]
    fn component_ticks_detect_change() {
        let ticks = ComponentTicks::new(Tick(5));
        assert!(ticks.is_added(Tick(4)));
        assert!(!ticks.is_added(Tick(5)));
        assert!(ticks.is_changed(Tick(4)));
    }
}
