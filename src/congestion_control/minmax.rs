// Copyright (c) 2023 The TQUIC Authors.
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

//! A windowed min/max tracker.
//!
//! Unlike the three-sample approximation of Kathleen Nichols' algorithm, this
//! tracker keeps every sample of the window, keyed by the time it was taken,
//! so the reported min/max is always the exact extremum of the samples that
//! are still inside the window.
//!
//! Samples are never dropped on insertion. The owner decides the horizon of
//! the window and removes expired samples explicitly with [`MinMax::cull`],
//! which lets the horizon be expressed in different units (wall clock time
//! for RTT, round trips for bandwidth).

use std::collections::BTreeMap;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct MinMax<T> {
    /// Samples ordered by the time they were taken. A later sample taken at
    /// the same instant replaces the earlier one.
    samples: BTreeMap<Instant, T>,
}

impl<T: Copy> MinMax<T> {
    pub fn new() -> Self {
        Self {
            samples: BTreeMap::new(),
        }
    }

    /// Add a sample taken at `time`.
    pub fn insert(&mut self, time: Instant, value: T) {
        self.samples.insert(time, value);
    }

    /// Remove every sample taken strictly before `horizon`.
    ///
    /// Return the number of removed samples.
    pub fn cull(&mut self, horizon: Instant) -> usize {
        let before = self.samples.len();
        self.samples = self.samples.split_off(&horizon);
        before - self.samples.len()
    }

    /// Get the maximal sample according to the given key.
    pub fn max_by_key<K: Ord>(&self, f: impl FnMut(&T) -> K) -> Option<T> {
        self.samples.values().copied().max_by_key(f)
    }

    /// Time of the oldest and newest samples in the window.
    pub fn span(&self) -> Option<(Instant, Instant)> {
        let first = self.samples.keys().next()?;
        let last = self.samples.keys().next_back()?;
        Some((*first, *last))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl<T: Copy + Ord> MinMax<T> {
    /// Get the min value.
    pub fn min(&self) -> Option<T> {
        self.samples.values().copied().min()
    }
}

impl<T: Copy> Default for MinMax<T> {
    fn default() -> Self {
        Self::new()
    }
}
