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

//! Min RTT tracker.
//!
//! The round-trip propagation delay of the path is estimated as the minimum
//! RTT sample observed during the last `rtt_window` (10 seconds by default)
//! of wall clock time.

use std::time::Duration;
use std::time::Instant;

use log::*;

use super::minmax::MinMax;

#[derive(Debug)]
pub struct RttFilter {
    /// RTT samples keyed by the time they were taken.
    window: MinMax<Duration>,

    /// Wall clock horizon of the window.
    horizon: Duration,

    /// The last time a new minimum was observed. The clock starts with the
    /// first accepted sample.
    last_min_rtt_change: Option<Instant>,
}

impl RttFilter {
    pub fn new(horizon: Duration) -> Self {
        Self {
            window: MinMax::new(),
            horizon,
            last_min_rtt_change: None,
        }
    }

    /// Add an RTT sample taken at `now`.
    ///
    /// Zero samples are rejected. Return true if the sample was stored.
    pub fn add_sample(&mut self, rtt: Duration, now: Instant) -> bool {
        if rtt.is_zero() {
            warn!("RTT measured is zero, not stored");
            return false;
        }

        match self.min_rtt() {
            Some(min_rtt) if rtt >= min_rtt => (),
            min_rtt => {
                trace!(
                    "new min rtt {}us (was {:?})",
                    rtt.as_micros(),
                    min_rtt.map(|v| v.as_micros())
                );
                self.last_min_rtt_change = Some(now);
            }
        }

        self.window.insert(now, rtt);
        true
    }

    /// Minimum RTT in the window, or `None` if there is no sample.
    pub fn min_rtt(&self) -> Option<Duration> {
        self.window.min()
    }

    /// Remove the samples older than `now - horizon`.
    pub fn cull(&mut self, now: Instant) -> usize {
        let horizon = match now.checked_sub(self.horizon) {
            Some(v) => v,
            None => return 0,
        };

        let culled = self.window.cull(horizon);
        if culled > 0 {
            trace!(
                "rtt window culled {}, size {} span {:?}",
                culled,
                self.window.len(),
                self.window.span()
            );
        }
        culled
    }

    /// The last time the min RTT decreased.
    pub fn last_min_rtt_change(&self) -> Option<Instant> {
        self.last_min_rtt_change
    }

    /// Restart the staleness clock of the min RTT.
    pub fn reset_min_rtt_change(&mut self, now: Instant) {
        self.last_min_rtt_change = Some(now);
    }

    /// Whether the min RTT has not decreased for longer than `interval`.
    ///
    /// Never stale before the first sample.
    pub fn is_stale(&self, now: Instant, interval: Duration) -> bool {
        self.last_min_rtt_change
            .map_or(false, |t| now.saturating_duration_since(t) > interval)
    }
}
