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

//! Max bandwidth tracker.
//!
//! The bottleneck bandwidth is estimated as the maximum delivery rate sample
//! observed during the last `window_rounds` round trips, where a round trip
//! is measured with the current min RTT estimate. The horizon therefore
//! adapts to the path RTT instead of being a fixed wall clock window.

use std::time::Duration;
use std::time::Instant;

use log::*;

use super::minmax::MinMax;

/// A delivery rate sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandwidthSample {
    /// Round count when the sample was taken.
    pub round: u64,

    /// Delivery rate in bits per second.
    pub bandwidth: u64,
}

#[derive(Debug)]
pub struct BandwidthFilter {
    /// Bandwidth samples keyed by the time they were taken.
    window: MinMax<BandwidthSample>,

    /// Horizon of the window in multiples of the RTT estimate.
    window_rounds: u32,
}

impl BandwidthFilter {
    pub fn new(window_rounds: u64) -> Self {
        Self {
            window: MinMax::new(),
            window_rounds: u32::try_from(window_rounds).unwrap_or(u32::MAX),
        }
    }

    /// Add a delivery rate sample taken at `now` during `round`.
    pub fn add_sample(&mut self, bandwidth: u64, now: Instant, round: u64) {
        self.window.insert(now, BandwidthSample { round, bandwidth });
    }

    /// Maximum bandwidth in the window, or `None` if there is no sample.
    pub fn max_bw(&self) -> Option<u64> {
        self.window
            .max_by_key(|s| s.bandwidth)
            .map(|s| s.bandwidth)
    }

    /// The sample holding the maximum bandwidth.
    pub fn max_sample(&self) -> Option<BandwidthSample> {
        self.window.max_by_key(|s| s.bandwidth)
    }

    /// Remove the samples older than `now - rtt * window_rounds`.
    ///
    /// Without an RTT estimate or without any bandwidth sample, there is no
    /// valid horizon and the window is left unchanged.
    pub fn cull(&mut self, now: Instant, rtt: Option<Duration>) -> usize {
        let rtt = match rtt {
            Some(rtt) if !self.window.is_empty() => rtt,
            _ => return 0,
        };

        let horizon = match now.checked_sub(rtt.saturating_mul(self.window_rounds)) {
            Some(v) => v,
            None => return 0,
        };

        let culled = self.window.cull(horizon);
        if culled > 0 {
            trace!(
                "bw window culled {}, size {} span {:?}",
                culled,
                self.window.len(),
                self.window.span()
            );
        }
        culled
    }
}
