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

/// Full pipe estimator, used mainly during Startup mode.
///
/// Startup ends once the bandwidth estimate has plateaued: after
/// `full_bw_rounds` consecutive rounds in which it did not grow by at least
/// `threshold` times the last recorded baseline, the pipe is considered
/// filled.
#[derive(Debug)]
pub struct FullPipeEstimator {
    /// Whether the flow has ever fully utilized its available bandwidth.
    is_filled_pipe: bool,

    /// Baseline level delivery rate.
    full_bw: u64,

    /// The number of rounds without much growth.
    full_bw_count: u64,

    /// Required growth factor.
    threshold: f64,

    /// Rounds without growth before the pipe is filled.
    full_bw_rounds: u64,
}

impl FullPipeEstimator {
    pub fn new(threshold: f64, full_bw_rounds: u64) -> Self {
        Self {
            is_filled_pipe: false,
            full_bw: 0,
            full_bw_count: 0,
            threshold,
            full_bw_rounds,
        }
    }

    /// Check for a plateau of the bandwidth estimate, once per round.
    ///
    /// Return true if the pipe is filled.
    pub fn on_round_start(&mut self, btlbw: u64) -> bool {
        if self.is_filled_pipe {
            return true;
        }

        // Still growing?
        if btlbw as f64 >= self.full_bw as f64 * self.threshold {
            // record new baseline level
            self.full_bw = btlbw;
            self.full_bw_count = 0;
            return false;
        }

        // another round w/o much growth
        self.full_bw_count += 1;
        if self.full_bw_count >= self.full_bw_rounds {
            self.is_filled_pipe = true;
        }

        self.is_filled_pipe
    }

    pub fn is_filled_pipe(&self) -> bool {
        self.is_filled_pipe
    }

    /// Baseline bandwidth of the plateau check.
    pub fn full_bw(&self) -> u64 {
        self.full_bw
    }
}
