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

//! BBR' state machine.
//!
//! Each state carries only the data it needs. Transitions are computed by
//! [`BbrState::next`], a pure function of the current state and of what the
//! controller observed on the latest ACK.

use std::time::Duration;
use std::time::Instant;

use strum_macros::Display;
use strum_macros::EnumIter;
use strum_macros::IntoStaticStr;

use crate::Config;

/// BBRGainCycleLen: the number of phases in the ProbeBW gain cycle.
pub const GAIN_CYCLE_LEN: usize = 8;

/// Index of the probing phase in the ProbeBW gain cycle.
const PROBE_PHASE: usize = 0;

/// Index of the draining phase in the ProbeBW gain cycle.
pub const DRAIN_PHASE: usize = 1;

/// Name of a BBR' state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr, EnumIter)]
pub enum BbrStateKind {
    Startup,
    Drain,
    ProbeBw,
    ProbeRtt,
}

/// BBR' state with its state-local data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BbrState {
    /// Exponential search for the bottleneck bandwidth.
    Startup,

    /// Drain the queue built during Startup.
    Drain,

    /// Steady state, cycling the pacing gain to probe for more bandwidth.
    ProbeBw {
        /// Current index in the gain cycle.
        cycle_index: usize,

        /// Round in which the current phase started.
        cycle_start_round: u64,
    },

    /// Clamp the congestion window to refresh the min RTT estimate.
    ProbeRtt {
        /// When ProbeRTT was entered.
        entered: Instant,

        /// When ProbeRTT may end. Set once in-flight data has fallen to the
        /// congestion window floor.
        done_stamp: Option<Instant>,
    },
}

/// What the controller observed when evaluating a transition.
#[derive(Debug, Clone, Copy)]
pub struct StateInput {
    /// Time of the ACK.
    pub now: Instant,

    /// Current round count.
    pub round: u64,

    /// Whether Startup has filled the pipe.
    pub filled_pipe: bool,

    /// Bytes in flight reported on the latest transmission.
    pub bytes_in_flight: u64,

    /// Estimated bandwidth-delay product in bytes.
    pub bdp: u64,

    /// Congestion window floor in bytes.
    pub min_cwnd: u64,

    /// Whether the min RTT has not decreased for the ProbeRTT interval.
    pub min_rtt_expired: bool,

    /// Current RTT estimate.
    pub rtt: Duration,
}

impl BbrState {
    /// Name of the state.
    pub fn kind(&self) -> BbrStateKind {
        match self {
            BbrState::Startup => BbrStateKind::Startup,
            BbrState::Drain => BbrStateKind::Drain,
            BbrState::ProbeBw { .. } => BbrStateKind::ProbeBw,
            BbrState::ProbeRtt { .. } => BbrStateKind::ProbeRtt,
        }
    }

    /// Pacing gain and cwnd gain of the state.
    pub fn gains(&self, conf: &Config) -> (f64, f64) {
        match self {
            BbrState::Startup => (conf.startup_gain, conf.startup_gain),

            BbrState::Drain => (1.0 / conf.startup_gain, 1.0 / conf.startup_gain),

            BbrState::ProbeBw { cycle_index, .. } => {
                (pacing_gain_cycle(conf, *cycle_index), conf.probe_bw_cwnd_gain)
            }

            BbrState::ProbeRtt { .. } => (1.0, 1.0),
        }
    }

    /// Compute the next state.
    pub fn next(self, input: &StateInput) -> BbrState {
        match self {
            // Leave Startup once the bandwidth estimate has plateaued.
            BbrState::Startup if input.filled_pipe => BbrState::Drain,
            BbrState::Startup => self,

            // Leave Drain once the queue built in Startup is gone.
            BbrState::Drain if input.bytes_in_flight <= input.bdp => enter_probe_bw(input),
            BbrState::Drain => self,

            BbrState::ProbeBw { .. } if input.min_rtt_expired => BbrState::ProbeRtt {
                entered: input.now,
                done_stamp: None,
            },

            // Each phase lasts one round.
            BbrState::ProbeBw {
                cycle_index,
                cycle_start_round,
            } if input.round > cycle_start_round => BbrState::ProbeBw {
                cycle_index: (cycle_index + 1) % GAIN_CYCLE_LEN,
                cycle_start_round: input.round,
            },
            BbrState::ProbeBw { .. } => self,

            // Hold the floor for one RTT once in-flight data has drained. An
            // RTT estimate beyond the clock range ends the hold right away.
            BbrState::ProbeRtt {
                entered,
                done_stamp: None,
            } if input.bytes_in_flight <= input.min_cwnd => BbrState::ProbeRtt {
                entered,
                done_stamp: Some(input.now.checked_add(input.rtt).unwrap_or(input.now)),
            },

            BbrState::ProbeRtt {
                done_stamp: Some(done),
                ..
            } if input.now >= done => {
                if input.filled_pipe {
                    enter_probe_bw(input)
                } else {
                    BbrState::Startup
                }
            }

            BbrState::ProbeRtt { .. } => self,
        }
    }
}

/// ProbeBW starts in the probing phase. The controller may pick another
/// initial phase on entry.
fn enter_probe_bw(input: &StateInput) -> BbrState {
    BbrState::ProbeBw {
        cycle_index: PROBE_PHASE,
        cycle_start_round: input.round,
    }
}

/// Pacing gain of a phase of the ProbeBW gain cycle:
/// `[1.25, 0.75, 1, 1, 1, 1, 1, 1]` with the default factors.
pub fn pacing_gain_cycle(conf: &Config, cycle_index: usize) -> f64 {
    match cycle_index % GAIN_CYCLE_LEN {
        PROBE_PHASE => conf.steady_factor + conf.probe_factor,
        DRAIN_PHASE => conf.steady_factor - conf.drain_factor,
        _ => conf.steady_factor,
    }
}
