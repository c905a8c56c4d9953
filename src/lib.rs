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

//! BBR' is the congestion control decision core of a TCP sender.
//!
//! Given a stream of delivery acknowledgments, it estimates the bottleneck
//! bandwidth and the minimum round-trip time of the path, runs a four-state
//! model-based probing state machine (Startup, Drain, ProbeBW and ProbeRTT)
//! and derives from that state two outputs: a pacing rate and a congestion
//! window.
//!
//! ## Integration
//!
//! The transport layer owning the socket calls into the controller on two
//! events and reads back the outputs:
//!
//! * [`CongestionController::on_send`] before a segment goes out, which
//!   returns the congestion window in bytes.
//! * [`CongestionController::on_ack`] when an acknowledgment arrives, which
//!   returns the pacing rate in bits per second (or `None` if pacing is
//!   administratively disabled).
//!
//! Each flow owns an independent controller. All tunables are grouped in a
//! single [`Config`] handed over at construction.
//!
//! ```
//! use std::time::{Duration, Instant};
//! use bbr_prime::{Bbr, CongestionController};
//!
//! let mut bbr = Bbr::new(bbr_prime::Config::new());
//! let now = Instant::now();
//!
//! let cwnd = bbr.on_send(now, 1500, 0, 1500);
//! assert_eq!(cwnd, 4 * 1500);
//!
//! let rate = bbr.on_ack(now + Duration::from_millis(20), 1500, Duration::from_millis(20));
//! assert!(rate.is_some());
//! ```

#![allow(dead_code)]

use std::cmp;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use serde_with::serde_as;
use serde_with::DurationMicroSeconds;

/// Version of the BBR' algorithm.
pub const VERSION: &str = "1.3";

/// Initial RTT estimate, used before any RTT sample is available.
pub const INITIAL_RTT: Duration = Duration::from_millis(1);

/// Initial bandwidth estimate in bits per second, used before any delivery
/// rate sample is available.
pub const INITIAL_BANDWIDTH: u64 = 6_000_000;

/// Length of the min RTT window in wall clock time.
const RTT_WINDOW: Duration = Duration::from_secs(10);

/// Length of the max bandwidth window in multiples of the RTT estimate.
const BANDWIDTH_WINDOW_ROUNDS: u64 = 10;

/// Default segment size in bytes.
pub const DEFAULT_MAX_SEGMENT_SIZE: u64 = 1500;

/// Congestion window floor in segments.
const MIN_CWND_PACKETS: u64 = 4;

/// Roughly `2/ln(2)`, the smallest gain that doubles the sending rate every
/// round trip.
const STARTUP_GAIN: f64 = 2.89;

/// Bandwidth growth needed to stay in Startup.
const STARTUP_THRESHOLD: f64 = 1.25;

/// Rounds without enough bandwidth growth before leaving Startup.
const STARTUP_FULL_BW_ROUNDS: u64 = 3;

/// Added to the steady gain in the probing phase of ProbeBW.
const PROBE_FACTOR: f64 = 0.25;

/// Removed from the steady gain in the draining phase of ProbeBW.
const DRAIN_FACTOR: f64 = 0.25;

/// Pacing gain of the cruising phases of ProbeBW.
const STEADY_FACTOR: f64 = 1.0;

/// Congestion window gain in ProbeBW.
const PROBE_BW_CWND_GAIN: f64 = 2.0;

/// Fraction of the bandwidth estimate used as pacing rate when cruising.
const PACING_FACTOR: f64 = 0.95;

/// Enter ProbeRTT if the min RTT has not changed for this long.
const PROBE_RTT_INTERVAL: Duration = Duration::from_secs(10);

/// Upper bound for any configurable gain.
const MAX_GAIN: f64 = 10.0;

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Tunables of a BBR' controller.
///
/// A configuration is built once and moved into [`Bbr::new`]. Setters clamp
/// out-of-range values into the accepted range and ignore `NaN`, so a
/// configuration built through them is always valid. Configurations loaded
/// with [`Config::from_json`] are validated instead.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// RTT estimate used while the RTT window is empty.
    #[serde_as(as = "DurationMicroSeconds<u64>")]
    pub(crate) initial_rtt: Duration,

    /// Bandwidth estimate (bits/s) used while the bandwidth window is empty.
    pub(crate) initial_bandwidth: u64,

    /// Wall clock horizon of the min RTT window.
    #[serde_as(as = "DurationMicroSeconds<u64>")]
    pub(crate) rtt_window: Duration,

    /// Horizon of the max bandwidth window, in RTT estimates.
    pub(crate) bandwidth_window_rounds: u64,

    /// Segment size in bytes.
    pub(crate) max_segment_size: u64,

    /// Congestion window floor in segments.
    pub(crate) min_cwnd_packets: u64,

    /// Pacing and cwnd gain in Startup.
    pub(crate) startup_gain: f64,

    /// Bandwidth growth factor that keeps the flow in Startup.
    pub(crate) startup_threshold: f64,

    /// Rounds without growth before the pipe is considered full.
    pub(crate) startup_full_bw_rounds: u64,

    /// ProbeBW probing phase gain is `steady_factor + probe_factor`.
    pub(crate) probe_factor: f64,

    /// ProbeBW draining phase gain is `steady_factor - drain_factor`.
    pub(crate) drain_factor: f64,

    /// ProbeBW cruising phase gain.
    pub(crate) steady_factor: f64,

    /// Cwnd gain in ProbeBW.
    pub(crate) probe_bw_cwnd_gain: f64,

    /// Pacing rate scale-down applied when the pacing gain is 1.
    pub(crate) pacing_factor: f64,

    /// Min RTT staleness that triggers ProbeRTT.
    #[serde_as(as = "DurationMicroSeconds<u64>")]
    pub(crate) probe_rtt_interval: Duration,

    /// Whether the transport paces its segments.
    pub(crate) enable_pacing: bool,

    /// Randomize the initial phase of the ProbeBW gain cycle.
    pub(crate) randomize_probe_bw_phase: bool,
}

impl Config {
    /// Create default configuration.
    ///
    /// The configuration may be customized by calling related set methods.
    ///
    /// ## Examples:
    ///
    /// ```
    /// let mut conf = bbr_prime::Config::new();
    /// conf.enable_pacing(false);
    /// conf.set_max_segment_size(1000);
    /// let bbr = bbr_prime::Bbr::new(conf);
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a JSON document.
    ///
    /// Missing fields take their default values. Durations are expressed in
    /// microseconds.
    pub fn from_json(json: &str) -> Result<Self> {
        let conf: Config = serde_json::from_str(json)?;
        conf.validate()?;
        Ok(conf)
    }

    /// Serialize the configuration into a JSON document.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Check that every tunable lies in its accepted range.
    pub fn validate(&self) -> Result<()> {
        fn check(ok: bool, name: &str) -> Result<()> {
            if ok {
                Ok(())
            } else {
                Err(Error::InvalidConfig(format!("{} is out of range", name)))
            }
        }

        check(!self.initial_rtt.is_zero(), "initial_rtt")?;
        check(!self.rtt_window.is_zero(), "rtt_window")?;
        check(!self.probe_rtt_interval.is_zero(), "probe_rtt_interval")?;
        check(self.bandwidth_window_rounds > 0, "bandwidth_window_rounds")?;
        check(self.max_segment_size > 0, "max_segment_size")?;
        check(self.min_cwnd_packets > 0, "min_cwnd_packets")?;
        check(self.startup_full_bw_rounds > 0, "startup_full_bw_rounds")?;
        check(
            (1.0..=MAX_GAIN).contains(&self.startup_gain),
            "startup_gain",
        )?;
        check(
            (1.0..=MAX_GAIN).contains(&self.startup_threshold),
            "startup_threshold",
        )?;
        check((0.0..=1.0).contains(&self.probe_factor), "probe_factor")?;
        check((0.0..1.0).contains(&self.drain_factor), "drain_factor")?;
        check(
            self.steady_factor > 0.0 && self.steady_factor <= MAX_GAIN,
            "steady_factor",
        )?;
        check(
            (1.0..=MAX_GAIN).contains(&self.probe_bw_cwnd_gain),
            "probe_bw_cwnd_gain",
        )?;
        check(
            self.pacing_factor > 0.0 && self.pacing_factor <= 1.0,
            "pacing_factor",
        )?;

        Ok(())
    }

    /// Set the initial RTT in milliseconds, used before real RTT is estimated.
    /// The default value is 1ms.
    pub fn set_initial_rtt(&mut self, millis: u64) {
        self.initial_rtt = Duration::from_millis(cmp::max(millis, 1));
    }

    /// Set the initial bandwidth in bits per second, used before a delivery
    /// rate is estimated. The default value is 6Mbps.
    pub fn set_initial_bandwidth(&mut self, bps: u64) {
        self.initial_bandwidth = bps;
    }

    /// Set the horizon of the min RTT window in milliseconds.
    /// The default value is 10 seconds.
    pub fn set_rtt_window(&mut self, millis: u64) {
        self.rtt_window = Duration::from_millis(cmp::max(millis, 1));
    }

    /// Set the horizon of the max bandwidth window in round trips.
    /// The default value is 10.
    pub fn set_bandwidth_window_rounds(&mut self, rounds: u64) {
        self.bandwidth_window_rounds = cmp::max(rounds, 1);
    }

    /// Set the segment size in bytes. The default value is 1500.
    pub fn set_max_segment_size(&mut self, v: u64) {
        self.max_segment_size = cmp::max(v, 1);
    }

    /// Set the congestion window floor in segments. The default value is 4.
    pub fn set_min_congestion_window(&mut self, packets: u64) {
        self.min_cwnd_packets = cmp::max(packets, 1);
    }

    /// Set the pacing and cwnd gain used in Startup. The default value is 2.89.
    pub fn set_startup_gain(&mut self, v: f64) {
        self.startup_gain = clamp_gain(v, 1.0, MAX_GAIN, self.startup_gain);
    }

    /// Set the bandwidth growth factor required to stay in Startup.
    /// The default value is 1.25.
    pub fn set_startup_threshold(&mut self, v: f64) {
        self.startup_threshold = clamp_gain(v, 1.0, MAX_GAIN, self.startup_threshold);
    }

    /// Set the number of rounds without bandwidth growth before Startup
    /// ends. The default value is 3.
    pub fn set_startup_full_bw_rounds(&mut self, rounds: u64) {
        self.startup_full_bw_rounds = cmp::max(rounds, 1);
    }

    /// Set the gain added in the probing phase of ProbeBW.
    /// The default value is 0.25.
    pub fn set_probe_factor(&mut self, v: f64) {
        self.probe_factor = clamp_gain(v, 0.0, 1.0, self.probe_factor);
    }

    /// Set the gain removed in the draining phase of ProbeBW.
    /// The default value is 0.25.
    pub fn set_drain_factor(&mut self, v: f64) {
        self.drain_factor = clamp_gain(v, 0.0, 0.99, self.drain_factor);
    }

    /// Set the gain of the cruising phases of ProbeBW.
    /// The default value is 1.0.
    pub fn set_steady_factor(&mut self, v: f64) {
        self.steady_factor = clamp_gain(v, 0.01, MAX_GAIN, self.steady_factor);
    }

    /// Set the cwnd gain used in ProbeBW. The default value is 2.0.
    pub fn set_probe_bw_cwnd_gain(&mut self, v: f64) {
        self.probe_bw_cwnd_gain = clamp_gain(v, 1.0, MAX_GAIN, self.probe_bw_cwnd_gain);
    }

    /// Set the pacing rate scale-down applied while the pacing gain is 1.
    /// The default value is 0.95.
    pub fn set_pacing_factor(&mut self, v: f64) {
        self.pacing_factor = clamp_gain(v, 0.01, 1.0, self.pacing_factor);
    }

    /// Set the min RTT staleness in milliseconds that triggers ProbeRTT.
    /// The default value is 10 seconds.
    pub fn set_probe_rtt_interval(&mut self, millis: u64) {
        self.probe_rtt_interval = Duration::from_millis(cmp::max(millis, 1));
    }

    /// Enable pacing. If disabled, the congestion window alone limits the
    /// sending rate. The default value is true.
    pub fn enable_pacing(&mut self, v: bool) {
        self.enable_pacing = v;
    }

    /// Randomize the initial phase of the ProbeBW gain cycle, which improves
    /// mixing when several flows share a bottleneck.
    /// The default value is false.
    pub fn randomize_probe_bw_phase(&mut self, v: bool) {
        self.randomize_probe_bw_phase = v;
    }

    /// Congestion window floor in bytes.
    pub fn min_cwnd(&self) -> u64 {
        self.min_cwnd_packets.saturating_mul(self.max_segment_size)
    }

    /// Whether pacing is enabled.
    pub fn pacing_enabled(&self) -> bool {
        self.enable_pacing
    }
}

impl Default for Config {
    fn default() -> Config {
        Config {
            initial_rtt: INITIAL_RTT,
            initial_bandwidth: INITIAL_BANDWIDTH,
            rtt_window: RTT_WINDOW,
            bandwidth_window_rounds: BANDWIDTH_WINDOW_ROUNDS,
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
            min_cwnd_packets: MIN_CWND_PACKETS,
            startup_gain: STARTUP_GAIN,
            startup_threshold: STARTUP_THRESHOLD,
            startup_full_bw_rounds: STARTUP_FULL_BW_ROUNDS,
            probe_factor: PROBE_FACTOR,
            drain_factor: DRAIN_FACTOR,
            steady_factor: STEADY_FACTOR,
            probe_bw_cwnd_gain: PROBE_BW_CWND_GAIN,
            pacing_factor: PACING_FACTOR,
            probe_rtt_interval: PROBE_RTT_INTERVAL,
            enable_pacing: true,
            randomize_probe_bw_phase: false,
        }
    }
}

/// Clamp a gain into `[min, max]`, keeping `current` for NaN input.
fn clamp_gain(v: f64, min: f64, max: f64, current: f64) -> f64 {
    if v.is_nan() {
        return current;
    }
    v.clamp(min, max)
}


pub use crate::congestion_control::build_congestion_controller;
pub use crate::congestion_control::Bbr;
pub use crate::congestion_control::BbrSnapshot;
pub use crate::congestion_control::BbrState;
pub use crate::congestion_control::BbrStateKind;
pub use crate::congestion_control::CongestionController;
pub use crate::congestion_control::CongestionStats;
pub use crate::error::Error;

#[path = "congestion_control/congestion_control.rs"]
mod congestion_control;

pub mod error;
