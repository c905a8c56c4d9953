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

#![allow(unused_variables)]

use std::fmt;
use std::time::Duration;
use std::time::Instant;

use crate::Config;
pub use bbr::Bbr;
pub use bbr::BbrSnapshot;
pub use state::BbrState;
pub use state::BbrStateKind;

/// Congestion control statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CongestionStats {
    /// Bytes in flight reported by the latest transmission.
    pub bytes_in_flight: u64,

    /// Total bytes delivered.
    pub bytes_delivered_in_total: u64,

    /// Number of transmissions.
    pub sends: u64,

    /// Number of acknowledgments.
    pub acks: u64,

    /// Number of RTT samples rejected for being zero.
    pub rtt_samples_rejected: u64,

    /// Number of rate samples discarded for a zero-length interval.
    pub rate_samples_discarded: u64,

    /// Number of rounds started.
    pub rounds: u64,

    /// Number of times ProbeRTT was entered.
    pub probe_rtt_count: u64,
}

/// Congestion control interfaces offered to the transport layer.
///
/// The transport invokes the callbacks of one controller serially.
pub trait CongestionController {
    /// Name of congestion control algorithm.
    fn name(&self) -> &str;

    /// Callback before a segment is sent out.
    ///
    /// `sent_seq` is the sequence number following the segment,
    /// `last_acked_seq` the highest cumulatively acknowledged sequence number
    /// and `bytes_in_flight` the amount of unacknowledged data. Return the
    /// congestion window in bytes.
    fn on_send(
        &mut self,
        now: Instant,
        sent_seq: u64,
        last_acked_seq: u64,
        bytes_in_flight: u64,
    ) -> u64;

    /// Callback for an acknowledgment carrying an RTT measurement.
    ///
    /// Return the pacing rate in bits per second, or None if pacing is
    /// disabled.
    fn on_ack(&mut self, now: Instant, acked_seq: u64, rtt: Duration) -> Option<u64>;

    /// Callback for the window growth of ack-clocked algorithms.
    fn increase_window(&mut self, segments_acked: u32) {}

    /// Slow start threshold in bytes.
    fn ssthresh(&self) -> u64;

    /// Current congestion window.
    fn congestion_window(&self) -> u64;

    /// Current pacing rate estimated by Congestion Control Algorithm (CCA).
    /// If CCA does not estimate pacing rate, return None.
    fn pacing_rate(&self) -> Option<u64> {
        None
    }

    /// Minimal congestion window.
    fn minimal_window(&self) -> u64;

    /// Name of the current state.
    fn state_name(&self) -> &'static str;

    /// Bandwidth estimate in bits per second, if any sample was taken.
    fn bandwidth(&self) -> Option<u64> {
        None
    }

    /// Min RTT estimate, if any sample was taken.
    fn min_rtt(&self) -> Option<Duration> {
        None
    }

    /// Congestion stats.
    fn stats(&self) -> &CongestionStats;

    /// Create a fresh controller with the same configuration.
    fn fork(&self) -> Box<dyn CongestionController>;
}

impl fmt::Debug for dyn CongestionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "congestion controller {}.", self.name())
    }
}

/// Build a congestion controller.
pub fn build_congestion_controller(conf: &Config) -> Box<dyn CongestionController> {
    Box::new(Bbr::new(conf.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn congestion_controller_build() {
        let mut conf = Config::new();
        conf.set_min_congestion_window(2);

        let mut cc = build_congestion_controller(&conf);
        assert_eq!(cc.name(), "BBR'");
        assert_eq!(cc.state_name(), "Startup");
        assert_eq!(cc.minimal_window(), 3000);
        assert_eq!(cc.ssthresh(), 65535);
        assert_eq!(format!("{:?}", cc), "congestion controller BBR'.");

        // Window growth is driven by the model only.
        let now = Instant::now();
        let cwnd = cc.on_send(now, 1500, 0, 0);
        cc.increase_window(10);
        assert_eq!(cc.congestion_window(), cwnd);
        assert_eq!(cc.stats().sends, 1);

        let forked = cc.fork();
        assert_eq!(forked.stats(), &CongestionStats::default());
        assert_eq!(forked.minimal_window(), 3000);
    }
}

mod bandwidth_filter;
mod bbr;
mod delivery_rate;
mod full_pipe;
mod minmax;
mod round;
mod rtt_filter;
mod state;
