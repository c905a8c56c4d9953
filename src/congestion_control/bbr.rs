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

//! BBR' Congestion Control.
//!
//! BBR' uses recent measurements of the delivery rate and round-trip time of
//! a TCP flow to build an explicit model of the path: the maximum recent
//! bandwidth and the minimum recent round-trip delay. The model is then used
//! to control both how fast the flow sends data (the pacing rate) and the
//! maximum amount of data it allows in flight (the congestion window).
//!
//! See <https://datatracker.ietf.org/doc/html/draft-cardwell-iccrg-bbr-congestion-control-00>.

extern crate rand;

use std::time::Duration;
use std::time::Instant;

use log::*;
use rand::Rng;
use serde::Serialize;

use super::bandwidth_filter::BandwidthFilter;
use super::delivery_rate::DeliveryRateEstimator;
use super::full_pipe::FullPipeEstimator;
use super::round::RoundTripCounter;
use super::rtt_filter::RttFilter;
use super::state::BbrState;
use super::state::StateInput;
use super::state::DRAIN_PHASE;
use super::state::GAIN_CYCLE_LEN;
use super::{CongestionController, CongestionStats};
use crate::Config;
use crate::VERSION;

/// Name of the algorithm.
const NAME: &str = "BBR'";

/// BBR does not use a slow start threshold.
const SSTHRESH: u64 = 65535;

/// Point-in-time view of a BBR' controller, for observability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BbrSnapshot {
    /// Name of the active state.
    pub state: &'static str,

    /// Current round count.
    pub round: u64,

    /// Bandwidth estimate in bits per second.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bandwidth: Option<u64>,

    /// Min RTT estimate in microseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_rtt_us: Option<u64>,

    /// Bandwidth-delay product in bits.
    pub bdp: u64,

    /// Gain applied to the bandwidth estimate for the pacing rate.
    pub pacing_gain: f64,

    /// Gain applied to the BDP for the congestion window.
    pub cwnd_gain: f64,

    /// Congestion window in bytes.
    pub cwnd: u64,

    /// Pacing rate in bits per second, if pacing is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pacing_rate: Option<u64>,

    /// Whether Startup has filled the pipe.
    pub filled_pipe: bool,
}

/// BBR' Congestion Control Algorithm.
#[derive(Debug)]
pub struct Bbr {
    /// Configurable parameters.
    config: Config,

    /// Statistics.
    stats: CongestionStats,

    /// State.
    state: BbrState,

    /// The dynamic gain factor used to scale the bandwidth estimate to
    /// produce the pacing rate.
    pacing_gain: f64,

    /// The dynamic gain factor used to scale the estimated BDP to produce a
    /// congestion window.
    cwnd_gain: f64,

    /// The current pacing rate in bits per second.
    pacing_rate: u64,

    /// The congestion window in bytes.
    cwnd: u64,

    /// Min RTT tracker.
    rtt_filter: RttFilter,

    /// Max bandwidth tracker.
    bw_filter: BandwidthFilter,

    /// Delivery rate estimator.
    delivery_rate_estimator: DeliveryRateEstimator,

    /// Counter of round trips.
    round: RoundTripCounter,

    /// Estimator of full pipe.
    full_pipe: FullPipeEstimator,

    /// The last round for which the per-round logic ran.
    last_evaluated_round: u64,
}

impl Bbr {
    pub fn new(config: Config) -> Self {
        info!("{} v{} created with {:?}", NAME, VERSION, config);

        let state = BbrState::Startup;
        let (pacing_gain, cwnd_gain) = state.gains(&config);

        let mut bbr = Self {
            stats: Default::default(),
            state,
            pacing_gain,
            cwnd_gain,
            pacing_rate: 0,
            cwnd: config.min_cwnd(),
            rtt_filter: RttFilter::new(config.rtt_window),
            bw_filter: BandwidthFilter::new(config.bandwidth_window_rounds),
            delivery_rate_estimator: DeliveryRateEstimator::default(),
            round: RoundTripCounter::default(),
            full_pipe: FullPipeEstimator::new(
                config.startup_threshold,
                config.startup_full_bw_rounds,
            ),
            last_evaluated_round: 0,
            config,
        };
        bbr.set_pacing_rate();
        bbr.cwnd = bbr.target_cwnd();

        bbr
    }

    /// Current state.
    pub fn state(&self) -> BbrState {
        self.state
    }

    pub fn pacing_gain(&self) -> f64 {
        self.pacing_gain
    }

    pub fn cwnd_gain(&self) -> f64 {
        self.cwnd_gain
    }

    pub fn round_count(&self) -> u64 {
        self.round.round_count()
    }

    /// Is pipe filled.
    pub fn is_filled_pipe(&self) -> bool {
        self.full_pipe.is_filled_pipe()
    }

    /// RTT estimate, falling back to the initial RTT.
    fn rtt_estimate(&self) -> Duration {
        self.rtt_filter.min_rtt().unwrap_or(self.config.initial_rtt)
    }

    /// Bandwidth estimate, falling back to the initial bandwidth.
    fn bandwidth_estimate(&self) -> u64 {
        self.bw_filter.max_bw().unwrap_or(self.config.initial_bandwidth)
    }

    fn bdp_bits(&self) -> f64 {
        self.rtt_estimate().as_secs_f64() * self.bandwidth_estimate() as f64
    }

    /// Estimated bandwidth-delay product in bits.
    pub fn bdp(&self) -> u64 {
        self.bdp_bits() as u64
    }

    /// Take a snapshot of the model and the outputs.
    pub fn snapshot(&self) -> BbrSnapshot {
        BbrSnapshot {
            state: self.state.kind().into(),
            round: self.round.round_count(),
            bandwidth: self.bw_filter.max_bw(),
            min_rtt_us: self
                .rtt_filter
                .min_rtt()
                .map(|v| u64::try_from(v.as_micros()).unwrap_or(u64::MAX)),
            bdp: self.bdp(),
            pacing_gain: self.pacing_gain,
            cwnd_gain: self.cwnd_gain,
            cwnd: self.cwnd,
            pacing_rate: self.pacing_rate(),
            filled_pipe: self.is_filled_pipe(),
        }
    }

    /// Initial gain cycle phase when entering ProbeBW.
    ///
    /// With randomization, any phase but the draining one may be picked.
    fn probe_bw_initial_phase(&self) -> usize {
        if !self.config.randomize_probe_bw_phase {
            return 0;
        }

        let phase = rand::thread_rng().gen_range(0..GAIN_CYCLE_LEN - 1);
        if phase >= DRAIN_PHASE {
            phase + 1
        } else {
            phase
        }
    }

    /// On every ACK, update the path model and the state machine.
    fn update_model_and_state(&mut self, now: Instant, min_rtt_expired: bool) {
        // Once per round, look for a plateau of the bandwidth estimate.
        let round = self.round.round_count();
        if round > self.last_evaluated_round {
            self.last_evaluated_round = round;

            if let Some(max) = self.bw_filter.max_sample() {
                if !self.full_pipe.is_filled_pipe() && self.full_pipe.on_round_start(max.bandwidth)
                {
                    debug!(
                        "{}: pipe filled at {}bps (sampled in round {}) in round {}",
                        NAME,
                        self.full_pipe.full_bw(),
                        max.round,
                        round
                    );
                }
            }
        }

        let input = StateInput {
            now,
            round,
            filled_pipe: self.full_pipe.is_filled_pipe(),
            bytes_in_flight: self.stats.bytes_in_flight,
            bdp: (self.bdp_bits() / 8.0) as u64,
            min_cwnd: self.config.min_cwnd(),
            min_rtt_expired,
            rtt: self.rtt_estimate(),
        };

        let mut next = self.state.next(&input);
        if next.kind() != self.state.kind() {
            debug!(
                "{}: state {} -> {} in round {}",
                NAME,
                self.state.kind(),
                next.kind(),
                round
            );

            match &mut next {
                BbrState::ProbeBw { cycle_index, .. } => {
                    *cycle_index = self.probe_bw_initial_phase();
                }
                BbrState::ProbeRtt { .. } => {
                    debug!(
                        "{}: min rtt {:?} unchanged since {:?}",
                        NAME,
                        self.rtt_filter.min_rtt(),
                        self.rtt_filter.last_min_rtt_change()
                    );
                    // Avoid entering ProbeRTT again right after leaving it.
                    self.rtt_filter.reset_min_rtt_change(now);
                    self.stats.probe_rtt_count += 1;
                }
                _ => (),
            }
        }

        self.state = next;
        (self.pacing_gain, self.cwnd_gain) = self.state.gains(&self.config);
    }

    /// BBR' updates the pacing rate on each ACK.
    fn set_pacing_rate(&mut self) {
        let mut rate = self.bandwidth_estimate() as f64 * self.pacing_gain;

        // Pace slightly below the estimate while cruising.
        if (self.pacing_gain - 1.0).abs() < f64::EPSILON {
            rate *= self.config.pacing_factor;
        }

        self.pacing_rate = rate.max(0.0) as u64;
    }

    /// The congestion window for the current state.
    ///
    /// Without pacing, cwnd alone limits the sending rate, so it is scaled
    /// with the pacing gain instead of the cwnd gain.
    fn target_cwnd(&self) -> u64 {
        let min_cwnd = self.config.min_cwnd();
        if let BbrState::ProbeRtt { .. } = self.state {
            return min_cwnd;
        }

        let gain = if self.config.pacing_enabled() {
            self.cwnd_gain
        } else {
            self.pacing_gain
        };

        let cwnd = (self.bdp_bits() * gain / 8.0) as u64;
        cwnd.max(min_cwnd)
    }
}

impl CongestionController for Bbr {
    fn name(&self) -> &str {
        NAME
    }

    fn on_send(
        &mut self,
        now: Instant,
        sent_seq: u64,
        last_acked_seq: u64,
        bytes_in_flight: u64,
    ) -> u64 {
        self.stats.sends += 1;
        self.stats.bytes_in_flight = bytes_in_flight;

        let outstanding = sent_seq.saturating_sub(last_acked_seq);
        if self
            .round
            .on_send(self.delivery_rate_estimator.delivered(), outstanding)
        {
            self.stats.rounds = self.round.round_count();
            trace!(
                "{}: round {} starts at {} bytes delivered",
                NAME,
                self.round.round_count(),
                self.round.round_start_delivered()
            );
        }

        self.delivery_rate_estimator.on_packet_sent(
            sent_seq,
            last_acked_seq,
            now,
            self.round.round_count(),
        );

        self.cwnd = self.target_cwnd();
        trace!(
            "{}: sent seq {} inflight {} bdp {} cwnd_gain {} cwnd {}",
            NAME,
            sent_seq,
            bytes_in_flight,
            self.bdp(),
            self.cwnd_gain,
            self.cwnd
        );

        self.cwnd
    }

    fn on_ack(&mut self, now: Instant, acked_seq: u64, rtt: Duration) -> Option<u64> {
        self.stats.acks += 1;

        // A new minimum is judged against the window as of now, and refreshes
        // the estimate before its staleness is checked.
        self.rtt_filter.cull(now);
        if !self.rtt_filter.add_sample(rtt, now) {
            self.stats.rtt_samples_rejected += 1;
        }
        let min_rtt_expired = self
            .rtt_filter
            .is_stale(now, self.config.probe_rtt_interval);

        if let Some(rs) = self.delivery_rate_estimator.on_ack(acked_seq, now) {
            trace!(
                "{}: rate sample {}bps, {} bytes over {:?}, sent in round {}",
                NAME,
                rs.delivery_rate,
                rs.delivered,
                rs.interval,
                rs.prior_round
            );
            self.bw_filter
                .add_sample(rs.delivery_rate, now, self.round.round_count());
        }
        self.bw_filter.cull(now, self.rtt_filter.min_rtt());

        self.stats.bytes_delivered_in_total = self.delivery_rate_estimator.delivered();
        self.stats.rate_samples_discarded = self.delivery_rate_estimator.discarded();

        self.update_model_and_state(now, min_rtt_expired);
        self.set_pacing_rate();

        trace!(
            "{}: acked seq {} rtt {:?} state {} pacing_gain {} pacing_rate {}bps",
            NAME,
            acked_seq,
            rtt,
            self.state.kind(),
            self.pacing_gain,
            self.pacing_rate
        );

        self.pacing_rate()
    }

    fn ssthresh(&self) -> u64 {
        SSTHRESH
    }

    fn congestion_window(&self) -> u64 {
        self.cwnd
    }

    fn pacing_rate(&self) -> Option<u64> {
        if self.config.pacing_enabled() {
            Some(self.pacing_rate)
        } else {
            None
        }
    }

    fn minimal_window(&self) -> u64 {
        self.config.min_cwnd()
    }

    fn state_name(&self) -> &'static str {
        self.state.kind().into()
    }

    fn bandwidth(&self) -> Option<u64> {
        self.bw_filter.max_bw()
    }

    fn min_rtt(&self) -> Option<Duration> {
        self.rtt_filter.min_rtt()
    }

    fn stats(&self) -> &CongestionStats {
        &self.stats
    }

    fn fork(&self) -> Box<dyn CongestionController> {
        Box::new(Bbr::new(self.config.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::congestion_control::state::pacing_gain_cycle;
    use crate::BbrStateKind;

    const MSS: u64 = 1500;
    const RTT_MS: u64 = 10;

    /// Send one segment per millisecond, each acknowledged RTT_MS later.
    ///
    /// Return the state after each ACK, together with the ACK time offset.
    fn drive(
        bbr: &mut Bbr,
        start: Instant,
        millis: std::ops::Range<u64>,
    ) -> Vec<(u64, BbrStateKind)> {
        let mut states = Vec::new();
        for ms in millis {
            let now = start + Duration::from_millis(ms);
            let acked = ms.saturating_sub(RTT_MS) * MSS;
            if ms > RTT_MS {
                bbr.on_ack(now, acked, Duration::from_millis(RTT_MS));
                states.push((ms, bbr.state().kind()));
            }
            bbr.on_send(now, ms * MSS, acked, (ms - 1) * MSS - acked);
        }
        states
    }

    #[test]
    fn bbr_init() {
        let bbr = Bbr::new(Config::new());

        assert_eq!(bbr.name(), "BBR'");
        assert_eq!(bbr.state(), BbrState::Startup);
        assert_eq!(bbr.state_name(), "Startup");
        assert_eq!(bbr.pacing_gain(), 2.89);
        assert_eq!(bbr.cwnd_gain(), 2.89);
        assert_eq!(bbr.round_count(), 0);
        assert_eq!(bbr.congestion_window(), 4 * MSS);
        assert_eq!(bbr.pacing_rate(), Some((6_000_000.0 * 2.89) as u64));
        assert_eq!(bbr.ssthresh(), 65535);
        assert!(!bbr.is_filled_pipe());
    }

    #[test]
    fn bbr_without_samples() {
        let mut bbr = Bbr::new(Config::new());
        let now = Instant::now();

        // Initial 1ms RTT and 6Mbps bandwidth.
        assert_eq!(bbr.bdp(), 6000);
        assert_eq!(bbr.bandwidth(), None);
        assert_eq!(bbr.min_rtt(), None);

        assert_eq!(bbr.on_send(now, MSS, 0, 0), 4 * MSS);
        assert_eq!(bbr.on_send(now, 2 * MSS, 0, MSS), 4 * MSS);
        assert_eq!(bbr.stats().sends, 2);
    }

    #[test]
    fn bbr_min_rtt() {
        let mut bbr = Bbr::new(Config::new());
        let now = Instant::now();

        for (i, (rtt, min_rtt)) in [(20, 20), (10, 10), (30, 10)].iter().enumerate() {
            let t = now + Duration::from_millis(i as u64);
            bbr.on_ack(t, 0, Duration::from_millis(*rtt));
            assert_eq!(bbr.min_rtt(), Some(Duration::from_millis(*min_rtt)));
        }
        assert_eq!(bbr.stats().acks, 3);
    }

    #[test]
    fn bbr_zero_rtt() {
        let mut bbr = Bbr::new(Config::new());
        let now = Instant::now();

        bbr.on_send(now, MSS, 0, 0);
        let rate = bbr.on_ack(now + Duration::from_millis(10), MSS, Duration::ZERO);

        // The RTT sample is dropped, the rest of the ACK is not.
        assert!(rate.is_some());
        assert_eq!(bbr.min_rtt(), None);
        assert_eq!(bbr.stats().rtt_samples_rejected, 1);
        assert_eq!(bbr.stats().bytes_delivered_in_total, MSS);
        assert_eq!(bbr.bandwidth(), Some(MSS * 8 * 100));
    }

    #[test]
    fn bbr_zero_delivery_interval() {
        let mut bbr = Bbr::new(Config::new());
        let now = Instant::now();

        bbr.on_send(now, MSS, 0, 0);
        bbr.on_ack(now, MSS, Duration::from_millis(1));

        assert_eq!(bbr.bandwidth(), None);
        assert_eq!(bbr.stats().rate_samples_discarded, 1);
    }

    #[test]
    fn bbr_startup_exit() {
        let mut bbr = Bbr::new(Config::new());
        let start = Instant::now();

        // 15000 bytes delivered every 10ms: 12Mbps once the flow is warm.
        let states = drive(&mut bbr, start, 1..54);

        // Baselines at 1.2Mbps, 2.4Mbps and 12Mbps, then three rounds
        // without growth.
        let drain: Vec<u64> = states
            .iter()
            .filter(|(_, k)| *k == BbrStateKind::Drain)
            .map(|(ms, _)| *ms)
            .collect();
        assert_eq!(drain, [52]);
        assert!(states
            .iter()
            .filter(|(ms, _)| *ms < 52)
            .all(|(_, k)| *k == BbrStateKind::Startup));
        assert!(bbr.is_filled_pipe());
        assert_eq!(bbr.bandwidth(), Some(12_000_000));
        assert_eq!(bbr.min_rtt(), Some(Duration::from_millis(RTT_MS)));

        // Less than a BDP in flight: leave Drain on the next ACK.
        assert_eq!(
            bbr.state(),
            BbrState::ProbeBw {
                cycle_index: 0,
                cycle_start_round: 6
            }
        );
        assert_eq!(bbr.pacing_gain(), 1.25);
        assert_eq!(bbr.cwnd_gain(), 2.0);
        assert_eq!(bbr.stats().rounds, 6);

        // The next round moves to the draining phase.
        drive(&mut bbr, start, 54..63);
        assert_eq!(
            bbr.state(),
            BbrState::ProbeBw {
                cycle_index: 1,
                cycle_start_round: 7
            }
        );
        assert_eq!(bbr.pacing_gain(), 0.75);
        assert_eq!(bbr.pacing_rate(), Some((12_000_000.0 * 0.75) as u64));
    }

    #[test]
    fn bbr_drain_gains() {
        let mut bbr = Bbr::new(Config::new());
        let now = Instant::now();

        bbr.state = BbrState::Drain;
        bbr.stats.bytes_in_flight = u64::MAX;
        bbr.on_ack(now, 0, Duration::from_millis(10));

        assert_eq!(bbr.state(), BbrState::Drain);
        assert_eq!(bbr.pacing_gain(), 1.0 / 2.89);
        assert_eq!(bbr.cwnd_gain(), 1.0 / 2.89);
    }

    #[test]
    fn bbr_probe_rtt() {
        let mut bbr = Bbr::new(Config::new());
        let now = Instant::now();
        let min_cwnd = 4 * MSS;

        bbr.on_send(now, MSS, 0, 0);
        bbr.on_ack(now + Duration::from_millis(10), MSS, Duration::from_millis(10));
        bbr.state = BbrState::ProbeBw {
            cycle_index: 2,
            cycle_start_round: bbr.round_count(),
        };

        // No new min RTT for exactly 10 seconds.
        let t = now + Duration::from_millis(10) + Duration::from_secs(10);
        bbr.on_ack(t, MSS, Duration::from_millis(20));
        assert_eq!(bbr.state().kind(), BbrStateKind::ProbeBw);

        let t = t + Duration::from_millis(1);
        bbr.on_ack(t, MSS, Duration::from_millis(20));
        assert_eq!(bbr.state().kind(), BbrStateKind::ProbeRtt);
        assert_eq!(bbr.stats().probe_rtt_count, 1);
        assert_eq!((bbr.pacing_gain(), bbr.cwnd_gain()), (1.0, 1.0));

        // The window is clamped to the floor on the very next send.
        assert_eq!(bbr.on_send(t, 2 * MSS, MSS, 100_000), min_cwnd);

        // Too much data in flight, the hold has not started.
        let t = t + Duration::from_millis(1);
        bbr.on_ack(t, MSS, Duration::from_millis(20));
        assert_eq!(
            bbr.state(),
            BbrState::ProbeRtt {
                entered: t - Duration::from_millis(1),
                done_stamp: None
            }
        );

        // Drained: hold the floor for one RTT.
        assert_eq!(bbr.on_send(t, 3 * MSS, MSS, min_cwnd), min_cwnd);
        let t = t + Duration::from_millis(1);
        bbr.on_ack(t, MSS, Duration::from_millis(20));
        assert_eq!(bbr.min_rtt(), Some(Duration::from_millis(20)));
        assert_eq!(
            bbr.state(),
            BbrState::ProbeRtt {
                entered: t - Duration::from_millis(2),
                done_stamp: Some(t + Duration::from_millis(20))
            }
        );

        bbr.on_ack(t + Duration::from_millis(19), MSS, Duration::from_millis(20));
        assert_eq!(bbr.state().kind(), BbrStateKind::ProbeRtt);

        // The pipe was never filled: back to Startup.
        bbr.on_ack(t + Duration::from_millis(20), MSS, Duration::from_millis(20));
        assert_eq!(bbr.state(), BbrState::Startup);
        assert_eq!(bbr.pacing_gain(), 2.89);
        assert_eq!(bbr.stats().probe_rtt_count, 1);
    }

    #[test]
    fn bbr_probe_rtt_only_from_probe_bw() {
        let mut bbr = Bbr::new(Config::new());
        let now = Instant::now();

        bbr.on_ack(now, 0, Duration::from_millis(10));
        bbr.on_ack(now + Duration::from_secs(20), 0, Duration::from_millis(20));
        assert_eq!(bbr.state(), BbrState::Startup);
        assert_eq!(bbr.stats().probe_rtt_count, 0);
    }

    #[test]
    fn bbr_min_rtt_refreshed_before_staleness() {
        let mut bbr = Bbr::new(Config::new());
        let now = Instant::now();

        bbr.on_ack(now, 0, Duration::from_millis(20));
        bbr.state = BbrState::ProbeBw {
            cycle_index: 2,
            cycle_start_round: 0,
        };

        // A lower RTT on the very ACK that would expire the estimate.
        let t = now + Duration::from_secs(11);
        bbr.on_ack(t, 0, Duration::from_millis(5));
        assert_eq!(bbr.state().kind(), BbrStateKind::ProbeBw);
        assert_eq!(bbr.stats().probe_rtt_count, 0);
        assert_eq!(bbr.min_rtt(), Some(Duration::from_millis(5)));
        assert_eq!(bbr.rtt_filter.last_min_rtt_change(), Some(t));
    }

    #[test]
    fn bbr_min_rtt_against_current_window() {
        let mut bbr = Bbr::new(Config::new());
        let now = Instant::now();

        bbr.on_ack(now, 0, Duration::from_millis(10));
        bbr.on_ack(now + Duration::from_secs(5), 0, Duration::from_millis(30));

        // The 10ms sample has aged out, so 20ms is a new minimum.
        let t = now + Duration::from_millis(10_500);
        bbr.on_ack(t, 0, Duration::from_millis(20));
        assert_eq!(bbr.min_rtt(), Some(Duration::from_millis(20)));
        assert_eq!(bbr.rtt_filter.last_min_rtt_change(), Some(t));
    }

    #[test]
    fn bbr_staleness_starts_with_first_sample() {
        let mut bbr = Bbr::new(Config::new());
        let now = Instant::now();

        bbr.state = BbrState::ProbeBw {
            cycle_index: 2,
            cycle_start_round: 0,
        };

        // Long after creation, but no RTT sample was ever accepted.
        bbr.on_ack(now + Duration::from_secs(3600), 0, Duration::ZERO);
        assert_eq!(bbr.state().kind(), BbrStateKind::ProbeBw);
        assert_eq!(bbr.stats().probe_rtt_count, 0);
        assert_eq!(bbr.rtt_filter.last_min_rtt_change(), None);
    }

    #[test]
    fn bbr_probe_rtt_with_huge_rtt() {
        let mut bbr = Bbr::new(Config::new());
        let now = Instant::now();

        bbr.on_ack(now, 0, Duration::MAX);
        assert_eq!(bbr.min_rtt(), Some(Duration::MAX));

        bbr.state = BbrState::ProbeRtt {
            entered: now,
            done_stamp: None,
        };
        bbr.stats.bytes_in_flight = 0;

        // The hold deadline is out of range: it ends at once.
        bbr.on_ack(now, 0, Duration::MAX);
        assert_eq!(
            bbr.state(),
            BbrState::ProbeRtt {
                entered: now,
                done_stamp: Some(now)
            }
        );

        bbr.on_ack(now, 0, Duration::MAX);
        assert_eq!(bbr.state(), BbrState::Startup);
    }

    #[test]
    fn bbr_cwnd_without_pacing() {
        let mut conf = Config::new();
        conf.enable_pacing(false);
        let mut bbr = Bbr::new(conf);
        let now = Instant::now();

        bbr.bw_filter.add_sample(10_000_000, now, 1);
        bbr.rtt_filter.add_sample(Duration::from_millis(5), now);
        bbr.state = BbrState::ProbeBw {
            cycle_index: 0,
            cycle_start_round: 0,
        };
        (bbr.pacing_gain, bbr.cwnd_gain) = bbr.state.gains(&bbr.config);

        // The pacing gain scales the window.
        let cwnd = bbr.on_send(now, MSS, 0, 0);
        assert_eq!(cwnd, (0.005 * 10_000_000.0 * 1.25 / 8.0) as u64);
        assert_eq!(cwnd, 7812);

        assert_eq!(bbr.on_ack(now + Duration::from_millis(5), 0, Duration::from_millis(5)), None);
        assert_eq!(bbr.pacing_rate(), None);
    }

    #[test]
    fn bbr_cwnd_with_pacing() {
        let mut bbr = Bbr::new(Config::new());
        let now = Instant::now();

        bbr.bw_filter.add_sample(10_000_000, now, 1);
        bbr.rtt_filter.add_sample(Duration::from_millis(5), now);
        bbr.state = BbrState::ProbeBw {
            cycle_index: 0,
            cycle_start_round: 0,
        };
        (bbr.pacing_gain, bbr.cwnd_gain) = bbr.state.gains(&bbr.config);

        // The cwnd gain scales the window.
        let cwnd = bbr.on_send(now, MSS, 0, 0);
        assert_eq!(cwnd, (0.005 * 10_000_000.0 * 2.0 / 8.0) as u64);

        // Small BDP: floored.
        let mut bbr = Bbr::new(Config::new());
        bbr.bw_filter.add_sample(100_000, now, 1);
        bbr.rtt_filter.add_sample(Duration::from_millis(5), now);
        assert_eq!(bbr.on_send(now, MSS, 0, 0), 4 * MSS);
    }

    #[test]
    fn bbr_pacing_rate_cruising() {
        let mut bbr = Bbr::new(Config::new());
        let now = Instant::now();

        bbr.bw_filter.add_sample(10_000_000, now, 0);
        bbr.state = BbrState::ProbeBw {
            cycle_index: 2,
            cycle_start_round: 0,
        };

        let rate = bbr.on_ack(now + Duration::from_millis(10), 0, Duration::from_millis(10));
        assert_eq!(bbr.pacing_gain(), 1.0);
        assert_eq!(rate, Some((10_000_000.0 * 0.95) as u64));
    }

    #[test]
    fn bbr_randomized_phase() {
        let mut conf = Config::new();
        conf.randomize_probe_bw_phase(true);
        let bbr = Bbr::new(conf);

        for _ in 0..100 {
            let phase = bbr.probe_bw_initial_phase();
            assert!(phase < GAIN_CYCLE_LEN);
            assert_ne!(phase, DRAIN_PHASE);
        }

        let bbr = Bbr::new(Config::new());
        assert_eq!(bbr.probe_bw_initial_phase(), 0);
    }

    #[test]
    fn bbr_randomized_phase_on_probe_bw_entry() {
        let mut conf = Config::new();
        conf.randomize_probe_bw_phase(true);
        let now = Instant::now();

        for _ in 0..20 {
            let mut bbr = Bbr::new(conf.clone());
            bbr.state = BbrState::Drain;
            bbr.on_ack(now, 0, Duration::from_millis(10));

            let phase = match bbr.state() {
                BbrState::ProbeBw {
                    cycle_index,
                    cycle_start_round,
                } => {
                    assert_eq!(cycle_start_round, bbr.round_count());
                    cycle_index
                }
                state => panic!("unexpected state {:?}", state),
            };
            assert_ne!(phase, DRAIN_PHASE);
            assert_eq!(bbr.pacing_gain(), pacing_gain_cycle(&bbr.config, phase));

            // The phase holds for the rest of the round.
            for i in 1..5 {
                bbr.on_ack(now + Duration::from_millis(i), 0, Duration::from_millis(10));
                assert_eq!(
                    bbr.state(),
                    BbrState::ProbeBw {
                        cycle_index: phase,
                        cycle_start_round: bbr.round_count()
                    }
                );
            }
        }
    }

    #[test]
    fn bbr_fork() {
        let mut conf = Config::new();
        conf.set_max_segment_size(1000);
        let mut bbr = Bbr::new(conf);
        let start = Instant::now();

        drive(&mut bbr, start, 1..30);
        assert!(bbr.bandwidth().is_some());

        let forked = bbr.fork();
        assert_eq!(forked.state_name(), "Startup");
        assert_eq!(forked.bandwidth(), None);
        assert_eq!(forked.min_rtt(), None);
        assert_eq!(forked.minimal_window(), 4000);
        assert_eq!(forked.stats(), &CongestionStats::default());
    }

    #[test]
    fn bbr_snapshot() -> serde_json::Result<()> {
        let mut bbr = Bbr::new(Config::new());
        let now = Instant::now();

        let v = serde_json::to_value(bbr.snapshot())?;
        assert_eq!(v["state"], "Startup");
        assert_eq!(v["round"], 0);
        assert_eq!(v["bdp"], 6000);
        assert!(v.get("bandwidth").is_none());
        assert!(v.get("min_rtt_us").is_none());

        bbr.on_send(now, MSS, 0, 0);
        bbr.on_ack(now + Duration::from_millis(10), MSS, Duration::from_millis(10));

        let snapshot = bbr.snapshot();
        assert_eq!(snapshot.round, 1);
        assert_eq!(snapshot.bandwidth, Some(1_200_000));
        assert_eq!(snapshot.min_rtt_us, Some(10_000));
        assert_eq!(snapshot.pacing_rate, bbr.pacing_rate());

        let v = serde_json::to_value(&snapshot)?;
        assert_eq!(v["min_rtt_us"], 10_000);
        assert_eq!(v["filled_pipe"], false);

        Ok(())
    }
}
