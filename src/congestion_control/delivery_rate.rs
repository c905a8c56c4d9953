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

//! A sender-side algorithm to estimate the current delivery rate of a TCP
//! flow from its sequence numbers.
//!
//! Before a segment W_s is sent, the sender records the latest acknowledged
//! sequence W_a and the send time W_t. When an ACK covering W_s arrives at
//! W_t', the delivery rate is estimated as `(ack - W_a) / (W_t' - W_t)`.
//!
//! See
//! <https://datatracker.ietf.org/doc/html/draft-cheng-iccrg-delivery-rate-estimation-00>.

use std::collections::VecDeque;
use std::time::Duration;
use std::time::Instant;

use log::*;

/// Per-transmission state recorded before a segment is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliverySample {
    /// W_a: The last acknowledged sequence number when the segment was sent.
    pub acked: u64,

    /// W_s: The sequence number of the segment.
    pub sent: u64,

    /// W_t: The time the segment was sent.
    pub time_sent: Instant,

    /// The round count when the segment was sent.
    pub round: u64,
}

/// Rate sample output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateSample {
    /// The delivery rate sample in bits per second.
    pub delivery_rate: u64,

    /// The amount of data acknowledged over the sampling interval, in bytes.
    pub delivered: u64,

    /// The length of the sampling interval.
    pub interval: Duration,

    /// The round count when the matched segment was sent.
    pub prior_round: u64,
}

/// Delivery rate estimator.
#[derive(Debug, Default)]
pub struct DeliveryRateEstimator {
    /// Outstanding transmissions, ordered by send time.
    samples: VecDeque<DeliverySample>,

    /// The total amount of data delivered so far over the lifetime of the
    /// flow, in bytes.
    delivered: u64,

    /// The highest acknowledged sequence number seen so far.
    last_acked: Option<u64>,

    /// The number of samples discarded because of a zero-length interval.
    discarded: u64,
}

impl DeliveryRateEstimator {
    /// Upon each segment transmission.
    pub fn on_packet_sent(&mut self, sent: u64, acked: u64, now: Instant, round: u64) {
        if self.last_acked.is_none() {
            self.last_acked = Some(acked);
        }

        trace!("last acked seq {}, sending seq {}", acked, sent);

        self.samples.push_back(DeliverySample {
            acked,
            sent,
            time_sent: now,
            round,
        });
    }

    /// Upon receiving an ACK, generate a rate sample from the newest
    /// transmission covered by `acked`.
    ///
    /// All transmissions covered by the ACK are consumed. Return None if no
    /// transmission is covered or the sampling interval is zero.
    pub fn on_ack(&mut self, acked: u64, now: Instant) -> Option<RateSample> {
        self.update_delivered(acked);

        // Find the newest transmission covered by the ACK.
        let pos = self.samples.iter().rposition(|s| s.sent <= acked)?;
        let sample = self.samples[pos];

        // Every transmission up to it is stale now.
        self.samples.retain(|s| s.sent > sample.sent);

        let interval = now.saturating_duration_since(sample.time_sent);
        if interval.is_zero() {
            warn!(
                "zero delivery interval for seq {}, rate sample discarded",
                sample.sent
            );
            self.discarded += 1;
            return None;
        }

        let delivered = acked.saturating_sub(sample.acked);
        let delivery_rate = delivered as u128 * 8 * 1_000_000_000 / interval.as_nanos();

        trace!(
            "W_s {} W_a {} byte-diff {} time-diff {}us bw {}bps",
            acked,
            sample.acked,
            delivered,
            interval.as_micros(),
            delivery_rate
        );

        Some(RateSample {
            delivery_rate: u64::try_from(delivery_rate).unwrap_or(u64::MAX),
            delivered,
            interval,
            prior_round: sample.round,
        })
    }

    /// Advance the cumulative delivered bytes to the acknowledged sequence.
    fn update_delivered(&mut self, acked: u64) {
        match self.last_acked {
            Some(last) if acked > last => {
                self.delivered = self.delivered.saturating_add(acked - last);
                self.last_acked = Some(acked);
            }
            Some(_) => (),
            None => self.last_acked = Some(acked),
        }
    }

    /// C.delivered.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Number of samples discarded because of a zero-length interval.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}
