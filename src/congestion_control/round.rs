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

/// Round trip counter.
///
/// BBR tracks a virtual time in "rounds": a round starts when a segment is
/// sent and ends once all the data outstanding at that moment has been
/// delivered, i.e. one round is roughly one RTT worth of delivered bytes.
/// The counter is checked before every transmission, using the cumulative
/// delivered bytes tracked by the delivery rate estimator.
#[derive(Debug, Default)]
pub struct RoundTripCounter {
    /// Count of rounds since initialization.
    round_count: u64,

    /// Delivered bytes when the current round started.
    round_start_delivered: u64,

    /// Delivered bytes marking the end of the current round.
    next_round_delivered: u64,
}

impl RoundTripCounter {
    /// Check for a round boundary before a transmission.
    ///
    /// `delivered` is the cumulative number of delivered bytes and
    /// `outstanding` the number of bytes sent but not yet acknowledged.
    /// Return true if a new round started.
    pub fn on_send(&mut self, delivered: u64, outstanding: u64) -> bool {
        if delivered >= self.next_round_delivered {
            self.round_count += 1;
            self.round_start_delivered = delivered;
            // At least one more byte must be delivered before the next round.
            self.next_round_delivered = delivered.saturating_add(outstanding.max(1));
            return true;
        }

        false
    }

    pub fn round_count(&self) -> u64 {
        self.round_count
    }

    pub fn round_start_delivered(&self) -> u64 {
        self.round_start_delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_counter() {
        let mut round = RoundTripCounter::default();
        assert_eq!(round.round_count(), 0);

        // The first transmission starts the first round.
        assert!(round.on_send(0, 0));
        assert_eq!(round.round_count(), 1);
        assert_eq!(round.next_round_delivered, 1);

        // Nothing delivered yet.
        assert!(!round.on_send(0, 1000));
        assert_eq!(round.round_count(), 1);

        // The first byte is delivered, 3000 bytes are outstanding.
        assert!(round.on_send(1000, 3000));
        assert_eq!(round.round_count(), 2);
        assert_eq!(round.round_start_delivered(), 1000);
        assert_eq!(round.next_round_delivered, 4000);

        for delivered in [2000, 3000, 3999] {
            assert!(!round.on_send(delivered, 3000));
            assert_eq!(round.round_count(), 2);
        }

        // All data outstanding at the round start is delivered.
        assert!(round.on_send(4000, 5000));
        assert_eq!(round.round_count(), 3);
        assert_eq!(round.next_round_delivered, 9000);
    }

    #[test]
    fn round_counter_monotonic() {
        let mut round = RoundTripCounter::default();
        let mut last = 0;

        for i in 0..1000_u64 {
            round.on_send(i * 100, 1000);
            assert!(round.round_count() >= last);
            last = round.round_count();
        }
        // A round ends every 1000 delivered bytes.
        assert_eq!(round.round_count(), 100);
    }
}
