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

#![no_main]

use std::time::Duration;
use std::time::Instant;

use libfuzzer_sys::fuzz_target;

use bbr_prime::Bbr;
use bbr_prime::CongestionController;
use bbr_prime::Config;

// Each event is 8 bytes: a kind byte, a time advance in microseconds, a
// sequence advance and a value (bytes in flight or RTT in microseconds).
fuzz_target!(|data: &[u8]| {
    let mut conf = Config::new();
    conf.randomize_probe_bw_phase(data.first().map_or(false, |b| b & 1 == 1));
    let mut bbr = Bbr::new(conf);

    let mut now = Instant::now();
    let mut sent_seq = 0_u64;
    let mut acked_seq = 0_u64;

    for ev in data.chunks_exact(8) {
        let advance = u16::from_le_bytes([ev[1], ev[2]]) as u64;
        let step = u16::from_le_bytes([ev[3], ev[4]]) as u64;
        let value = u32::from_le_bytes([ev[5], ev[6], ev[7], 0]) as u64;
        now += Duration::from_micros(advance);

        if ev[0] & 1 == 0 {
            sent_seq = sent_seq.saturating_add(step);
            let cwnd = bbr.on_send(now, sent_seq, acked_seq, value);
            assert!(cwnd >= bbr.minimal_window());
        } else {
            acked_seq = acked_seq.saturating_add(step).min(sent_seq);
            bbr.on_ack(now, acked_seq, Duration::from_micros(value));
        }
    }
});
