// fsdlink - a flight simulation network client
// Copyright (C) 2017-2018  Datong Sun (dndx@idndx.com)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Per-callsign transmission offset, derived from how often a peer's
//! positions arrive.

use crate::aviation::Callsign;
use std::collections::{HashMap, VecDeque};

/// Assumed delay for peers sending the classic 5 s updates.
pub const SLOW_OFFSET_MS: i64 = 6000;
/// Assumed delay for peers that also send interim positions.
pub const FAST_OFFSET_MS: i64 = 2000;

const MAX_SAMPLES: usize = 6;
const AVERAGE_OVER: usize = 3;

#[derive(Debug, Default)]
pub struct OffsetEstimator {
    last_received: HashMap<Callsign, i64>,
    deltas: HashMap<Callsign, VecDeque<i64>>,
    additional_ms: i64,
}

impl OffsetEstimator {
    pub fn new(additional_ms: i64) -> Self {
        OffsetEstimator {
            additional_ms,
            ..Default::default()
        }
    }

    /// Records a position arrival at `received_ms` and returns the offset to
    /// stamp on it.
    pub fn received(&mut self, callsign: &Callsign, received_ms: i64) -> i64 {
        let previous = match self.last_received.insert(callsign.clone(), received_ms) {
            Some(p) => p,
            None => return SLOW_OFFSET_MS,
        };

        let deltas = self.deltas.entry(callsign.clone()).or_default();
        deltas.push_front((received_ms - previous).abs());
        deltas.truncate(MAX_SAMPLES);

        let offset = if deltas.len() >= AVERAGE_OVER {
            let avg = deltas.iter().take(AVERAGE_OVER).sum::<i64>() / AVERAGE_OVER as i64;
            if avg < FAST_OFFSET_MS {
                FAST_OFFSET_MS
            } else {
                SLOW_OFFSET_MS
            }
        } else {
            SLOW_OFFSET_MS
        };

        offset + self.additional_ms
    }

    /// Latest measured interval, or the slow default.
    pub fn current(&self, callsign: &Callsign) -> i64 {
        self.deltas
            .get(callsign)
            .and_then(|d| d.front().copied())
            .unwrap_or(SLOW_OFFSET_MS)
    }

    pub fn remove(&mut self, callsign: &Callsign) {
        self.last_received.remove(callsign);
        self.deltas.remove(callsign);
    }

    pub fn clear(&mut self) {
        self.last_received.clear();
        self.deltas.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switches_to_fast_after_three_quick_samples() {
        let cs = Callsign::aircraft("DLH123");
        let mut o = OffsetEstimator::new(0);

        assert_eq!(o.received(&cs, 0), SLOW_OFFSET_MS);
        assert_eq!(o.received(&cs, 1000), SLOW_OFFSET_MS);
        assert_eq!(o.received(&cs, 2000), SLOW_OFFSET_MS);
        assert_eq!(o.received(&cs, 3000), FAST_OFFSET_MS);
        assert_eq!(o.current(&cs), 1000);

        // back to 5 s updates
        assert_eq!(o.received(&cs, 8000), SLOW_OFFSET_MS);
    }

    #[test]
    fn test_slow_peer_and_removal() {
        let cs = Callsign::aircraft("BAW1");
        let mut o = OffsetEstimator::new(500);

        for i in 0..6 {
            o.received(&cs, i * 5000);
        }
        assert_eq!(o.received(&cs, 30000), SLOW_OFFSET_MS + 500);

        o.remove(&cs);
        assert_eq!(o.current(&cs), SLOW_OFFSET_MS);
        assert_eq!(o.received(&cs, 31000), SLOW_OFFSET_MS);
    }
}
