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

use std::time::{Duration, Instant};

/// Grants `capacity` immediate actions, then one more per `interval`.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: u32,
    tokens: u32,
    interval: Duration,
    last_refill: Option<Instant>,
}

impl TokenBucket {
    pub fn new(capacity: u32, interval: Duration) -> Self {
        TokenBucket {
            capacity,
            tokens: capacity,
            interval,
            last_refill: None,
        }
    }

    fn refill(&mut self, now: Instant) {
        let last = match self.last_refill {
            Some(l) => l,
            None => {
                self.last_refill = Some(now);
                return;
            }
        };

        let elapsed = now.saturating_duration_since(last);
        let n = (elapsed.as_millis() / self.interval.as_millis().max(1)) as u32;

        if n > 0 {
            self.tokens = self.capacity.min(self.tokens.saturating_add(n));
            self.last_refill = Some(last + self.interval * n);
        }

        if self.tokens == self.capacity {
            // a full bucket does not bank time
            self.last_refill = Some(now);
        }
    }

    pub fn try_consume(&mut self, now: Instant) -> bool {
        self.refill(now);

        if self.tokens == 0 {
            return false;
        }

        self.tokens -= 1;
        true
    }

    /// When the next token becomes available.
    pub fn next_refill(&self, now: Instant) -> Instant {
        match self.last_refill {
            Some(l) if self.tokens < self.capacity => (l + self.interval).max(now),
            _ => now,
        }
    }
}
