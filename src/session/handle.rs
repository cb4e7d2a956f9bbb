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

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub trait Handle {
    fn get_utc(&self) -> DateTime<Utc>;
    fn get_clock(&self) -> Instant;
    fn get_frequency(&self) -> u16;

    /// Wall clock in milliseconds since the Unix epoch, the time base
    /// of every stored situation.
    fn get_epoch_ms(&self) -> i64 {
        self.get_utc().timestamp_millis()
    }
}

pub trait Pushable<D>: Handle {
    fn push_data(&mut self, d: D);
}

#[derive(Debug, Clone, Copy)]
pub struct BasicHandle {
    utc: DateTime<Utc>,
    clock: Instant,
    freq: u16,
}

impl Handle for BasicHandle {
    fn get_utc(&self) -> DateTime<Utc> {
        self.utc
    }

    fn get_clock(&self) -> Instant {
        self.clock
    }

    fn get_frequency(&self) -> u16 {
        self.freq
    }
}

impl BasicHandle {
    pub fn new(freq: u16) -> Self {
        Self {
            utc: Utc::now(),
            clock: Instant::now(),
            freq,
        }
    }

    /// A handle frozen at the given instants, used to drive time by hand.
    pub fn at(utc: DateTime<Utc>, clock: Instant, freq: u16) -> Self {
        Self { utc, clock, freq }
    }

    /// The same handle `ms` milliseconds later on both clocks.
    pub fn advanced(&self, ms: u64) -> Self {
        Self {
            utc: self.utc + ChronoDuration::milliseconds(ms as i64),
            clock: self.clock + Duration::from_millis(ms),
            freq: self.freq,
        }
    }
}

pub struct PushableHandle<'a, H, D>
where
    D: 'a,
    H: 'a + Handle,
{
    handle: &'a H,
    queue: &'a mut VecDeque<D>,
}

impl<'a, H, D> Handle for PushableHandle<'a, H, D>
where
    H: 'a + Handle,
{
    fn get_utc(&self) -> DateTime<Utc> {
        self.handle.get_utc()
    }

    fn get_clock(&self) -> Instant {
        self.handle.get_clock()
    }

    fn get_frequency(&self) -> u16 {
        self.handle.get_frequency()
    }
}

impl<'a, H, D> Pushable<D> for PushableHandle<'a, H, D>
where
    H: 'a + Handle,
{
    fn push_data(&mut self, d: D) {
        self.queue.push_back(d);
    }
}

impl<'a, H, D> PushableHandle<'a, H, D>
where
    H: 'a + Handle,
{
    pub fn new(handle: &'a H, queue: &'a mut VecDeque<D>) -> Self {
        Self { handle, queue }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advanced_moves_both_clocks() {
        let h = BasicHandle::new(100);
        let later = h.advanced(1500);

        assert_eq!(later.get_epoch_ms() - h.get_epoch_ms(), 1500);
        assert_eq!(later.get_clock() - h.get_clock(), Duration::from_millis(1500));
        assert_eq!(later.get_frequency(), 100);
    }

    #[test]
    fn test_pushable_handle_queues_in_order() {
        let h = BasicHandle::new(10);
        let mut q = VecDeque::new();

        {
            let mut p = PushableHandle::new(&h, &mut q);
            p.push_data(1);
            p.push_data(2);
            assert_eq!(p.get_frequency(), 10);
        }

        assert_eq!(q, VecDeque::from(vec![1, 2]));
    }
}
