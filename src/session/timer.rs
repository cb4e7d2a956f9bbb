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

/// A periodic timer driven by handle clocks instead of a reactor.
#[derive(Debug, Clone)]
pub struct Timer {
    interval: Duration,
    next: Option<Instant>,
}

impl Timer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: None,
        }
    }

    pub fn start(&mut self, now: Instant) {
        self.next = Some(now + self.interval);
    }

    pub fn stop(&mut self) {
        self.next = None;
    }

    pub fn is_active(&self) -> bool {
        self.next.is_some()
    }

    /// True at most once per interval. A stopped timer never fires.
    pub fn fired(&mut self, now: Instant) -> bool {
        match self.next {
            Some(due) if now >= due => {
                self.next = Some(now + self.interval);
                true
            }
            _ => false,
        }
    }
}

/// Fires once at a due instant, then disarms itself.
#[derive(Debug, Clone, Default)]
pub struct OneShot {
    due: Option<Instant>,
}

impl OneShot {
    /// Arms the timer. An already armed timer keeps the earlier due instant.
    pub fn schedule(&mut self, due: Instant) {
        self.due = Some(match self.due {
            Some(d) if d < due => d,
            _ => due,
        });
    }

    pub fn cancel(&mut self) {
        self.due = None;
    }

    pub fn is_pending(&self) -> bool {
        self.due.is_some()
    }

    pub fn fired(&mut self, now: Instant) -> bool {
        match self.due {
            Some(d) if now >= d => {
                self.due = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_periodic() {
        let t0 = Instant::now();
        let mut t = Timer::new(Duration::from_millis(1000));

        assert!(!t.fired(t0 + Duration::from_secs(10)));

        t.start(t0);
        assert!(!t.fired(t0 + Duration::from_millis(999)));
        assert!(t.fired(t0 + Duration::from_millis(1000)));
        assert!(!t.fired(t0 + Duration::from_millis(1500)));
        assert!(t.fired(t0 + Duration::from_millis(2000)));

        t.stop();
        assert!(!t.is_active());
        assert!(!t.fired(t0 + Duration::from_secs(5)));
    }

    #[test]
    fn test_one_shot_keeps_earliest() {
        let t0 = Instant::now();
        let mut o = OneShot::default();

        o.schedule(t0 + Duration::from_millis(500));
        o.schedule(t0 + Duration::from_millis(900));
        assert!(o.fired(t0 + Duration::from_millis(500)));
        assert!(!o.is_pending());
        assert!(!o.fired(t0 + Duration::from_millis(900)));
    }
}
