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

//! Delayed retries deciding when a new aircraft has enough data for
//! model matching. Each scheduled chain carries a generation, a result
//! computed for an older chain of the same callsign is ignored.

use crate::aviation::Callsign;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const MAX_ATTEMPTS: u32 = 5;
pub const RETRY_INTERVAL: Duration = Duration::from_millis(1500);

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Readiness {
    Ready,
    NotYet,
    /// The aircraft left, stop trying
    Gone,
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Resolved {
    Ready,
    GaveUp,
    Aborted,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ReadinessCheck {
    pub callsign: Callsign,
    pub generation: u64,
    pub attempt: u32,
}

#[derive(Debug)]
struct Pending {
    generation: u64,
    attempt: u32,
    due: Instant,
}

#[derive(Debug, Default)]
pub struct ReadinessTracker {
    pending: HashMap<Callsign, Pending>,
    generation: u64,
}

impl ReadinessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a fresh chain, replacing any running one for the callsign.
    pub fn schedule(&mut self, callsign: Callsign, now: Instant) -> u64 {
        self.generation += 1;
        self.pending.insert(
            callsign,
            Pending {
                generation: self.generation,
                attempt: 1,
                due: now + RETRY_INTERVAL,
            },
        );

        self.generation
    }

    pub fn cancel(&mut self, callsign: &Callsign) {
        self.pending.remove(callsign);
    }

    pub fn is_pending(&self, callsign: &Callsign) -> bool {
        self.pending.contains_key(callsign)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn due(&self, now: Instant) -> Vec<ReadinessCheck> {
        let mut checks: Vec<ReadinessCheck> = self
            .pending
            .iter()
            .filter(|(_, p)| p.due <= now)
            .map(|(cs, p)| ReadinessCheck {
                callsign: cs.clone(),
                generation: p.generation,
                attempt: p.attempt,
            })
            .collect();

        checks.sort_by(|a, b| a.callsign.cmp(&b.callsign));
        checks
    }

    /// Applies the outcome of one check. `None` while the chain goes on
    /// or when the check belongs to a chain that no longer exists.
    pub fn resolve(&mut self, check: &ReadinessCheck, readiness: Readiness, now: Instant) -> Option<Resolved> {
        let current = match self.pending.get_mut(&check.callsign) {
            Some(p) if p.generation == check.generation => p,
            _ => {
                trace!("stale readiness check for {}", check.callsign);
                return None;
            }
        };

        let resolved = match readiness {
            Readiness::Ready => Resolved::Ready,
            Readiness::Gone => Resolved::Aborted,
            Readiness::NotYet if current.attempt >= MAX_ATTEMPTS => Resolved::GaveUp,
            Readiness::NotYet => {
                current.attempt += 1;
                current.due = now + RETRY_INTERVAL;
                return None;
            }
        };

        self.pending.remove(&check.callsign);
        Some(resolved)
    }
}
