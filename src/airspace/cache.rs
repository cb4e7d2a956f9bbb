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

//! Flight plans received from the network, readable from any thread.

use crate::aviation::{Callsign, FlightPlan};
use crate::session::context::Context;
use crate::utils::{read_lock, write_lock};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::{Duration, Instant};

/// Plans older than this are queried again.
pub const FLIGHT_PLAN_TTL_MS: i64 = 30_000;
const POLL_INTERVAL: Duration = Duration::from_millis(10);
const WAIT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
pub struct CachedPlan {
    pub plan: FlightPlan,
    pub updated_ms: i64,
}

impl CachedPlan {
    pub fn is_fresh(&self, now_ms: i64) -> bool {
        now_ms - self.updated_ms < FLIGHT_PLAN_TTL_MS
    }
}

#[derive(Debug, Clone, Default)]
pub struct FlightPlanCache {
    plans: Arc<RwLock<HashMap<Callsign, CachedPlan>>>,
}

impl FlightPlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, plan: FlightPlan, now_ms: i64) {
        write_lock(&self.plans).insert(
            plan.callsign.clone(),
            CachedPlan {
                plan,
                updated_ms: now_ms,
            },
        );
    }

    pub fn get(&self, callsign: &Callsign) -> Option<CachedPlan> {
        read_lock(&self.plans).get(callsign).cloned()
    }

    pub fn remove(&self, callsign: &Callsign) {
        write_lock(&self.plans).remove(callsign);
    }

    pub fn clear(&self) {
        write_lock(&self.plans).clear();
    }

    /// The plan of `callsign`, querying the network when the cached one
    /// is missing or stale and waiting up to a second for the answer.
    ///
    /// Must not run on the session thread, which is the one filling the
    /// cache; there the cached plan is returned as is. Returns `None` on
    /// timeout or shutdown.
    pub fn load<F>(&self, callsign: &Callsign, context: &Context, request: F) -> Option<FlightPlan>
    where
        F: FnOnce(&Callsign),
    {
        let now_ms = Utc::now().timestamp_millis();
        let cached = self.get(callsign);

        if let Some(ref c) = cached {
            if c.is_fresh(now_ms) {
                return Some(c.plan.clone());
            }
        }

        if context.is_session_thread() {
            warn!("flight plan of {} requested on the session thread, not waiting", callsign);
            return cached.map(|c| c.plan);
        }

        request(callsign);

        let started = Instant::now();
        while started.elapsed() < WAIT_TIMEOUT {
            if context.is_shutting_down() {
                return None;
            }

            if let Some(c) = self.get(callsign) {
                if c.updated_ms >= now_ms {
                    return Some(c.plan);
                }
            }

            thread::sleep(POLL_INTERVAL);
        }

        debug!("no flight plan for {} within {:?}", callsign, WAIT_TIMEOUT);
        None
    }
}
