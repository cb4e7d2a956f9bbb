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

//! Periodic summary of the airspace, doubling as a sweep for traffic
//! that silently went away.

use crate::aviation::{AtcStation, Callsign, RemoteAircraft};
use crate::session::timer::Timer;
use std::cmp::Ordering;
use std::time::{Duration, Instant};

const ANALYZE_INTERVAL: Duration = Duration::from_secs(5);
const AIRCRAFT_TIMEOUT_MS: i64 = 15_000;
const ATC_TIMEOUT_MS: i64 = 50_000;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AirspaceSnapshot {
    pub timestamp_ms: i64,
    /// Closest first, unknown distances last
    pub aircraft: Vec<RemoteAircraft>,
    pub stations: Vec<AtcStation>,
}

impl AirspaceSnapshot {
    pub fn aircraft_callsigns(&self) -> Vec<Callsign> {
        self.aircraft.iter().map(|a| a.callsign.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub snapshot: AirspaceSnapshot,
    pub stale_aircraft: Vec<Callsign>,
    pub stale_stations: Vec<Callsign>,
}

fn by_distance(a: &RemoteAircraft, b: &RemoteAircraft) -> Ordering {
    match (a.distance_nm, b.distance_nm) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.callsign.cmp(&b.callsign),
    }
}

#[derive(Debug)]
pub struct Analyzer {
    timer: Timer,
    enabled: bool,
}

impl Default for Analyzer {
    fn default() -> Self {
        Analyzer {
            timer: Timer::new(ANALYZE_INTERVAL),
            enabled: false,
        }
    }
}

impl Analyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_enabled(&mut self, enabled: bool, now: Instant) {
        if enabled == self.enabled {
            return;
        }

        self.enabled = enabled;
        if enabled {
            self.timer.start(now);
        } else {
            self.timer.stop();
        }
        debug!("airspace analyzer {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Produces an analysis once per interval while enabled.
    pub fn tick<'a, A, S>(&mut self, now: Instant, now_ms: i64, aircraft: A, stations: S) -> Option<Analysis>
    where
        A: Iterator<Item = &'a RemoteAircraft>,
        S: Iterator<Item = &'a AtcStation>,
    {
        if !self.timer.fired(now) {
            return None;
        }

        Some(analyze(now_ms, aircraft, stations))
    }
}

pub fn analyze<'a, A, S>(now_ms: i64, aircraft: A, stations: S) -> Analysis
where
    A: Iterator<Item = &'a RemoteAircraft>,
    S: Iterator<Item = &'a AtcStation>,
{
    let mut live_aircraft = Vec::new();
    let mut stale_aircraft = Vec::new();
    for a in aircraft {
        if now_ms - a.last_updated_ms > AIRCRAFT_TIMEOUT_MS {
            stale_aircraft.push(a.callsign.clone());
        } else {
            live_aircraft.push(a.clone());
        }
    }
    live_aircraft.sort_by(by_distance);

    let mut live_stations = Vec::new();
    let mut stale_stations = Vec::new();
    for s in stations {
        if now_ms - s.last_updated_ms > ATC_TIMEOUT_MS {
            stale_stations.push(s.callsign.clone());
        } else {
            live_stations.push(s.clone());
        }
    }

    Analysis {
        snapshot: AirspaceSnapshot {
            timestamp_ms: now_ms,
            aircraft: live_aircraft,
            stations: live_stations,
        },
        stale_aircraft,
        stale_stations,
    }
}
