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

use super::callsign::Callsign;
use super::geo::{Altitude, GroundElevation, Position};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use crate::utils::{read_lock, write_lock};

/// One reported pose of a remote aircraft.
/// `timestamp_ms` is the local receive time, `time_offset_ms` the
/// assumed transmission delay added on top of it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Situation {
    pub callsign: Callsign,
    pub position: Position,
    pub altitude: Altitude,
    pub pressure_altitude: Option<Altitude>,
    /// True heading in deg
    pub heading: f64,
    pub pitch: f64,
    pub bank: f64,
    /// Ground speed in kts
    pub ground_speed: f64,
    pub on_ground: bool,
    pub timestamp_ms: i64,
    pub time_offset_ms: i64,
    pub interim: bool,
    pub elevation: Option<GroundElevation>,
}

impl Situation {
    pub fn new(callsign: Callsign, position: Position, altitude: Altitude) -> Self {
        Situation {
            callsign,
            position,
            altitude,
            pressure_altitude: None,
            heading: 0.0,
            pitch: 0.0,
            bank: 0.0,
            ground_speed: 0.0,
            on_ground: false,
            timestamp_ms: 0,
            time_offset_ms: 0,
            interim: false,
            elevation: None,
        }
    }

    pub fn adjusted_ms(&self) -> i64 {
        self.timestamp_ms + self.time_offset_ms
    }

    /// Same normal vector and same altitude, bit for bit.
    pub fn is_same_position(&self, other: &Situation) -> bool {
        self.position.normal_vector() == other.position.normal_vector()
            && self.altitude == other.altitude
    }
}

/// Situations of one callsign, latest first, bounded.
#[derive(Debug, Clone)]
pub struct SituationHistory {
    entries: Vec<Situation>,
    max: usize,
}

impl SituationHistory {
    pub fn new(max: usize) -> Self {
        SituationHistory {
            entries: Vec::new(),
            max: max.max(1),
        }
    }

    /// Inserts keeping the latest-first order by timestamp, evicting the oldest.
    pub fn push(&mut self, s: Situation) {
        let at = self
            .entries
            .iter()
            .position(|e| e.timestamp_ms <= s.timestamp_ms)
            .unwrap_or(self.entries.len());

        self.entries.insert(at, s);
        self.entries.truncate(self.max);
    }

    pub fn latest(&self) -> Option<&Situation> {
        self.entries.first()
    }

    pub fn as_slice(&self) -> &[Situation] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub type SharedHistory = Arc<RwLock<SituationHistory>>;

/// Per-callsign histories. The monitor is the only writer; interpolation
/// may read from any thread, one history lock at a time.
#[derive(Debug, Clone)]
pub struct SituationStore {
    histories: Arc<RwLock<HashMap<Callsign, SharedHistory>>>,
    max: usize,
}

impl SituationStore {
    pub fn new(max: usize) -> Self {
        SituationStore {
            histories: Arc::new(RwLock::new(HashMap::new())),
            max,
        }
    }

    pub fn push(&self, s: Situation) {
        let history = write_lock(&self.histories)
            .entry(s.callsign.clone())
            .or_insert_with(|| Arc::new(RwLock::new(SituationHistory::new(self.max))))
            .clone();

        write_lock(&history).push(s);
    }

    pub fn history(&self, callsign: &Callsign) -> Option<SharedHistory> {
        read_lock(&self.histories).get(callsign).cloned()
    }

    pub fn latest(&self, callsign: &Callsign) -> Option<Situation> {
        self.history(callsign)
            .and_then(|h| read_lock(&h).latest().cloned())
    }

    pub fn count(&self, callsign: &Callsign) -> usize {
        self.history(callsign).map_or(0, |h| read_lock(&h).len())
    }

    /// A copy of the history, latest first.
    pub fn situations(&self, callsign: &Callsign) -> Vec<Situation> {
        self.history(callsign)
            .map_or_else(Vec::new, |h| read_lock(&h).as_slice().to_vec())
    }

    /// Latest situation of every callsign except `except`.
    pub fn latest_of_others(&self, except: &Callsign) -> Vec<Situation> {
        let all: Vec<SharedHistory> = read_lock(&self.histories)
            .iter()
            .filter(|(cs, _)| *cs != except)
            .map(|(_, h)| h.clone())
            .collect();

        all.iter()
            .filter_map(|h| read_lock(h).latest().cloned())
            .collect()
    }

    pub fn remove(&self, callsign: &Callsign) {
        write_lock(&self.histories).remove(callsign);
    }

    pub fn clear(&self) {
        write_lock(&self.histories).clear();
    }

    pub fn len(&self) -> usize {
        read_lock(&self.histories).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ts: i64) -> Situation {
        let mut s = Situation::new(
            Callsign::aircraft("DLH123"),
            Position::from_lat_lon(48.0, 11.0),
            Altitude::msl(3000.0),
        );
        s.timestamp_ms = ts;
        s
    }

    #[test]
    fn test_history_latest_first_and_bounded() {
        let mut h = SituationHistory::new(3);
        h.push(at(1000));
        h.push(at(3000));
        h.push(at(2000));
        h.push(at(4000));

        let ts: Vec<i64> = h.as_slice().iter().map(|s| s.timestamp_ms).collect();
        assert_eq!(ts, vec![4000, 3000, 2000]);
        assert_eq!(h.latest().map(|s| s.timestamp_ms), Some(4000));
    }

    #[test]
    fn test_store_shares_histories() {
        let store = SituationStore::new(10);
        let reader = store.clone();
        store.push(at(1000));
        store.push(at(2000));

        let cs = Callsign::new("dlh123");
        assert_eq!(reader.count(&cs), 2);
        assert_eq!(reader.latest(&cs).map(|s| s.timestamp_ms), Some(2000));
        assert!(reader.latest_of_others(&cs).is_empty());

        store.remove(&cs);
        assert_eq!(reader.count(&cs), 0);
    }

    #[test]
    fn test_adjusted_time() {
        let mut s = at(1000);
        s.time_offset_ms = 6000;
        assert_eq!(s.adjusted_ms(), 7000);
    }
}
