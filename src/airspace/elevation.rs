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

//! Ground elevation below a remote aircraft, from the cheapest source
//! that can answer.

use crate::aviation::{ElevationSource, GroundElevation, Situation, SituationStore};
use crate::ownship::PositionProvider;
use std::sync::Arc;

/// Cached elevations of the same callsign closer than this are reused.
const CACHE_RADIUS_NM: f64 = 0.05;
/// Stationary aircraft within this radius contribute to the average.
const AVERAGE_RADIUS_NM: f64 = 1.0;
const STATIONARY_KTS: f64 = 1.0;

pub struct ElevationResolver {
    provider: Arc<dyn PositionProvider>,
}

impl ElevationResolver {
    pub fn new(provider: Arc<dyn PositionProvider>) -> Self {
        ElevationResolver { provider }
    }

    /// `None` means nothing could answer yet, the provider may still be
    /// working on the request.
    pub fn resolve(&self, situation: &Situation, store: &SituationStore) -> Option<GroundElevation> {
        let own = store.situations(&situation.callsign);

        if let Some(e) = from_cache(situation, &own) {
            return Some(e);
        }

        if let Some(e) = self
            .provider
            .request_elevation(&situation.callsign, &situation.position)
        {
            return Some(e);
        }

        let others = store.latest_of_others(&situation.callsign);
        if let Some(e) = average_of_stationary(situation, &others) {
            return Some(e);
        }

        if let Some(e) = extrapolate(situation, &own) {
            return Some(e);
        }

        if situation.on_ground {
            return Some(GroundElevation::new(situation.altitude.feet, ElevationSource::Network));
        }

        trace!("no elevation for {} yet", situation.callsign);
        None
    }
}

fn from_cache(situation: &Situation, history: &[Situation]) -> Option<GroundElevation> {
    history
        .iter()
        .filter(|s| s.position.distance_nm(&situation.position) < CACHE_RADIUS_NM)
        .filter_map(|s| s.elevation)
        .next()
        .map(|e| GroundElevation::new(e.feet, ElevationSource::Cache))
}

fn average_of_stationary(situation: &Situation, others: &[Situation]) -> Option<GroundElevation> {
    let elevations: Vec<f64> = others
        .iter()
        .filter(|s| s.on_ground && s.ground_speed < STATIONARY_KTS)
        .filter(|s| s.position.distance_nm(&situation.position) < AVERAGE_RADIUS_NM)
        .filter_map(|s| s.elevation.map(|e| e.feet))
        .collect();

    if elevations.is_empty() {
        return None;
    }

    let mean = elevations.iter().sum::<f64>() / elevations.len() as f64;
    Some(GroundElevation::new(mean, ElevationSource::Average))
}

/// Linear in time through the two latest situations that carry one.
fn extrapolate(situation: &Situation, history: &[Situation]) -> Option<GroundElevation> {
    let mut known = history
        .iter()
        .filter(|s| s.timestamp_ms <= situation.timestamp_ms)
        .filter_map(|s| s.elevation.map(|e| (s.timestamp_ms, e.feet)));

    let (t1, e1) = known.next()?;
    let (t2, e2) = known.next()?;

    let feet = if t1 == t2 {
        e1
    } else {
        let rate = (e1 - e2) / (t1 - t2) as f64;
        e1 + rate * (situation.timestamp_ms - t1) as f64
    };

    Some(GroundElevation::new(feet, ElevationSource::Extrapolated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aviation::{Altitude, Callsign, Position};
    use std::sync::Mutex;

    struct Provider {
        answer: Option<f64>,
        asked: Mutex<usize>,
    }

    impl PositionProvider for Provider {
        fn own_position(&self) -> Position {
            Position::from_lat_lon(0.0, 0.0)
        }

        fn request_elevation(&self, _callsign: &Callsign, _position: &Position) -> Option<GroundElevation> {
            *self.asked.lock().unwrap() += 1;
            self.answer.map(|f| GroundElevation::new(f, ElevationSource::Provider))
        }
    }

    fn resolver(answer: Option<f64>) -> (ElevationResolver, Arc<Provider>) {
        let p = Arc::new(Provider {
            answer,
            asked: Mutex::new(0),
        });
        (ElevationResolver::new(p.clone()), p)
    }

    fn sit(cs: &str, lat: f64, ts: i64, elevation: Option<f64>) -> Situation {
        let mut s = Situation::new(Callsign::aircraft(cs), Position::from_lat_lon(lat, 11.0), Altitude::msl(5000.0));
        s.timestamp_ms = ts;
        s.elevation = elevation.map(|f| GroundElevation::new(f, ElevationSource::Provider));
        s
    }

    #[test]
    fn test_cache_before_provider() {
        let (r, p) = resolver(Some(700.0));
        let store = SituationStore::new(6);
        store.push(sit("DLH1", 48.0, 1000, Some(1500.0)));

        let e = r.resolve(&sit("DLH1", 48.0001, 2000, None), &store).unwrap();
        assert_eq!(e, GroundElevation::new(1500.0, ElevationSource::Cache));
        assert_eq!(*p.asked.lock().unwrap(), 0);

        let e = r.resolve(&sit("DLH1", 48.5, 3000, None), &store).unwrap();
        assert_eq!(e.source, ElevationSource::Provider);
        assert_eq!(*p.asked.lock().unwrap(), 1);
    }

    #[test]
    fn test_average_of_stationary_neighbours() {
        let (r, _) = resolver(None);
        let store = SituationStore::new(6);

        for (cs, lat, feet, gs) in &[("A1", 48.001, 1000.0, 0.0), ("A2", 48.002, 1200.0, 0.5), ("A3", 48.003, 5000.0, 30.0)] {
            let mut s = sit(cs, *lat, 1000, Some(*feet));
            s.on_ground = true;
            s.ground_speed = *gs;
            store.push(s);
        }
        // too far away
        let mut far = sit("A4", 49.0, 1000, Some(9000.0));
        far.on_ground = true;
        store.push(far);

        let e = r.resolve(&sit("DLH1", 48.0, 2000, None), &store).unwrap();
        assert_eq!(e, GroundElevation::new(1100.0, ElevationSource::Average));
    }

    #[test]
    fn test_extrapolation() {
        let (r, _) = resolver(None);
        let store = SituationStore::new(6);
        store.push(sit("DLH1", 48.0, 1000, Some(1000.0)));
        store.push(sit("DLH1", 48.1, 2000, Some(1100.0)));

        let e = r.resolve(&sit("DLH1", 48.2, 3000, None), &store).unwrap();
        assert_eq!(e.source, ElevationSource::Extrapolated);
        assert!((e.feet - 1200.0).abs() < 1e-9);
    }

    #[test]
    fn test_nothing_known() {
        let (r, _) = resolver(None);
        let store = SituationStore::new(6);

        assert_eq!(r.resolve(&sit("DLH1", 48.0, 1000, None), &store), None);

        let mut s = sit("DLH1", 48.0, 1000, None);
        s.on_ground = true;
        s.altitude = Altitude::msl(1470.0);
        let e = r.resolve(&s, &store).unwrap();
        assert_eq!(e, GroundElevation::new(1470.0, ElevationSource::Network));
    }
}
