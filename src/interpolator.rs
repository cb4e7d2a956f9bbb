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

//! Smooths the sparse position reports of a remote aircraft into a pose
//! for the current frame. Pure computation, no network awareness.

use crate::aviation::{Callsign, Position, Situation, SituationHistory, SituationStore};
use crate::utils::read_lock;

/// Fractions beyond this mean nothing new arrived for a while.
const STALE_FRACTION: f64 = 2.0;

#[derive(Debug, Default, Clone, Copy)]
pub struct InterpolationHints {
    /// VTOL aircraft move their attitude while hovering in place
    pub vtol: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct InterpolationStatus {
    pub succeeded: bool,
    pub changed_position: bool,
    /// `None` when a stored situation was returned unchanged
    pub fraction: Option<f64>,
}

impl InterpolationStatus {
    pub fn is_extrapolating(&self) -> bool {
        self.fraction.map_or(false, |f| f > 1.0)
    }
}

#[derive(Debug, Clone)]
pub struct Interpolator {
    latency_ms: i64,
}

impl Interpolator {
    pub fn new(latency_ms: i64) -> Self {
        Interpolator { latency_ms }
    }

    /// Reads one callsign's history under its lock.
    pub fn interpolate_from_store(
        &self,
        store: &SituationStore,
        callsign: &Callsign,
        reference_ms: i64,
        hints: &InterpolationHints,
    ) -> (Option<Situation>, InterpolationStatus) {
        match store.history(callsign) {
            Some(h) => self.interpolate(callsign, &read_lock(&h), reference_ms, hints),
            None => (None, InterpolationStatus::default()),
        }
    }

    pub fn interpolate(
        &self,
        callsign: &Callsign,
        history: &SituationHistory,
        reference_ms: i64,
        hints: &InterpolationHints,
    ) -> (Option<Situation>, InterpolationStatus) {
        self.interpolate_slice(callsign, history.as_slice(), reference_ms, hints)
    }

    /// `situations` must be latest first. Anything after the first entry
    /// out of order is ignored.
    pub fn interpolate_slice(
        &self,
        callsign: &Callsign,
        situations: &[Situation],
        reference_ms: i64,
        hints: &InterpolationHints,
    ) -> (Option<Situation>, InterpolationStatus) {
        let mut status = InterpolationStatus::default();
        if situations.is_empty() {
            return (None, status);
        }

        let valid = sorted_prefix(situations);
        let split_ms = reference_ms - self.latency_ms;

        // latest first: [newer ..., | split |, older ...]
        let pivot = valid
            .iter()
            .position(|s| s.adjusted_ms() <= split_ms)
            .unwrap_or(valid.len());
        let (newer, older) = valid.split_at(pivot);

        status.succeeded = true;

        let (old, new) = match (newer.last(), older.first()) {
            (Some(new), Some(old)) => (old, new),
            // no motion known yet
            (Some(oldest_newer), None) => return (Some(oldest_newer.clone()), status),
            (None, Some(only)) if older.len() < 2 => return (Some(only.clone()), status),
            (None, _) => (&older[1], &older[0]),
        };

        let delta_ms = (new.adjusted_ms() - old.adjusted_ms()).abs() as f64;
        let fraction = if delta_ms > 0.0 {
            1.0 - (new.adjusted_ms() - split_ms) as f64 / delta_ms
        } else {
            1.0
        };

        if fraction > STALE_FRACTION {
            warn!("{} extrapolating far ahead, fraction {:.2}", callsign, fraction);
        } else if fraction > 1.0 {
            debug!("{} extrapolating, fraction {:.2}", callsign, fraction);
        }
        status.fraction = Some(fraction);

        let mut current = old.clone();

        let (a, b) = (old.position.normal_vector(), new.position.normal_vector());
        current.position = Position::from_normal_vector([
            lerp(a[0], b[0], fraction),
            lerp(a[1], b[1], fraction),
            lerp(a[2], b[2], fraction),
        ]);

        match old.altitude.blend(&new.altitude, fraction) {
            Some(alt) => current.altitude = alt,
            None => debug!("{} altitude datum changed, keeping the older altitude", callsign),
        }

        if !hints.vtol && a == b && old.altitude == new.altitude {
            return (Some(current), status);
        }
        status.changed_position = true;

        let mut heading_end = new.heading;
        if heading_end - old.heading < -180.0 {
            heading_end += 360.0;
        }
        if heading_end - old.heading > 180.0 {
            heading_end -= 360.0;
        }
        current.heading = lerp(old.heading, heading_end, fraction).rem_euclid(360.0);

        // network attitude is reported with inverted signs
        current.pitch = -lerp(old.pitch, new.pitch, fraction);
        current.bank = -lerp(old.bank, new.bank, fraction);
        current.ground_speed = lerp(old.ground_speed, new.ground_speed, fraction);

        (Some(current), status)
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    (b - a) * t + a
}

fn sorted_prefix(situations: &[Situation]) -> &[Situation] {
    let end = situations
        .windows(2)
        .position(|w| w[1].adjusted_ms() > w[0].adjusted_ms())
        .map_or(situations.len(), |i| i + 1);

    &situations[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aviation::Altitude;

    const LATENCY: i64 = 1000;

    fn at(ts: i64, lat: f64, lon: f64, alt: f64) -> Situation {
        let mut s = Situation::new(
            Callsign::aircraft("DLH123"),
            Position::from_lat_lon(lat, lon),
            Altitude::msl(alt),
        );
        s.timestamp_ms = ts;
        s
    }

    fn run(situations: &[Situation], reference_ms: i64) -> (Option<Situation>, InterpolationStatus) {
        Interpolator::new(LATENCY).interpolate_slice(
            &Callsign::aircraft("DLH123"),
            situations,
            reference_ms,
            &InterpolationHints::default(),
        )
    }

    #[test]
    fn test_fraction_between_two_reports() {
        let p0 = at(0, 48.0, 11.0, 3000.0);
        let p1 = at(1000, 48.1, 11.2, 4000.0);

        let (s, status) = run(&[p1.clone(), p0.clone()], 1000 + LATENCY / 2);
        let s = s.unwrap();
        let f = status.fraction.unwrap();

        assert!(f > 0.0 && f < 1.0, "fraction {}", f);
        assert!(s.position.latitude() > 48.0 && s.position.latitude() < 48.1);
        assert!(s.position.longitude() > 11.0 && s.position.longitude() < 11.2);
        assert!(s.position.distance_nm(&p0.position) < p0.position.distance_nm(&p1.position));
        assert!((s.altitude.feet - 3500.0).abs() < 1e-6);
    }

    #[test]
    fn test_heading_takes_shortest_turn() {
        let mut p0 = at(0, 48.0, 11.0, 3000.0);
        let mut p1 = at(1000, 48.1, 11.0, 3000.0);
        p0.heading = 350.0;
        p1.heading = 10.0;

        let (s, status) = run(&[p1, p0], 1500);
        assert_eq!(status.fraction, Some(0.5));
        let h = s.unwrap().heading;
        assert!(h < 1e-9 || (360.0 - h) < 1e-9, "heading {}", h);
    }

    #[test]
    fn test_unchanged_position_keeps_old_attitude() {
        let mut p0 = at(0, 48.0, 11.0, 3000.0);
        let mut p1 = at(1000, 48.0, 11.0, 3000.0);
        p0.heading = 90.0;
        p0.pitch = 2.0;
        p0.bank = -5.0;
        p1.heading = 180.0;
        p1.pitch = 10.0;
        p1.bank = 20.0;

        let (s, status) = run(&[p1, p0], 1500);
        let s = s.unwrap();
        assert!(!status.changed_position);
        assert_eq!(s.heading, 90.0);
        assert_eq!(s.pitch, 2.0);
        assert_eq!(s.bank, -5.0);
    }

    #[test]
    fn test_vtol_is_interpolated_in_place() {
        let mut p0 = at(0, 48.0, 11.0, 3000.0);
        let mut p1 = at(1000, 48.0, 11.0, 3000.0);
        p0.heading = 90.0;
        p1.heading = 180.0;

        let (s, status) = Interpolator::new(LATENCY).interpolate_slice(
            &p0.callsign.clone(),
            &[p1, p0],
            1500,
            &InterpolationHints { vtol: true },
        );
        assert!(status.changed_position);
        assert!((s.unwrap().heading - 135.0).abs() < 1e-9);
    }

    #[test]
    fn test_attitude_signs_are_inverted() {
        let mut p0 = at(0, 48.0, 11.0, 3000.0);
        let mut p1 = at(1000, 48.1, 11.0, 3000.0);
        p0.pitch = 2.0;
        p1.pitch = 4.0;
        p0.bank = 10.0;
        p1.bank = 20.0;

        let s = run(&[p1, p0], 1500).0.unwrap();
        assert!((s.pitch + 3.0).abs() < 1e-9);
        assert!((s.bank + 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_degraded_histories() {
        let p0 = at(0, 48.0, 11.0, 3000.0);
        let p1 = at(1000, 48.1, 11.0, 3000.0);
        let p2 = at(2000, 48.2, 11.0, 3000.0);

        assert_eq!(run(&[], 5000).0, None);

        // everything newer than the split: oldest newer unchanged
        let (s, status) = run(&[p2.clone(), p1.clone()], 1500);
        assert_eq!(s.unwrap(), p1);
        assert_eq!(status.fraction, None);

        // one older entry only
        assert_eq!(run(&[p0.clone()], 5000).0.unwrap(), p0);

        // two older entries: extrapolated beyond the newest
        let (s, status) = run(&[p1.clone(), p0.clone()], 3000);
        assert!(status.is_extrapolating());
        assert!((status.fraction.unwrap() - 2.0).abs() < 1e-9);
        assert!(s.unwrap().position.latitude() > 48.1);
    }

    #[test]
    fn test_out_of_order_tail_is_ignored() {
        let p0 = at(0, 48.0, 11.0, 3000.0);
        let p1 = at(1000, 48.1, 11.0, 3000.0);
        let bogus = at(5000, 40.0, 0.0, 3000.0);

        let (s, status) = run(&[p1, p0, bogus], 1500);
        assert_eq!(status.fraction, Some(0.5));
        let lat = s.unwrap().position.latitude();
        assert!(lat > 48.0 && lat < 48.1);
    }

    #[test]
    fn test_from_store() {
        let store = SituationStore::new(10);
        store.push(at(0, 48.0, 11.0, 3000.0));
        store.push(at(1000, 48.1, 11.0, 3000.0));

        let i = Interpolator::new(LATENCY);
        let hints = InterpolationHints::default();
        let (s, _) = i.interpolate_from_store(&store, &Callsign::aircraft("DLH123"), 1500, &hints);
        assert!(s.is_some());
        let (s, _) = i.interpolate_from_store(&store, &Callsign::aircraft("XYZ"), 1500, &hints);
        assert!(s.is_none());
    }
}
