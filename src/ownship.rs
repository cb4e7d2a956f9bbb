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

//! The local aircraft, as fed by the hosting simulator.

use crate::aviation::{AircraftParts, Callsign, GroundElevation, Position, Transponder};
use crate::config::OwnAircraftConfig;
use crate::utils::{read_lock, write_lock};
use std::sync::{Arc, RwLock};

#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct OwnAircraft {
    pub callsign: Callsign,
    /// Latitude in deg
    pub lat: f64,
    /// Longitude in deg
    pub lon: f64,
    /// True altitude in ft
    pub altitude: f64,
    /// Pressure altitude in ft
    pub pressure_altitude: f64,
    pub heading: f64,
    pub pitch: f64,
    pub bank: f64,
    /// Ground speed in kts
    pub gs: f64,
    pub transponder: Transponder,
    pub parts: AircraftParts,
    pub com1_khz: u32,
    pub com2_khz: u32,
    pub aircraft_icao: String,
    pub airline_icao: String,
    pub combined_type: String,
    pub livery: String,
    pub model_string: String,
}

impl OwnAircraft {
    pub fn new(callsign: Callsign) -> Self {
        OwnAircraft {
            callsign,
            lat: 0.0,
            lon: 0.0,
            altitude: 0.0,
            pressure_altitude: 0.0,
            heading: 0.0,
            pitch: 0.0,
            bank: 0.0,
            gs: 0.0,
            transponder: Transponder::default(),
            parts: AircraftParts::default(),
            com1_khz: 122800,
            com2_khz: 122800,
            aircraft_icao: String::new(),
            airline_icao: String::new(),
            combined_type: String::new(),
            livery: String::new(),
            model_string: String::new(),
        }
    }

    /// Starting state before the simulator reports anything.
    pub fn from_config(callsign: Callsign, c: &OwnAircraftConfig) -> Self {
        OwnAircraft {
            lat: c.lat,
            lon: c.lon,
            altitude: c.altitude,
            pressure_altitude: c.altitude,
            com1_khz: c.com1_khz,
            com2_khz: c.com2_khz,
            aircraft_icao: c.aircraft_icao.clone(),
            airline_icao: c.airline_icao.clone(),
            combined_type: c.combined_type.clone(),
            livery: c.livery.clone(),
            model_string: c.model_string.clone(),
            ..OwnAircraft::new(callsign)
        }
    }

    pub fn position(&self) -> Position {
        Position::from_lat_lon(self.lat, self.lon)
    }

    pub fn on_ground(&self) -> bool {
        self.parts.on_ground
    }
}

/// Source of the local aircraft for the protocol client.
pub trait OwnAircraftProvider: Send + Sync {
    fn own_aircraft(&self) -> OwnAircraft;
}

/// What the airspace monitor needs to know about the local world.
pub trait PositionProvider: Send + Sync {
    fn own_position(&self) -> Position;

    /// Terrain elevation below `position`. `None` means the request is in
    /// flight and the caller should try again later.
    fn request_elevation(&self, callsign: &Callsign, position: &Position) -> Option<GroundElevation>;
}

/// The local aircraft behind a lock, written by the simulator side and
/// read by the session thread.
#[derive(Debug, Clone)]
pub struct SharedOwnAircraft(Arc<RwLock<OwnAircraft>>);

impl SharedOwnAircraft {
    pub fn new(aircraft: OwnAircraft) -> Self {
        SharedOwnAircraft(Arc::new(RwLock::new(aircraft)))
    }

    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut OwnAircraft),
    {
        f(&mut write_lock(&self.0));
    }
}

impl OwnAircraftProvider for SharedOwnAircraft {
    fn own_aircraft(&self) -> OwnAircraft {
        read_lock(&self.0).clone()
    }
}

impl PositionProvider for SharedOwnAircraft {
    fn own_position(&self) -> Position {
        read_lock(&self.0).position()
    }

    // no simulator terrain probe attached
    fn request_elevation(&self, _callsign: &Callsign, _position: &Position) -> Option<GroundElevation> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let mut c = OwnAircraftConfig::default();
        c.lat = 48.35;
        c.airline_icao = "DLH".to_string();

        let own = OwnAircraft::from_config(Callsign::aircraft("DLH123"), &c);
        assert_eq!(own.lat, 48.35);
        assert_eq!(own.aircraft_icao, "C172");
        assert_eq!(own.airline_icao, "DLH");
        assert_eq!(own.com1_khz, 122800);
        assert_eq!(own.callsign, Callsign::aircraft("DLH123"));
    }

    #[test]
    fn test_shared_update_visible_to_readers() {
        let shared = SharedOwnAircraft::new(OwnAircraft::new(Callsign::aircraft("DLH123")));
        let reader = shared.clone();

        shared.update(|a| {
            a.lat = 48.35;
            a.lon = 11.78;
            a.parts.on_ground = true;
        });

        let own = reader.own_aircraft();
        assert_eq!(own.lat, 48.35);
        assert!(own.on_ground());
        assert!((reader.own_position().latitude() - 48.35).abs() < 1e-9);
    }
}
