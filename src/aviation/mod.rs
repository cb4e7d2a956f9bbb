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

//! Value types shared by the protocol client, the airspace monitor and
//! the interpolator.

pub mod aircraft;
pub mod callsign;
pub mod flightplan;
pub mod geo;
pub mod parts;
pub mod situation;
pub mod station;
pub mod transponder;

pub use self::aircraft::{AircraftModel, Capabilities, Client, ModelSource, RemoteAircraft};
pub use self::callsign::{Callsign, CallsignKind};
pub use self::flightplan::{FlightPlan, FlightRules};
pub use self::geo::{Altitude, ElevationSource, GroundElevation, Position};
pub use self::parts::AircraftParts;
pub use self::situation::{Situation, SituationHistory, SituationStore};
pub use self::station::{AtcStation, Facility};
pub use self::transponder::{Transponder, TransponderMode};

/// Rounds a frequency to the 25 kHz channel raster, the network drops
/// the last digit of 8.33 kHz style frequencies.
pub fn round_to_channel_spacing(khz: u32) -> u32 {
    ((khz as f64 / 25.0).round() * 25.0) as u32
}
