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

//! The airspace as the network describes it: stations, aircraft, their
//! identities and histories, reconciled from protocol events.

pub mod atis;
pub mod cache;
pub mod elevation;
pub mod lookup;
pub mod monitor;
pub mod readiness;
pub mod snapshot;

pub use self::monitor::AirspaceMonitor;
pub use self::snapshot::AirspaceSnapshot;

use crate::aviation::{AtcStation, Callsign, RemoteAircraft};
use crate::fsd::Event;

/// Everything subscribers of the session get to see.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AirspaceEvent {
    /// Network events the monitor does not consume itself
    Network(Event),
    AtcOnlineChanged,
    AtcBookedChanged,
    AtcConnectionStatus {
        station: AtcStation,
        online: bool,
    },
    AtisReceived {
        callsign: Callsign,
        message: String,
    },
    AircraftAdded(RemoteAircraft),
    AircraftUpdated(RemoteAircraft),
    AircraftRemoved(Callsign),
    ReadyForModelMatching(RemoteAircraft),
    ReverseLookupMessage {
        callsign: Callsign,
        message: String,
    },
    Snapshot(AirspaceSnapshot),
}
