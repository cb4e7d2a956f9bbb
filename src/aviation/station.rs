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
use super::geo::Position;
use chrono::{DateTime, Utc};

#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum Facility {
    Observer,
    FlightService,
    Delivery,
    Ground,
    Tower,
    Approach,
    Center,
    Unknown,
}

impl Facility {
    pub fn from_wire(v: i32) -> Self {
        match v {
            0 => Facility::Observer,
            1 => Facility::FlightService,
            2 => Facility::Delivery,
            3 => Facility::Ground,
            4 => Facility::Tower,
            5 => Facility::Approach,
            6 => Facility::Center,
            _ => Facility::Unknown,
        }
    }

    pub fn to_wire(self) -> i32 {
        match self {
            Facility::Observer => 0,
            Facility::FlightService => 1,
            Facility::Delivery => 2,
            Facility::Ground => 3,
            Facility::Tower => 4,
            Facility::Approach => 5,
            Facility::Center => 6,
            Facility::Unknown => -1,
        }
    }
}

/// Default visible range by role, matched against the callsign suffix.
const ROLE_RANGES_NM: [(&str, f64); 7] = [
    ("ATIS", 150.0),
    ("GND", 10.0),
    ("TWR", 25.0),
    ("DEP", 150.0),
    ("APP", 150.0),
    ("CTR", 300.0),
    ("FSS", 1500.0),
];

/// Stations often announce a range of 0, use the role default as a floor.
pub fn fix_atc_range(network_nm: f64, callsign: &Callsign) -> f64 {
    let suffix = match callsign.suffix() {
        Some(s) => s,
        None => return network_nm,
    };

    ROLE_RANGES_NM
        .iter()
        .find(|(role, _)| suffix.contains(role))
        .map_or(network_nm, |(_, nm)| network_nm.max(*nm))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtcStation {
    pub callsign: Callsign,
    pub controller_name: String,
    pub controller_id: String,
    pub frequency_khz: Option<u32>,
    pub position: Option<Position>,
    pub range_nm: f64,
    pub online: bool,
    pub booked_from: Option<DateTime<Utc>>,
    pub booked_until: Option<DateTime<Utc>>,
    pub atis: Option<String>,
    pub metar: Option<String>,
    pub distance_nm: Option<f64>,
    pub bearing_deg: Option<f64>,
    #[serde(skip)]
    pub last_updated_ms: i64,
}

impl Default for AtcStation {
    fn default() -> Self {
        AtcStation::new(Callsign::new(""))
    }
}

impl AtcStation {
    pub fn new(callsign: Callsign) -> Self {
        AtcStation {
            callsign,
            controller_name: String::new(),
            controller_id: String::new(),
            frequency_khz: None,
            position: None,
            range_nm: 0.0,
            online: false,
            booked_from: None,
            booked_until: None,
            atis: None,
            metar: None,
            distance_nm: None,
            bearing_deg: None,
            last_updated_ms: 0,
        }
    }

    pub fn has_booking_times(&self) -> bool {
        self.booked_from.is_some() && self.booked_until.is_some()
    }

    /// Merges an online record with its booking. Live fields come from
    /// `self`, scheduling fields from `booking`; whichever side lacks a
    /// value takes it from the other. The booking is flagged online.
    pub fn sync_with_booking(&mut self, booking: &mut AtcStation) {
        if booking.has_booking_times() {
            self.booked_from = booking.booked_from;
            self.booked_until = booking.booked_until;
        } else {
            booking.booked_from = self.booked_from;
            booking.booked_until = self.booked_until;
        }

        if self.controller_name.is_empty() {
            self.controller_name = booking.controller_name.clone();
        } else {
            booking.controller_name = self.controller_name.clone();
        }

        if self.controller_id.is_empty() {
            self.controller_id = booking.controller_id.clone();
        } else {
            booking.controller_id = self.controller_id.clone();
        }

        if self.frequency_khz.is_some() {
            booking.frequency_khz = self.frequency_khz;
        }

        if self.position.is_some() {
            booking.position = self.position;
        }

        booking.range_nm = self.range_nm;
        booking.distance_nm = self.distance_nm;
        booking.bearing_deg = self.bearing_deg;
        booking.online = true;
    }

    pub fn update_relative(&mut self, own: &Position) {
        match self.position {
            Some(p) if !own.is_null() => {
                self.distance_nm = Some(own.distance_nm(&p));
                self.bearing_deg = Some(own.bearing_deg(&p));
            }
            _ => {
                self.distance_nm = None;
                self.bearing_deg = None;
            }
        }
    }

    /// Within its declared visible range of `own`.
    pub fn is_in_range(&self, own: &Position) -> bool {
        match self.position {
            Some(p) => own.distance_nm(&p) <= self.range_nm,
            None => false,
        }
    }
}
