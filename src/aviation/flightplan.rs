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

#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum FlightRules {
    Ifr,
    Vfr,
    Dvfr,
    Svfr,
}

impl FlightRules {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "I" => FlightRules::Ifr,
            "D" => FlightRules::Dvfr,
            "S" => FlightRules::Svfr,
            _ => FlightRules::Vfr,
        }
    }

    pub fn to_wire(self) -> &'static str {
        match self {
            FlightRules::Ifr => "I",
            FlightRules::Vfr => "V",
            FlightRules::Dvfr => "D",
            FlightRules::Svfr => "S",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightPlan {
    pub callsign: Callsign,
    pub rules: FlightRules,
    pub aircraft_type: String,
    pub true_airspeed_kts: u32,
    pub departure: String,
    /// `hhmm`, zero padded
    pub departure_time_planned: String,
    pub departure_time_actual: String,
    pub cruise_altitude: String,
    pub destination: String,
    pub enroute_minutes: u32,
    pub fuel_minutes: u32,
    pub alternate: String,
    pub remarks: String,
    pub route: String,
}

impl FlightPlan {
    /// Value of a `KEY/VALUE` item in the remarks, e.g. `OPR/DLH`.
    pub fn remarks_value(&self, key: &str) -> Option<String> {
        let prefix = format!("{}/", key);

        self.remarks
            .split_whitespace()
            .find(|t| t.to_uppercase().starts_with(&prefix))
            .map(|t| t[prefix.len()..].to_uppercase())
            .filter(|v| !v.is_empty())
    }

    /// Airline designator from the remarks, if the operator is given.
    pub fn remarks_airline(&self) -> Option<String> {
        self.remarks_value("OPR")
            .filter(|v| v.len() == 3 && v.chars().all(|c| c.is_ascii_alphabetic()))
    }
}

/// Pads a wire departure time such as `930` to `0930`.
pub fn pad_hhmm(t: u32) -> String {
    let s = format!("0000{}", t);
    s[s.len() - 4..].to_string()
}

/// Interprets bare numeric cruise levels the way planning tools emit them.
pub fn normalize_cruise_altitude(raw: &str, rules: FlightRules) -> String {
    let s = raw.trim();
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return s.to_string();
    }

    let ca: u64 = match s.parse() {
        Ok(v) => v,
        Err(_) => return s.to_string(),
    };

    match rules {
        FlightRules::Ifr if ca >= 1000 => format!("FL{}", ca / 100),
        FlightRules::Ifr => format!("FL{}", s),
        _ if ca >= 5000 => format!("FL{}", ca / 100),
        _ => format!("{}ft", s),
    }
}
