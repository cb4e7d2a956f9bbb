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

//! Remote participants as the airspace monitor sees them.

use super::callsign::Callsign;
use super::parts::AircraftParts;
use super::situation::Situation;
use super::transponder::Transponder;

/// What a peer declared in its capabilities reply.
#[derive(Debug, Default, PartialEq, Eq, Copy, Clone, Serialize)]
pub struct Capabilities {
    /// ATCINFO
    pub atis: bool,
    /// MODELDESC
    pub icao_codes: bool,
    /// FASTPOS
    pub interim_positions: bool,
    /// VISUPDATE
    pub visual_positions: bool,
    /// ACCONFIG
    pub aircraft_config: bool,
}

impl Capabilities {
    /// Parses `KEY=1` pairs; anything else is ignored.
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut caps = Capabilities::default();

        for kv in pairs {
            let mut split = kv.split('=');
            let (key, value) = match (split.next(), split.next(), split.next()) {
                (Some(k), Some(v), None) => (k, v),
                _ => continue,
            };

            if value != "1" {
                continue;
            }

            match key {
                "ATCINFO" => caps.atis = true,
                "MODELDESC" => caps.icao_codes = true,
                "FASTPOS" => caps.interim_positions = true,
                "VISUPDATE" => caps.visual_positions = true,
                "ACCONFIG" => caps.aircraft_config = true,
                _ => {}
            }
        }

        caps
    }

    pub fn to_pairs(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (set, key) in &[
            (self.atis, "ATCINFO"),
            (self.icao_codes, "MODELDESC"),
            (self.interim_positions, "FASTPOS"),
            (self.visual_positions, "VISUPDATE"),
            (self.aircraft_config, "ACCONFIG"),
        ] {
            if *set {
                out.push(format!("{}=1", key));
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Client {
    pub callsign: Callsign,
    pub real_name: String,
    pub server: String,
    pub capabilities: Capabilities,
    pub capabilities_known: bool,
    /// Model string as announced by the peer
    pub queried_model_string: String,
}

impl Client {
    pub fn new(callsign: Callsign) -> Self {
        Client {
            callsign,
            real_name: String::new(),
            server: String::new(),
            capabilities: Capabilities::default(),
            capabilities_known: false,
            queried_model_string: String::new(),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize)]
pub enum ModelSource {
    None,
    /// Plane information reply
    Queried,
    /// Vendor identity packet
    Fsinn,
    /// Resolved against the model catalog
    Database,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AircraftModel {
    pub model_string: String,
    pub aircraft_icao: String,
    pub airline_icao: String,
    pub livery: String,
    pub combined_type: String,
    pub source: ModelSource,
}

impl Default for AircraftModel {
    fn default() -> Self {
        AircraftModel {
            model_string: String::new(),
            aircraft_icao: String::new(),
            airline_icao: String::new(),
            livery: String::new(),
            combined_type: String::new(),
            source: ModelSource::None,
        }
    }
}

impl AircraftModel {
    pub fn has_model_string(&self) -> bool {
        !self.model_string.is_empty()
    }

    pub fn is_from_database(&self) -> bool {
        self.source == ModelSource::Database
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteAircraft {
    pub callsign: Callsign,
    pub pilot_name: String,
    pub transponder: Transponder,
    pub situation: Situation,
    pub model: AircraftModel,
    pub com1_khz: Option<u32>,
    pub distance_nm: Option<f64>,
    pub bearing_deg: Option<f64>,
    pub parts: Option<AircraftParts>,
    /// A full config was seen, incremental ones may be merged
    pub parts_full_seen: bool,
    pub fast_positions: bool,
    pub last_updated_ms: i64,
}

impl RemoteAircraft {
    pub fn new(situation: Situation, transponder: Transponder) -> Self {
        RemoteAircraft {
            callsign: situation.callsign.clone(),
            pilot_name: String::new(),
            transponder,
            last_updated_ms: situation.timestamp_ms,
            situation,
            model: AircraftModel::default(),
            com1_khz: None,
            distance_nm: None,
            bearing_deg: None,
            parts: None,
            parts_full_seen: false,
            fast_positions: false,
        }
    }
}
