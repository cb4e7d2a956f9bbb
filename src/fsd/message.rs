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

//! FSD packets and their line encoding. Every packet is one line of
//! colon separated fields behind a short prefix; the transport adds the
//! `\r\n` terminator.

use super::pbh::{self, Pbh};
use crate::aviation::flightplan::FlightPlan;
use crate::aviation::{Facility, TransponderMode};
use std::fmt;

pub const SERVER: &str = "SERVER";
/// Frequencies travel as kHz minus this offset.
pub const FREQUENCY_OFFSET_KHZ: u32 = 100_000;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
pub enum QueryType {
    IsValidAtc,
    Capabilities,
    Com1Freq,
    RealName,
    Server,
    Atis,
    PublicIp,
    Inf,
    FlightPlan,
    AircraftConfig,
    Unknown,
}

impl QueryType {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "ATC" => QueryType::IsValidAtc,
            "CAPS" => QueryType::Capabilities,
            "C?" => QueryType::Com1Freq,
            "RN" => QueryType::RealName,
            "SV" => QueryType::Server,
            "ATIS" => QueryType::Atis,
            "IP" => QueryType::PublicIp,
            "INF" => QueryType::Inf,
            "FP" => QueryType::FlightPlan,
            "ACC" => QueryType::AircraftConfig,
            _ => QueryType::Unknown,
        }
    }

    pub fn to_wire(self) -> &'static str {
        match self {
            QueryType::IsValidAtc => "ATC",
            QueryType::Capabilities => "CAPS",
            QueryType::Com1Freq => "C?",
            QueryType::RealName => "RN",
            QueryType::Server => "SV",
            QueryType::Atis => "ATIS",
            QueryType::PublicIp => "IP",
            QueryType::Inf => "INF",
            QueryType::FlightPlan => "FP",
            QueryType::AircraftConfig => "ACC",
            QueryType::Unknown => "",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_wire())
    }
}

/// Receiver field of a `#TM` packet.
#[derive(Debug, PartialEq, Eq, Clone, Serialize)]
pub enum TextTarget {
    Callsign(String),
    /// Radio message, frequencies in kHz
    Frequencies(Vec<u32>),
    Broadcast,
    Supervisors,
}

impl TextTarget {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "*" => return TextTarget::Broadcast,
            "*S" => return TextTarget::Supervisors,
            _ => {}
        }

        if s.starts_with('@') {
            let freqs: Vec<u32> = s
                .split('&')
                .filter_map(|f| f.trim_start_matches('@').parse::<u32>().ok())
                .map(|f| f + FREQUENCY_OFFSET_KHZ)
                .collect();

            if !freqs.is_empty() {
                return TextTarget::Frequencies(freqs);
            }
        }

        TextTarget::Callsign(s.to_string())
    }

    pub fn to_wire(&self) -> String {
        match self {
            TextTarget::Callsign(cs) => cs.clone(),
            TextTarget::Frequencies(f) => f
                .iter()
                .map(|khz| format!("@{}", khz.saturating_sub(FREQUENCY_OFFSET_KHZ)))
                .collect::<Vec<_>>()
                .join("&"),
            TextTarget::Broadcast => "*".to_string(),
            TextTarget::Supervisors => "*S".to_string(),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct PilotDataUpdate {
    pub mode: TransponderMode,
    pub sender: String,
    /// As reported, may be garbage
    pub transponder: i32,
    pub rating: u8,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_true: i32,
    pub altitude_pressure: i32,
    pub ground_speed: i32,
    pub pbh: Pbh,
}

#[derive(Debug, PartialEq, Clone)]
pub struct InterimPilotDataUpdate {
    pub sender: String,
    pub receiver: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_true: i32,
    pub ground_speed: i32,
    pub pbh: Pbh,
}

#[derive(Debug, PartialEq, Clone)]
pub struct AtcDataUpdate {
    pub sender: String,
    pub frequency_khz: u32,
    pub facility: Facility,
    pub visible_range: i32,
    pub rating: u8,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: i32,
}

/// Identity packet pair of the FSInn client, still used by a few peers.
#[derive(Debug, PartialEq, Eq, Clone, Serialize)]
pub struct FsinnPacket {
    pub sender: String,
    pub receiver: String,
    pub airline_icao: String,
    pub aircraft_icao: String,
    pub combined_type: String,
    pub model_string: String,
}

#[derive(Debug, PartialEq, Clone)]
pub struct ClientIdentification {
    pub sender: String,
    pub client_id: u16,
    pub client_name: String,
    pub version_major: u32,
    pub version_minor: u32,
    pub cid: String,
    pub sys_uid: String,
    pub challenge: String,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Message {
    AddAtc {
        sender: String,
        real_name: String,
        cid: String,
        password: String,
        rating: u8,
        revision: u32,
    },
    AddPilot {
        sender: String,
        cid: String,
        password: String,
        rating: u8,
        revision: u32,
        sim_type: u32,
        real_name: String,
    },
    DeleteAtc {
        sender: String,
        cid: String,
    },
    DeletePilot {
        sender: String,
        cid: String,
    },
    AtcDataUpdate(AtcDataUpdate),
    PilotDataUpdate(PilotDataUpdate),
    InterimPilotDataUpdate(InterimPilotDataUpdate),
    PlaneInfoRequest {
        sender: String,
        receiver: String,
    },
    PlaneInformation {
        sender: String,
        receiver: String,
        aircraft: String,
        airline: String,
        livery: String,
    },
    FsinnRequest(FsinnPacket),
    FsinnInformation(FsinnPacket),
    /// `#SB` subtype nobody here understands
    CustomPilotPacket {
        sender: String,
        receiver: String,
        subtype: String,
        data: Vec<String>,
    },
    ClientQuery {
        sender: String,
        receiver: String,
        query: QueryType,
        payload: Vec<String>,
    },
    ClientResponse {
        sender: String,
        receiver: String,
        query: QueryType,
        payload: Vec<String>,
    },
    FlightPlan {
        receiver: String,
        plan: FlightPlan,
    },
    TextMessage {
        sender: String,
        receiver: TextTarget,
        message: String,
    },
    Ping {
        sender: String,
        receiver: String,
        timestamp: String,
    },
    Pong {
        sender: String,
        receiver: String,
        timestamp: String,
    },
    ServerError {
        sender: String,
        receiver: String,
        code: u32,
        parameter: String,
        description: String,
    },
    KillRequest {
        sender: String,
        receiver: String,
        reason: String,
    },
    ServerIdentification {
        sender: String,
        receiver: String,
        version: String,
        challenge: String,
    },
    ClientIdentification(ClientIdentification),
    Heartbeat,
    Rehost {
        sender: String,
        receiver: String,
        host: String,
    },
    Mute {
        sender: String,
        receiver: String,
        mute: bool,
    },
    MetarRequest {
        sender: String,
        station: String,
    },
    MetarResponse {
        sender: String,
        receiver: String,
        metar: String,
    },
}

/// Colons would shift every following field.
pub fn no_colons(s: &str) -> String {
    s.replace(':', "")
}

fn hhmm_to_wire(t: &str) -> u32 {
    t.trim().parse().unwrap_or(0)
}

impl Message {
    pub fn to_line(&self) -> String {
        match self {
            Message::AddAtc {
                sender,
                real_name,
                cid,
                password,
                rating,
                revision,
            } => format!(
                "#AA{}:{}:{}:{}:{}:{}:{}",
                sender,
                SERVER,
                no_colons(real_name),
                cid,
                password,
                rating,
                revision
            ),
            Message::AddPilot {
                sender,
                cid,
                password,
                rating,
                revision,
                sim_type,
                real_name,
            } => format!(
                "#AP{}:{}:{}:{}:{}:{}:{}:{}",
                sender,
                SERVER,
                cid,
                password,
                rating,
                revision,
                sim_type,
                no_colons(real_name)
            ),
            Message::DeleteAtc { sender, cid } => format!("#DA{}:{}", sender, cid),
            Message::DeletePilot { sender, cid } => format!("#DP{}:{}", sender, cid),
            Message::AtcDataUpdate(u) => format!(
                "%{}:{}:{}:{}:{}:{:.5}:{:.5}:{}",
                u.sender,
                u.frequency_khz.saturating_sub(FREQUENCY_OFFSET_KHZ),
                u.facility.to_wire(),
                u.visible_range,
                u.rating,
                u.latitude,
                u.longitude,
                u.elevation
            ),
            Message::PilotDataUpdate(u) => format!(
                "@{}:{}:{}:{}:{:.5}:{:.5}:{}:{}:{}:{}",
                u.mode.to_wire(),
                u.sender,
                u.transponder,
                u.rating,
                u.latitude,
                u.longitude,
                u.altitude_true,
                u.ground_speed,
                pbh::pack(&u.pbh),
                u.altitude_pressure - u.altitude_true
            ),
            Message::InterimPilotDataUpdate(u) => format!(
                "#SB{}:{}:VI:{:.5}:{:.5}:{}:{}:{}",
                u.sender,
                u.receiver,
                u.latitude,
                u.longitude,
                u.altitude_true,
                u.ground_speed,
                pbh::pack(&u.pbh)
            ),
            Message::PlaneInfoRequest { sender, receiver } => {
                format!("#SB{}:{}:PIR", sender, receiver)
            }
            Message::PlaneInformation {
                sender,
                receiver,
                aircraft,
                airline,
                livery,
            } => {
                let mut line = format!("#SB{}:{}:PI:GEN:EQUIPMENT={}", sender, receiver, aircraft);
                if !airline.is_empty() {
                    line.push_str(&format!(":AIRLINE={}", airline));
                }
                if !livery.is_empty() {
                    line.push_str(&format!(":LIVERY={}", livery));
                }
                line
            }
            Message::FsinnRequest(p) => fsinn_line("FSIPIR", p),
            Message::FsinnInformation(p) => fsinn_line("FSIPI", p),
            Message::CustomPilotPacket {
                sender,
                receiver,
                subtype,
                data,
            } => {
                let mut fields = vec![sender.clone(), receiver.clone(), subtype.clone()];
                fields.extend(data.iter().cloned());
                format!("#SB{}", fields.join(":"))
            }
            Message::ClientQuery {
                sender,
                receiver,
                query,
                payload,
            } => client_line("$CQ", sender, receiver, *query, payload),
            Message::ClientResponse {
                sender,
                receiver,
                query,
                payload,
            } => client_line("$CR", sender, receiver, *query, payload),
            Message::FlightPlan { receiver, plan } => format!(
                "$FP{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}",
                plan.callsign,
                receiver,
                plan.rules.to_wire(),
                no_colons(&plan.aircraft_type),
                plan.true_airspeed_kts,
                plan.departure,
                hhmm_to_wire(&plan.departure_time_planned),
                hhmm_to_wire(&plan.departure_time_actual),
                no_colons(&plan.cruise_altitude),
                plan.destination,
                plan.enroute_minutes / 60,
                plan.enroute_minutes % 60,
                plan.fuel_minutes / 60,
                plan.fuel_minutes % 60,
                plan.alternate,
                no_colons(&plan.remarks),
                no_colons(&plan.route)
            ),
            Message::TextMessage {
                sender,
                receiver,
                message,
            } => format!("#TM{}:{}:{}", sender, receiver.to_wire(), message),
            Message::Ping {
                sender,
                receiver,
                timestamp,
            } => format!("$PI{}:{}:{}", sender, receiver, timestamp),
            Message::Pong {
                sender,
                receiver,
                timestamp,
            } => format!("$PO{}:{}:{}", sender, receiver, timestamp),
            Message::ServerError {
                sender,
                receiver,
                code,
                parameter,
                description,
            } => format!(
                "$ER{}:{}:{:03}:{}:{}",
                sender, receiver, code, parameter, description
            ),
            Message::KillRequest {
                sender,
                receiver,
                reason,
            } => format!("$!!{}:{}:{}", sender, receiver, reason),
            Message::ServerIdentification {
                sender,
                receiver,
                version,
                challenge,
            } => format!("$DI{}:{}:{}:{}", sender, receiver, version, challenge),
            Message::ClientIdentification(id) => format!(
                "$ID{}:{}:{:04x}:{}:{}:{}:{}:{}:{}",
                id.sender,
                SERVER,
                id.client_id,
                id.client_name,
                id.version_major,
                id.version_minor,
                id.cid,
                id.sys_uid,
                id.challenge
            ),
            Message::Heartbeat => "#DL".to_string(),
            Message::Rehost {
                sender,
                receiver,
                host,
            } => format!("$XX{}:{}:{}", sender, receiver, host),
            Message::Mute {
                sender,
                receiver,
                mute,
            } => format!("#MU{}:{}:{}", sender, receiver, *mute as u8),
            Message::MetarRequest { sender, station } => {
                format!("$AX{}:{}:METAR:{}", sender, SERVER, station)
            }
            Message::MetarResponse {
                sender,
                receiver,
                metar,
            } => format!("$AR{}:{}:{}", sender, receiver, metar),
        }
    }
}

fn fsinn_line(subtype: &str, p: &FsinnPacket) -> String {
    format!(
        "#SB{}:{}:{}:0:{}:{}:::::{}:{}",
        p.sender, p.receiver, subtype, p.airline_icao, p.aircraft_icao, p.combined_type, p.model_string
    )
}

fn client_line(prefix: &str, sender: &str, receiver: &str, query: QueryType, payload: &[String]) -> String {
    let mut line = format!("{}{}:{}:{}", prefix, sender, receiver, query.to_wire());
    for p in payload {
        line.push(':');
        line.push_str(p);
    }
    line
}
