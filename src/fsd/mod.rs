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

//! The FSD protocol session client: codec, rate limiting and the
//! connection state machine.

pub mod bucket;
pub mod client;
pub mod error;
pub mod message;
pub mod offset;
pub mod parser;
pub mod pbh;
pub mod rawlog;

pub use self::client::FsdClient;
pub use self::error::{DecodeError, FsdError, Result, ServerErrorCode};
pub use self::message::{FsinnPacket, QueryType, TextTarget};

use crate::aviation::{Callsign, Capabilities, FlightPlan, Position, Situation, Transponder};
use serde_json::Value;

#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl ConnectionStatus {
    /// Waiting on the network to finish a transition.
    pub fn is_pending(self) -> bool {
        matches!(self, ConnectionStatus::Connecting | ConnectionStatus::Disconnecting)
    }
}

#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginMode {
    Pilot,
    Observer,
    /// Logged in as a pilot, but never advertises or sends fast positions
    Stealth,
}

impl Default for LoginMode {
    fn default() -> Self {
        LoginMode::Pilot
    }
}

impl LoginMode {
    pub fn is_observer(self) -> bool {
        self == LoginMode::Observer
    }
}

#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize)]
pub enum AtisLineKind {
    VoiceRoom,
    Text,
    LogoffTime,
    End,
}

impl AtisLineKind {
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "V" => Some(AtisLineKind::VoiceRoom),
            "T" => Some(AtisLineKind::Text),
            "Z" => Some(AtisLineKind::LogoffTime),
            "E" => Some(AtisLineKind::End),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextMessage {
    pub sender: Callsign,
    pub target: TextTarget,
    pub message: String,
    /// Radio messages only: the matching COM frequencies
    pub frequencies_khz: Vec<u32>,
    pub received_ms: i64,
}

/// Typed inbound traffic, raised by the client once per decoded packet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Event {
    ConnectionStatusChanged {
        from: ConnectionStatus,
        to: ConnectionStatus,
    },
    AtcPositionUpdate {
        callsign: Callsign,
        frequency_khz: u32,
        position: Position,
        range_nm: f64,
    },
    AtcDisconnected {
        callsign: Callsign,
    },
    PilotPositionUpdate {
        situation: Situation,
        transponder: Transponder,
    },
    InterimPositionUpdate {
        situation: Situation,
    },
    PilotDisconnected {
        callsign: Callsign,
    },
    TextMessage(TextMessage),
    FlightPlan(FlightPlan),
    /// Somebody asked the server for the plan of `target`
    FlightPlanQueried {
        sender: Callsign,
        target: Callsign,
    },
    Capabilities {
        callsign: Callsign,
        capabilities: Capabilities,
    },
    RealName {
        callsign: Callsign,
        name: String,
    },
    Server {
        callsign: Callsign,
        server: String,
    },
    Com1Frequency {
        callsign: Callsign,
        frequency_khz: u32,
    },
    AtisLine {
        callsign: Callsign,
        kind: AtisLineKind,
        line: String,
    },
    ValidAtc {
        callsign: Callsign,
        valid: bool,
    },
    PlaneInformation {
        callsign: Callsign,
        aircraft: String,
        airline: String,
        livery: String,
    },
    FsinnInformation {
        callsign: Callsign,
        packet: FsinnPacket,
    },
    CustomPacket {
        callsign: Callsign,
        data: Vec<String>,
    },
    AircraftConfig {
        callsign: Callsign,
        config: Value,
        offset_ms: i64,
    },
    Pong {
        callsign: Callsign,
        elapsed_ms: i64,
    },
    Metar {
        metar: String,
    },
    ServerError {
        code: ServerErrorCode,
        parameter: String,
        description: String,
        fatal: bool,
    },
    KillRequested {
        reason: String,
    },
    Muted {
        muted: bool,
    },
    RawMessage {
        line: String,
        sent: bool,
    },
}

/// Outbound work handed to the client by the monitor and the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Query {
        receiver: Callsign,
        query: QueryType,
        payload: Vec<String>,
    },
    PlaneInfo {
        receiver: Callsign,
    },
    FsinnInfo {
        receiver: Callsign,
    },
    AircraftConfigFull {
        receiver: Callsign,
    },
    AddInterimReceiver(Callsign),
    RemoveInterimReceiver(Callsign),
    Text {
        receiver: Callsign,
        message: String,
    },
    Radio {
        frequencies_khz: Vec<u32>,
        message: String,
    },
    Metar {
        station: String,
    },
    Ping {
        receiver: Callsign,
    },
    FileFlightPlan(FlightPlan),
    QueryFlightPlan(Callsign),
}

impl Request {
    pub fn query(receiver: &Callsign, query: QueryType) -> Self {
        Request::Query {
            receiver: receiver.clone(),
            query,
            payload: vec![],
        }
    }
}
