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

use super::ConnectionStatus;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FsdError {
    #[error("I/O error {0}")]
    IOError(#[from] io::Error),
    #[error("JSON error {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("decode error {0}")]
    Decode(#[from] DecodeError),
    #[error("cannot connect while {0:?}")]
    NotDisconnected(ConnectionStatus),
}

pub type Result<T> = std::result::Result<T, FsdError>;

#[derive(Error, Debug, PartialEq)]
pub enum DecodeError {
    #[error("unknown packet '{0}'")]
    UnknownPacket(String),
    #[error("{0}: empty payload")]
    EmptyPayload(&'static str),
    #[error("{kind}: expected at least {expected} fields, got {got}")]
    TooFewFields {
        kind: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("{kind}: invalid {field} '{value}'")]
    InvalidField {
        kind: &'static str,
        field: &'static str,
        value: String,
    },
}

/// Server rejection reasons as sent in `$ER` packets.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize)]
pub enum ServerErrorCode {
    NoError,
    CallsignInUse,
    InvalidCallsign,
    AlreadyRegistered,
    SyntaxError,
    InvalidSrcCallsign,
    InvalidCidPassword,
    NoSuchCallsign,
    NoFlightPlan,
    NoWeatherProfile,
    InvalidRevision,
    RequestedLevelTooHigh,
    ServerFull,
    CidSuspended,
    InvalidCtrl,
    RatingTooLow,
    InvalidClient,
    AuthTimeout,
    Unknown,
}

const CODES: [ServerErrorCode; 18] = [
    ServerErrorCode::NoError,
    ServerErrorCode::CallsignInUse,
    ServerErrorCode::InvalidCallsign,
    ServerErrorCode::AlreadyRegistered,
    ServerErrorCode::SyntaxError,
    ServerErrorCode::InvalidSrcCallsign,
    ServerErrorCode::InvalidCidPassword,
    ServerErrorCode::NoSuchCallsign,
    ServerErrorCode::NoFlightPlan,
    ServerErrorCode::NoWeatherProfile,
    ServerErrorCode::InvalidRevision,
    ServerErrorCode::RequestedLevelTooHigh,
    ServerErrorCode::ServerFull,
    ServerErrorCode::CidSuspended,
    ServerErrorCode::InvalidCtrl,
    ServerErrorCode::RatingTooLow,
    ServerErrorCode::InvalidClient,
    ServerErrorCode::AuthTimeout,
];

impl ServerErrorCode {
    pub fn from_wire(n: u32) -> Self {
        CODES
            .get(n as usize)
            .copied()
            .unwrap_or(ServerErrorCode::Unknown)
    }

    pub fn to_wire(self) -> u32 {
        CODES.iter().position(|c| *c == self).unwrap_or(CODES.len()) as u32
    }

    /// Fatal codes end the session.
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ServerErrorCode::CallsignInUse
                | ServerErrorCode::InvalidCallsign
                | ServerErrorCode::InvalidCidPassword
                | ServerErrorCode::InvalidRevision
                | ServerErrorCode::RequestedLevelTooHigh
                | ServerErrorCode::ServerFull
                | ServerErrorCode::CidSuspended
                | ServerErrorCode::RatingTooLow
                | ServerErrorCode::InvalidClient
                | ServerErrorCode::AuthTimeout
        )
    }

    pub fn description(self) -> &'static str {
        match self {
            ServerErrorCode::NoError => "OK",
            ServerErrorCode::CallsignInUse => "The requested callsign is already taken",
            ServerErrorCode::InvalidCallsign => "The requested callsign is not valid",
            ServerErrorCode::AlreadyRegistered => "Already registered",
            ServerErrorCode::SyntaxError => "Malformed packet, syntax error",
            ServerErrorCode::InvalidSrcCallsign => "Packet was using an invalid source callsign",
            ServerErrorCode::InvalidCidPassword => "Wrong user ID or password, inactive account",
            ServerErrorCode::NoSuchCallsign => "No such callsign",
            ServerErrorCode::NoFlightPlan => "No flight plan",
            ServerErrorCode::NoWeatherProfile => "Requested weather profile does not exist",
            ServerErrorCode::InvalidRevision => "This server does not support our protocol version",
            ServerErrorCode::RequestedLevelTooHigh => "Not authorized to use the requested pilot rating",
            ServerErrorCode::ServerFull => "The server is full",
            ServerErrorCode::CidSuspended => "The user account is suspended",
            ServerErrorCode::InvalidCtrl => "Invalid control",
            ServerErrorCode::RatingTooLow => "Not authorized to use the requested rating",
            ServerErrorCode::InvalidClient => "This software is not authorized on this network",
            ServerErrorCode::AuthTimeout => "Client did not authenticate in time",
            ServerErrorCode::Unknown => "Unknown server error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip_and_fatality() {
        assert_eq!(ServerErrorCode::from_wire(9), ServerErrorCode::NoWeatherProfile);
        assert_eq!(ServerErrorCode::NoWeatherProfile.to_wire(), 9);
        assert_eq!(ServerErrorCode::from_wire(17), ServerErrorCode::AuthTimeout);
        assert_eq!(ServerErrorCode::from_wire(99), ServerErrorCode::Unknown);

        let fatal: Vec<u32> = (0..18)
            .filter(|n| ServerErrorCode::from_wire(*n).is_fatal())
            .collect();
        assert_eq!(fatal, vec![1, 2, 6, 10, 11, 12, 13, 15, 16, 17]);
    }
}
