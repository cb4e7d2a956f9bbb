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

use super::error::DecodeError;
use super::message::*;
use super::pbh;
use crate::aviation::flightplan::{normalize_cruise_altitude, pad_hhmm, FlightPlan};
use crate::aviation::{Callsign, Facility, FlightRules, TransponderMode};
use nom::branch::alt;
use nom::bytes::complete::{tag, take_till};
use nom::character::complete::char;
use nom::multi::separated_list0;
use nom::IResult;
use std::str::FromStr;

type DecodeResult<T> = Result<T, DecodeError>;

fn prefix(i: &str) -> IResult<&str, &str> {
    alt((
        alt((
            tag("#AA"),
            tag("#AP"),
            tag("#DA"),
            tag("#DP"),
            tag("#SB"),
            tag("#TM"),
            tag("#DL"),
            tag("#MU"),
            tag("%"),
            tag("@"),
        )),
        alt((
            tag("$CQ"),
            tag("$CR"),
            tag("$FP"),
            tag("$PI"),
            tag("$PO"),
            tag("$ER"),
            tag("$!!"),
            tag("$DI"),
            tag("$ID"),
            tag("$XX"),
            tag("$AX"),
            tag("$AR"),
        )),
    ))(i)
}

fn tokens(i: &str) -> IResult<&str, Vec<&str>> {
    separated_list0(char(':'), take_till(|c| c == ':'))(i)
}

fn expect(kind: &'static str, t: &[&str], n: usize) -> DecodeResult<()> {
    if t.len() < n {
        return Err(DecodeError::TooFewFields {
            kind,
            expected: n,
            got: t.len(),
        });
    }
    Ok(())
}

fn field<T: FromStr>(kind: &'static str, name: &'static str, raw: &str) -> DecodeResult<T> {
    raw.trim().parse().map_err(|_| DecodeError::InvalidField {
        kind,
        field: name,
        value: raw.to_string(),
    })
}

fn invalid(kind: &'static str, name: &'static str, raw: &str) -> DecodeError {
    DecodeError::InvalidField {
        kind,
        field: name,
        value: raw.to_string(),
    }
}

/// Latitude or longitude, finite and within `limit` degrees.
fn coordinate(kind: &'static str, name: &'static str, raw: &str, limit: f64) -> DecodeResult<f64> {
    let v: f64 = field(kind, name, raw)?;
    if !v.is_finite() || v.abs() > limit {
        return Err(invalid(kind, name, raw));
    }
    Ok(v)
}

fn latitude(kind: &'static str, raw: &str) -> DecodeResult<f64> {
    coordinate(kind, "latitude", raw, 90.0)
}

fn longitude(kind: &'static str, raw: &str) -> DecodeResult<f64> {
    coordinate(kind, "longitude", raw, 180.0)
}

fn owned(t: &[&str]) -> Vec<String> {
    t.iter().map(|s| s.to_string()).collect()
}

/// Decodes one received line, without its terminator.
pub fn decode(line: &str) -> DecodeResult<Message> {
    let line = line.trim();

    let (payload, cmd) =
        prefix(line).map_err(|_| DecodeError::UnknownPacket(line.chars().take(3).collect()))?;

    if cmd == "#DL" {
        return Ok(Message::Heartbeat);
    }

    let payload = payload.trim();
    if payload.is_empty() {
        return Err(DecodeError::EmptyPayload(cmd_name(cmd)));
    }

    // take_till never fails, an empty field is still a field
    let t = match tokens(payload) {
        Ok((_, t)) => t,
        Err(_) => return Err(DecodeError::EmptyPayload(cmd_name(cmd))),
    };

    match cmd {
        "#AA" => {
            expect("#AA", &t, 7)?;
            Ok(Message::AddAtc {
                sender: t[0].to_string(),
                real_name: t[2].to_string(),
                cid: t[3].to_string(),
                password: t[4].to_string(),
                rating: field("#AA", "rating", t[5])?,
                revision: field("#AA", "revision", t[6])?,
            })
        }
        "#AP" => {
            expect("#AP", &t, 8)?;
            Ok(Message::AddPilot {
                sender: t[0].to_string(),
                cid: t[2].to_string(),
                password: t[3].to_string(),
                rating: field("#AP", "rating", t[4])?,
                revision: field("#AP", "revision", t[5])?,
                sim_type: field("#AP", "sim type", t[6])?,
                real_name: t[7..].join(":"),
            })
        }
        "#DA" | "#DP" => {
            expect(cmd_name(cmd), &t, 1)?;
            let sender = t[0].to_string();
            let cid = t.get(1).map_or_else(String::new, |s| s.to_string());
            Ok(if cmd == "#DA" {
                Message::DeleteAtc { sender, cid }
            } else {
                Message::DeletePilot { sender, cid }
            })
        }
        "%" => decode_atc_update(&t),
        "@" => decode_pilot_update(&t),
        "#SB" => decode_custom(&t),
        "#TM" => {
            expect("#TM", &t, 3)?;
            Ok(Message::TextMessage {
                sender: t[0].to_string(),
                receiver: TextTarget::from_wire(t[1]),
                message: t[2..].join(":"),
            })
        }
        "#MU" => {
            expect("#MU", &t, 3)?;
            Ok(Message::Mute {
                sender: t[0].to_string(),
                receiver: t[1].to_string(),
                mute: t[2] == "1",
            })
        }
        "$CQ" | "$CR" => {
            expect(cmd_name(cmd), &t, 3)?;
            let sender = t[0].to_string();
            let receiver = t[1].to_string();
            let query = QueryType::from_wire(t[2]);
            let payload = owned(&t[3..]);
            Ok(if cmd == "$CQ" {
                Message::ClientQuery {
                    sender,
                    receiver,
                    query,
                    payload,
                }
            } else {
                Message::ClientResponse {
                    sender,
                    receiver,
                    query,
                    payload,
                }
            })
        }
        "$FP" => decode_flight_plan(&t),
        "$PI" | "$PO" => {
            expect(cmd_name(cmd), &t, 3)?;
            let sender = t[0].to_string();
            let receiver = t[1].to_string();
            let timestamp = t[2].to_string();
            Ok(if cmd == "$PI" {
                Message::Ping {
                    sender,
                    receiver,
                    timestamp,
                }
            } else {
                Message::Pong {
                    sender,
                    receiver,
                    timestamp,
                }
            })
        }
        "$ER" => {
            expect("$ER", &t, 3)?;
            Ok(Message::ServerError {
                sender: t[0].to_string(),
                receiver: t[1].to_string(),
                code: field("$ER", "code", t[2])?,
                parameter: t.get(3).map_or_else(String::new, |s| s.to_string()),
                description: if t.len() > 4 { t[4..].join(":") } else { String::new() },
            })
        }
        "$!!" => {
            expect("$!!", &t, 2)?;
            Ok(Message::KillRequest {
                sender: t[0].to_string(),
                receiver: t[1].to_string(),
                reason: if t.len() > 2 { t[2..].join(":") } else { String::new() },
            })
        }
        "$DI" => {
            expect("$DI", &t, 4)?;
            Ok(Message::ServerIdentification {
                sender: t[0].to_string(),
                receiver: t[1].to_string(),
                version: t[2].to_string(),
                challenge: t[3].to_string(),
            })
        }
        "$ID" => {
            expect("$ID", &t, 8)?;
            Ok(Message::ClientIdentification(ClientIdentification {
                sender: t[0].to_string(),
                client_id: u16::from_str_radix(t[2], 16).map_err(|_| DecodeError::InvalidField {
                    kind: "$ID",
                    field: "client id",
                    value: t[2].to_string(),
                })?,
                client_name: t[3].to_string(),
                version_major: field("$ID", "major", t[4])?,
                version_minor: field("$ID", "minor", t[5])?,
                cid: t[6].to_string(),
                sys_uid: t[7].to_string(),
                challenge: t.get(8).map_or_else(String::new, |s| s.to_string()),
            }))
        }
        "$XX" => {
            expect("$XX", &t, 3)?;
            Ok(Message::Rehost {
                sender: t[0].to_string(),
                receiver: t[1].to_string(),
                host: t[2].to_string(),
            })
        }
        "$AX" => {
            expect("$AX", &t, 4)?;
            Ok(Message::MetarRequest {
                sender: t[0].to_string(),
                station: t[3].to_string(),
            })
        }
        "$AR" => {
            expect("$AR", &t, 3)?;
            Ok(Message::MetarResponse {
                sender: t[0].to_string(),
                receiver: t[1].to_string(),
                metar: t[2..].join(":"),
            })
        }
        _ => Err(DecodeError::UnknownPacket(cmd.to_string())),
    }
}

fn cmd_name(cmd: &str) -> &'static str {
    match cmd {
        "#AA" => "#AA",
        "#AP" => "#AP",
        "#DA" => "#DA",
        "#DP" => "#DP",
        "#SB" => "#SB",
        "#TM" => "#TM",
        "#MU" => "#MU",
        "%" => "%",
        "@" => "@",
        "$CQ" => "$CQ",
        "$CR" => "$CR",
        "$FP" => "$FP",
        "$PI" => "$PI",
        "$PO" => "$PO",
        "$ER" => "$ER",
        "$!!" => "$!!",
        "$DI" => "$DI",
        "$ID" => "$ID",
        "$XX" => "$XX",
        "$AX" => "$AX",
        "$AR" => "$AR",
        _ => "?",
    }
}

fn decode_atc_update(t: &[&str]) -> DecodeResult<Message> {
    expect("%", t, 8)?;
    let freq: u32 = field("%", "frequency", t[1])?;

    Ok(Message::AtcDataUpdate(AtcDataUpdate {
        sender: t[0].to_string(),
        frequency_khz: freq
            .checked_add(FREQUENCY_OFFSET_KHZ)
            .ok_or_else(|| invalid("%", "frequency", t[1]))?,
        facility: Facility::from_wire(field("%", "facility", t[2])?),
        visible_range: field("%", "range", t[3])?,
        rating: field("%", "rating", t[4])?,
        latitude: latitude("%", t[5])?,
        longitude: longitude("%", t[6])?,
        elevation: field("%", "elevation", t[7])?,
    }))
}

fn decode_pilot_update(t: &[&str]) -> DecodeResult<Message> {
    expect("@", t, 10)?;
    let mode = TransponderMode::from_wire(t[0]).ok_or_else(|| DecodeError::InvalidField {
        kind: "@",
        field: "transponder mode",
        value: t[0].to_string(),
    })?;
    let altitude_true: i32 = field("@", "altitude", t[6])?;
    let delta: i32 = field("@", "pressure delta", t[9])?;
    let altitude_pressure = altitude_true
        .checked_add(delta)
        .ok_or_else(|| invalid("@", "pressure delta", t[9]))?;

    Ok(Message::PilotDataUpdate(PilotDataUpdate {
        mode,
        sender: t[1].to_string(),
        transponder: field("@", "transponder", t[2])?,
        rating: field("@", "rating", t[3])?,
        latitude: latitude("@", t[4])?,
        longitude: longitude("@", t[5])?,
        altitude_true,
        altitude_pressure,
        ground_speed: field("@", "ground speed", t[7])?,
        pbh: pbh::unpack(field("@", "pbh", t[8])?),
    }))
}

fn decode_custom(t: &[&str]) -> DecodeResult<Message> {
    expect("#SB", t, 3)?;
    let sender = t[0].to_string();
    let receiver = t[1].to_string();

    match t[2] {
        "PIR" => Ok(Message::PlaneInfoRequest { sender, receiver }),
        "PI" if t.get(3) == Some(&"GEN") => {
            let mut aircraft = String::new();
            let mut airline = String::new();
            let mut livery = String::new();

            for kv in &t[4..] {
                let mut split = kv.splitn(2, '=');
                match (split.next(), split.next()) {
                    (Some("EQUIPMENT"), Some(v)) => aircraft = v.to_string(),
                    (Some("AIRLINE"), Some(v)) => airline = v.to_string(),
                    (Some("LIVERY"), Some(v)) => livery = v.to_string(),
                    _ => {}
                }
            }

            Ok(Message::PlaneInformation {
                sender,
                receiver,
                aircraft,
                airline,
                livery,
            })
        }
        "VI" => {
            expect("#SB VI", t, 8)?;
            Ok(Message::InterimPilotDataUpdate(InterimPilotDataUpdate {
                sender,
                receiver,
                latitude: latitude("#SB VI", t[3])?,
                longitude: longitude("#SB VI", t[4])?,
                altitude_true: field("#SB VI", "altitude", t[5])?,
                ground_speed: field("#SB VI", "ground speed", t[6])?,
                pbh: pbh::unpack(field("#SB VI", "pbh", t[7])?),
            }))
        }
        "FSIPIR" | "FSIPI" => {
            let kind = if t[2] == "FSIPIR" { "#SB FSIPIR" } else { "#SB FSIPI" };
            expect(kind, t, 12)?;
            let packet = FsinnPacket {
                sender,
                receiver,
                airline_icao: t[4].to_string(),
                aircraft_icao: t[5].to_string(),
                combined_type: t[10].to_string(),
                model_string: t[11..].join(":"),
            };
            Ok(if t[2] == "FSIPIR" {
                Message::FsinnRequest(packet)
            } else {
                Message::FsinnInformation(packet)
            })
        }
        subtype => Ok(Message::CustomPilotPacket {
            sender,
            receiver,
            subtype: subtype.to_string(),
            data: owned(&t[3..]),
        }),
    }
}

fn decode_flight_plan(t: &[&str]) -> DecodeResult<Message> {
    expect("$FP", t, 17)?;
    let rules = FlightRules::from_wire(t[2]);
    // pilots leave numeric fields blank all the time
    let num = |i: usize| t[i].trim().parse::<u32>().unwrap_or(0);
    let minutes = |h: usize, m: usize| num(h).saturating_mul(60).saturating_add(num(m));

    Ok(Message::FlightPlan {
        receiver: t[1].to_string(),
        plan: FlightPlan {
            callsign: Callsign::aircraft(t[0]),
            rules,
            aircraft_type: t[3].to_string(),
            true_airspeed_kts: num(4),
            departure: t[5].to_string(),
            departure_time_planned: pad_hhmm(num(6)),
            departure_time_actual: pad_hhmm(num(7)),
            cruise_altitude: normalize_cruise_altitude(t[8], rules),
            destination: t[9].to_string(),
            enroute_minutes: minutes(10, 11),
            fuel_minutes: minutes(12, 13),
            alternate: t[14].to_string(),
            remarks: t[15].to_string(),
            route: t[16..].join(":"),
        },
    })
}
