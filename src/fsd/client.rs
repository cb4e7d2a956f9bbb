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

use super::bucket::TokenBucket;
use super::message::*;
use super::offset::OffsetEstimator;
use super::parser::decode;
use super::pbh::Pbh;
use super::rawlog::RawMessageLog;
use super::*;
use crate::aviation::parts::incremental_diff;
use crate::aviation::{
    round_to_channel_spacing, Altitude, AircraftParts, Callsign, CallsignKind, Capabilities,
    Facility, Position, Situation, Transponder,
};
use crate::config::{Config, IdentityConfig, RawLogConfig, ServerConfig, SetupConfig, TimingConfig};
use crate::ownship::{OwnAircraft, OwnAircraftProvider};
use crate::session::context::Context;
use crate::session::handle::Pushable;
use crate::session::timer::{OneShot, Timer};
use crate::transport::{Inbound, Transport};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

const MAX_LINES_PER_TICK: usize = 75;
const BUCKET_CAPACITY: u32 = 10;
const BUCKET_REFILL: Duration = Duration::from_secs(5);
/// Receiver of broadcast aircraft config deltas
const CONFIG_BROADCAST: &str = "@94836";
const CLIENT_NAME: &str = "fsdlink";
const CLIENT_ID: u16 = 0x8f21;
/// Revisions from here on authenticate before login
const AUTH_REVISION: u32 = 100;

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum ConfigSend {
    Sent,
    Unchanged,
    /// Rate limited, retried when the next token is due
    Deferred,
    Disabled,
}

pub struct FsdClient {
    transport: Box<dyn Transport>,
    own: Arc<dyn OwnAircraftProvider>,
    context: Context,
    own_callsign: Callsign,
    server: ServerConfig,
    identity: IdentityConfig,
    login_mode: LoginMode,
    setup: SetupConfig,
    timing: TimingConfig,
    raw_config: RawLogConfig,
    status: ConnectionStatus,
    status_since: Instant,
    last_ecosystem: Option<String>,
    send_queue: VecDeque<String>,
    bucket: TokenBucket,
    offsets: OffsetEstimator,
    interim_receivers: BTreeSet<Callsign>,
    sent_parts: Option<AircraftParts>,
    position_timer: Timer,
    interim_timer: Timer,
    config_timer: Timer,
    deferred_config: OneShot,
    raw_log: RawMessageLog,
}

impl FsdClient {
    pub fn new(
        config: &Config,
        transport: Box<dyn Transport>,
        own: Arc<dyn OwnAircraftProvider>,
        context: Context,
    ) -> Self {
        let kind = if config.login_mode.is_observer() {
            CallsignKind::Observer
        } else {
            CallsignKind::Aircraft
        };
        let t = &config.timing;

        FsdClient {
            transport,
            own,
            context,
            own_callsign: Callsign::with_kind(&config.identity.callsign, kind),
            server: config.server.clone(),
            identity: config.identity.clone(),
            login_mode: config.login_mode,
            setup: config.setup.clone(),
            timing: config.timing.clone(),
            raw_config: config.raw_log.clone(),
            status: ConnectionStatus::Disconnected,
            status_since: Instant::now(),
            last_ecosystem: None,
            send_queue: VecDeque::new(),
            bucket: TokenBucket::new(BUCKET_CAPACITY, BUCKET_REFILL),
            offsets: OffsetEstimator::new(t.additional_offset_ms),
            interim_receivers: BTreeSet::new(),
            sent_parts: None,
            position_timer: Timer::new(Duration::from_millis(t.position_interval_ms)),
            interim_timer: Timer::new(Duration::from_millis(t.interim_interval_ms)),
            config_timer: Timer::new(Duration::from_millis(t.config_interval_ms)),
            deferred_config: OneShot::default(),
            raw_log: RawMessageLog::disabled(),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn own_callsign(&self) -> &Callsign {
        &self.own_callsign
    }

    pub fn last_ecosystem(&self) -> Option<&str> {
        self.last_ecosystem.as_deref()
    }

    pub fn interim_receivers(&self) -> impl Iterator<Item = &Callsign> {
        self.interim_receivers.iter()
    }

    pub fn queued(&self) -> usize {
        self.send_queue.len()
    }

    pub fn connect(&mut self, handle: &mut dyn Pushable<Event>) -> Result<()> {
        if self.status != ConnectionStatus::Disconnected {
            return Err(FsdError::NotDisconnected(self.status));
        }

        self.clear_state();

        self.raw_log = match RawMessageLog::open(
            self.raw_config.mode,
            &self.raw_config.directory,
            handle.get_utc(),
        ) {
            Ok(l) => l,
            Err(e) => {
                warn!("raw message log disabled: {}", e);
                RawMessageLog::disabled()
            }
        };
        self.raw_log.arm_password_filter();

        self.set_status(handle, ConnectionStatus::Connecting);
        info!(
            "connecting to {} ({}:{}) as {}",
            self.server.name, self.server.host, self.server.port, self.own_callsign
        );

        if let Err(e) = self.transport.open(&self.server.host, self.server.port) {
            error!("unable to open connection: {}", e);
            self.set_status(handle, ConnectionStatus::Disconnected);
            return Err(e.into());
        }

        Ok(())
    }

    /// Safe to call in any state. Queued lines go out before the logoff.
    pub fn disconnect(&mut self, handle: &mut dyn Pushable<Event>) {
        if self.status == ConnectionStatus::Disconnected {
            return;
        }

        self.stop_timers();
        self.set_status(handle, ConnectionStatus::Disconnecting);

        if self.transport.is_open() {
            while let Some(line) = self.send_queue.pop_front() {
                self.write_line(handle, &line);
            }

            let cid = self.identity.cid.clone();
            let logoff = if self.login_mode.is_observer() {
                Message::DeleteAtc {
                    sender: self.own_callsign.to_string(),
                    cid,
                }
            } else {
                Message::DeletePilot {
                    sender: self.own_callsign.to_string(),
                    cid,
                }
            };
            self.write_line(handle, &logoff.to_line());
        }

        self.transport.close();
        self.set_status(handle, ConnectionStatus::Disconnected);
    }

    pub fn run<'a, I>(&mut self, handle: &mut dyn Pushable<Event>, requests: I)
    where
        I: Iterator<Item = &'a Request>,
    {
        let now = handle.get_clock();

        if self.status == ConnectionStatus::Disconnected {
            for r in requests {
                debug!("not connected, dropping {:?}", r);
            }
            return;
        }

        if self.context.is_shutting_down() {
            self.disconnect(handle);
            return;
        }

        for inbound in self.transport.poll(MAX_LINES_PER_TICK) {
            match inbound {
                Inbound::Connected => self.on_transport_connected(handle),
                Inbound::Line(l) => self.on_line(handle, &l),
                Inbound::Closed(reason) => {
                    warn!("connection lost: {}", reason);
                    self.disconnect(handle);
                }
            }

            if self.status == ConnectionStatus::Disconnected {
                return;
            }
        }

        for r in requests {
            self.handle_request(handle, r);
        }

        if self.status == ConnectionStatus::Connected {
            if self.position_timer.fired(now) {
                self.send_position_update();
            }

            if self.interim_timer.fired(now) {
                self.send_interim_positions();
            }

            let scheduled = self.config_timer.fired(now);
            let deferred = self.deferred_config.fired(now);
            if scheduled || deferred {
                self.send_incremental_aircraft_config(now);
            }
        }

        if self.status.is_pending()
            && now.saturating_duration_since(self.status_since)
                > Duration::from_millis(self.timing.pending_timeout_ms)
        {
            warn!("{:?} for too long, giving up", self.status);
            self.disconnect(handle);
            return;
        }

        self.flush_send_queue(handle);
    }

    fn set_status(&mut self, handle: &mut dyn Pushable<Event>, to: ConnectionStatus) {
        if self.status == to {
            return;
        }

        let from = self.status;
        self.status = to;
        self.status_since = handle.get_clock();
        info!("connection status {:?} -> {:?}", from, to);

        match to {
            ConnectionStatus::Connected => self.start_timers(handle.get_clock()),
            ConnectionStatus::Disconnected => {
                self.stop_timers();
                self.clear_state();
                self.last_ecosystem = Some(self.server.ecosystem.clone());
            }
            _ => {}
        }

        handle.push_data(Event::ConnectionStatusChanged { from, to });
    }

    fn start_timers(&mut self, now: Instant) {
        self.position_timer.start(now);
        self.config_timer.start(now);

        if self.setup.send_interim_positions && self.login_mode == LoginMode::Pilot {
            self.interim_timer.start(now);
        }
    }

    fn stop_timers(&mut self) {
        self.position_timer.stop();
        self.interim_timer.stop();
        self.config_timer.stop();
        self.deferred_config.cancel();
    }

    fn clear_state(&mut self) {
        self.send_queue.clear();
        self.offsets.clear();
        self.interim_receivers.clear();
        self.sent_parts = None;
        self.deferred_config.cancel();
    }

    fn clear_state_for(&mut self, callsign: &Callsign) {
        self.offsets.remove(callsign);
        self.interim_receivers.remove(callsign);
    }

    fn on_transport_connected(&mut self, handle: &mut dyn Pushable<Event>) {
        if self.identity.revision >= AUTH_REVISION {
            debug!("waiting for server identification");
            return;
        }

        self.send_login(handle);
        self.set_status(handle, ConnectionStatus::Connected);
    }

    fn send_login(&mut self, handle: &mut dyn Pushable<Event>) {
        let id = &self.identity;
        let login = if self.login_mode.is_observer() {
            Message::AddAtc {
                sender: self.own_callsign.to_string(),
                real_name: id.name_and_home_base(),
                cid: id.cid.clone(),
                password: id.password.clone(),
                rating: id.atc_rating,
                revision: id.revision,
            }
        } else {
            Message::AddPilot {
                sender: self.own_callsign.to_string(),
                cid: id.cid.clone(),
                password: id.password.clone(),
                rating: id.pilot_rating,
                revision: id.revision,
                sim_type: id.sim_type,
                real_name: id.name_and_home_base(),
            }
        };

        self.write_line(handle, &login.to_line());
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            atis: true,
            icao_codes: true,
            interim_positions: self.setup.send_interim_positions
                && self.login_mode == LoginMode::Pilot,
            visual_positions: false,
            aircraft_config: self.setup.send_aircraft_parts,
        }
    }

    /// Straight to the wire, used for login and logoff.
    fn write_line(&mut self, handle: &mut dyn Pushable<Event>, line: &str) {
        trace!("FSD Sent=>{}", line);
        self.raw_log.record(line, true, handle.get_utc());

        if self.raw_config.events {
            handle.push_data(Event::RawMessage {
                line: line.to_string(),
                sent: true,
            });
        }

        if let Err(e) = self.transport.send(line) {
            warn!("unable to send: {}", e);
        }
    }

    fn queue(&mut self, m: Message) {
        self.send_queue.push_back(m.to_line());
    }

    /// Drains a share of the queue that grows with its length.
    fn flush_send_queue(&mut self, handle: &mut dyn Pushable<Event>) {
        let len = self.send_queue.len();
        if len == 0 {
            return;
        }

        let mut n = 1;
        for threshold in &[5, 10, 20, 30] {
            if len > *threshold {
                n += 1;
            }
        }

        if len > 50 {
            n += if len > 100 {
                30
            } else if len > 75 {
                20
            } else {
                10
            };

            if len > 75 {
                warn!("send queue overloaded, {} messages waiting", len);
            } else {
                info!("send queue backlog of {} messages", len);
            }
        }

        debug!("total {} queued lines, sending {}", len, n.min(len));

        for _ in 0..n.min(len) {
            if let Some(line) = self.send_queue.pop_front() {
                self.write_line(handle, &line);
            }
        }
    }

    fn own_aircraft(&self) -> OwnAircraft {
        self.own.own_aircraft()
    }

    fn own_airline(&self, own: &OwnAircraft) -> String {
        if self.setup.force_three_letter_airline {
            own.airline_icao.chars().take(3).collect()
        } else {
            own.airline_icao.clone()
        }
    }

    fn sender(&self) -> String {
        self.own_callsign.to_string()
    }

    pub fn send_position_update(&mut self) {
        if self.status != ConnectionStatus::Connected {
            return;
        }

        let own = self.own_aircraft();
        let m = if self.login_mode.is_observer() {
            Message::AtcDataUpdate(AtcDataUpdate {
                sender: self.sender(),
                frequency_khz: 199_998,
                facility: Facility::Observer,
                visible_range: 300,
                rating: 1,
                latitude: own.lat,
                longitude: own.lon,
                elevation: 0,
            })
        } else {
            Message::PilotDataUpdate(PilotDataUpdate {
                mode: own.transponder.mode,
                sender: self.sender(),
                transponder: own.transponder.code as i32,
                rating: self.identity.pilot_rating,
                latitude: own.lat,
                longitude: own.lon,
                altitude_true: own.altitude.round() as i32,
                altitude_pressure: own.pressure_altitude.round() as i32,
                ground_speed: own.gs.round() as i32,
                pbh: pbh_of(&own),
            })
        };

        trace!("position update {:?}", m);
        self.queue(m);
    }

    pub fn send_interim_positions(&mut self) {
        if self.status != ConnectionStatus::Connected || self.interim_receivers.is_empty() {
            return;
        }

        let own = self.own_aircraft();
        let receivers: Vec<String> = self.interim_receivers.iter().map(|c| c.to_string()).collect();

        for receiver in receivers {
            self.queue(Message::InterimPilotDataUpdate(InterimPilotDataUpdate {
                sender: self.sender(),
                receiver,
                latitude: own.lat,
                longitude: own.lon,
                altitude_true: own.altitude.round() as i32,
                ground_speed: own.gs.round() as i32,
                pbh: pbh_of(&own),
            }));
        }
    }

    /// Broadcasts what changed in the own parts since the last broadcast.
    pub fn send_incremental_aircraft_config(&mut self, now: Instant) -> ConfigSend {
        if self.status != ConnectionStatus::Connected || !self.setup.send_aircraft_parts {
            return ConfigSend::Disabled;
        }

        let current = self.own_aircraft().parts;
        if self.sent_parts.as_ref() == Some(&current) {
            return ConfigSend::Unchanged;
        }

        if !self.bucket.try_consume(now) {
            let due = self.bucket.next_refill(now);
            debug!("aircraft config rate limited, retrying in {:?}", due.saturating_duration_since(now));
            self.deferred_config.schedule(due);
            return ConfigSend::Deferred;
        }

        let previous = self
            .sent_parts
            .as_ref()
            .map_or_else(|| serde_json::json!({}), AircraftParts::to_json);
        let delta = incremental_diff(&previous, &current.to_json());
        let payload = serde_json::json!({ "config": delta }).to_string();

        self.queue(Message::ClientQuery {
            sender: self.sender(),
            receiver: CONFIG_BROADCAST.to_string(),
            query: QueryType::AircraftConfig,
            payload: vec![payload],
        });
        self.sent_parts = Some(current);
        ConfigSend::Sent
    }

    fn send_full_aircraft_config(&mut self, receiver: &str) {
        let own = self.own_aircraft();
        let payload = serde_json::json!({ "config": own.parts.to_full_json() }).to_string();

        self.queue(Message::ClientQuery {
            sender: self.sender(),
            receiver: receiver.to_string(),
            query: QueryType::AircraftConfig,
            payload: vec![payload],
        });
    }

    fn handle_request(&mut self, handle: &mut dyn Pushable<Event>, r: &Request) {
        let m = match r {
            Request::Query {
                receiver,
                query,
                payload,
            } => Message::ClientQuery {
                sender: self.sender(),
                receiver: receiver.to_string(),
                query: *query,
                payload: payload.clone(),
            },
            Request::PlaneInfo { receiver } => Message::PlaneInfoRequest {
                sender: self.sender(),
                receiver: receiver.to_string(),
            },
            Request::FsinnInfo { receiver } => {
                let own = self.own_aircraft();
                Message::FsinnRequest(self.fsinn_packet(&own, receiver.as_str()))
            }
            Request::AircraftConfigFull { receiver } => Message::ClientQuery {
                sender: self.sender(),
                receiver: receiver.to_string(),
                query: QueryType::AircraftConfig,
                payload: vec![serde_json::json!({ "request": "full" }).to_string()],
            },
            Request::AddInterimReceiver(cs) => {
                if self.interim_receivers.insert(cs.clone()) {
                    debug!("{} receives interim positions", cs);
                }
                return;
            }
            Request::RemoveInterimReceiver(cs) => {
                self.interim_receivers.remove(cs);
                return;
            }
            Request::Text { receiver, message } => Message::TextMessage {
                sender: self.sender(),
                receiver: TextTarget::Callsign(receiver.to_string()),
                message: message.clone(),
            },
            Request::Radio {
                frequencies_khz,
                message,
            } => Message::TextMessage {
                sender: self.sender(),
                receiver: TextTarget::Frequencies(frequencies_khz.clone()),
                message: message.clone(),
            },
            Request::Metar { station } => Message::MetarRequest {
                sender: self.sender(),
                station: station.to_uppercase(),
            },
            Request::Ping { receiver } => Message::Ping {
                sender: self.sender(),
                receiver: receiver.to_string(),
                timestamp: handle.get_epoch_ms().to_string(),
            },
            Request::FileFlightPlan(plan) => {
                let mut plan = plan.clone();
                plan.callsign = self.own_callsign.clone();
                Message::FlightPlan {
                    receiver: SERVER.to_string(),
                    plan,
                }
            }
            Request::QueryFlightPlan(cs) => Message::ClientQuery {
                sender: self.sender(),
                receiver: SERVER.to_string(),
                query: QueryType::FlightPlan,
                payload: vec![cs.to_string()],
            },
        };

        self.queue(m);
    }

    fn fsinn_packet(&self, own: &OwnAircraft, receiver: &str) -> FsinnPacket {
        FsinnPacket {
            sender: self.sender(),
            receiver: receiver.to_string(),
            airline_icao: self.own_airline(own),
            aircraft_icao: own.aircraft_icao.clone(),
            combined_type: own.combined_type.clone(),
            model_string: no_colons(&own.model_string),
        }
    }

    fn on_line(&mut self, handle: &mut dyn Pushable<Event>, line: &str) {
        trace!("FSD Recv=>{}", line);
        self.raw_log.record(line, false, handle.get_utc());

        if self.raw_config.events {
            handle.push_data(Event::RawMessage {
                line: line.to_string(),
                sent: false,
            });
        }

        match decode(line) {
            Ok(m) => self.dispatch(handle, m),
            Err(DecodeError::UnknownPacket(p)) => debug!("unknown packet {}: {}", p, line),
            Err(e) => debug!("dropping malformed line: {}", e),
        }
    }

    fn dispatch(&mut self, handle: &mut dyn Pushable<Event>, m: Message) {
        match m {
            Message::AddAtc { .. }
            | Message::AddPilot { .. }
            | Message::ClientIdentification(_)
            | Message::MetarRequest { .. }
            | Message::Heartbeat => {}
            Message::DeleteAtc { sender, .. } => handle.push_data(Event::AtcDisconnected {
                callsign: Callsign::atc(&sender),
            }),
            Message::DeletePilot { sender, .. } => {
                let callsign = Callsign::aircraft(&sender);
                self.clear_state_for(&callsign);
                handle.push_data(Event::PilotDisconnected { callsign });
            }
            Message::AtcDataUpdate(u) => self.on_atc_update(handle, u),
            Message::PilotDataUpdate(u) => self.on_pilot_update(handle, u),
            Message::InterimPilotDataUpdate(u) => self.on_interim_update(handle, u),
            Message::PlaneInfoRequest { sender, .. } => {
                let own = self.own_aircraft();
                let m = Message::PlaneInformation {
                    sender: self.sender(),
                    receiver: sender,
                    aircraft: own.aircraft_icao.clone(),
                    airline: self.own_airline(&own),
                    livery: own.livery.clone(),
                };
                self.queue(m);
            }
            Message::PlaneInformation {
                sender,
                aircraft,
                airline,
                livery,
                ..
            } => handle.push_data(Event::PlaneInformation {
                callsign: Callsign::aircraft(&sender),
                aircraft,
                airline,
                livery,
            }),
            Message::FsinnRequest(p) => {
                let own = self.own_aircraft();
                let reply = self.fsinn_packet(&own, &p.sender);
                self.queue(Message::FsinnInformation(reply));
                handle.push_data(Event::FsinnInformation {
                    callsign: Callsign::aircraft(&p.sender),
                    packet: p,
                });
            }
            Message::FsinnInformation(p) => handle.push_data(Event::FsinnInformation {
                callsign: Callsign::aircraft(&p.sender),
                packet: p,
            }),
            Message::CustomPilotPacket {
                sender,
                subtype,
                data,
                ..
            } => {
                // SquawkBox interim positions are too imprecise to use
                if subtype != "I" {
                    handle.push_data(Event::CustomPacket {
                        callsign: Callsign::aircraft(&sender),
                        data,
                    });
                }
            }
            Message::ClientQuery {
                sender,
                query,
                payload,
                ..
            } => self.on_client_query(handle, sender, query, payload),
            Message::ClientResponse {
                sender,
                query,
                payload,
                ..
            } => self.on_client_response(handle, sender, query, payload),
            Message::FlightPlan { plan, .. } => handle.push_data(Event::FlightPlan(plan)),
            Message::TextMessage {
                sender,
                receiver,
                message,
            } => self.on_text_message(handle, sender, receiver, message),
            Message::Ping {
                sender, timestamp, ..
            } => {
                let m = Message::Pong {
                    sender: self.sender(),
                    receiver: sender,
                    timestamp,
                };
                self.queue(m);
            }
            Message::Pong {
                sender, timestamp, ..
            } => match timestamp.parse::<i64>() {
                Ok(ts) => {
                    let elapsed_ms = handle.get_epoch_ms() - ts;
                    handle.push_data(Event::Pong {
                        callsign: Callsign::new(&sender),
                        elapsed_ms,
                    });
                }
                Err(_) => debug!("pong with bad timestamp {}", timestamp),
            },
            Message::ServerError {
                code,
                parameter,
                description,
                ..
            } => {
                let code = ServerErrorCode::from_wire(code);
                let fatal = code.is_fatal();

                if fatal {
                    error!("server error {:?}: {} ({})", code, code.description(), description);
                } else {
                    warn!("server error {:?}: {} {}", code, parameter, description);
                }

                handle.push_data(Event::ServerError {
                    code,
                    parameter,
                    description,
                    fatal,
                });

                if fatal {
                    self.disconnect(handle);
                }
            }
            Message::KillRequest { reason, .. } => {
                error!("kicked from the network: {}", reason);
                handle.push_data(Event::KillRequested { reason });
                self.disconnect(handle);
            }
            Message::ServerIdentification { version, .. } => {
                if self.status != ConnectionStatus::Connecting {
                    debug!("ignoring server identification {}", version);
                    return;
                }

                info!("server identified as {}", version);
                let id = Message::ClientIdentification(ClientIdentification {
                    sender: self.sender(),
                    client_id: CLIENT_ID,
                    client_name: CLIENT_NAME.to_string(),
                    version_major: env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0),
                    version_minor: env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0),
                    cid: self.identity.cid.clone(),
                    sys_uid: self.identity.system_uid.clone(),
                    challenge: String::new(),
                });
                self.write_line(handle, &id.to_line());
                self.send_login(handle);
                self.set_status(handle, ConnectionStatus::Connected);
            }
            Message::Rehost { host, .. } => info!("server asked to move to {}, not following", host),
            Message::Mute { mute, .. } => handle.push_data(Event::Muted { muted: mute }),
            Message::MetarResponse { metar, .. } => handle.push_data(Event::Metar { metar }),
        }
    }

    fn on_atc_update(&mut self, handle: &mut dyn Pushable<Event>, u: AtcDataUpdate) {
        let callsign = Callsign::atc(&u.sender);

        if u.facility == Facility::Unknown && !callsign.is_observer() {
            return;
        }
        if u.facility == Facility::Observer && !callsign.has_suffix() {
            return;
        }

        handle.push_data(Event::AtcPositionUpdate {
            range_nm: crate::aviation::station::fix_atc_range(u.visible_range as f64, &callsign),
            callsign,
            frequency_khz: u.frequency_khz,
            position: Position::from_lat_lon(u.latitude, u.longitude),
        });
    }

    fn situation_of(&mut self, handle: &dyn Pushable<Event>, sender: &str, lat: f64, lon: f64, alt: i32, pbh: Pbh) -> Situation {
        let callsign = Callsign::aircraft(sender);
        let now_ms = handle.get_epoch_ms();

        let mut s = Situation::new(
            callsign.clone(),
            Position::from_lat_lon(lat, lon),
            Altitude::msl(alt as f64),
        );
        s.heading = pbh.heading;
        s.pitch = pbh.pitch;
        s.bank = pbh.bank;
        s.on_ground = pbh.on_ground;
        s.timestamp_ms = now_ms;
        s.time_offset_ms = self.offsets.received(&callsign, now_ms);
        s
    }

    fn on_pilot_update(&mut self, handle: &mut dyn Pushable<Event>, u: PilotDataUpdate) {
        let mut situation = self.situation_of(&*handle, &u.sender, u.latitude, u.longitude, u.altitude_true, u.pbh);
        situation.ground_speed = u.ground_speed as f64;
        situation.pressure_altitude = Some(Altitude::pressure(u.altitude_pressure as f64));

        let transponder = Transponder::from_reported(u.transponder, u.mode);
        handle.push_data(Event::PilotPositionUpdate {
            situation,
            transponder,
        });
    }

    fn on_interim_update(&mut self, handle: &mut dyn Pushable<Event>, u: InterimPilotDataUpdate) {
        if !self.setup.receive_interim_positions {
            return;
        }

        let mut situation = self.situation_of(&*handle, &u.sender, u.latitude, u.longitude, u.altitude_true, u.pbh);
        situation.ground_speed = u.ground_speed as f64;
        situation.interim = true;
        handle.push_data(Event::InterimPositionUpdate { situation });
    }

    fn on_client_query(&mut self, handle: &mut dyn Pushable<Event>, sender: String, query: QueryType, payload: Vec<String>) {
        let own = self.own_aircraft();

        let reply = match query {
            QueryType::Capabilities => self.capabilities().to_pairs(),
            QueryType::Com1Freq => vec![format!("{:.3}", khz_to_mhz!(own.com1_khz))],
            QueryType::RealName => {
                let rating = if self.login_mode.is_observer() {
                    self.identity.atc_rating
                } else {
                    self.identity.pilot_rating
                };
                vec![self.identity.real_name.clone(), String::new(), rating.to_string()]
            }
            QueryType::Server => vec![self.server.host.clone()],
            QueryType::Inf => {
                let info = format!(
                    "CID={} {} IP={} SYS_UID={} FSVER={} LT={} LO={} AL={} {}",
                    self.identity.cid,
                    CLIENT_NAME,
                    self.transport.local_addr().unwrap_or_default(),
                    self.identity.system_uid,
                    self.identity.sim_type,
                    own.lat,
                    own.lon,
                    own.altitude.round() as i64,
                    self.identity.real_name
                );
                self.queue(Message::TextMessage {
                    sender: self.sender(),
                    receiver: TextTarget::Callsign(sender),
                    message: info,
                });
                return;
            }
            QueryType::FlightPlan => {
                if let Some(target) = payload.first() {
                    handle.push_data(Event::FlightPlanQueried {
                        sender: Callsign::new(&sender),
                        target: Callsign::aircraft(target),
                    });
                }
                return;
            }
            QueryType::AircraftConfig => {
                self.on_aircraft_config(handle, &sender, &payload.join(":"));
                return;
            }
            QueryType::IsValidAtc | QueryType::Atis | QueryType::PublicIp | QueryType::Unknown => {
                debug!("not answering {:?} query from {}", query, sender);
                return;
            }
        };

        self.queue(Message::ClientResponse {
            sender: self.sender(),
            receiver: sender,
            query,
            payload: reply,
        });
    }

    fn on_aircraft_config(&mut self, handle: &mut dyn Pushable<Event>, sender: &str, json: &str) {
        let value: serde_json::Value = match serde_json::from_str(json) {
            Ok(v) => v,
            Err(e) => {
                debug!("bad aircraft config from {}: {}", sender, e);
                return;
            }
        };

        if value.get("request").and_then(|r| r.as_str()) == Some("full") {
            self.send_full_aircraft_config(sender);
            return;
        }

        if !self.setup.receive_aircraft_parts {
            return;
        }

        let config = match value.get("config") {
            Some(c) if c.as_object().map_or(false, |o| !o.is_empty()) => c.clone(),
            _ => return,
        };

        let callsign = Callsign::aircraft(sender);
        let offset_ms = self.offsets.current(&callsign);
        handle.push_data(Event::AircraftConfig {
            callsign,
            config,
            offset_ms,
        });
    }

    fn on_client_response(&mut self, handle: &mut dyn Pushable<Event>, sender: String, query: QueryType, payload: Vec<String>) {
        let first = payload.first().cloned().unwrap_or_default();

        let event = match query {
            QueryType::IsValidAtc => {
                if payload.len() < 2 {
                    debug!("short ATC validity reply from {}", sender);
                    return;
                }
                Event::ValidAtc {
                    callsign: Callsign::atc(&payload[1]),
                    valid: first == "Y",
                }
            }
            QueryType::Capabilities => Event::Capabilities {
                callsign: Callsign::new(&sender),
                capabilities: Capabilities::from_pairs(payload.iter().map(String::as_str)),
            },
            QueryType::Com1Freq => match first.trim().parse::<f64>() {
                Ok(mhz) if mhz > 0.0 => Event::Com1Frequency {
                    callsign: Callsign::new(&sender),
                    frequency_khz: (mhz * 1000.0).round() as u32,
                },
                _ => {
                    debug!("bad COM1 reply '{}' from {}", first, sender);
                    return;
                }
            },
            QueryType::RealName => Event::RealName {
                callsign: Callsign::new(&sender),
                name: first,
            },
            QueryType::Server => Event::Server {
                callsign: Callsign::new(&sender),
                server: first,
            },
            QueryType::Atis => {
                let kind = match AtisLineKind::from_wire(&first) {
                    Some(k) => k,
                    None => {
                        debug!("unknown ATIS line type '{}' from {}", first, sender);
                        return;
                    }
                };
                Event::AtisLine {
                    callsign: Callsign::atc(&sender),
                    kind,
                    line: payload.get(1..).map_or_else(String::new, |rest| rest.join(":")),
                }
            }
            _ => {
                debug!("ignoring {:?} response from {}", query, sender);
                return;
            }
        };

        handle.push_data(event);
    }

    fn on_text_message(&mut self, handle: &mut dyn Pushable<Event>, sender: String, target: TextTarget, message: String) {
        let received_ms = handle.get_epoch_ms();

        let frequencies_khz = match target {
            TextTarget::Frequencies(ref freqs) => {
                let own = self.own_aircraft();
                let matched: Vec<u32> = freqs
                    .iter()
                    .map(|f| round_to_channel_spacing(*f))
                    .filter(|f| *f == own.com1_khz || *f == own.com2_khz)
                    .collect();

                if matched.is_empty() {
                    return;
                }
                matched
            }
            _ => vec![],
        };

        handle.push_data(Event::TextMessage(TextMessage {
            sender: Callsign::new(&sender),
            target,
            message,
            frequencies_khz,
            received_ms,
        }));
    }
}

fn pbh_of(own: &OwnAircraft) -> Pbh {
    Pbh {
        pitch: own.pitch,
        bank: own.bank,
        heading: own.heading,
        on_ground: own.on_ground(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ownship::SharedOwnAircraft;
    use crate::session::handle::{BasicHandle, Handle, PushableHandle};
    use crate::transport::loopback::{self, LoopbackPeer};

    struct Rig {
        client: FsdClient,
        peer: LoopbackPeer,
        own: SharedOwnAircraft,
        handle: BasicHandle,
        events: VecDeque<Event>,
    }

    impl Rig {
        fn new(mut config: Config) -> Self {
            config.identity.callsign = "ABCD".to_string();
            config.identity.password = "secret".to_string();
            let (transport, peer) = loopback::pair();
            let mut own = OwnAircraft::new(Callsign::aircraft("ABCD"));
            own.lat = 43.12578;
            own.lon = -72.15841;
            own.com1_khz = 124050;
            own.aircraft_icao = "B744".to_string();
            own.airline_icao = "BAW".to_string();
            let own = SharedOwnAircraft::new(own);

            let client = FsdClient::new(&config, Box::new(transport), Arc::new(own.clone()), Context::new());
            Rig {
                client,
                peer,
                own,
                handle: BasicHandle::new(100),
                events: VecDeque::new(),
            }
        }

        fn connect(&mut self) {
            let mut h = PushableHandle::new(&self.handle, &mut self.events);
            self.client.connect(&mut h).unwrap();
            self.tick(10);
        }

        fn tick(&mut self, ms: u64) {
            self.requests(ms, &[]);
        }

        fn requests(&mut self, ms: u64, requests: &[Request]) {
            self.handle = self.handle.advanced(ms);
            let mut h = PushableHandle::new(&self.handle, &mut self.events);
            self.client.run(&mut h, requests.iter());
        }

        fn drain(&mut self) -> Vec<Event> {
            self.events.drain(..).collect()
        }

        fn sent_after(&mut self, ticks: usize) -> Vec<String> {
            for _ in 0..ticks {
                self.tick(10);
            }
            self.peer.take_sent()
        }
    }

    #[test]
    fn test_connect_logs_in_and_reports_status() {
        let mut rig = Rig::new(Config::default());
        rig.connect();

        assert_eq!(rig.client.status(), ConnectionStatus::Connected);
        let sent = rig.peer.take_sent();
        assert_eq!(sent[0], "#APABCD:SERVER:1234567:secret:1:9:0:");

        let statuses: Vec<ConnectionStatus> = rig
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                Event::ConnectionStatusChanged { to, .. } => Some(to),
                _ => None,
            })
            .collect();
        assert_eq!(statuses, vec![ConnectionStatus::Connecting, ConnectionStatus::Connected]);

        let mut h = PushableHandle::new(&rig.handle, &mut rig.events);
        assert!(matches!(
            rig.client.connect(&mut h),
            Err(FsdError::NotDisconnected(ConnectionStatus::Connected))
        ));
    }

    #[test]
    fn test_disconnect_is_idempotent_and_sends_logoff() {
        let mut rig = Rig::new(Config::default());
        rig.connect();
        rig.peer.take_sent();

        let mut h = PushableHandle::new(&rig.handle, &mut rig.events);
        rig.client.disconnect(&mut h);
        rig.client.disconnect(&mut h);

        assert_eq!(rig.peer.take_sent(), vec!["#DPABCD:1234567".to_string()]);
        assert_eq!(rig.client.status(), ConnectionStatus::Disconnected);
        assert_eq!(rig.client.last_ecosystem(), Some("private"));
        assert!(!rig.peer.is_open());
    }

    #[test]
    fn test_server_identification_handshake() {
        let mut config = Config::default();
        config.identity.revision = 100;
        let mut rig = Rig::new(config);
        rig.connect();
        assert_eq!(rig.client.status(), ConnectionStatus::Connecting);
        assert!(rig.peer.take_sent().is_empty());

        rig.peer.push("$DISERVER:CLIENT:VATSIM FSD V3.13:0123456789abcdef");
        rig.tick(10);

        let sent = rig.peer.take_sent();
        assert!(sent[0].starts_with("$IDABCD:SERVER:8f21:fsdlink:"));
        assert!(sent[1].starts_with("#APABCD:SERVER:"));
        assert_eq!(rig.client.status(), ConnectionStatus::Connected);
    }

    #[test]
    fn test_pending_connection_times_out() {
        let mut config = Config::default();
        config.identity.revision = 100;
        let mut rig = Rig::new(config);
        rig.connect();

        rig.tick(7000);
        assert_eq!(rig.client.status(), ConnectionStatus::Connecting);
        rig.tick(1000);
        assert_eq!(rig.client.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_position_updates_follow_timer() {
        let mut rig = Rig::new(Config::default());
        rig.connect();
        rig.peer.take_sent();
        rig.own.update(|a| {
            a.altitude = 12000.0;
            a.pressure_altitude = 12008.0;
            a.gs = 125.0;
            a.pitch = -2.0;
            a.bank = 3.0;
            a.heading = 280.0;
            a.parts.on_ground = true;
            a.transponder = Transponder::from_reported(7000, crate::aviation::TransponderMode::ModeC);
        });

        rig.tick(4000);
        assert!(rig.peer.take_sent().iter().all(|l| !l.starts_with('@')));

        rig.tick(1000);
        let sent = rig.sent_after(1);
        assert!(sent.contains(&"@N:ABCD:7000:1:43.12578:-72.15841:12000:125:25132146:8".to_string()));
    }

    #[test]
    fn test_observer_position_update() {
        let mut config = Config::default();
        config.login_mode = LoginMode::Observer;
        let mut rig = Rig::new(config);
        rig.connect();
        assert!(rig.peer.take_sent()[0].starts_with("#AAABCD:SERVER:"));

        rig.tick(5000);
        let sent = rig.sent_after(1);
        assert!(sent.contains(&"%ABCD:99998:0:300:1:43.12578:-72.15841:0".to_string()));
    }

    #[test]
    fn test_interim_positions_go_to_receivers_only() {
        let mut rig = Rig::new(Config::default());
        rig.connect();
        rig.peer.take_sent();

        rig.tick(1000);
        assert!(rig.sent_after(2).iter().all(|l| !l.contains(":VI:")));

        rig.requests(10, &[Request::AddInterimReceiver(Callsign::aircraft("XYZ"))]);
        rig.tick(1000);
        let sent = rig.sent_after(2);
        assert_eq!(sent.iter().filter(|l| l.starts_with("#SBABCD:XYZ:VI:")).count(), 1);
    }

    #[test]
    fn test_stealth_never_sends_interim_positions() {
        let mut config = Config::default();
        config.login_mode = LoginMode::Stealth;
        let mut rig = Rig::new(config);
        rig.connect();
        rig.requests(10, &[Request::AddInterimReceiver(Callsign::aircraft("XYZ"))]);

        rig.peer.push("$CQXYZ:ABCD:CAPS");
        rig.tick(1000);
        let sent = rig.sent_after(3);
        assert!(sent.iter().all(|l| !l.contains(":VI:")));
        assert!(sent.contains(&"$CRABCD:XYZ:CAPS:ATCINFO=1:MODELDESC=1:ACCONFIG=1".to_string()));
    }

    #[test]
    fn test_config_rate_limit_defers_instead_of_dropping() {
        let mut rig = Rig::new(Config::default());
        rig.connect();
        let t0 = rig.handle.get_clock();

        for i in 0..10 {
            rig.own.update(|a| a.parts.flaps_pct = i as u8 + 1);
            let now = t0 + Duration::from_millis(i * 90);
            assert_eq!(rig.client.send_incremental_aircraft_config(now), ConfigSend::Sent);
        }

        rig.own.update(|a| a.parts.flaps_pct = 42);
        let now = t0 + Duration::from_millis(950);
        assert_eq!(rig.client.send_incremental_aircraft_config(now), ConfigSend::Deferred);

        rig.peer.take_sent();
        let mut flushed = Vec::new();
        for _ in 0..600 {
            rig.tick(10);
            flushed.extend(rig.peer.take_sent());
        }

        let acc: Vec<&String> = flushed.iter().filter(|l| l.contains(":@94836:ACC:")).collect();
        assert!(acc.iter().any(|l| l.contains(r#""flaps_pct":42"#)), "{:?}", acc);
        assert_eq!(
            rig.client.send_incremental_aircraft_config(rig.handle.get_clock()),
            ConfigSend::Unchanged
        );
    }

    #[test]
    fn test_first_config_is_complete_then_incremental() {
        let mut rig = Rig::new(Config::default());
        rig.connect();
        let now = rig.handle.get_clock();

        assert_eq!(rig.client.send_incremental_aircraft_config(now), ConfigSend::Sent);
        assert_eq!(rig.client.send_incremental_aircraft_config(now), ConfigSend::Unchanged);

        rig.own.update(|a| a.parts.gear_down = true);
        assert_eq!(rig.client.send_incremental_aircraft_config(now), ConfigSend::Sent);

        let sent = rig.sent_after(5);
        let acc: Vec<&String> = sent.iter().filter(|l| l.contains(":ACC:")).collect();
        assert_eq!(acc.len(), 2);
        assert!(acc[0].contains("lights"));
        assert!(acc[1].ends_with(r#":ACC:{"config":{"gear_down":true}}"#));
    }

    #[test]
    fn test_send_queue_drain_rate() {
        let mut rig = Rig::new(Config::default());
        rig.connect();
        rig.peer.take_sent();

        let texts: Vec<Request> = (0..60)
            .map(|i| Request::Text {
                receiver: Callsign::aircraft("XYZ"),
                message: format!("m{}", i),
            })
            .collect();
        rig.requests(10, &texts);

        // 60 waiting: 1 + 4 steps + 10 overload
        assert_eq!(rig.peer.take_sent().len(), 15);
        assert_eq!(rig.client.queued(), 45);
        rig.tick(10);
        assert_eq!(rig.peer.take_sent().len(), 5);
    }

    #[test]
    fn test_inbound_dispatch() {
        let mut rig = Rig::new(Config::default());
        rig.connect();
        rig.drain();

        rig.peer.push("@N:DLH123:7000:1:43.12578:-72.15841:12000:125:25132146:8");
        rig.peer.push("@S:DLH124:9999:1:43.1:-72.1:12000:125:0:0");
        rig.peer.push("%EDDM_TWR:18500:4:0:5:48.35:11.78:0");
        rig.peer.push("%EDDM:18500:0:0:1:48.35:11.78:0");
        rig.peer.push("#TMEDDM_TWR:@24050&@35725:hello radio");
        rig.peer.push("#TMEDDM_TWR:@18500:not for us");
        rig.peer.push("$CRXYZ:ABCD:CAPS:FASTPOS=1:ACCONFIG=1");
        rig.peer.push("@N:DLH123:garbage");
        rig.tick(10);

        let events = rig.drain();
        match &events[0] {
            Event::PilotPositionUpdate { situation, transponder } => {
                assert_eq!(situation.callsign, Callsign::aircraft("DLH123"));
                assert_eq!(situation.ground_speed, 125.0);
                assert_eq!(situation.time_offset_ms, crate::fsd::offset::SLOW_OFFSET_MS);
                assert_eq!(transponder.code, 7000);
            }
            other => panic!("unexpected {:?}", other),
        }
        match &events[1] {
            Event::PilotPositionUpdate { transponder, .. } => assert_eq!(*transponder, Transponder::default()),
            other => panic!("unexpected {:?}", other),
        }
        match &events[2] {
            Event::AtcPositionUpdate { callsign, frequency_khz, range_nm, .. } => {
                assert_eq!(callsign.as_str(), "EDDM_TWR");
                assert_eq!(*frequency_khz, 118500);
                assert_eq!(*range_nm, 25.0);
            }
            other => panic!("unexpected {:?}", other),
        }
        match &events[3] {
            Event::TextMessage(tm) => {
                assert_eq!(tm.frequencies_khz, vec![124050]);
                assert_eq!(tm.message, "hello radio");
            }
            other => panic!("unexpected {:?}", other),
        }
        match &events[4] {
            Event::Capabilities { capabilities, .. } => {
                assert!(capabilities.interim_positions);
                assert!(capabilities.aircraft_config);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(events.len(), 5);
    }

    #[test]
    fn test_peer_queries_are_answered() {
        let mut rig = Rig::new(Config::default());
        rig.connect();
        rig.peer.take_sent();

        rig.peer.push("$CQXYZ:ABCD:C?");
        rig.peer.push("$CQXYZ:ABCD:RN");
        rig.peer.push("$CQXYZ:ABCD:SV");
        rig.peer.push("#SBXYZ:ABCD:PIR");
        rig.peer.push("$PISERVER:ABCD:85275222");
        rig.peer.push(r#"$CQXYZ:ABCD:ACC:{"request":"full"}"#);
        let sent = rig.sent_after(10);

        assert!(sent.contains(&"$CRABCD:XYZ:C?:124.050".to_string()));
        assert!(sent.contains(&"$CRABCD:XYZ:RN:::1".to_string()));
        assert!(sent.contains(&"$CRABCD:XYZ:SV:127.0.0.1".to_string()));
        assert!(sent.contains(&"#SBABCD:XYZ:PI:GEN:EQUIPMENT=B744:AIRLINE=BAW".to_string()));
        assert!(sent.contains(&"$POABCD:SERVER:85275222".to_string()));
        assert!(sent.iter().any(|l| l.starts_with("$CQABCD:XYZ:ACC:") && l.contains(r#""is_full_data":true"#)));
    }

    #[test]
    fn test_fatal_server_error_and_kill_disconnect() {
        let mut rig = Rig::new(Config::default());
        rig.connect();
        rig.peer.push("$ERSERVER:ABCD:009:EGLL:No such weather profile");
        rig.tick(10);
        assert_eq!(rig.client.status(), ConnectionStatus::Connected);

        rig.peer.push("$ERSERVER:ABCD:001::Callsign in use");
        rig.tick(10);
        assert_eq!(rig.client.status(), ConnectionStatus::Disconnected);
        assert!(rig.drain().iter().any(|e| matches!(
            e,
            Event::ServerError {
                code: ServerErrorCode::CallsignInUse,
                fatal: true,
                ..
            }
        )));

        rig.connect();
        rig.peer.push("$!!SUP:ABCD:I don't like you!");
        rig.tick(10);
        assert_eq!(rig.client.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_remote_close_forces_disconnect() {
        let mut rig = Rig::new(Config::default());
        rig.connect();
        rig.peer.hang_up();
        rig.tick(10);
        assert_eq!(rig.client.status(), ConnectionStatus::Disconnected);
    }
}
