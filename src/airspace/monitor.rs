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

//! Turns protocol events into airspace state and owns the reconciliation
//! rules between what is online, what is booked, and what was queried.

use super::atis::{AtisAssembler, AtisOutcome};
use super::cache::FlightPlanCache;
use super::elevation::ElevationResolver;
use super::lookup::{LookupHints, ModelCatalog, ReverseLookup};
use super::readiness::{Readiness, ReadinessTracker, Resolved, MAX_ATTEMPTS};
use super::snapshot::Analyzer;
use super::AirspaceEvent;
use crate::aviation::parts::{is_full_data, merge_incremental};
use crate::aviation::{
    AircraftParts, AtcStation, Callsign, Capabilities, Client, ModelSource, Position, RemoteAircraft, Situation,
    SituationStore, Transponder,
};
use crate::config::{Config, SetupConfig};
use crate::fsd::{AtisLineKind, ConnectionStatus, Event, FsinnPacket, QueryType, Request, TextMessage, TextTarget};
use crate::ownship::PositionProvider;
use crate::session::handle::Pushable;
use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

/// This network answers ATIS queries with typed lines only.
const TYPED_ATIS_ECOSYSTEM: &str = "vatsim";

const NEW_ATC_QUERIES: [QueryType; 4] = [
    QueryType::RealName,
    QueryType::Atis,
    QueryType::Capabilities,
    QueryType::Server,
];

const NEW_AIRCRAFT_QUERIES: [QueryType; 4] = [
    QueryType::Com1Freq,
    QueryType::RealName,
    QueryType::Capabilities,
    QueryType::Server,
];

/// `hhmm` on the UTC day of `today`.
pub fn logoff_time(hhmm: &str, today: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if hhmm.len() != 4 || !hhmm.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let h = hhmm[..2].parse().ok()?;
    let m = hhmm[2..].parse().ok()?;
    let t = NaiveTime::from_hms_opt(h, m, 0)?;

    Some(Utc.from_utc_datetime(&today.date_naive().and_time(t)))
}

fn update_relative(aircraft: &mut RemoteAircraft, own: &Position) {
    if own.is_null() {
        aircraft.distance_nm = None;
        aircraft.bearing_deg = None;
        return;
    }

    aircraft.distance_nm = Some(own.distance_nm(&aircraft.situation.position));
    aircraft.bearing_deg = Some(own.bearing_deg(&aircraft.situation.position));
}

pub struct AirspaceMonitor {
    provider: Arc<dyn PositionProvider>,
    lookup: ReverseLookup,
    elevation: ElevationResolver,
    store: SituationStore,
    flight_plans: FlightPlanCache,
    setup: SetupConfig,
    ecosystem: String,
    connected: bool,

    aircraft: HashMap<Callsign, RemoteAircraft>,
    /// Last full config of each aircraft with every increment merged in
    parts_json: HashMap<Callsign, Value>,
    clients: HashMap<Callsign, Client>,
    atc_online: BTreeMap<Callsign, AtcStation>,
    atc_booked: BTreeMap<Callsign, AtcStation>,
    /// Identity packets that arrived before the first position
    parked_fsinn: HashMap<Callsign, FsinnPacket>,

    atis: AtisAssembler,
    readiness: ReadinessTracker,
    analyzer: Analyzer,
    outbox: VecDeque<Request>,
}

impl AirspaceMonitor {
    pub fn new(
        config: &Config,
        provider: Arc<dyn PositionProvider>,
        catalog: Arc<dyn ModelCatalog>,
        store: SituationStore,
        flight_plans: FlightPlanCache,
    ) -> Self {
        AirspaceMonitor {
            elevation: ElevationResolver::new(provider.clone()),
            provider,
            lookup: ReverseLookup::new(catalog),
            store,
            flight_plans,
            setup: config.setup.clone(),
            ecosystem: config.server.ecosystem.clone(),
            connected: false,
            aircraft: HashMap::new(),
            parts_json: HashMap::new(),
            clients: HashMap::new(),
            atc_online: BTreeMap::new(),
            atc_booked: BTreeMap::new(),
            parked_fsinn: HashMap::new(),
            atis: AtisAssembler::new(),
            readiness: ReadinessTracker::new(),
            analyzer: Analyzer::new(),
            outbox: VecDeque::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn store(&self) -> &SituationStore {
        &self.store
    }

    pub fn flight_plans(&self) -> &FlightPlanCache {
        &self.flight_plans
    }

    pub fn aircraft(&self, callsign: &Callsign) -> Option<&RemoteAircraft> {
        self.aircraft.get(callsign)
    }

    pub fn aircraft_count(&self) -> usize {
        self.aircraft.len()
    }

    pub fn client(&self, callsign: &Callsign) -> Option<&Client> {
        self.clients.get(callsign)
    }

    pub fn atc_online(&self) -> impl Iterator<Item = &AtcStation> {
        self.atc_online.values()
    }

    pub fn atc_booked(&self) -> impl Iterator<Item = &AtcStation> {
        self.atc_booked.values()
    }

    /// Requests produced since the last call, in order, for the client.
    pub fn take_requests(&mut self) -> Vec<Request> {
        self.outbox.drain(..).collect()
    }

    pub fn run<'a, I>(&mut self, handle: &mut dyn Pushable<AirspaceEvent>, events: I)
    where
        I: Iterator<Item = &'a Event>,
    {
        for e in events {
            self.on_event(handle, e);
        }

        if !self.connected {
            return;
        }

        let now_ms = handle.get_epoch_ms();
        for outcome in self.atis.expire(now_ms) {
            self.on_atis_outcome(handle, outcome);
        }

        self.check_readiness(handle);
        self.analyze(handle);
    }

    /// Replaces the booked stations, reconciling each with its online
    /// counterpart if there is one.
    pub fn set_bookings(&mut self, handle: &mut dyn Pushable<AirspaceEvent>, bookings: Vec<AtcStation>) {
        let mut online_changed = false;
        self.atc_booked.clear();

        for mut booking in bookings {
            booking.online = false;
            if let Some(online) = self.atc_online.get_mut(&booking.callsign) {
                online.sync_with_booking(&mut booking);
                online_changed = true;
            }
            self.atc_booked.insert(booking.callsign.clone(), booking);
        }

        info!("{} booked stations", self.atc_booked.len());
        handle.push_data(AirspaceEvent::AtcBookedChanged);
        if online_changed {
            handle.push_data(AirspaceEvent::AtcOnlineChanged);
        }
    }

    /// Asks every aircraft again for its ICAO codes and COM1.
    pub fn requery_aircraft(&mut self) {
        let callsigns: Vec<Callsign> = self.aircraft.keys().cloned().collect();
        for cs in callsigns {
            self.outbox.push_back(Request::PlaneInfo { receiver: cs.clone() });
            self.outbox.push_back(Request::query(&cs, QueryType::Com1Freq));
        }
    }

    pub fn request_atis_updates(&mut self, now_ms: i64) {
        let callsigns: Vec<Callsign> = self.atc_online.keys().cloned().collect();
        for cs in callsigns {
            self.query_atis(&cs, now_ms);
        }
    }

    pub fn enable_analyzer(&mut self, enabled: bool, now: Instant) {
        self.analyzer.set_enabled(enabled, now);
    }

    /// Adds a station as if it had come online.
    pub fn inject_atc_station(&mut self, handle: &mut dyn Pushable<AirspaceEvent>, mut station: AtcStation) {
        station.online = true;
        station.last_updated_ms = handle.get_epoch_ms();
        station.update_relative(&self.provider.own_position());

        if let Some(booking) = self.atc_booked.get_mut(&station.callsign) {
            station.sync_with_booking(booking);
            handle.push_data(AirspaceEvent::AtcBookedChanged);
        }

        self.atc_online.insert(station.callsign.clone(), station.clone());
        handle.push_data(AirspaceEvent::AtcOnlineChanged);
        handle.push_data(AirspaceEvent::AtcConnectionStatus { station, online: true });
    }

    pub fn inject_aircraft_parts(
        &mut self,
        handle: &mut dyn Pushable<AirspaceEvent>,
        callsign: &Callsign,
        parts: AircraftParts,
    ) {
        let aircraft = match self.aircraft.get_mut(callsign) {
            Some(a) => a,
            None => {
                debug!("no aircraft {} to set parts for", callsign);
                return;
            }
        };

        self.parts_json.insert(callsign.clone(), parts.to_json());
        aircraft.parts = Some(parts);
        aircraft.parts_full_seen = true;
        handle.push_data(AirspaceEvent::AircraftUpdated(aircraft.clone()));
    }

    fn on_event(&mut self, handle: &mut dyn Pushable<AirspaceEvent>, e: &Event) {
        if let Event::ConnectionStatusChanged { to, .. } = *e {
            match to {
                ConnectionStatus::Connected => self.connected = true,
                ConnectionStatus::Disconnected => self.clear(handle),
                _ => {}
            }
            handle.push_data(AirspaceEvent::Network(e.clone()));
            return;
        }

        if !self.connected {
            trace!("not connected, ignoring {:?}", e);
            return;
        }

        let now_ms = handle.get_epoch_ms();

        match *e {
            Event::AtcPositionUpdate {
                ref callsign,
                frequency_khz,
                position,
                range_nm,
            } => self.on_atc_position(handle, callsign, frequency_khz, position, range_nm),
            Event::AtcDisconnected { ref callsign } => self.on_atc_disconnected(handle, callsign),
            Event::PilotPositionUpdate {
                ref situation,
                transponder,
            } => self.on_pilot_position(handle, situation, transponder),
            Event::InterimPositionUpdate { ref situation } => self.on_interim_position(situation),
            Event::PilotDisconnected { ref callsign } => self.remove_aircraft(handle, callsign),
            Event::TextMessage(ref m) if self.atis.is_pending(&m.sender) => {
                if let Some(outcome) = self.atis.text_reply(&m.sender, &m.message, now_ms) {
                    self.on_atis_outcome(handle, outcome);
                }
            }
            Event::FlightPlan(ref plan) => {
                self.flight_plans.insert(plan.clone(), now_ms);
                handle.push_data(AirspaceEvent::Network(e.clone()));
            }
            Event::Capabilities {
                ref callsign,
                capabilities,
            } => self.on_capabilities(callsign, capabilities),
            Event::RealName { ref callsign, ref name } => self.on_real_name(handle, callsign, name),
            Event::Server { ref callsign, ref server } => {
                self.client_mut(callsign).server = server.clone();
            }
            Event::Com1Frequency {
                ref callsign,
                frequency_khz,
            } => self.on_com1(handle, callsign, frequency_khz),
            Event::AtisLine {
                ref callsign,
                kind,
                ref line,
            } => self.on_atis_line(handle, callsign, kind, line),
            Event::PlaneInformation {
                ref callsign,
                ref aircraft,
                ref airline,
                ref livery,
            } => self.on_plane_information(handle, callsign, aircraft, airline, livery),
            Event::FsinnInformation {
                ref callsign,
                ref packet,
            } => self.on_fsinn(handle, callsign, packet),
            Event::AircraftConfig {
                ref callsign,
                ref config,
                ..
            } => self.on_aircraft_config(handle, callsign, config),
            Event::Metar { ref metar } => {
                self.on_metar(metar);
                handle.push_data(AirspaceEvent::Network(e.clone()));
            }
            _ => handle.push_data(AirspaceEvent::Network(e.clone())),
        }
    }

    /// Forgets everything learned from the network. Bookings stay, offline.
    fn clear(&mut self, handle: &mut dyn Pushable<AirspaceEvent>) {
        let was_connected = self.connected;
        self.connected = false;

        for cs in self.aircraft.keys() {
            handle.push_data(AirspaceEvent::AircraftRemoved(cs.clone()));
        }
        self.aircraft.clear();
        self.parts_json.clear();
        self.clients.clear();
        self.parked_fsinn.clear();
        self.atc_online.clear();
        for b in self.atc_booked.values_mut() {
            b.online = false;
        }

        self.store.clear();
        self.flight_plans.clear();
        self.atis.clear();
        self.readiness.clear();
        self.outbox.clear();

        if was_connected {
            handle.push_data(AirspaceEvent::AtcOnlineChanged);
            handle.push_data(AirspaceEvent::AtcBookedChanged);
        }
    }

    fn client_mut(&mut self, callsign: &Callsign) -> &mut Client {
        self.clients
            .entry(callsign.clone())
            .or_insert_with(|| Client::new(callsign.clone()))
    }

    fn query_atis(&mut self, callsign: &Callsign, now_ms: i64) {
        self.outbox.push_back(Request::query(callsign, QueryType::Atis));
        if !self.ecosystem.eq_ignore_ascii_case(TYPED_ATIS_ECOSYSTEM) {
            self.atis.query_sent(callsign, now_ms);
        }
    }

    fn on_atc_position(
        &mut self,
        handle: &mut dyn Pushable<AirspaceEvent>,
        callsign: &Callsign,
        frequency_khz: u32,
        position: Position,
        range_nm: f64,
    ) {
        let now_ms = handle.get_epoch_ms();
        let own = self.provider.own_position();

        if let Some(station) = self.atc_online.get_mut(callsign) {
            station.last_updated_ms = now_ms;

            let changed = station.frequency_khz != Some(frequency_khz)
                || station.position != Some(position)
                || station.range_nm != range_nm;
            if !changed {
                return;
            }

            station.frequency_khz = Some(frequency_khz);
            station.position = Some(position);
            station.range_nm = range_nm;
            station.update_relative(&own);
            handle.push_data(AirspaceEvent::AtcOnlineChanged);
            return;
        }

        let mut station = match self.atc_booked.get(callsign) {
            Some(b) => b.clone(),
            None => AtcStation::new(callsign.clone()),
        };
        station.frequency_khz = Some(frequency_khz);
        station.position = Some(position);
        station.range_nm = range_nm;
        station.online = true;
        station.last_updated_ms = now_ms;
        station.update_relative(&own);

        if let Some(client) = self.clients.get(callsign) {
            if !client.real_name.is_empty() {
                station.controller_name = client.real_name.clone();
            }
        }

        if let Some(booking) = self.atc_booked.get_mut(callsign) {
            station.sync_with_booking(booking);
            handle.push_data(AirspaceEvent::AtcBookedChanged);
        }

        debug!("ATC {} online on {} kHz", callsign, frequency_khz);
        self.client_mut(callsign);
        self.atc_online.insert(callsign.clone(), station.clone());
        handle.push_data(AirspaceEvent::AtcOnlineChanged);
        handle.push_data(AirspaceEvent::AtcConnectionStatus { station, online: true });

        for q in NEW_ATC_QUERIES.iter() {
            if *q == QueryType::Atis {
                self.query_atis(callsign, now_ms);
            } else {
                self.outbox.push_back(Request::query(callsign, *q));
            }
        }
    }

    fn on_atc_disconnected(&mut self, handle: &mut dyn Pushable<AirspaceEvent>, callsign: &Callsign) {
        self.atis.remove(callsign);
        self.clients.remove(callsign);

        let mut station = match self.atc_online.remove(callsign) {
            Some(s) => s,
            None => return,
        };
        station.online = false;

        if let Some(booking) = self.atc_booked.get_mut(callsign) {
            booking.online = false;
            handle.push_data(AirspaceEvent::AtcBookedChanged);
        }

        debug!("ATC {} offline", callsign);
        handle.push_data(AirspaceEvent::AtcOnlineChanged);
        handle.push_data(AirspaceEvent::AtcConnectionStatus { station, online: false });
    }

    fn with_elevation(&self, situation: &Situation) -> Situation {
        let mut s = situation.clone();
        if s.elevation.is_none() {
            s.elevation = self.elevation.resolve(&s, &self.store);
        }
        s
    }

    fn on_pilot_position(
        &mut self,
        handle: &mut dyn Pushable<AirspaceEvent>,
        situation: &Situation,
        transponder: Transponder,
    ) {
        let callsign = situation.callsign.clone();
        let now_ms = handle.get_epoch_ms();
        let own = self.provider.own_position();
        let situation = self.with_elevation(situation);

        self.store.push(situation.clone());

        if let Some(aircraft) = self.aircraft.get_mut(&callsign) {
            aircraft.transponder = transponder;
            aircraft.situation = situation;
            aircraft.last_updated_ms = now_ms;
            update_relative(aircraft, &own);
            handle.push_data(AirspaceEvent::AircraftUpdated(aircraft.clone()));
            return;
        }

        let mut aircraft = RemoteAircraft::new(situation, transponder);
        aircraft.last_updated_ms = now_ms;
        update_relative(&mut aircraft, &own);
        aircraft.pilot_name = self.client_mut(&callsign).real_name.clone();

        debug!("new aircraft {}", callsign);
        self.aircraft.insert(callsign.clone(), aircraft.clone());
        handle.push_data(AirspaceEvent::AircraftAdded(aircraft));

        let parked = self.parked_fsinn.remove(&callsign);
        self.outbox.push_back(Request::PlaneInfo {
            receiver: callsign.clone(),
        });
        if parked.is_none() {
            self.outbox.push_back(Request::FsinnInfo {
                receiver: callsign.clone(),
            });
        }
        for q in NEW_AIRCRAFT_QUERIES.iter() {
            self.outbox.push_back(Request::query(&callsign, *q));
        }

        if let Some(packet) = parked {
            debug!("replaying parked identity packet of {}", callsign);
            self.on_fsinn(handle, &callsign, &packet);
        }

        self.readiness.schedule(callsign, handle.get_clock());
    }

    /// Interim packets lack ground speed, it is carried over from the
    /// last full position.
    fn on_interim_position(&mut self, situation: &Situation) {
        let callsign = &situation.callsign;
        let latest = match self.store.latest(callsign) {
            Some(l) if self.aircraft.contains_key(callsign) => l,
            _ => {
                trace!("interim position of {} before any full one", callsign);
                return;
            }
        };

        if latest.position.normal_vector() == situation.position.normal_vector() {
            trace!("interim position of {} unchanged", callsign);
            return;
        }

        let mut s = self.with_elevation(situation);
        s.ground_speed = latest.ground_speed;
        self.store.push(s.clone());

        if let Some(aircraft) = self.aircraft.get_mut(callsign) {
            aircraft.situation = s;
            aircraft.fast_positions = true;
            update_relative(aircraft, &self.provider.own_position());
        }
    }

    fn remove_aircraft(&mut self, handle: &mut dyn Pushable<AirspaceEvent>, callsign: &Callsign) {
        self.readiness.cancel(callsign);
        self.store.remove(callsign);
        self.flight_plans.remove(callsign);
        self.parked_fsinn.remove(callsign);
        self.parts_json.remove(callsign);
        self.clients.remove(callsign);

        if self.aircraft.remove(callsign).is_some() {
            debug!("aircraft {} removed", callsign);
            self.outbox
                .push_back(Request::RemoveInterimReceiver(callsign.clone()));
            handle.push_data(AirspaceEvent::AircraftRemoved(callsign.clone()));
        }
    }

    fn on_capabilities(&mut self, callsign: &Callsign, capabilities: Capabilities) {
        let client = self.client_mut(callsign);
        client.capabilities = capabilities;
        client.capabilities_known = true;

        if callsign.is_atc_alike() {
            return;
        }

        if capabilities.interim_positions && self.setup.receive_interim_positions {
            if let Some(a) = self.aircraft.get_mut(callsign) {
                a.fast_positions = true;
            }
            self.outbox
                .push_back(Request::AddInterimReceiver(callsign.clone()));
        }

        if capabilities.aircraft_config && self.setup.receive_aircraft_parts {
            self.outbox.push_back(Request::AircraftConfigFull {
                receiver: callsign.clone(),
            });
        }
    }

    fn on_real_name(&mut self, handle: &mut dyn Pushable<AirspaceEvent>, callsign: &Callsign, name: &str) {
        self.client_mut(callsign).real_name = name.to_string();

        if let Some(station) = self.atc_online.get_mut(callsign) {
            if station.controller_name != name {
                station.controller_name = name.to_string();
                if let Some(booking) = self.atc_booked.get_mut(callsign) {
                    booking.controller_name = name.to_string();
                }
                handle.push_data(AirspaceEvent::AtcOnlineChanged);
            }
        }

        if let Some(aircraft) = self.aircraft.get_mut(callsign) {
            if aircraft.pilot_name != name {
                aircraft.pilot_name = name.to_string();
                handle.push_data(AirspaceEvent::AircraftUpdated(aircraft.clone()));
            }
        }
    }

    fn on_com1(&mut self, handle: &mut dyn Pushable<AirspaceEvent>, callsign: &Callsign, frequency_khz: u32) {
        if let Some(station) = self.atc_online.get_mut(callsign) {
            if station.frequency_khz != Some(frequency_khz) {
                station.frequency_khz = Some(frequency_khz);
                handle.push_data(AirspaceEvent::AtcOnlineChanged);
            }
        }

        if let Some(aircraft) = self.aircraft.get_mut(callsign) {
            if aircraft.com1_khz != Some(frequency_khz) {
                aircraft.com1_khz = Some(frequency_khz);
                handle.push_data(AirspaceEvent::AircraftUpdated(aircraft.clone()));
            }
        }
    }

    fn on_atis_line(
        &mut self,
        handle: &mut dyn Pushable<AirspaceEvent>,
        callsign: &Callsign,
        kind: AtisLineKind,
        line: &str,
    ) {
        if let Some(outcome) = self.atis.line(callsign, kind, line) {
            self.on_atis_outcome(handle, outcome);
        }
    }

    fn on_atis_outcome(&mut self, handle: &mut dyn Pushable<AirspaceEvent>, outcome: AtisOutcome) {
        match outcome {
            AtisOutcome::Atis {
                callsign,
                message,
                logoff,
                ..
            } => {
                let until = logoff.as_deref().and_then(|l| logoff_time(l, handle.get_utc()));

                if let Some(station) = self.atc_online.get_mut(&callsign) {
                    station.atis = Some(message.clone());
                    if until.is_some() {
                        station.booked_until = until;
                    }
                    handle.push_data(AirspaceEvent::AtcOnlineChanged);
                }

                handle.push_data(AirspaceEvent::AtisReceived { callsign, message });
            }
            AtisOutcome::Text { callsign, message } => {
                let m = TextMessage {
                    sender: callsign,
                    target: TextTarget::Callsign(String::new()),
                    message,
                    frequencies_khz: vec![],
                    received_ms: handle.get_epoch_ms(),
                };
                handle.push_data(AirspaceEvent::Network(Event::TextMessage(m)));
            }
        }
    }

    fn reverse_lookup(
        &mut self,
        handle: &mut dyn Pushable<AirspaceEvent>,
        callsign: &Callsign,
        hints: &LookupHints,
        source: ModelSource,
    ) {
        let plan = self.flight_plans.get(callsign).map(|c| c.plan);
        let mut log = Vec::new();
        let mut model = self.lookup.lookup(callsign, hints, plan.as_ref(), &mut log);
        if model.source == ModelSource::Fallback {
            model.source = source;
        }

        for message in log {
            handle.push_data(AirspaceEvent::ReverseLookupMessage {
                callsign: callsign.clone(),
                message,
            });
        }

        if let Some(aircraft) = self.aircraft.get_mut(callsign) {
            if aircraft.model != model {
                aircraft.model = model;
                handle.push_data(AirspaceEvent::AircraftUpdated(aircraft.clone()));
            }
        }
    }

    fn on_plane_information(
        &mut self,
        handle: &mut dyn Pushable<AirspaceEvent>,
        callsign: &Callsign,
        aircraft_icao: &str,
        airline_icao: &str,
        livery: &str,
    ) {
        let model_string = match self.aircraft.get(callsign) {
            Some(a) => a.model.model_string.clone(),
            None => {
                debug!("ICAO codes of unknown aircraft {}", callsign);
                return;
            }
        };

        let hints = LookupHints {
            model_string,
            aircraft_icao: aircraft_icao.to_string(),
            airline_icao: airline_icao.to_string(),
            livery: livery.to_string(),
        };
        self.reverse_lookup(handle, callsign, &hints, ModelSource::Queried);
    }

    fn on_fsinn(&mut self, handle: &mut dyn Pushable<AirspaceEvent>, callsign: &Callsign, packet: &FsinnPacket) {
        if !self.aircraft.contains_key(callsign) {
            if !callsign.is_atc_alike() {
                trace!("parking identity packet of {}", callsign);
                self.parked_fsinn.insert(callsign.clone(), packet.clone());
            }
            return;
        }

        self.client_mut(callsign).queried_model_string = packet.model_string.clone();

        let hints = LookupHints {
            model_string: packet.model_string.clone(),
            aircraft_icao: packet.aircraft_icao.clone(),
            airline_icao: packet.airline_icao.clone(),
            livery: String::new(),
        };
        self.reverse_lookup(handle, callsign, &hints, ModelSource::Fsinn);

        if let Some(aircraft) = self.aircraft.get_mut(callsign) {
            if aircraft.model.combined_type.is_empty() {
                aircraft.model.combined_type = packet.combined_type.clone();
            }
        }
    }

    /// Full configs replace, increments are merged into the last full one.
    fn on_aircraft_config(&mut self, handle: &mut dyn Pushable<AirspaceEvent>, callsign: &Callsign, config: &Value) {
        let aircraft = match self.aircraft.get_mut(callsign) {
            Some(a) => a,
            None => {
                trace!("config of {} which is not in range", callsign);
                return;
            }
        };

        let merged = if is_full_data(config) {
            config.clone()
        } else if aircraft.parts_full_seen {
            let mut base = self
                .parts_json
                .get(callsign)
                .cloned()
                .unwrap_or_else(|| Value::Object(Default::default()));
            merge_incremental(&mut base, config);
            base
        } else {
            trace!("incremental config of {} before a full one", callsign);
            return;
        };

        let parts = match AircraftParts::from_json(&merged) {
            Ok(p) => p,
            Err(e) => {
                debug!("bad aircraft config of {}: {}", callsign, e);
                return;
            }
        };

        self.parts_json.insert(callsign.clone(), merged);
        aircraft.parts = Some(parts);
        aircraft.parts_full_seen = true;
        handle.push_data(AirspaceEvent::AircraftUpdated(aircraft.clone()));
    }

    fn on_metar(&mut self, metar: &str) {
        let icao = match metar.split_whitespace().next() {
            Some(i) => i.to_uppercase(),
            None => return,
        };

        for station in self.atc_online.values_mut() {
            if station.callsign.icao_code().as_deref() == Some(icao.as_str()) {
                station.metar = Some(metar.to_string());
            }
        }
    }

    fn readiness_of(&self, callsign: &Callsign) -> Readiness {
        let aircraft = match self.aircraft.get(callsign) {
            Some(a) => a,
            None => return Readiness::Gone,
        };

        let model = &aircraft.model;
        let identified = model.is_from_database() || model.has_model_string() || model.source == ModelSource::Fsinn;

        if self.store.count(callsign) >= 2 && identified {
            Readiness::Ready
        } else {
            Readiness::NotYet
        }
    }

    fn check_readiness(&mut self, handle: &mut dyn Pushable<AirspaceEvent>) {
        let now = handle.get_clock();

        for check in self.readiness.due(now) {
            let readiness = self.readiness_of(&check.callsign);
            let cs = check.callsign.clone();

            let message = match self.readiness.resolve(&check, readiness, now) {
                None if readiness == Readiness::NotYet => String::from("waiting for further data"),
                None => continue,
                Some(Resolved::Aborted) => String::from("no longer in range, not matching"),
                Some(Resolved::Ready) => String::from("ready for matching"),
                Some(Resolved::GaveUp) => {
                    warn!("{} still incomplete after {} attempts", cs, MAX_ATTEMPTS);
                    format!("incomplete after {} attempts, matching with what is known", MAX_ATTEMPTS)
                }
            };

            handle.push_data(AirspaceEvent::ReverseLookupMessage {
                callsign: cs.clone(),
                message,
            });

            if readiness != Readiness::Gone && !self.readiness.is_pending(&cs) {
                if let Some(aircraft) = self.aircraft.get(&cs) {
                    handle.push_data(AirspaceEvent::ReadyForModelMatching(aircraft.clone()));
                }
            }
        }
    }

    fn analyze(&mut self, handle: &mut dyn Pushable<AirspaceEvent>) {
        let now = handle.get_clock();
        let now_ms = handle.get_epoch_ms();

        let analysis = match self
            .analyzer
            .tick(now, now_ms, self.aircraft.values(), self.atc_online.values())
        {
            Some(a) => a,
            None => return,
        };

        for cs in &analysis.stale_aircraft {
            info!("aircraft {} timed out", cs);
            self.remove_aircraft(handle, cs);
        }

        for cs in &analysis.stale_stations {
            info!("ATC {} timed out", cs);
            self.on_atc_disconnected(handle, cs);
        }

        handle.push_data(AirspaceEvent::Snapshot(analysis.snapshot));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::airspace::lookup::{CatalogEntry, InMemoryCatalog};
    use crate::aviation::{Altitude, ElevationSource, FlightPlan, FlightRules, GroundElevation};
    use crate::session::handle::{BasicHandle, Handle, PushableHandle};
    use chrono::Timelike;
    use serde_json::json;

    struct Ground;

    impl PositionProvider for Ground {
        fn own_position(&self) -> Position {
            Position::from_lat_lon(48.35, 11.78)
        }

        fn request_elevation(&self, _callsign: &Callsign, _position: &Position) -> Option<GroundElevation> {
            Some(GroundElevation::new(1487.0, ElevationSource::Provider))
        }
    }

    struct Rig {
        monitor: AirspaceMonitor,
        handle: BasicHandle,
        out: VecDeque<AirspaceEvent>,
    }

    impl Rig {
        fn new(ecosystem: &str) -> Self {
            let mut config = Config::default();
            config.server.ecosystem = ecosystem.to_string();

            let catalog = InMemoryCatalog::new(vec![CatalogEntry {
                model_string: "A320 Lufthansa".to_string(),
                aircraft_icao: "A320".to_string(),
                airline_icao: "DLH".to_string(),
                ..CatalogEntry::default()
            }]);

            let mut rig = Rig {
                monitor: AirspaceMonitor::new(
                    &config,
                    Arc::new(Ground),
                    Arc::new(catalog),
                    SituationStore::new(6),
                    FlightPlanCache::new(),
                ),
                handle: BasicHandle::new(100),
                out: VecDeque::new(),
            };
            rig.feed(vec![Event::ConnectionStatusChanged {
                from: ConnectionStatus::Connecting,
                to: ConnectionStatus::Connected,
            }]);
            rig.drain();
            rig
        }

        fn feed(&mut self, events: Vec<Event>) {
            let mut h = PushableHandle::new(&self.handle, &mut self.out);
            self.monitor.run(&mut h, events.iter());
        }

        fn wait(&mut self, ms: u64) {
            self.handle = self.handle.advanced(ms);
            self.feed(vec![]);
        }

        fn drain(&mut self) -> Vec<AirspaceEvent> {
            self.out.drain(..).collect()
        }

        fn now_ms(&self) -> i64 {
            self.handle.get_epoch_ms()
        }

        fn position(&self, cs: &str, lat: f64) -> Event {
            let mut s = Situation::new(Callsign::aircraft(cs), Position::from_lat_lon(lat, 11.78), Altitude::msl(5000.0));
            s.timestamp_ms = self.now_ms();
            s.ground_speed = 180.0;
            Event::PilotPositionUpdate {
                situation: s,
                transponder: Transponder::default(),
            }
        }
    }

    fn atc_position(cs: &str) -> Event {
        Event::AtcPositionUpdate {
            callsign: Callsign::atc(cs),
            frequency_khz: 118700,
            position: Position::from_lat_lon(48.35, 11.78),
            range_nm: 25.0,
        }
    }

    fn booking(cs: &str) -> AtcStation {
        let mut b = AtcStation::new(Callsign::atc(cs));
        b.controller_name = "Booked Controller".to_string();
        b.booked_from = Some(Utc.with_ymd_and_hms(2020, 1, 1, 10, 0, 0).unwrap());
        b.booked_until = Some(Utc.with_ymd_and_hms(2020, 1, 1, 12, 0, 0).unwrap());
        b
    }

    #[test]
    fn test_atc_online_then_offline_keeps_booking() {
        let mut rig = Rig::new("vatsim");
        {
            let mut h = PushableHandle::new(&rig.handle, &mut rig.out);
            rig.monitor.set_bookings(&mut h, vec![booking("EDDM_TWR")]);
        }

        rig.feed(vec![atc_position("EDDM_TWR")]);
        let online: Vec<&AtcStation> = rig.monitor.atc_online().collect();
        assert_eq!(online.len(), 1);
        assert_eq!(online[0].controller_name, "Booked Controller");
        assert!(online[0].has_booking_times());
        assert!(rig.monitor.atc_booked().next().unwrap().online);

        rig.feed(vec![Event::AtcDisconnected {
            callsign: Callsign::atc("EDDM_TWR"),
        }]);
        assert_eq!(rig.monitor.atc_online().count(), 0);
        let booked: Vec<&AtcStation> = rig.monitor.atc_booked().collect();
        assert_eq!(booked.len(), 1);
        assert!(!booked[0].online);

        let events = rig.drain();
        assert!(events.contains(&AirspaceEvent::AtcBookedChanged));
        assert!(events.iter().any(|e| matches!(e, AirspaceEvent::AtcConnectionStatus { online: false, .. })));
    }

    #[test]
    fn test_bookings_reconcile_with_online_station() {
        let mut rig = Rig::new("vatsim");
        rig.feed(vec![
            atc_position("EDDM_TWR"),
            Event::RealName {
                callsign: Callsign::atc("EDDM_TWR"),
                name: "Jane Doe".to_string(),
            },
        ]);

        {
            let mut h = PushableHandle::new(&rig.handle, &mut rig.out);
            rig.monitor.set_bookings(&mut h, vec![booking("EDDM_TWR"), booking("EDDM_GND")]);
        }

        let online = rig.monitor.atc_online().next().unwrap().clone();
        let booked = rig
            .monitor
            .atc_booked()
            .find(|b| b.callsign == Callsign::atc("EDDM_TWR"))
            .unwrap()
            .clone();

        assert_eq!(online.controller_name, "Jane Doe");
        assert_eq!(booked.controller_name, "Jane Doe");
        assert_eq!(online.booked_from, booked.booked_from);
        assert_eq!(online.booked_until, booked.booked_until);
        assert!(booked.online);
        assert!(!rig.monitor.atc_booked().any(|b| b.callsign == Callsign::atc("EDDM_GND") && b.online));
    }

    #[test]
    fn test_new_atc_is_queried_once_and_updates_are_partial() {
        let mut rig = Rig::new("vatsim");
        rig.feed(vec![atc_position("EDDM_TWR")]);

        let requests = rig.monitor.take_requests();
        let queries: Vec<QueryType> = requests
            .iter()
            .filter_map(|r| match r {
                Request::Query { query, .. } => Some(*query),
                _ => None,
            })
            .collect();
        assert_eq!(queries, NEW_ATC_QUERIES.to_vec());
        rig.drain();

        // same data, nothing to tell
        rig.feed(vec![atc_position("EDDM_TWR")]);
        assert!(rig.drain().is_empty());
        assert!(rig.monitor.take_requests().is_empty());

        rig.feed(vec![Event::AtcPositionUpdate {
            callsign: Callsign::atc("EDDM_TWR"),
            frequency_khz: 118_800,
            position: Position::from_lat_lon(48.35, 11.78),
            range_nm: 25.0,
        }]);
        assert_eq!(rig.drain(), vec![AirspaceEvent::AtcOnlineChanged]);
    }

    #[test]
    fn test_new_aircraft_queries_and_fsinn_parking() {
        let mut rig = Rig::new("vatsim");
        let packet = FsinnPacket {
            sender: "DLH1".to_string(),
            receiver: "ME".to_string(),
            airline_icao: "DLH".to_string(),
            aircraft_icao: "A320".to_string(),
            combined_type: "L2J".to_string(),
            model_string: "A320 Lufthansa".to_string(),
        };
        rig.feed(vec![Event::FsinnInformation {
            callsign: Callsign::aircraft("DLH1"),
            packet,
        }]);
        assert_eq!(rig.monitor.aircraft_count(), 0);

        let pos = rig.position("DLH1", 48.4);
        rig.feed(vec![pos]);

        let requests = rig.monitor.take_requests();
        assert_eq!(
            requests[0],
            Request::PlaneInfo {
                receiver: Callsign::aircraft("DLH1")
            }
        );
        assert!(!requests.iter().any(|r| matches!(r, Request::FsinnInfo { .. })));
        assert_eq!(requests.len(), 1 + NEW_AIRCRAFT_QUERIES.len());

        let a = rig.monitor.aircraft(&Callsign::aircraft("DLH1")).unwrap();
        assert_eq!(a.model.model_string, "A320 Lufthansa");
        assert!(a.model.is_from_database());
        assert_eq!(a.situation.elevation.unwrap().source, ElevationSource::Provider);
        assert!(a.distance_nm.unwrap() > 2.0);

        // without a parked packet the identity is asked for
        let pos = rig.position("BAW2", 48.5);
        rig.feed(vec![pos]);
        assert!(rig
            .monitor
            .take_requests()
            .iter()
            .any(|r| matches!(r, Request::FsinnInfo { .. })));
    }

    #[test]
    fn test_interim_positions() {
        let mut rig = Rig::new("vatsim");
        let mut s = Situation::new(Callsign::aircraft("DLH1"), Position::from_lat_lon(48.4, 11.78), Altitude::msl(5000.0));
        s.timestamp_ms = rig.now_ms();

        // no full position yet
        rig.feed(vec![Event::InterimPositionUpdate { situation: s.clone() }]);
        assert_eq!(rig.monitor.store().count(&Callsign::aircraft("DLH1")), 0);

        let pos = rig.position("DLH1", 48.4);
        rig.feed(vec![pos]);
        assert_eq!(rig.monitor.store().count(&Callsign::aircraft("DLH1")), 1);

        // same spot as the full position
        s.timestamp_ms += 200;
        rig.feed(vec![Event::InterimPositionUpdate { situation: s.clone() }]);
        assert_eq!(rig.monitor.store().count(&Callsign::aircraft("DLH1")), 1);

        s.position = Position::from_lat_lon(48.401, 11.78);
        rig.feed(vec![Event::InterimPositionUpdate { situation: s }]);
        let latest = rig.monitor.store().latest(&Callsign::aircraft("DLH1")).unwrap();
        assert_eq!(latest.ground_speed, 180.0);
        assert_eq!(rig.monitor.store().count(&Callsign::aircraft("DLH1")), 2);
    }

    #[test]
    fn test_ready_for_matching_after_second_position() {
        let mut rig = Rig::new("vatsim");
        let pos = rig.position("DLH1", 48.4);
        rig.feed(vec![pos]);
        rig.feed(vec![Event::PlaneInformation {
            callsign: Callsign::aircraft("DLH1"),
            aircraft: "A320".to_string(),
            airline: "DLH".to_string(),
            livery: String::new(),
        }]);
        rig.drain();

        // one position only, not yet
        rig.wait(1500);
        assert!(!rig.drain().iter().any(|e| matches!(e, AirspaceEvent::ReadyForModelMatching(_))));

        rig.handle = rig.handle.advanced(500);
        let pos = rig.position("DLH1", 48.41);
        rig.feed(vec![pos]);
        rig.wait(1500);
        let ready: Vec<AirspaceEvent> = rig
            .drain()
            .into_iter()
            .filter(|e| matches!(e, AirspaceEvent::ReadyForModelMatching(_)))
            .collect();
        assert_eq!(ready.len(), 1);
    }

    #[test]
    fn test_ready_for_matching_gives_up_but_reports() {
        let mut rig = Rig::new("vatsim");
        let pos = rig.position("XYZ9", 48.4);
        rig.feed(vec![pos]);

        let mut ready = 0;
        for _ in 0..MAX_ATTEMPTS {
            rig.wait(1500);
            ready += rig
                .drain()
                .iter()
                .filter(|e| matches!(e, AirspaceEvent::ReadyForModelMatching(_)))
                .count();
        }
        assert_eq!(ready, 1);

        // and an aircraft leaving aborts the chain silently
        let pos = rig.position("XYZ8", 48.4);
        rig.feed(vec![
            pos,
            Event::PilotDisconnected {
                callsign: Callsign::aircraft("XYZ8"),
            },
        ]);
        rig.wait(1500);
        assert!(!rig.drain().iter().any(|e| matches!(e, AirspaceEvent::ReadyForModelMatching(_))));
    }

    #[test]
    fn test_capabilities_trigger_interim_and_config_requests() {
        let mut rig = Rig::new("vatsim");
        let pos = rig.position("DLH1", 48.4);
        rig.feed(vec![pos]);
        rig.monitor.take_requests();

        rig.feed(vec![Event::Capabilities {
            callsign: Callsign::aircraft("DLH1"),
            capabilities: Capabilities {
                interim_positions: true,
                aircraft_config: true,
                ..Capabilities::default()
            },
        }]);

        assert_eq!(
            rig.monitor.take_requests(),
            vec![
                Request::AddInterimReceiver(Callsign::aircraft("DLH1")),
                Request::AircraftConfigFull {
                    receiver: Callsign::aircraft("DLH1")
                },
            ]
        );
        assert!(rig.monitor.client(&Callsign::aircraft("DLH1")).unwrap().capabilities_known);
    }

    #[test]
    fn test_aircraft_config_full_then_incremental() {
        let mut rig = Rig::new("vatsim");
        let cs = Callsign::aircraft("DLH1");
        let pos = rig.position("DLH1", 48.4);
        rig.feed(vec![pos]);

        let config = |v: Value| Event::AircraftConfig {
            callsign: Callsign::aircraft("DLH1"),
            config: v,
            offset_ms: 0,
        };

        rig.feed(vec![config(json!({"gear_down": true}))]);
        assert!(rig.monitor.aircraft(&cs).unwrap().parts.is_none());

        let mut full = AircraftParts::with_engines(2, true);
        full.gear_down = true;
        full.flaps_pct = 10;
        rig.feed(vec![config(full.to_full_json())]);
        assert_eq!(rig.monitor.aircraft(&cs).unwrap().parts, Some(full.clone()));

        rig.feed(vec![config(json!({"flaps_pct": 25, "lights": {"landing_on": true}}))]);
        let parts = rig.monitor.aircraft(&cs).unwrap().parts.clone().unwrap();
        assert_eq!(parts.flaps_pct, 25);
        assert!(parts.lights.landing_on);
        assert!(parts.gear_down);
        assert_eq!(parts.engines.len(), 2);

        // unknown aircraft are ignored
        rig.feed(vec![Event::AircraftConfig {
            callsign: Callsign::aircraft("BAW2"),
            config: full.to_full_json(),
            offset_ms: 0,
        }]);
        assert!(rig.monitor.aircraft(&Callsign::aircraft("BAW2")).is_none());
    }

    #[test]
    fn test_typed_atis_sets_logoff() {
        let mut rig = Rig::new("vatsim");
        let cs = Callsign::atc("EDDM_TWR");
        rig.feed(vec![atc_position("EDDM_TWR")]);
        rig.drain();

        let line = |kind, l: &str| Event::AtisLine {
            callsign: Callsign::atc("EDDM_TWR"),
            kind,
            line: l.to_string(),
        };
        rig.feed(vec![
            line(AtisLineKind::Text, "MUENCHEN TOWER"),
            line(AtisLineKind::Text, "z"),
            line(AtisLineKind::LogoffTime, "2130"),
            line(AtisLineKind::End, ""),
        ]);

        let station = rig.monitor.atc_online().next().unwrap().clone();
        assert_eq!(station.atis.as_deref(), Some("MUENCHEN TOWER"));
        let until = station.booked_until.unwrap();
        assert_eq!((until.hour(), until.minute()), (21, 30));

        assert!(rig.drain().contains(&AirspaceEvent::AtisReceived {
            callsign: cs,
            message: "MUENCHEN TOWER".to_string()
        }));
    }

    #[test]
    fn test_plain_atis_reply_flushed_as_text() {
        let mut rig = Rig::new("other");
        rig.feed(vec![atc_position("EDDM_TWR")]);
        rig.drain();

        let text = |m: &str| {
            Event::TextMessage(TextMessage {
                sender: Callsign::atc("EDDM_TWR"),
                target: TextTarget::Callsign("ME".to_string()),
                message: m.to_string(),
                frequencies_khz: vec![],
                received_ms: 0,
            })
        };
        rig.feed(vec![text("Information A")]);
        assert!(rig.drain().is_empty());

        rig.wait(5001);
        let events = rig.drain();
        assert!(events.iter().any(|e| match e {
            AirspaceEvent::Network(Event::TextMessage(m)) => m.message == "Information A",
            _ => false,
        }));

        // no longer pending, text passes through
        rig.feed(vec![text("hello")]);
        assert_eq!(rig.drain().len(), 1);
    }

    #[test]
    fn test_flight_plan_cached_and_analyzer_times_out() {
        let mut rig = Rig::new("vatsim");
        let pos = rig.position("DLH1", 48.4);
        rig.feed(vec![
            pos,
            Event::FlightPlan(FlightPlan {
                callsign: Callsign::aircraft("DLH1"),
                rules: FlightRules::Ifr,
                aircraft_type: "A320".to_string(),
                true_airspeed_kts: 450,
                departure: "EDDM".to_string(),
                departure_time_planned: "0900".to_string(),
                departure_time_actual: "0900".to_string(),
                cruise_altitude: "FL350".to_string(),
                destination: "EDDF".to_string(),
                enroute_minutes: 60,
                fuel_minutes: 120,
                alternate: "EDDK".to_string(),
                remarks: String::new(),
                route: "DCT".to_string(),
            }),
            atc_position("EDDM_TWR"),
        ]);
        assert!(rig.monitor.flight_plans().get(&Callsign::aircraft("DLH1")).is_some());

        rig.monitor.enable_analyzer(true, rig.handle.get_clock());
        rig.drain();

        rig.wait(5000);
        let snapshot = rig.drain().into_iter().find_map(|e| match e {
            AirspaceEvent::Snapshot(s) => Some(s),
            _ => None,
        });
        assert_eq!(snapshot.unwrap().aircraft.len(), 1);

        for _ in 0..3 {
            rig.wait(5000);
        }
        assert_eq!(rig.monitor.aircraft_count(), 0);
        assert!(rig.monitor.flight_plans().get(&Callsign::aircraft("DLH1")).is_none());
        assert_eq!(rig.monitor.atc_online().count(), 1);
    }

    #[test]
    fn test_disconnect_clears_everything() {
        let mut rig = Rig::new("vatsim");
        let pos = rig.position("DLH1", 48.4);
        rig.feed(vec![pos, atc_position("EDDM_TWR")]);
        rig.drain();

        rig.feed(vec![Event::ConnectionStatusChanged {
            from: ConnectionStatus::Connected,
            to: ConnectionStatus::Disconnected,
        }]);

        assert!(!rig.monitor.is_connected());
        assert_eq!(rig.monitor.aircraft_count(), 0);
        assert_eq!(rig.monitor.atc_online().count(), 0);
        assert_eq!(rig.monitor.store().len(), 0);
        assert!(rig.drain().contains(&AirspaceEvent::AircraftRemoved(Callsign::aircraft("DLH1"))));

        // nothing is taken in while offline
        let pos = rig.position("DLH1", 48.4);
        rig.feed(vec![pos]);
        assert_eq!(rig.monitor.aircraft_count(), 0);
    }

    #[test]
    fn test_logoff_time() {
        let today = Utc.with_ymd_and_hms(2021, 6, 1, 8, 0, 0).unwrap();
        assert_eq!(logoff_time("2130", today), Some(Utc.with_ymd_and_hms(2021, 6, 1, 21, 30, 0).unwrap()));
        assert_eq!(logoff_time("2560", today), None);
        assert_eq!(logoff_time("930", today), None);
        assert_eq!(logoff_time("ab12", today), None);
    }
}
