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

//! The cooperative session loop. One thread runs the client and the
//! monitor tick by tick; everybody else talks to it through channels.

pub mod context;
pub mod handle;
pub mod timer;

use self::context::Context;
use self::handle::{BasicHandle, Handle, PushableHandle};
use crate::airspace::cache::FlightPlanCache;
use crate::airspace::lookup::ModelCatalog;
use crate::airspace::{AirspaceEvent, AirspaceMonitor};
use crate::aviation::{AircraftParts, AtcStation, Callsign, FlightPlan, Situation, SituationStore};
use crate::config::Config;
use crate::fsd::{self, ConnectionStatus, Event, FsdClient, Request};
use crate::interpolator::{InterpolationHints, InterpolationStatus, Interpolator};
use crate::ownship::{OwnAircraftProvider, PositionProvider};
use crate::transport::Transport;
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::sleep;
use std::time::{Duration, Instant};

const STATS_INTERVAL: Duration = Duration::from_secs(60);

/// Work for the session thread, sent from anywhere.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Request(Request),
    SetBookings(Vec<AtcStation>),
    RequeryAircraft,
    RequestAtisUpdates,
    EnableAnalyzer(bool),
    InjectAtcStation(AtcStation),
    InjectAircraftParts(Callsign, AircraftParts),
    Disconnect,
}

pub struct Session {
    client: FsdClient,
    monitor: AirspaceMonitor,
    context: Context,
    commands: Receiver<Command>,
    command_tx: Sender<Command>,
    subscribers: Vec<SyncSender<AirspaceEvent>>,
    interpolator: Interpolator,
    interval: Duration,
    frequency: u16,
    handle: BasicHandle,
    event_queue: VecDeque<Event>,
    airspace_queue: VecDeque<AirspaceEvent>,
    requests: Vec<Request>,
    stats_last: Instant,
}

impl Session {
    pub fn new(
        config: &Config,
        transport: Box<dyn Transport>,
        own: Arc<dyn OwnAircraftProvider>,
        provider: Arc<dyn PositionProvider>,
        catalog: Arc<dyn ModelCatalog>,
        context: Context,
    ) -> Self {
        let frequency = config.timing.frequency_hz.max(1);
        let (command_tx, commands) = mpsc::channel();

        Session {
            client: FsdClient::new(config, transport, own, context.clone()),
            monitor: AirspaceMonitor::new(
                config,
                provider,
                catalog,
                SituationStore::new(config.history.max_situations),
                FlightPlanCache::new(),
            ),
            context,
            commands,
            command_tx,
            subscribers: vec![],
            interpolator: Interpolator::new(config.timing.interpolator_latency_ms),
            interval: Duration::from_millis(1000 / frequency as u64),
            frequency,
            handle: BasicHandle::new(frequency),
            event_queue: VecDeque::new(),
            airspace_queue: VecDeque::new(),
            requests: vec![],
            stats_last: Instant::now(),
        }
    }

    /// A bounded feed of everything the session raises. A subscriber
    /// that falls `capacity` events behind misses events.
    pub fn subscribe(&mut self, capacity: usize) -> Receiver<AirspaceEvent> {
        let (tx, rx) = mpsc::sync_channel(capacity);
        self.subscribers.push(tx);
        rx
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            commands: self.command_tx.clone(),
            context: self.context.clone(),
            store: self.monitor.store().clone(),
            flight_plans: self.monitor.flight_plans().clone(),
            interpolator: self.interpolator.clone(),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.client.status()
    }

    pub fn monitor(&self) -> &AirspaceMonitor {
        &self.monitor
    }

    pub fn connect(&mut self) -> fsd::Result<()> {
        self.handle = BasicHandle::new(self.frequency);
        let result = {
            let mut handle = PushableHandle::new(&self.handle, &mut self.event_queue);
            self.client.connect(&mut handle)
        };

        self.run_monitor();
        self.publish();
        result
    }

    fn run_commands(&mut self) {
        let mut events = PushableHandle::new(&self.handle, &mut self.event_queue);
        let mut airspace = PushableHandle::new(&self.handle, &mut self.airspace_queue);

        while let Ok(c) = self.commands.try_recv() {
            trace!("command {:?}", c);
            match c {
                Command::Request(r) => self.requests.push(r),
                Command::SetBookings(b) => self.monitor.set_bookings(&mut airspace, b),
                Command::RequeryAircraft => self.monitor.requery_aircraft(),
                Command::RequestAtisUpdates => self.monitor.request_atis_updates(self.handle.get_epoch_ms()),
                Command::EnableAnalyzer(on) => self.monitor.enable_analyzer(on, self.handle.get_clock()),
                Command::InjectAtcStation(s) => self.monitor.inject_atc_station(&mut airspace, s),
                Command::InjectAircraftParts(cs, p) => self.monitor.inject_aircraft_parts(&mut airspace, &cs, p),
                Command::Disconnect => self.client.disconnect(&mut events),
            }
        }
    }

    fn run_client(&mut self) {
        self.requests.extend(self.monitor.take_requests());
        debug!("total {} requests for the client", self.requests.len());

        let mut handle = PushableHandle::new(&self.handle, &mut self.event_queue);
        self.client.run(&mut handle, self.requests.iter());
        self.requests.clear();
    }

    fn run_monitor(&mut self) {
        let mut handle = PushableHandle::new(&self.handle, &mut self.airspace_queue);

        {
            let (first, second) = self.event_queue.as_slices();
            debug!("total {} network events to process", self.event_queue.len());
            trace!("{:?}", first);
            trace!("{:?}", second);

            self.monitor.run(&mut handle, first.iter().chain(second));
        }

        self.event_queue.clear();
    }

    fn publish(&mut self) {
        for e in self.airspace_queue.drain(..) {
            self.subscribers.retain(|s| match s.try_send(e.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!("subscriber is lagging behind, dropping event");
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            });
        }
    }

    /// One pass of the loop at the current time.
    pub fn tick(&mut self) {
        self.handle = BasicHandle::new(self.frequency);

        self.run_commands();
        self.run_client();
        self.run_monitor();
        self.publish();

        run_every!(STATS_INTERVAL, self.stats_last, self.handle, {
            info!(
                "{} aircraft, {} stations online, {} lines queued",
                self.monitor.aircraft_count(),
                self.monitor.atc_online().count(),
                self.client.queued()
            );
        });
    }

    /// Runs until the connection is gone.
    pub fn run(&mut self) {
        self.context.mark_session_thread();

        loop {
            // main event loop
            let before = Instant::now();

            self.tick();

            if self.client.status() == ConnectionStatus::Disconnected {
                info!("session ended");
                return;
            }

            let elapsed = before.elapsed();

            if elapsed < self.interval {
                sleep(self.interval - elapsed);
            } else {
                warn!("loop unable to keep up with the set frequency");
            }
        }
    }
}

/// Access to a running session from other threads.
#[derive(Clone)]
pub struct SessionHandle {
    commands: Sender<Command>,
    context: Context,
    store: SituationStore,
    flight_plans: FlightPlanCache,
    interpolator: Interpolator,
}

impl SessionHandle {
    /// False once the session is gone.
    pub fn send(&self, c: Command) -> bool {
        self.commands.send(c).is_ok()
    }

    pub fn shutdown(&self) {
        self.context.request_shutdown();
    }

    /// Blocks for up to a second while the plan is fetched.
    pub fn flight_plan(&self, callsign: &Callsign) -> Option<FlightPlan> {
        let commands = self.commands.clone();
        self.flight_plans.load(callsign, &self.context, move |cs| {
            let _ = commands.send(Command::Request(Request::QueryFlightPlan(cs.clone())));
        })
    }

    pub fn situations(&self, callsign: &Callsign) -> Vec<Situation> {
        self.store.situations(callsign)
    }

    pub fn interpolate(
        &self,
        callsign: &Callsign,
        reference_ms: i64,
        hints: &InterpolationHints,
    ) -> (Option<Situation>, InterpolationStatus) {
        self.interpolator
            .interpolate_from_store(&self.store, callsign, reference_ms, hints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::airspace::lookup::InMemoryCatalog;
    use crate::ownship::{OwnAircraft, SharedOwnAircraft};
    use crate::transport::loopback::{self, LoopbackPeer};
    use std::thread;

    fn session() -> (Session, LoopbackPeer, Receiver<AirspaceEvent>) {
        let mut config = Config::default();
        config.identity.callsign = "ABCD".to_string();
        let (transport, peer) = loopback::pair();
        let own = SharedOwnAircraft::new(OwnAircraft::new(Callsign::aircraft("ABCD")));

        let mut s = Session::new(
            &config,
            Box::new(transport),
            Arc::new(own.clone()),
            Arc::new(own),
            Arc::new(InMemoryCatalog::default()),
            Context::new(),
        );
        let rx = s.subscribe(64);
        (s, peer, rx)
    }

    fn received(rx: &Receiver<AirspaceEvent>) -> Vec<AirspaceEvent> {
        rx.try_iter().collect()
    }

    #[test]
    fn test_connect_and_see_atc() {
        let (mut s, peer, rx) = session();
        s.connect().unwrap();
        s.tick();
        assert_eq!(s.status(), ConnectionStatus::Connected);
        assert!(s.monitor().is_connected());

        peer.push("%EDDM_TWR:18500:4:0:5:48.35:11.78:0");
        s.tick();
        assert!(received(&rx).contains(&AirspaceEvent::AtcOnlineChanged));

        // follow-up queries go out on the next ticks
        let mut sent = Vec::new();
        for _ in 0..10 {
            s.tick();
            sent.extend(peer.take_sent());
        }
        assert!(sent.iter().any(|l| l.starts_with("$CQABCD:EDDM_TWR:RN")));
        assert!(sent.iter().any(|l| l.starts_with("$CQABCD:EDDM_TWR:ATIS")));
    }

    #[test]
    fn test_commands_from_another_thread() {
        let (mut s, peer, rx) = session();
        s.connect().unwrap();
        s.tick();
        peer.take_sent();

        let h = s.handle();
        thread::spawn(move || {
            h.send(Command::Request(Request::Text {
                receiver: Callsign::aircraft("XYZ"),
                message: "hi".to_string(),
            }));
            h.send(Command::InjectAtcStation(AtcStation::new(Callsign::atc("EDDM_GND"))));
        })
        .join()
        .unwrap();

        s.tick();
        s.tick();
        assert!(peer.take_sent().contains(&"#TMABCD:XYZ:hi".to_string()));
        assert_eq!(s.monitor().atc_online().count(), 1);
        assert!(received(&rx)
            .iter()
            .any(|e| matches!(e, AirspaceEvent::AtcConnectionStatus { online: true, .. })));
    }

    #[test]
    fn test_flight_plan_wait_times_out_and_queries() {
        let (mut s, peer, _rx) = session();
        s.connect().unwrap();
        s.tick();
        peer.take_sent();

        let h = s.handle();
        let waiter = thread::spawn(move || h.flight_plan(&Callsign::aircraft("DLH1")));
        assert_eq!(waiter.join().unwrap(), None);

        s.tick();
        s.tick();
        assert!(peer.take_sent().iter().any(|l| l.ends_with(":FP:DLH1")));
    }

    #[test]
    fn test_lagging_and_dropped_subscribers() {
        let (mut s, _peer, rx) = session();
        let slow = s.subscribe(1);
        drop(rx);

        s.connect().unwrap();
        s.tick();

        // the dropped receiver is forgotten, the slow one kept
        assert_eq!(s.subscribers.len(), 1);
        assert_eq!(slow.try_iter().count(), 1);
    }

    #[test]
    fn test_run_returns_after_disconnect() {
        let (mut s, peer, _rx) = session();
        s.connect().unwrap();

        let h = s.handle();
        h.send(Command::Disconnect);
        s.run();

        assert_eq!(s.status(), ConnectionStatus::Disconnected);
        assert!(!peer.is_open());
    }
}
