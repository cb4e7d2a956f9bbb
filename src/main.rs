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

#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate lazy_static;

#[macro_use]
mod utils;
mod airspace;
mod aviation;
mod config;
mod fsd;
mod interpolator;
mod ownship;
mod session;
mod transport;

use airspace::lookup::InMemoryCatalog;
use aviation::{AtcStation, Callsign};
use config::Config;
use ownship::{OwnAircraft, SharedOwnAircraft};
use session::context::Context;
use session::{Command, Session};
use std::env;
use std::process;
use std::sync::Arc;
use transport::tcp::TcpTransport;

fn main() {
    env_logger::init();

    let path = env::args()
        .nth(1)
        .unwrap_or_else(|| config::DEFAULT_PATH.to_string());
    let config = match Config::load(&path) {
        Ok(c) => c,
        Err(e) => {
            error!("unable to load {}: {}", path, e);
            process::exit(1);
        }
    };

    let catalog = InMemoryCatalog::load(config.models_file.as_deref()).unwrap_or_else(|e| {
        warn!("model catalog not loaded: {}", e);
        InMemoryCatalog::default()
    });
    info!("{} models in catalog", catalog.len());

    let bookings: Vec<AtcStation> = config::load_side_file(config.bookings_file.as_deref()).unwrap_or_else(|e| {
        warn!("bookings not loaded: {}", e);
        vec![]
    });

    let callsign = if config.login_mode.is_observer() {
        Callsign::atc(&config.identity.callsign)
    } else {
        Callsign::aircraft(&config.identity.callsign)
    };
    let own = SharedOwnAircraft::new(OwnAircraft::from_config(callsign, &config.own_aircraft));

    let mut session = Session::new(
        &config,
        Box::new(TcpTransport::new()),
        Arc::new(own.clone()),
        Arc::new(own),
        Arc::new(catalog),
        Context::new(),
    );
    session.handle().send(Command::SetBookings(bookings));

    if let Err(e) = session.connect() {
        error!("{}", e);
        process::exit(1);
    }

    session.run();
}
