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

//! In-memory transport, the test side plays the server through a
//! `LoopbackPeer`.

use super::{Inbound, Transport};
use crate::utils::lock;
use std::collections::VecDeque;
use std::io::{self, ErrorKind};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Shared {
    open: bool,
    connect_pending: bool,
    to_client: VecDeque<String>,
    from_client: Vec<String>,
    closed_by_peer: bool,
}

pub struct LoopbackTransport {
    shared: Arc<Mutex<Shared>>,
}

#[derive(Clone)]
pub struct LoopbackPeer {
    shared: Arc<Mutex<Shared>>,
}

pub fn pair() -> (LoopbackTransport, LoopbackPeer) {
    let shared = Arc::new(Mutex::new(Shared::default()));
    (
        LoopbackTransport {
            shared: shared.clone(),
        },
        LoopbackPeer { shared },
    )
}

impl LoopbackPeer {
    pub fn push(&self, line: &str) {
        lock(&self.shared).to_client.push_back(line.to_string());
    }

    /// Lines the client wrote since the last call.
    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut lock(&self.shared).from_client)
    }

    pub fn hang_up(&self) {
        lock(&self.shared).closed_by_peer = true;
    }

    pub fn is_open(&self) -> bool {
        lock(&self.shared).open
    }
}

impl Transport for LoopbackTransport {
    fn open(&mut self, _host: &str, _port: u16) -> io::Result<()> {
        let mut s = lock(&self.shared);
        if s.open {
            return Err(io::Error::new(ErrorKind::AlreadyExists, "transport already open"));
        }
        s.open = true;
        s.connect_pending = true;
        s.closed_by_peer = false;
        Ok(())
    }

    fn poll(&mut self, max_lines: usize) -> Vec<Inbound> {
        let mut s = lock(&self.shared);
        let mut events = Vec::new();

        if !s.open {
            return events;
        }

        if s.connect_pending {
            s.connect_pending = false;
            events.push(Inbound::Connected);
        }

        while events.len() < max_lines {
            match s.to_client.pop_front() {
                Some(l) => events.push(Inbound::Line(l)),
                None => break,
            }
        }

        if s.closed_by_peer && s.to_client.is_empty() {
            s.open = false;
            events.push(Inbound::Closed("remote closed connection".to_string()));
        }

        events
    }

    fn send(&mut self, line: &str) -> io::Result<()> {
        let mut s = lock(&self.shared);
        if !s.open {
            return Err(io::Error::new(ErrorKind::NotConnected, "transport not open"));
        }
        s.from_client.push(line.to_string());
        Ok(())
    }

    fn close(&mut self) {
        let mut s = lock(&self.shared);
        s.open = false;
        s.connect_pending = false;
    }

    fn is_open(&self) -> bool {
        lock(&self.shared).open
    }
}
