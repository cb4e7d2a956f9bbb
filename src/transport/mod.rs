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

pub mod tcp;
#[cfg(test)]
pub mod loopback;

use std::io;

/// What a transport observed since the last poll.
#[derive(Debug)]
pub enum Inbound {
    Connected,
    Line(String),
    /// Remote close or a failed connect
    Closed(String),
}

/// A line oriented connection to the FSD server. Never blocks the
/// session thread.
pub trait Transport {
    fn open(&mut self, host: &str, port: u16) -> io::Result<()>;
    /// Everything that happened since the last call, at most `max_lines` lines.
    fn poll(&mut self, max_lines: usize) -> Vec<Inbound>;
    /// Writes one line, the terminator is added here.
    fn send(&mut self, line: &str) -> io::Result<()>;
    fn close(&mut self);
    fn is_open(&self) -> bool;

    /// Local address of the connection, reported to peers asking for it.
    fn local_addr(&self) -> Option<String> {
        None
    }
}
