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

use super::{Inbound, Transport};
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::mpsc::{channel, Receiver, TryRecvError};
use std::thread;

const READ_CHUNK: usize = 4096;

enum State {
    Closed,
    Connecting(Receiver<io::Result<TcpStream>>),
    Open(TcpStream),
}

pub struct TcpTransport {
    state: State,
    inbound: Vec<u8>,
    outbound: Vec<u8>,
}

impl TcpTransport {
    pub fn new() -> Self {
        TcpTransport {
            state: State::Closed,
            inbound: Vec::new(),
            outbound: Vec::new(),
        }
    }

    fn flush_outbound(&mut self) -> io::Result<()> {
        let stream = match self.state {
            State::Open(ref mut s) => s,
            _ => return Ok(()),
        };

        while !self.outbound.is_empty() {
            match stream.write(&self.outbound) {
                Ok(0) => return Err(io::Error::new(ErrorKind::WriteZero, "socket closed")),
                Ok(n) => {
                    self.outbound.drain(..n);
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    warn!("TCP send overwhelming buffers, {} bytes pending", self.outbound.len());
                    break;
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    /// Reads whatever is available; returns false on remote close.
    fn fill_inbound(&mut self) -> Result<bool, String> {
        let stream = match self.state {
            State::Open(ref mut s) => s,
            _ => return Ok(true),
        };

        let mut buf = [0_u8; READ_CHUNK];
        loop {
            match stream.read(&mut buf) {
                Ok(0) => return Ok(false),
                Ok(n) => self.inbound.extend_from_slice(&buf[..n]),
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => return Ok(true),
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.to_string()),
            }
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let end = self.inbound.iter().position(|b| *b == b'\n')?;
        let raw: Vec<u8> = self.inbound.drain(..=end).collect();

        Some(
            String::from_utf8_lossy(&raw)
                .trim_end_matches(|c| c == '\r' || c == '\n')
                .to_string(),
        )
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        TcpTransport::new()
    }
}

impl Transport for TcpTransport {
    fn open(&mut self, host: &str, port: u16) -> io::Result<()> {
        if !matches!(self.state, State::Closed) {
            return Err(io::Error::new(ErrorKind::AlreadyExists, "transport already open"));
        }

        let (tx, rx) = channel();
        let addr = format!("{}:{}", host, port);

        // resolving and connecting may take seconds
        thread::Builder::new()
            .name("fsd-connect".to_string())
            .spawn(move || {
                let res = TcpStream::connect(addr.as_str()).and_then(|s| {
                    s.set_nonblocking(true)?;
                    s.set_nodelay(true)?;
                    Ok(s)
                });
                // the session may have given up already
                let _ = tx.send(res);
            })?;

        self.inbound.clear();
        self.outbound.clear();
        self.state = State::Connecting(rx);
        Ok(())
    }

    fn poll(&mut self, max_lines: usize) -> Vec<Inbound> {
        let mut events = Vec::new();

        if let State::Connecting(ref rx) = self.state {
            match rx.try_recv() {
                Ok(Ok(stream)) => {
                    debug!("TCP connected to {:?}", stream.peer_addr());
                    self.state = State::Open(stream);
                    events.push(Inbound::Connected);
                }
                Ok(Err(e)) => {
                    self.state = State::Closed;
                    events.push(Inbound::Closed(format!("connect failed: {}", e)));
                    return events;
                }
                Err(TryRecvError::Empty) => return events,
                Err(TryRecvError::Disconnected) => {
                    self.state = State::Closed;
                    events.push(Inbound::Closed("connect thread died".to_string()));
                    return events;
                }
            }
        }

        if let Err(e) = self.flush_outbound() {
            self.close();
            events.push(Inbound::Closed(e.to_string()));
            return events;
        }

        let alive = self.fill_inbound();

        while events.len() < max_lines {
            match self.take_line() {
                Some(l) => events.push(Inbound::Line(l)),
                None => break,
            }
        }

        match alive {
            Ok(true) => {}
            Ok(false) => {
                self.close();
                events.push(Inbound::Closed("remote closed connection".to_string()));
            }
            Err(e) => {
                self.close();
                events.push(Inbound::Closed(e));
            }
        }

        events
    }

    fn send(&mut self, line: &str) -> io::Result<()> {
        if !matches!(self.state, State::Open(_)) {
            return Err(io::Error::new(ErrorKind::NotConnected, "transport not open"));
        }

        self.outbound.extend_from_slice(line.as_bytes());
        self.outbound.extend_from_slice(b"\r\n");
        self.flush_outbound()
    }

    fn close(&mut self) {
        if let State::Open(ref s) = self.state {
            if let Err(e) = s.shutdown(Shutdown::Both) {
                debug!("TCP shutdown: {}", e);
            }
        }
        self.state = State::Closed;
        self.outbound.clear();
    }

    fn is_open(&self) -> bool {
        !matches!(self.state, State::Closed)
    }

    fn local_addr(&self) -> Option<String> {
        match self.state {
            State::Open(ref s) => s.local_addr().ok().map(|a| a.ip().to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufRead;
    use std::io::BufReader;
    use std::net::TcpListener;
    use std::time::{Duration, Instant};

    fn poll_until<F>(t: &mut TcpTransport, mut done: F) -> Vec<Inbound>
    where
        F: FnMut(&[Inbound]) -> bool,
    {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut all = Vec::new();
        while Instant::now() < deadline {
            all.extend(t.poll(75));
            if done(&all) {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        all
    }

    #[test]
    fn test_lines_both_ways() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut t = TcpTransport::new();
        t.open("127.0.0.1", port).unwrap();
        let (mut server, _) = listener.accept().unwrap();

        let events = poll_until(&mut t, |e| !e.is_empty());
        assert!(matches!(events[0], Inbound::Connected));

        t.send("#TMABCD:XYZ:hello").unwrap();
        let mut reader = BufReader::new(server.try_clone().unwrap());
        let mut got = String::new();
        reader.read_line(&mut got).unwrap();
        assert_eq!(got, "#TMABCD:XYZ:hello\r\n");

        server.write_all(b"$PISERVER:ABCD:1\r\n$PISERVER:ABCD:2\r\n").unwrap();
        let events = poll_until(&mut t, |e| e.len() >= 2);
        let lines: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                Inbound::Line(l) => Some(l.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(lines, vec!["$PISERVER:ABCD:1", "$PISERVER:ABCD:2"]);

        drop(reader);
        drop(server);
        let events = poll_until(&mut t, |e| e.iter().any(|i| matches!(i, Inbound::Closed(_))));
        assert!(events.iter().any(|i| matches!(i, Inbound::Closed(_))));
        assert!(!t.is_open());
    }
}
