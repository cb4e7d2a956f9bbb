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

//! ATIS assembly. Structured replies arrive as typed lines closed by an
//! end marker; servers without that extension answer an ATIS query with
//! plain private text that ends in a `hhmmz` logoff line.

use crate::aviation::Callsign;
use crate::fsd::AtisLineKind;
use regex::Regex;
use std::collections::HashMap;

/// Unfinished plain text replies are released as text after this.
pub const PENDING_TIMEOUT_MS: i64 = 5000;

lazy_static! {
    // some controllers leave the logoff time empty
    static ref LOGOFF_LINE: Regex = Regex::new(r"^\d{0,4}z$").unwrap();
    // z, z1, z2 ... left over from ATIS templates
    static ref PLACEHOLDER: Regex = Regex::new(r"^(z\d?|.)$").unwrap();
}

#[derive(Debug, Clone, PartialEq)]
pub enum AtisOutcome {
    Atis {
        callsign: Callsign,
        message: String,
        voice_room: Option<String>,
        /// `hhmm` as announced
        logoff: Option<String>,
    },
    /// A plain reply that never finished, handed on as a text message
    Text { callsign: Callsign, message: String },
}

#[derive(Debug, Default)]
struct TypedLines {
    voice_room: Option<String>,
    text: Vec<String>,
    logoff: Option<String>,
}

#[derive(Debug)]
struct PendingQuery {
    sent_ms: i64,
    lines: Vec<String>,
}

#[derive(Debug, Default)]
pub struct AtisAssembler {
    typed: HashMap<Callsign, TypedLines>,
    pending: HashMap<Callsign, PendingQuery>,
}

pub fn is_placeholder(line: &str) -> bool {
    PLACEHOLDER.is_match(&line.trim().to_lowercase())
}

pub fn is_logoff_line(line: &str) -> bool {
    LOGOFF_LINE.is_match(line.trim())
}

impl AtisAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expect a plain text reply from `callsign`.
    pub fn query_sent(&mut self, callsign: &Callsign, now_ms: i64) {
        self.pending.insert(
            callsign.clone(),
            PendingQuery {
                sent_ms: now_ms,
                lines: Vec::new(),
            },
        );
    }

    pub fn is_pending(&self, callsign: &Callsign) -> bool {
        self.pending.contains_key(callsign)
    }

    pub fn line(&mut self, callsign: &Callsign, kind: AtisLineKind, line: &str) -> Option<AtisOutcome> {
        if kind != AtisLineKind::End {
            let entry = self.typed.entry(callsign.clone()).or_default();
            match kind {
                AtisLineKind::VoiceRoom => entry.voice_room = Some(line.trim().to_string()),
                AtisLineKind::Text => entry.text.push(line.to_string()),
                AtisLineKind::LogoffTime => entry.logoff = Some(line.trim().to_string()),
                AtisLineKind::End => {}
            }
            return None;
        }

        let lines = self.typed.remove(callsign)?;
        self.pending.remove(callsign);

        let message = lines
            .text
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty() && !is_placeholder(l))
            .collect::<Vec<_>>()
            .join("\n");

        Some(AtisOutcome::Atis {
            callsign: callsign.clone(),
            message,
            voice_room: lines.voice_room,
            logoff: lines.logoff.filter(|l| !l.is_empty()),
        })
    }

    /// Feeds one private text line of a pending station. `None` while
    /// more lines are expected.
    pub fn text_reply(&mut self, callsign: &Callsign, message: &str, now_ms: i64) -> Option<AtisOutcome> {
        let query = self.pending.get_mut(callsign)?;
        query.lines.push(message.to_string());

        if now_ms - query.sent_ms > PENDING_TIMEOUT_MS {
            return self.flush(callsign);
        }

        if !is_logoff_line(message) {
            return None;
        }

        let query = self.pending.remove(callsign)?;
        let logoff = message.trim().trim_end_matches('z').to_string();
        let body = &query.lines[..query.lines.len() - 1];

        Some(AtisOutcome::Atis {
            callsign: callsign.clone(),
            message: body.join("\n"),
            voice_room: None,
            logoff: if logoff.len() == 4 { Some(logoff) } else { None },
        })
    }

    /// Releases overdue plain replies as text.
    pub fn expire(&mut self, now_ms: i64) -> Vec<AtisOutcome> {
        let overdue: Vec<Callsign> = self
            .pending
            .iter()
            .filter(|(_, q)| now_ms - q.sent_ms > PENDING_TIMEOUT_MS)
            .map(|(cs, _)| cs.clone())
            .collect();

        overdue.iter().filter_map(|cs| self.flush(cs)).collect()
    }

    fn flush(&mut self, callsign: &Callsign) -> Option<AtisOutcome> {
        let query = self.pending.remove(callsign)?;
        if query.lines.is_empty() {
            debug!("ATIS query to {} went unanswered", callsign);
            return None;
        }

        Some(AtisOutcome::Text {
            callsign: callsign.clone(),
            message: query.lines.join("\n"),
        })
    }

    pub fn remove(&mut self, callsign: &Callsign) {
        self.typed.remove(callsign);
        self.pending.remove(callsign);
    }

    pub fn clear(&mut self) {
        self.typed.clear();
        self.pending.clear();
    }
}
