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

//! Participant identifiers. Equality, ordering and hashing all use the
//! normalized form, so lookups never depend on how a callsign was typed.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

const ATC_SUFFIXES: [&str; 6] = ["APP", "GND", "DEP", "TWR", "DEL", "CTR"];
const ATC_ALIKE_SUFFIXES: [&str; 11] = [
    "ATIS", "APP", "GND", "OBS", "DEP", "TWR", "DEL", "CTR", "SUP", "FSS", "INS",
];
// sort order of ATC roles, lower is more important
const SUFFIX_ORDER: [&str; 15] = [
    "FSS", "CTR", "APP", "DEP", "TWR", "GND", "DEL", "ATIS", "SUP", "OBS", "INS", "ADM", "VATGOV",
    "VATSIM", "EXAM",
];

#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum CallsignKind {
    Aircraft,
    Atc,
    Observer,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Callsign {
    normalized: String,
    as_set: String,
    hint: CallsignKind,
}

impl Callsign {
    pub fn new(s: &str) -> Self {
        Self::with_kind(s, CallsignKind::Unknown)
    }

    pub fn aircraft(s: &str) -> Self {
        Self::with_kind(s, CallsignKind::Aircraft)
    }

    pub fn atc(s: &str) -> Self {
        Self::with_kind(s, CallsignKind::Atc)
    }

    pub fn with_kind(s: &str, hint: CallsignKind) -> Self {
        Callsign {
            normalized: Callsign::normalize(s, hint),
            as_set: s.trim().to_string(),
            hint,
        }
    }

    /// Upper-cases and strips everything but letters, digits and `_`.
    /// ATC callsigns (by hint or by suffix) additionally keep `-`.
    pub fn normalize(s: &str, hint: CallsignKind) -> String {
        let upper = s.trim().to_uppercase();
        let keep_hyphen = match hint {
            CallsignKind::Atc => true,
            CallsignKind::Aircraft => false,
            _ => looks_like_atc(&upper),
        };

        upper
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || (keep_hyphen && *c == '-'))
            .collect()
    }

    pub fn as_str(&self) -> &str {
        &self.normalized
    }

    pub fn as_set(&self) -> &str {
        &self.as_set
    }

    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }

    pub fn hint(&self) -> CallsignKind {
        self.hint
    }

    /// The hint when one was given, otherwise a classification by suffix.
    pub fn kind(&self) -> CallsignKind {
        match self.hint {
            CallsignKind::Unknown if self.is_empty() => CallsignKind::Unknown,
            CallsignKind::Unknown if self.is_observer() => CallsignKind::Observer,
            CallsignKind::Unknown if self.is_atc_alike() => CallsignKind::Atc,
            CallsignKind::Unknown => CallsignKind::Aircraft,
            h => h,
        }
    }

    pub fn has_suffix(&self) -> bool {
        self.as_set.contains('_')
    }

    /// Text after the last `_`, upper-cased.
    pub fn suffix(&self) -> Option<String> {
        if !self.has_suffix() {
            return None;
        }

        self.as_set.rsplit('_').next().map(|s| s.to_uppercase())
    }

    pub fn is_atc(&self) -> bool {
        if self.hint == CallsignKind::Atc {
            return true;
        }

        self.suffix()
            .map_or(false, |s| ATC_SUFFIXES.contains(&s.as_str()))
    }

    pub fn is_atc_alike(&self) -> bool {
        if self.hint == CallsignKind::Aircraft {
            return false;
        }

        self.suffix()
            .map_or(false, |s| ATC_ALIKE_SUFFIXES.contains(&s.as_str()))
    }

    pub fn is_observer(&self) -> bool {
        self.as_set.to_uppercase().ends_with("_OBS")
    }

    pub fn suffix_sort_order(&self) -> usize {
        self.suffix()
            .and_then(|s| SUFFIX_ORDER.iter().position(|o| *o == s))
            .map_or(usize::MAX, |p| p + 1)
    }

    /// Airport designator of an ATC callsign, e.g. `EDDM` for `EDDM_TWR`.
    pub fn icao_code(&self) -> Option<String> {
        if self.is_atc() && self.normalized.chars().count() >= 4 {
            return Some(self.normalized.chars().take(4).collect());
        }

        None
    }

    /// Airline designator of a flight callsign, e.g. `DLH` for `DLH123`.
    /// Virtual 4-letter codes starting with `V` are kept as is.
    pub fn airline_prefix(&self) -> Option<String> {
        if self.normalized.len() < 3 || self.is_atc() {
            return None;
        }

        let letters: String = self
            .normalized
            .chars()
            .take_while(|c| c.is_ascii_uppercase())
            .collect();
        let has_number = self.normalized[letters.len()..]
            .chars()
            .next()
            .map_or(false, |c| c.is_ascii_digit());

        if !has_number {
            return None;
        }

        match letters.len() {
            3 => Some(letters),
            4 if letters.starts_with('V') => Some(letters),
            4 => Some(letters[..3].to_string()),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        let len = self.normalized.len();
        if !(2..=10).contains(&len) {
            return false;
        }

        match self.kind() {
            CallsignKind::Aircraft => self
                .normalized
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()),
            _ => self
                .normalized
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_' || c == '-'),
        }
    }
}

fn looks_like_atc(upper: &str) -> bool {
    upper
        .rsplit_once('_')
        .map_or(false, |(_, s)| ATC_ALIKE_SUFFIXES.contains(&s))
}

impl PartialEq for Callsign {
    fn eq(&self, other: &Callsign) -> bool {
        self.normalized == other.normalized
    }
}

impl Eq for Callsign {}

impl Hash for Callsign {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized.hash(state);
    }
}

impl PartialOrd for Callsign {
    fn partial_cmp(&self, other: &Callsign) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Callsign {
    fn cmp(&self, other: &Callsign) -> Ordering {
        self.normalized.cmp(&other.normalized)
    }
}

impl fmt::Display for Callsign {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.normalized)
    }
}

impl From<String> for Callsign {
    fn from(s: String) -> Self {
        Callsign::new(&s)
    }
}

impl<'a> From<&'a str> for Callsign {
    fn from(s: &'a str) -> Self {
        Callsign::new(s)
    }
}

impl From<Callsign> for String {
    fn from(c: Callsign) -> Self {
        c.normalized
    }
}
