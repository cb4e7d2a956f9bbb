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

//! Aircraft configuration (lights, gear, flaps, engines) and its JSON
//! exchange form, including incremental deltas.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const FULL_DATA_KEY: &str = "is_full_data";

#[derive(Debug, Default, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Lights {
    pub strobe_on: bool,
    pub landing_on: bool,
    pub taxi_on: bool,
    pub beacon_on: bool,
    pub nav_on: bool,
    pub logo_on: bool,
}

#[derive(Debug, Default, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Engine {
    pub on: bool,
}

#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AircraftParts {
    pub lights: Lights,
    /// Keyed by engine number starting at "1"
    pub engines: BTreeMap<String, Engine>,
    pub gear_down: bool,
    pub flaps_pct: u8,
    pub spoilers_out: bool,
    pub on_ground: bool,
}

impl AircraftParts {
    pub fn with_engines(count: usize, on: bool) -> Self {
        let mut p = AircraftParts::default();
        for i in 1..=count {
            p.engines.insert(i.to_string(), Engine { on });
        }
        p
    }

    pub fn to_json(&self) -> Value {
        // plain data, serialization cannot fail
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn to_full_json(&self) -> Value {
        let mut v = self.to_json();
        if let Value::Object(ref mut m) = v {
            m.insert(FULL_DATA_KEY.to_string(), Value::Bool(true));
        }
        v
    }

    /// Parses a full config; the full-data marker is ignored.
    pub fn from_json(v: &Value) -> serde_json::Result<Self> {
        let mut v = v.clone();
        if let Value::Object(ref mut m) = v {
            m.remove(FULL_DATA_KEY);
        }
        serde_json::from_value(v)
    }
}

pub fn is_full_data(config: &Value) -> bool {
    config
        .get(FULL_DATA_KEY)
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Keys of `current` whose value differs from `previous`. Nested objects
/// are diffed key by key; the result only carries what changed.
pub fn incremental_diff(previous: &Value, current: &Value) -> Value {
    let mut out = Map::new();

    if let Value::Object(cur) = current {
        for (k, v) in cur {
            match (previous.get(k), v) {
                (Some(p), _) if p == v => {}
                (Some(p @ Value::Object(_)), Value::Object(_)) => {
                    out.insert(k.clone(), incremental_diff(p, v));
                }
                _ => {
                    out.insert(k.clone(), v.clone());
                }
            }
        }
    }

    Value::Object(out)
}

/// Applies an incremental delta onto `base` in place.
pub fn merge_incremental(base: &mut Value, delta: &Value) {
    match (base, delta) {
        (Value::Object(b), Value::Object(d)) => {
            for (k, v) in d {
                match b.get_mut(k) {
                    Some(existing @ Value::Object(_)) if v.is_object() => merge_incremental(existing, v),
                    _ => {
                        b.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (b, d) => *b = d.clone(),
    }
}
