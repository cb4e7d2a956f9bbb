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

use crate::fsd::rawlog::RawLogMode;
use crate::fsd::LoginMode;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_PATH: &str = "fsdlink.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error {0}")]
    IOError(#[from] io::Error),
    #[error("JSON error {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    /// Network family the server belongs to, remembered after logoff
    pub ecosystem: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 6809,
            name: "local".to_string(),
            ecosystem: "private".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub callsign: String,
    pub cid: String,
    pub password: String,
    pub real_name: String,
    pub home_base: String,
    pub pilot_rating: u8,
    pub atc_rating: u8,
    /// 9 is the classic protocol without authentication
    pub revision: u32,
    pub sim_type: u32,
    pub system_uid: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        IdentityConfig {
            callsign: "FSD123".to_string(),
            cid: "1234567".to_string(),
            password: String::new(),
            real_name: String::new(),
            home_base: String::new(),
            pilot_rating: 1,
            atc_rating: 1,
            revision: 9,
            sim_type: 0,
            system_uid: String::new(),
        }
    }
}

impl IdentityConfig {
    pub fn name_and_home_base(&self) -> String {
        format!("{} {}", self.real_name, self.home_base)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OwnAircraftConfig {
    pub aircraft_icao: String,
    pub airline_icao: String,
    pub combined_type: String,
    pub livery: String,
    pub model_string: String,
    pub lat: f64,
    pub lon: f64,
    /// ft
    pub altitude: f64,
    pub com1_khz: u32,
    pub com2_khz: u32,
}

impl Default for OwnAircraftConfig {
    fn default() -> Self {
        OwnAircraftConfig {
            aircraft_icao: "C172".to_string(),
            airline_icao: String::new(),
            combined_type: "L1P".to_string(),
            livery: String::new(),
            model_string: String::new(),
            lat: 0.0,
            lon: 0.0,
            altitude: 0.0,
            com1_khz: 122800,
            com2_khz: 122800,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetupConfig {
    pub send_interim_positions: bool,
    pub receive_interim_positions: bool,
    pub send_aircraft_parts: bool,
    pub receive_aircraft_parts: bool,
    /// Cut airline designators to 3 letters before sending
    pub force_three_letter_airline: bool,
}

impl Default for SetupConfig {
    fn default() -> Self {
        SetupConfig {
            send_interim_positions: true,
            receive_interim_positions: true,
            send_aircraft_parts: true,
            receive_aircraft_parts: true,
            force_three_letter_airline: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub frequency_hz: u16,
    pub position_interval_ms: u64,
    pub interim_interval_ms: u64,
    pub config_interval_ms: u64,
    pub pending_timeout_ms: u64,
    pub interpolator_latency_ms: i64,
    /// Added on top of every estimated transmission offset
    pub additional_offset_ms: i64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            frequency_hz: 100,
            position_interval_ms: 5000,
            interim_interval_ms: 1000,
            config_interval_ms: 1000,
            pending_timeout_ms: 7500,
            interpolator_latency_ms: 1000,
            additional_offset_ms: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawLogConfig {
    pub mode: RawLogMode,
    pub directory: PathBuf,
    /// Also raise every line as an event to subscribers
    pub events: bool,
}

impl Default for RawLogConfig {
    fn default() -> Self {
        RawLogConfig {
            mode: RawLogMode::None,
            directory: PathBuf::from("."),
            events: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub max_situations: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        HistoryConfig { max_situations: 50 }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub identity: IdentityConfig,
    pub login_mode: LoginMode,
    pub own_aircraft: OwnAircraftConfig,
    pub setup: SetupConfig,
    pub timing: TimingConfig,
    pub raw_log: RawLogConfig,
    /// JSON list of booked stations
    pub bookings_file: Option<PathBuf>,
    /// JSON model catalog for reverse lookup
    pub models_file: Option<PathBuf>,
    pub history: HistoryConfig,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
        let f = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(f))?)
    }

    /// The file at `path` if it exists, defaults otherwise.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
        let path = path.as_ref();
        if !path.exists() {
            info!("{} not found, using defaults", path.display());
            return Ok(Config::default());
        }

        Config::from_file(path)
    }
}

/// Reads a JSON document from an optional side file, `T::default()` when
/// no file is configured.
pub fn load_side_file<T>(path: Option<&Path>) -> Result<T>
where
    T: Default + serde::de::DeserializeOwned,
{
    match path {
        Some(p) => {
            let f = File::open(p)?;
            Ok(serde_json::from_reader(BufReader::new(f))?)
        }
        None => Ok(T::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"{{"identity": {{"callsign": "DLH123"}}, "login_mode": "observer",
                "timing": {{"position_interval_ms": 2000}}, "raw_log": {{"mode": "timestamped"}},
                "unknown_key": 1}}"#
        )
        .unwrap();

        let c = Config::from_file(f.path()).unwrap();
        assert_eq!(c.identity.callsign, "DLH123");
        assert_eq!(c.identity.revision, 9);
        assert_eq!(c.login_mode, LoginMode::Observer);
        assert_eq!(c.timing.position_interval_ms, 2000);
        assert_eq!(c.timing.pending_timeout_ms, 7500);
        assert_eq!(c.raw_log.mode, RawLogMode::Timestamped);
        assert_eq!(c.history.max_situations, 50);
        assert_eq!(c.server, ServerConfig::default());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let c = Config::load(dir.path().join("nope.json")).unwrap();
        assert_eq!(c, Config::default());
    }

    #[test]
    fn test_broken_file_is_an_error() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "{{ not json").unwrap();
        assert!(matches!(Config::from_file(f.path()), Err(ConfigError::JsonError(_))));
    }

    #[test]
    fn test_name_and_home_base() {
        let mut i = IdentityConfig::default();
        i.real_name = "Joe Bloggs".to_string();
        assert_eq!(i.name_and_home_base(), "Joe Bloggs");
        i.home_base = "EGLL".to_string();
        assert_eq!(i.name_and_home_base(), "Joe Bloggs EGLL");
    }
}
