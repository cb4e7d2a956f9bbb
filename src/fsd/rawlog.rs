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

//! File trace of every line sent and received.

use chrono::{DateTime, Utc};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawLogMode {
    None,
    /// One file, emptied on every connect
    Truncate,
    Append,
    /// A new file per connect
    Timestamped,
}

impl Default for RawLogMode {
    fn default() -> Self {
        RawLogMode::None
    }
}

pub struct RawMessageLog {
    file: Option<File>,
    path: Option<PathBuf>,
    filter_password: bool,
}

pub fn file_name(mode: RawLogMode, utc: DateTime<Utc>) -> Option<String> {
    match mode {
        RawLogMode::None => None,
        RawLogMode::Truncate | RawLogMode::Append => Some("rawfsdmessages.log".to_string()),
        RawLogMode::Timestamped => Some(format!(
            "rawfsdmessages_{}.log",
            utc.format("%y%m%d%H%M%S")
        )),
    }
}

/// Hides the password field of a pilot login line.
pub fn filter_password(line: &str) -> Option<String> {
    if !line.starts_with("#AP") {
        return None;
    }

    let mut fields: Vec<&str> = line.split(':').collect();
    if fields.len() < 8 || fields[1] != "SERVER" {
        return None;
    }

    fields[3] = "<password>";
    Some(fields.join(":"))
}

impl RawMessageLog {
    pub fn disabled() -> Self {
        RawMessageLog {
            file: None,
            path: None,
            filter_password: false,
        }
    }

    pub fn open(mode: RawLogMode, dir: &Path, utc: DateTime<Utc>) -> io::Result<Self> {
        let name = match file_name(mode, utc) {
            Some(n) => n,
            None => return Ok(RawMessageLog::disabled()),
        };
        let path = dir.join(name);

        let file = match mode {
            RawLogMode::Append => OpenOptions::new().create(true).append(true).open(&path)?,
            _ => File::create(&path)?,
        };

        info!("tracing raw FSD messages to {}", path.display());

        Ok(RawMessageLog {
            file: Some(file),
            path: Some(path),
            filter_password: true,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.file.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The next login line gets its password masked.
    pub fn arm_password_filter(&mut self) {
        self.filter_password = true;
    }

    pub fn record(&mut self, line: &str, sent: bool, utc: DateTime<Utc>) {
        let file = match self.file.as_mut() {
            Some(f) => f,
            None => return,
        };

        let mut text = line.trim().to_string();
        if self.filter_password {
            if let Some(filtered) = filter_password(&text) {
                text = filtered;
                self.filter_password = false;
            }
        }

        let prefix = if sent { "FSD Sent=>" } else { "FSD Recv=>" };
        if let Err(e) = writeln!(
            file,
            "{} {}{}",
            utc.format("%Y-%m-%d %H:%M:%S%.3f"),
            prefix,
            text
        ) {
            warn!("unable to write raw message log: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;

    fn utc() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 3, 4, 5, 6, 7).unwrap()
    }

    #[test]
    fn test_password_filter() {
        assert_eq!(
            filter_password("#APABCD:SERVER:1234567:secret:1:9:2:Joe Bloggs EGLL"),
            Some("#APABCD:SERVER:1234567:<password>:1:9:2:Joe Bloggs EGLL".to_string())
        );
        assert_eq!(filter_password("#TMABCD:XYZ:hello"), None);
    }

    #[test]
    fn test_file_names() {
        assert_eq!(file_name(RawLogMode::None, utc()), None);
        assert_eq!(
            file_name(RawLogMode::Timestamped, utc()),
            Some("rawfsdmessages_180304050607.log".to_string())
        );
    }

    #[test]
    fn test_truncate_and_append() {
        let dir = tempfile::tempdir().unwrap();

        let mut log = RawMessageLog::open(RawLogMode::Truncate, dir.path(), utc()).unwrap();
        log.record("#APABCD:SERVER:1234567:secret:1:9:2:Joe\r\n", true, utc());
        log.record("#APABCD:SERVER:1234567:again:1:9:2:Joe", true, utc());
        log.record("$POSERVER:ABCD:1", false, utc());
        drop(log);

        let path = dir.path().join("rawfsdmessages.log");
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("FSD Sent=>#APABCD:SERVER:1234567:<password>:1:9:2:Joe"));
        // only the first login is masked
        assert!(lines[1].contains(":again:"));
        assert!(lines[2].starts_with("2018-03-04 05:06:07.000 FSD Recv=>"));

        let mut log = RawMessageLog::open(RawLogMode::Append, dir.path(), utc()).unwrap();
        log.record("#DL", false, utc());
        drop(log);
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 4);

        let log = RawMessageLog::open(RawLogMode::Truncate, dir.path(), utc()).unwrap();
        drop(log);
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 0);
    }
}
