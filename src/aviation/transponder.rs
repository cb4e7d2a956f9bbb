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

#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum TransponderMode {
    Standby,
    ModeC,
    Ident,
}

impl TransponderMode {
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "S" => Some(TransponderMode::Standby),
            "N" => Some(TransponderMode::ModeC),
            "Y" => Some(TransponderMode::Ident),
            _ => None,
        }
    }

    pub fn to_wire(self) -> &'static str {
        match self {
            TransponderMode::Standby => "S",
            TransponderMode::ModeC => "N",
            TransponderMode::Ident => "Y",
        }
    }
}

#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub struct Transponder {
    pub code: u16,
    pub mode: TransponderMode,
}

impl Default for Transponder {
    /// IFR standby
    fn default() -> Self {
        Transponder {
            code: 2000,
            mode: TransponderMode::Standby,
        }
    }
}

impl Transponder {
    /// Octal digits only, 0000 to 7777.
    pub fn is_valid_code(code: i32) -> bool {
        if !(0..=7777).contains(&code) {
            return false;
        }

        let mut c = code;
        while c > 0 {
            if c % 10 > 7 {
                return false;
            }
            c /= 10;
        }
        true
    }

    /// A reported code, replaced by the default when it is not a valid squawk.
    pub fn from_reported(code: i32, mode: TransponderMode) -> Self {
        if Transponder::is_valid_code(code) {
            Transponder {
                code: code as u16,
                mode,
            }
        } else {
            debug!("invalid transponder code {}, using standby default", code);
            Transponder::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_codes() {
        assert!(Transponder::is_valid_code(7000));
        assert!(Transponder::is_valid_code(0));
        assert!(Transponder::is_valid_code(7777));
        assert!(!Transponder::is_valid_code(7778));
        assert!(!Transponder::is_valid_code(1809));
        assert!(!Transponder::is_valid_code(-1));
        assert!(!Transponder::is_valid_code(10000));
    }

    #[test]
    fn test_invalid_falls_back_to_standby() {
        let t = Transponder::from_reported(1899, TransponderMode::ModeC);
        assert_eq!(t, Transponder::default());
        assert_eq!(t.code, 2000);

        let t = Transponder::from_reported(7000, TransponderMode::Ident);
        assert_eq!(t.mode, TransponderMode::Ident);
    }
}
