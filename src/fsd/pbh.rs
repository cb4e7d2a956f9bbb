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

//! Pitch, bank, heading and on-ground packed into one 32 bit word.
//! Bits 31..22 carry `-pitch`, 21..12 `-bank`, 11..2 heading, each
//! scaled to 1024 per full turn; bit 1 is the on-ground flag.

const STEPS: f64 = 1024.0;

#[derive(Debug, PartialEq, Copy, Clone)]
pub struct Pbh {
    pub pitch: f64,
    pub bank: f64,
    pub heading: f64,
    pub on_ground: bool,
}

fn encode_angle(deg: f64) -> u32 {
    ((deg.rem_euclid(360.0) * STEPS / 360.0) as u32) & 0x3FF
}

fn decode_signed(raw: u32) -> f64 {
    let mut deg = (raw as f64 * 360.0 / STEPS).round();
    if deg > 180.0 {
        deg -= 360.0;
    }
    -deg
}

pub fn pack(pbh: &Pbh) -> u32 {
    encode_angle(-pbh.pitch) << 22
        | encode_angle(-pbh.bank) << 12
        | encode_angle(pbh.heading) << 2
        | (pbh.on_ground as u32) << 1
}

pub fn unpack(v: u32) -> Pbh {
    Pbh {
        pitch: decode_signed((v >> 22) & 0x3FF),
        bank: decode_signed((v >> 12) & 0x3FF),
        heading: ((v >> 2) & 0x3FF) as f64 * 360.0 / STEPS,
        on_ground: v & 0x2 != 0,
    }
}
