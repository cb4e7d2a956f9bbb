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

//! Geodetic value types. Positions are kept as normal vectors so
//! great-circle math and blending have no pole or meridian seams.

pub const EARTH_RADIUS_NM: f64 = 3440.065;

#[derive(Debug, PartialEq, Copy, Clone, Serialize, Deserialize)]
pub struct Position {
    normal: [f64; 3],
}

impl Position {
    pub fn from_lat_lon(lat: f64, lon: f64) -> Self {
        let (phi, lambda) = (lat.to_radians(), lon.to_radians());

        Position {
            normal: [
                phi.cos() * lambda.cos(),
                phi.cos() * lambda.sin(),
                phi.sin(),
            ],
        }
    }

    /// The vector does not need unit length, only its direction is used.
    pub fn from_normal_vector(normal: [f64; 3]) -> Self {
        Position { normal }
    }

    pub fn normal_vector(&self) -> [f64; 3] {
        self.normal
    }

    pub fn latitude(&self) -> f64 {
        let [x, y, z] = self.normal;
        z.atan2(x.hypot(y)).to_degrees()
    }

    pub fn longitude(&self) -> f64 {
        let [x, y, _] = self.normal;
        y.atan2(x).to_degrees()
    }

    pub fn is_null(&self) -> bool {
        self.normal == [0_f64; 3]
    }

    /// Great-circle distance in NM.
    pub fn distance_nm(&self, other: &Position) -> f64 {
        let a = self.normal;
        let b = other.normal;
        let cross = [
            a[1] * b[2] - a[2] * b[1],
            a[2] * b[0] - a[0] * b[2],
            a[0] * b[1] - a[1] * b[0],
        ];
        let sin = (cross[0].powi(2) + cross[1].powi(2) + cross[2].powi(2)).sqrt();
        let cos = a[0] * b[0] + a[1] * b[1] + a[2] * b[2];

        sin.atan2(cos) * EARTH_RADIUS_NM
    }

    /// Initial true bearing towards `other` in `[0, 360)`.
    pub fn bearing_deg(&self, other: &Position) -> f64 {
        let (phi1, phi2) = (self.latitude().to_radians(), other.latitude().to_radians());
        let dl = (other.longitude() - self.longitude()).to_radians();
        let y = dl.sin() * phi2.cos();
        let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * dl.cos();

        y.atan2(x).to_degrees().rem_euclid(360_f64)
    }
}

#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum AltitudeDatum {
    MeanSeaLevel,
    Pressure,
}

/// Altitude in ft. Values on different datums never compare.
#[derive(Debug, PartialEq, Copy, Clone, Serialize, Deserialize)]
pub struct Altitude {
    pub feet: f64,
    pub datum: AltitudeDatum,
}

impl Altitude {
    pub fn msl(feet: f64) -> Self {
        Altitude {
            feet,
            datum: AltitudeDatum::MeanSeaLevel,
        }
    }

    pub fn pressure(feet: f64) -> Self {
        Altitude {
            feet,
            datum: AltitudeDatum::Pressure,
        }
    }

    /// `self - other`, `None` when the datums differ.
    pub fn difference(&self, other: &Altitude) -> Option<f64> {
        if self.datum != other.datum {
            return None;
        }

        Some(self.feet - other.feet)
    }

    pub fn blend(&self, other: &Altitude, fraction: f64) -> Option<Altitude> {
        other.difference(self).map(|d| Altitude {
            feet: self.feet + d * fraction,
            datum: self.datum,
        })
    }
}

#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum ElevationSource {
    /// Taken from the network on-ground flag.
    Network,
    /// Answered by the hosting simulator.
    Provider,
    /// Reused from a nearby earlier situation of the same callsign.
    Cache,
    Extrapolated,
    /// Mean of stationary aircraft around.
    Average,
}

#[derive(Debug, PartialEq, Copy, Clone, Serialize, Deserialize)]
pub struct GroundElevation {
    pub feet: f64,
    pub source: ElevationSource,
}

impl GroundElevation {
    pub fn new(feet: f64, source: ElevationSource) -> Self {
        GroundElevation { feet, source }
    }
}
