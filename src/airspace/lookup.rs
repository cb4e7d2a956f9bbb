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

//! Reverse lookup: which model best represents a remote aircraft, given
//! whatever identity hints arrived so far. The catalog itself is an
//! outside collaborator behind `ModelCatalog`.

use crate::aviation::{AircraftModel, Callsign, FlightPlan, ModelSource};
use crate::config;
use nom::bytes::complete::tag;
use nom::character::complete::{char, u32 as dec_u32};
use nom::combinator::{all_consuming, map};
use nom::sequence::{preceded, tuple};
use nom::IResult;
use std::path::Path;
use std::sync::Arc;

/// Catalog ids encoded as `db_m<model>l<livery>a<aircraft>`.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct DbIds {
    pub model: u32,
    pub livery: u32,
    pub aircraft: u32,
}

fn db_ids(i: &str) -> IResult<&str, DbIds> {
    map(
        tuple((
            preceded(tag("db_m"), dec_u32),
            preceded(char('l'), dec_u32),
            preceded(char('a'), dec_u32),
        )),
        |(model, livery, aircraft)| DbIds {
            model,
            livery,
            aircraft,
        },
    )(i)
}

pub fn parse_db_ids(s: &str) -> Option<DbIds> {
    all_consuming(db_ids)(s.trim()).ok().map(|(_, ids)| ids)
}

pub trait ModelCatalog: Send + Sync {
    fn by_model_string(&self, model_string: &str) -> Option<AircraftModel>;
    fn by_ids(&self, ids: DbIds) -> Option<AircraftModel>;
    fn by_livery_and_aircraft(&self, livery: &str, aircraft_icao: &str) -> Option<AircraftModel>;
    /// Closest match for the designator, limited to `airline` when given.
    fn by_aircraft_icao(&self, aircraft_icao: &str, airline_icao: Option<&str>) -> Option<AircraftModel>;
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogEntry {
    pub model_id: u32,
    pub livery_id: u32,
    pub aircraft_id: u32,
    pub model_string: String,
    pub aircraft_icao: String,
    pub airline_icao: String,
    pub livery: String,
    pub combined_type: String,
}

impl CatalogEntry {
    fn to_model(&self) -> AircraftModel {
        AircraftModel {
            model_string: self.model_string.clone(),
            aircraft_icao: self.aircraft_icao.clone(),
            airline_icao: self.airline_icao.clone(),
            livery: self.livery.clone(),
            combined_type: self.combined_type.clone(),
            source: ModelSource::Database,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryCatalog {
    entries: Vec<CatalogEntry>,
}

impl InMemoryCatalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        InMemoryCatalog { entries }
    }

    /// An empty catalog when no file is configured.
    pub fn load(path: Option<&Path>) -> config::Result<Self> {
        Ok(InMemoryCatalog::new(config::load_side_file(path)?))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn find<P>(&self, pred: P) -> Option<AircraftModel>
    where
        P: Fn(&CatalogEntry) -> bool,
    {
        self.entries.iter().find(|e| pred(e)).map(CatalogEntry::to_model)
    }
}

impl ModelCatalog for InMemoryCatalog {
    fn by_model_string(&self, model_string: &str) -> Option<AircraftModel> {
        self.find(|e| e.model_string.eq_ignore_ascii_case(model_string))
    }

    fn by_ids(&self, ids: DbIds) -> Option<AircraftModel> {
        self.find(|e| e.model_id == ids.model && e.livery_id == ids.livery && e.aircraft_id == ids.aircraft)
    }

    fn by_livery_and_aircraft(&self, livery: &str, aircraft_icao: &str) -> Option<AircraftModel> {
        self.find(|e| e.livery.eq_ignore_ascii_case(livery) && e.aircraft_icao.eq_ignore_ascii_case(aircraft_icao))
    }

    fn by_aircraft_icao(&self, aircraft_icao: &str, airline_icao: Option<&str>) -> Option<AircraftModel> {
        let airline_ok = |e: &CatalogEntry| airline_icao.map_or(true, |a| e.airline_icao.eq_ignore_ascii_case(a));

        // exact designator first, then the same family (B738 for B739)
        self.find(|e| airline_ok(e) && e.aircraft_icao.eq_ignore_ascii_case(aircraft_icao))
            .or_else(|| {
                let family: String = aircraft_icao.chars().take(3).collect();
                if family.len() < 3 {
                    return None;
                }
                self.find(|e| airline_ok(e) && e.aircraft_icao.to_uppercase().starts_with(&family.to_uppercase()))
            })
    }
}

/// What is known about a remote aircraft's identity.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LookupHints {
    pub model_string: String,
    pub aircraft_icao: String,
    pub airline_icao: String,
    pub livery: String,
}

#[derive(Clone)]
pub struct ReverseLookup {
    catalog: Arc<dyn ModelCatalog>,
}

impl ReverseLookup {
    pub fn new(catalog: Arc<dyn ModelCatalog>) -> Self {
        ReverseLookup { catalog }
    }

    /// Tries each source in order of trust and stops at the first hit.
    /// Every step taken is appended to `log`.
    pub fn lookup(
        &self,
        callsign: &Callsign,
        hints: &LookupHints,
        flight_plan: Option<&FlightPlan>,
        log: &mut Vec<String>,
    ) -> AircraftModel {
        if !hints.model_string.is_empty() {
            if let Some(m) = self.catalog.by_model_string(&hints.model_string) {
                log.push(format!("{}: found by model string '{}'", callsign, hints.model_string));
                return m;
            }
        }

        let ids = parse_db_ids(&hints.livery).or_else(|| parse_db_ids(&hints.model_string));
        if let Some(ids) = ids {
            if let Some(m) = self.catalog.by_ids(ids) {
                log.push(format!("{}: found by catalog ids {:?}", callsign, ids));
                return m;
            }
        }

        if !hints.livery.is_empty() && !hints.aircraft_icao.is_empty() {
            if let Some(m) = self.catalog.by_livery_and_aircraft(&hints.livery, &hints.aircraft_icao) {
                log.push(format!("{}: found by livery {} and {}", callsign, hints.livery, hints.aircraft_icao));
                return m;
            }
        }

        let airline = if hints.airline_icao.is_empty() {
            callsign.airline_prefix()
        } else {
            Some(hints.airline_icao.clone())
        };

        if !hints.aircraft_icao.is_empty() {
            if let Some(m) = self.catalog.by_aircraft_icao(&hints.aircraft_icao, airline.as_deref()) {
                log.push(format!("{}: found by {} for airline {:?}", callsign, hints.aircraft_icao, airline));
                return m;
            }

            let remarks_airline = flight_plan
                .and_then(FlightPlan::remarks_airline)
                .filter(|a| Some(a) != airline.as_ref());
            if let Some(a) = remarks_airline {
                if let Some(m) = self.catalog.by_aircraft_icao(&hints.aircraft_icao, Some(&a)) {
                    log.push(format!("{}: found by {} for airline {} from remarks", callsign, hints.aircraft_icao, a));
                    return m;
                }
            }
        }

        log.push(format!("{}: no catalog match, using fallback", callsign));
        self.fallback(hints, airline)
    }

    fn fallback(&self, hints: &LookupHints, airline: Option<String>) -> AircraftModel {
        let mut model = self
            .catalog
            .by_aircraft_icao(&hints.aircraft_icao, None)
            .filter(|_| !hints.aircraft_icao.is_empty())
            .unwrap_or_default();

        model.model_string = if hints.model_string.is_empty() {
            model.model_string
        } else {
            hints.model_string.clone()
        };
        if !hints.aircraft_icao.is_empty() {
            model.aircraft_icao = hints.aircraft_icao.clone();
        }
        if let Some(a) = airline {
            model.airline_icao = a;
        }
        if !hints.livery.is_empty() {
            model.livery = hints.livery.clone();
        }
        model.source = ModelSource::Fallback;
        model
    }
}
