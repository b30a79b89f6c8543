//! Geo database reader capability.
//!
//! The rest of the crate only talks to databases through [`GeoReader`] and
//! obtains readers through a [`DatabaseOpener`], so the MaxMind-backed
//! implementation can be swapped for [`fixture::FixtureReader`] in tests.

use serde::Serialize;
use std::net::IpAddr;
use std::path::Path;

use crate::error::Result;

pub mod fixture;
pub mod maxmind;

pub use fixture::{FixtureOpener, FixtureReader};
pub use maxmind::{MaxmindOpener, MaxmindReader};

/// Autonomous system owning an address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AsnRecord {
    pub number: u32,
    pub organization: String,
}

/// First-level administrative division (state, province, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Subdivision {
    pub iso_code: String,
    pub name: String,
}

/// City-level location of an address. Names are English.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CityRecord {
    pub city: String,
    pub subdivisions: Vec<Subdivision>,
    pub postal: String,
    pub latitude: f64,
    pub longitude: f64,
    pub time_zone: String,
}

/// Country-level location of an address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CountryRecord {
    /// ISO 3166-1 alpha-2 code
    pub iso_code: String,
    pub name: String,
    pub continent_code: String,
    pub in_european_union: bool,
}

/// An open, queryable geo database.
///
/// Records are returned owned so callers can drop the registry lock before
/// doing anything with them.
pub trait GeoReader: Send + Sync {
    /// Look up the autonomous system of an address.
    fn asn(&self, ip: IpAddr) -> Result<AsnRecord>;

    /// Look up the city-level location of an address.
    fn city(&self, ip: IpAddr) -> Result<CityRecord>;

    /// Look up the country of an address.
    fn country(&self, ip: IpAddr) -> Result<CountryRecord>;

    /// Release the reader. Called once, right before the reader is dropped.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Opens a [`GeoReader`] from a database file on disk.
pub trait DatabaseOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn GeoReader>>;
}
