//! MaxMind (`.mmdb`) backed reader.

use maxminddb::MaxMindDBError;
use serde::Deserialize;
use std::net::IpAddr;
use std::path::Path;

use super::{AsnRecord, CityRecord, CountryRecord, DatabaseOpener, GeoReader, Subdivision};
use crate::error::{Error, Result};

#[derive(Deserialize, Default)]
struct Names {
    en: Option<String>,
}

#[derive(Deserialize)]
struct NamedPlace {
    iso_code: Option<String>,
    names: Option<Names>,
}

impl NamedPlace {
    fn english_name(&self) -> String {
        self.names
            .as_ref()
            .and_then(|n| n.en.clone())
            .unwrap_or_default()
    }
}

#[derive(Deserialize)]
struct Postal {
    code: Option<String>,
}

#[derive(Deserialize)]
struct Location {
    latitude: Option<f64>,
    longitude: Option<f64>,
    time_zone: Option<String>,
}

#[derive(Deserialize)]
struct Continent {
    code: Option<String>,
}

#[derive(Deserialize)]
struct CountryData {
    iso_code: Option<String>,
    names: Option<Names>,
    is_in_european_union: Option<bool>,
}

#[derive(Deserialize)]
struct AsnResponse {
    autonomous_system_number: Option<u32>,
    autonomous_system_organization: Option<String>,
}

#[derive(Deserialize)]
struct CityResponse {
    city: Option<NamedPlace>,
    subdivisions: Option<Vec<NamedPlace>>,
    postal: Option<Postal>,
    location: Option<Location>,
}

#[derive(Deserialize)]
struct CountryResponse {
    country: Option<CountryData>,
    continent: Option<Continent>,
}

/// Reader over a MaxMind database loaded into memory.
pub struct MaxmindReader {
    inner: maxminddb::Reader<Vec<u8>>,
}

impl MaxmindReader {
    /// Open and parse a database file.
    pub fn open(path: &Path) -> Result<Self> {
        let inner = maxminddb::Reader::open_readfile(path).map_err(|e| Error::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        log::debug!(
            "Opened {} database built at {}",
            inner.metadata.database_type,
            inner.metadata.build_epoch
        );
        Ok(Self { inner })
    }

    /// Look up a record, treating an address absent from the database as an
    /// empty record rather than an error.
    fn lookup<'de, T>(&'de self, ip: IpAddr) -> std::result::Result<Option<T>, MaxMindDBError>
    where
        T: Deserialize<'de>,
    {
        match self.inner.lookup::<T>(ip) {
            Ok(record) => Ok(Some(record)),
            Err(MaxMindDBError::AddressNotFoundError(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl GeoReader for MaxmindReader {
    fn asn(&self, ip: IpAddr) -> Result<AsnRecord> {
        let found: Option<AsnResponse> = self
            .lookup(ip)
            .map_err(|e| Error::AsnLookup(e.to_string()))?;

        Ok(found
            .map(|r| AsnRecord {
                number: r.autonomous_system_number.unwrap_or_default(),
                organization: r.autonomous_system_organization.unwrap_or_default(),
            })
            .unwrap_or_default())
    }

    fn city(&self, ip: IpAddr) -> Result<CityRecord> {
        let found: Option<CityResponse> = self
            .lookup(ip)
            .map_err(|e| Error::CityLookup(e.to_string()))?;
        let Some(r) = found else {
            return Ok(CityRecord::default());
        };

        let mut record = CityRecord {
            city: r.city.map(|c| c.english_name()).unwrap_or_default(),
            subdivisions: r
                .subdivisions
                .unwrap_or_default()
                .iter()
                .map(|s| Subdivision {
                    iso_code: s.iso_code.clone().unwrap_or_default(),
                    name: s.english_name(),
                })
                .collect(),
            postal: r.postal.and_then(|p| p.code).unwrap_or_default(),
            ..CityRecord::default()
        };
        if let Some(loc) = r.location {
            record.latitude = loc.latitude.unwrap_or_default();
            record.longitude = loc.longitude.unwrap_or_default();
            record.time_zone = loc.time_zone.unwrap_or_default();
        }
        Ok(record)
    }

    fn country(&self, ip: IpAddr) -> Result<CountryRecord> {
        let found: Option<CountryResponse> = self
            .lookup(ip)
            .map_err(|e| Error::CountryLookup(e.to_string()))?;
        let Some(r) = found else {
            return Ok(CountryRecord::default());
        };

        let mut record = CountryRecord {
            continent_code: r.continent.and_then(|c| c.code).unwrap_or_default(),
            ..CountryRecord::default()
        };
        if let Some(country) = r.country {
            record.iso_code = country.iso_code.unwrap_or_default();
            record.name = country.names.and_then(|n| n.en).unwrap_or_default();
            record.in_european_union = country.is_in_european_union.unwrap_or(false);
        }
        Ok(record)
    }
}

/// Opens [`MaxmindReader`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxmindOpener;

impl DatabaseOpener for MaxmindOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn GeoReader>> {
        Ok(Box::new(MaxmindReader::open(path)?))
    }
}
