//! Deterministic reader whose answers are derived from the database file's
//! bytes. Lets tests observe which file version a live reader was opened from
//! without shipping real `.mmdb` files.

use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{AsnRecord, CityRecord, CountryRecord, DatabaseOpener, GeoReader, Subdivision};
use crate::error::{Error, Result};

/// Reader answering every lookup with records labelled by its contents.
///
/// - ASN: number = content length, organization = label
/// - City: city = label, one subdivision `("LB", label)`
/// - Country: name = label, iso code `"US"`
#[derive(Debug, Clone)]
pub struct FixtureReader {
    label: String,
    fail_lookups: bool,
    closes: Arc<AtomicUsize>,
}

impl FixtureReader {
    /// Create a reader answering with the given label.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            fail_lookups: false,
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a reader whose lookups all fail.
    pub fn failing() -> Self {
        Self {
            fail_lookups: true,
            ..Self::new("")
        }
    }

    /// Shared counter of `close()` calls, usable after the reader was moved
    /// into a registry.
    pub fn close_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.closes)
    }

    fn check(&self, ip: IpAddr) -> std::result::Result<(), String> {
        if self.fail_lookups {
            Err(format!("fixture lookup failure for {}", ip))
        } else {
            Ok(())
        }
    }
}

impl GeoReader for FixtureReader {
    fn asn(&self, ip: IpAddr) -> Result<AsnRecord> {
        self.check(ip).map_err(Error::AsnLookup)?;
        Ok(AsnRecord {
            number: self.label.len() as u32,
            organization: self.label.clone(),
        })
    }

    fn city(&self, ip: IpAddr) -> Result<CityRecord> {
        self.check(ip).map_err(Error::CityLookup)?;
        Ok(CityRecord {
            city: self.label.clone(),
            subdivisions: vec![Subdivision {
                iso_code: "LB".to_string(),
                name: self.label.clone(),
            }],
            postal: "00000".to_string(),
            latitude: 1.5,
            longitude: -2.5,
            time_zone: "UTC".to_string(),
        })
    }

    fn country(&self, ip: IpAddr) -> Result<CountryRecord> {
        self.check(ip).map_err(Error::CountryLookup)?;
        Ok(CountryRecord {
            iso_code: "US".to_string(),
            name: self.label.clone(),
            continent_code: "NA".to_string(),
            in_european_union: false,
        })
    }

    fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Opens [`FixtureReader`]s labelled with the file's (UTF-8 lossy) contents.
///
/// Empty files and paths that cannot be read as files fail to open.
#[derive(Debug, Clone, Default)]
pub struct FixtureOpener {
    opens: Arc<AtomicUsize>,
}

impl FixtureOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful opens so far.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl DatabaseOpener for FixtureOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn GeoReader>> {
        let open_err = |reason: String| Error::Open {
            path: path.display().to_string(),
            reason,
        };
        let bytes = fs::read(path).map_err(|e| open_err(e.to_string()))?;
        if bytes.is_empty() {
            return Err(open_err("empty database file".to_string()));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        let label = String::from_utf8_lossy(&bytes).into_owned();
        Ok(Box::new(FixtureReader::new(label)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_answers_follow_file_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("GeoLite2-ASN.mmdb");
        fs::write(&path, b"v1").unwrap();

        let opener = FixtureOpener::new();
        let reader = opener.open(&path).unwrap();
        let ip: IpAddr = "8.8.8.8".parse().unwrap();

        assert_eq!(reader.asn(ip).unwrap().organization, "v1");
        assert_eq!(reader.city(ip).unwrap().city, "v1");
        assert_eq!(reader.country(ip).unwrap().name, "v1");
        assert_eq!(opener.open_count(), 1);
    }

    #[test]
    fn test_open_rejects_empty_and_directories() {
        let dir = tempdir().unwrap();
        let empty = dir.path().join("empty.mmdb");
        fs::write(&empty, b"").unwrap();

        let opener = FixtureOpener::new();
        assert!(opener.open(&empty).is_err());
        assert!(opener.open(dir.path()).is_err());
        assert_eq!(opener.open_count(), 0);
    }

    #[test]
    fn test_failing_reader() {
        let reader = FixtureReader::failing();
        let ip: IpAddr = "::1".parse().unwrap();
        assert!(matches!(reader.asn(ip), Err(Error::AsnLookup(_))));
        assert!(matches!(reader.city(ip), Err(Error::CityLookup(_))));
        assert!(matches!(reader.country(ip), Err(Error::CountryLookup(_))));
    }

    #[test]
    fn test_close_counter() {
        let reader = FixtureReader::new("x");
        let closes = reader.close_counter();
        reader.close().unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
