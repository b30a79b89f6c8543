//! Aggregated IP information built from the asn, city and country databases.

use chrono::{Offset, Utc};
use chrono_tz::Tz;
use ipnet::{Ipv4Net, Ipv6Net};
use serde::Serialize;
use std::net::IpAddr;

use crate::country;
use crate::error::Result;
use crate::registry::{Registry, ASN, CITY, COUNTRY};

/// Everything known about an IP address.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IpInfo {
    pub ip: String,
    pub network: String,
    pub version: String,
    pub city: String,
    pub region: String,
    pub region_code: String,
    pub country: String,
    pub country_name: String,
    pub country_code: String,
    pub country_code_iso3: String,
    pub continent_code: String,
    pub in_eu: bool,
    pub postal: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: String,
    pub utc_offset: String,
    pub asn: String,
    pub org: String,
}

/// Look `ip` up in every database. The first failing lookup aborts with its
/// error.
pub fn lookup(registry: &Registry, ip: IpAddr) -> Result<IpInfo> {
    let ip = ip.to_canonical();
    let mut info = IpInfo {
        ip: ip.to_string(),
        network: approximate_network(ip),
        version: match ip {
            IpAddr::V4(_) => "IPv4",
            IpAddr::V6(_) => "IPv6",
        }
        .to_string(),
        ..IpInfo::default()
    };

    let asn = registry.get(ASN)?.asn(ip)?;
    info.asn = format!("AS{}", asn.number);
    info.org = asn.organization;

    let city = registry.get(CITY)?.city(ip)?;
    if let Some(region) = city.subdivisions.into_iter().next() {
        info.region = region.name;
        info.region_code = region.iso_code;
    }
    info.city = city.city;
    info.postal = city.postal;
    info.latitude = city.latitude;
    info.longitude = city.longitude;
    info.utc_offset = utc_offset(&city.time_zone).unwrap_or_default();
    info.timezone = city.time_zone;

    let country = registry.get(COUNTRY)?.country(ip)?;
    info.country_code_iso3 = country::alpha3_or_same(&country.iso_code);
    info.country = country.iso_code.clone();
    info.country_code = country.iso_code;
    info.country_name = country.name;
    info.continent_code = country.continent_code;
    info.in_eu = country.in_european_union;

    Ok(info)
}

/// The /24 (IPv4) or /64 (IPv6) network containing `ip`.
pub fn approximate_network(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => Ipv4Net::new(v4, 24)
            .map(|net| net.trunc().to_string())
            .unwrap_or_default(),
        IpAddr::V6(v6) => Ipv6Net::new(v6, 64)
            .map(|net| net.trunc().to_string())
            .unwrap_or_default(),
    }
}

/// Current whole-hour UTC offset of an IANA zone, formatted `+HH00`/`-HH00`.
pub fn utc_offset(time_zone: &str) -> Option<String> {
    if time_zone.is_empty() {
        return None;
    }
    let tz: Tz = time_zone.parse().ok()?;
    let seconds = Utc::now().with_timezone(&tz).offset().fix().local_minus_utc();
    let hours = seconds / 3600;
    let sign = if hours < 0 { '-' } else { '+' };
    Some(format!("{}{:02}00", sign, hours.abs()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::reader::FixtureReader;
    use crate::registry::{DatabaseSpec, REQUIRED_KINDS};

    fn ready_registry(country: FixtureReader) -> Registry {
        let registry = Registry::from_specs(
            REQUIRED_KINDS
                .iter()
                .map(|kind| DatabaseSpec::new(kind, "http://db.test", format!("/db/{}", kind))),
        );
        registry.restore(ASN, Box::new(FixtureReader::new("Example Net"))).unwrap();
        registry.restore(CITY, Box::new(FixtureReader::new("Springfield"))).unwrap();
        registry.restore(COUNTRY, Box::new(country)).unwrap();
        registry
    }

    #[test]
    fn test_lookup_ipv4() {
        let registry = ready_registry(FixtureReader::new("United States"));
        let info = lookup(&registry, "8.8.8.8".parse().unwrap()).unwrap();

        assert_eq!(info.ip, "8.8.8.8");
        assert_eq!(info.version, "IPv4");
        assert_eq!(info.network, "8.8.8.0/24");
        assert_eq!(info.asn, "AS11");
        assert_eq!(info.org, "Example Net");
        assert_eq!(info.city, "Springfield");
        assert_eq!(info.region, "Springfield");
        assert_eq!(info.region_code, "LB");
        assert_eq!(info.country, "US");
        assert_eq!(info.country_code, "US");
        assert_eq!(info.country_code_iso3, "USA");
        assert_eq!(info.country_name, "United States");
        assert_eq!(info.continent_code, "NA");
        assert_eq!(info.timezone, "UTC");
        assert_eq!(info.utc_offset, "+0000");
    }

    #[test]
    fn test_lookup_ipv6_and_mapped() {
        let registry = ready_registry(FixtureReader::new("x"));

        let info = lookup(&registry, "2001:db8:1:2:3::4".parse().unwrap()).unwrap();
        assert_eq!(info.version, "IPv6");
        assert_eq!(info.network, "2001:db8:1:2::/64");

        let mapped = lookup(&registry, "::ffff:192.0.2.55".parse().unwrap()).unwrap();
        assert_eq!(mapped.ip, "192.0.2.55");
        assert_eq!(mapped.version, "IPv4");
        assert_eq!(mapped.network, "192.0.2.0/24");
    }

    #[test]
    fn test_lookup_propagates_sub_lookup_error() {
        let registry = ready_registry(FixtureReader::failing());
        let err = lookup(&registry, "1.1.1.1".parse().unwrap()).unwrap_err();
        assert!(matches!(err, Error::CountryLookup(_)));
        assert!(err.to_string().starts_with("country lookup error"));
    }

    #[test]
    fn test_utc_offset() {
        assert_eq!(utc_offset("UTC").as_deref(), Some("+0000"));
        assert_eq!(utc_offset("Asia/Tokyo").as_deref(), Some("+0900"));
        assert_eq!(utc_offset("Asia/Kolkata").as_deref(), Some("+0500"));
        assert_eq!(utc_offset(""), None);
        assert_eq!(utc_offset("Mars/Olympus_Mons"), None);
    }
}
