//! ipgeo - IP geolocation service backed by self-refreshing MaxMind databases.
//!
//! The crate resolves an IP address to location, network and autonomous
//! system metadata using local copies of the GeoLite2 ASN, City and Country
//! databases, and keeps those copies fresh while serving.
//!
//! # Components
//!
//! - **Registry**: one [`DatabaseEntry`] per database kind, each guarding
//!   its live reader with a reader/writer lock
//! - **Lifecycle manager**: downloads missing databases at startup, then
//!   periodically re-downloads stale ones and hot-swaps their readers
//! - **Readers**: the [`GeoReader`] capability, implemented over MaxMind
//!   files and by a deterministic fixture for tests
//! - **HTTP layer**: `/ipgeo` and `/ipgeo/{ip}` JSON endpoints
//!
//! # Quick Start
//!
//! ```ignore
//! use ipgeo::{Config, LifecycleManager, Registry};
//! use std::sync::Arc;
//!
//! let config = Config::default();
//! let registry = Arc::new(Registry::from_specs(config.database_specs()));
//!
//! // Download missing databases and open readers (fatal on error)
//! let manager = Arc::new(LifecycleManager::new(Arc::clone(&registry)));
//! manager.initialize()?;
//!
//! // Refresh stale databases in the background
//! Arc::clone(&manager).spawn_refresher()?;
//!
//! let info = ipgeo::info::lookup(&registry, "8.8.8.8".parse()?)?;
//! println!("{} {}", info.asn, info.country_name);
//! ```
//!
//! # Refresh policy
//!
//! Every `check_interval` (1 day by default) each database older than
//! `max_age` (30 days) is downloaded to `<path>.new`, renamed over the live
//! file and reopened. A failed refresh leaves the current reader in place and
//! is retried on the next cycle.

mod error;

pub mod config;
pub mod country;
pub mod download;
pub mod info;
pub mod lifecycle;
pub mod reader;
pub mod registry;
pub mod server;

// Re-export core types
pub use error::{Error, Result};

pub use config::{ensure_config_file, Config};
pub use download::{Fetcher, HttpFetcher};
pub use info::IpInfo;
pub use lifecycle::{LifecycleManager, RefreshOutcome, RefreshPolicy};
pub use reader::{
    AsnRecord, CityRecord, CountryRecord, DatabaseOpener, FixtureOpener, FixtureReader,
    GeoReader, MaxmindOpener, MaxmindReader,
};
pub use registry::{DatabaseEntry, DatabaseSpec, Registry};
