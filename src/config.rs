//! Service configuration stored as a JSON file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::lifecycle::RefreshPolicy;
use crate::registry::{DatabaseSpec, ASN, CITY, COUNTRY};

/// Default directory holding the MaxMind databases.
pub const DEFAULT_DATABASE_DIR: &str = "./maxmind_db";

/// Default listening port.
pub const DEFAULT_PORT: &str = "5324";

/// Default source URL and file name per database kind.
pub const DEFAULT_DATABASES: [(&str, &str, &str); 3] = [
    (ASN, "https://git.io/GeoLite2-ASN.mmdb", "GeoLite2-ASN.mmdb"),
    (CITY, "https://git.io/GeoLite2-City.mmdb", "GeoLite2-City.mmdb"),
    (
        COUNTRY,
        "https://git.io/GeoLite2-Country.mmdb",
        "GeoLite2-Country.mmdb",
    ),
];

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Accepted Host header; empty accepts any host
    pub host: String,
    pub port: String,
    /// Serve HTTPS
    pub ssl: bool,
    /// PEM certificate path
    pub cert: String,
    /// PEM private key path
    pub key: String,
    pub database_dir: PathBuf,
    pub check_interval_hours: u64,
    pub max_age_days: u64,
    pub download_timeout_secs: u64,
    /// Source URL overrides keyed by database kind
    pub databases: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT.to_string(),
            ssl: false,
            cert: String::new(),
            key: String::new(),
            database_dir: PathBuf::from(DEFAULT_DATABASE_DIR),
            check_interval_hours: 24,
            max_age_days: 30,
            download_timeout_secs: 300,
            databases: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file. Missing fields take defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;

        log::info!("Configuration loaded from {:?}", path);
        log::info!("  Host: {}", config.host);
        log::info!("  Port: {}", config.port);
        log::info!("  SSL: {}", config.ssl);
        if config.ssl {
            log::info!("  Certificate: {}", config.cert);
            log::info!("  Key: {}", config.key);
        }
        Ok(config)
    }

    /// Save configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Check the TLS settings are consistent.
    pub fn validate(&self) -> Result<()> {
        let has_cert = !self.cert.is_empty();
        let has_key = !self.key.is_empty();

        if !self.ssl && (has_cert || has_key) {
            return Err(Error::Config(
                "SSL is disabled but certificate or key path is provided".to_string(),
            ));
        }
        if self.ssl && has_cert != has_key {
            return Err(Error::Config(
                "both certificate and key must be provided when using SSL with custom certificates"
                    .to_string(),
            ));
        }
        if self.ssl && !has_cert {
            return Err(Error::Config(
                "SSL is enabled but no certificate and key are configured".to_string(),
            ));
        }
        if self.check_interval_hours == 0 {
            return Err(Error::Config(
                "check_interval_hours must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Address to bind, `host:port`. An empty host binds every interface.
    pub fn listen_addr(&self) -> String {
        let host = if self.host.is_empty() {
            "0.0.0.0"
        } else {
            self.host.as_str()
        };
        format!("{}:{}", host, self.port)
    }

    /// The asn, city and country databases with their sources and paths.
    pub fn database_specs(&self) -> Vec<DatabaseSpec> {
        DEFAULT_DATABASES
            .iter()
            .map(|(kind, default_url, file_name)| {
                let url = self
                    .databases
                    .get(*kind)
                    .map(String::as_str)
                    .unwrap_or(*default_url);
                DatabaseSpec::new(kind, url, self.database_dir.join(file_name))
            })
            .collect()
    }

    pub fn refresh_policy(&self) -> RefreshPolicy {
        RefreshPolicy {
            check_interval: Duration::from_secs(self.check_interval_hours.saturating_mul(60 * 60)),
            max_age: Duration::from_secs(self.max_age_days.saturating_mul(24 * 60 * 60)),
        }
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

/// Create the config file with default values if it does not exist yet.
///
/// Returns `true` if a file was written.
pub fn ensure_config_file(path: impl AsRef<Path>) -> Result<bool> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    if path.exists() {
        return Ok(false);
    }

    log::info!(
        "Configuration file {:?} does not exist, creating with default values",
        path
    );
    Config::default().save(path)?;
    Ok(true)
}
