//! Error types for ipgeo.

use thiserror::Error;

/// Error type for ipgeo operations.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Network failure or non-success status while fetching a database
    #[error("download error: {0}")]
    Download(String),

    /// Database file could not be opened or parsed
    #[error("failed to open database {path}: {reason}")]
    Open { path: String, reason: String },

    /// No database registered under the requested kind
    #[error("unknown database kind: {0}")]
    UnknownKind(String),

    /// Database entry has no reader yet
    #[error("database {0} not initialized")]
    NotInitialized(String),

    /// ASN lookup failed
    #[error("ASN lookup error: {0}")]
    AsnLookup(String),

    /// City lookup failed
    #[error("city lookup error: {0}")]
    CityLookup(String),

    /// Country lookup failed
    #[error("country lookup error: {0}")]
    CountryLookup(String),

    /// Invalid IP address
    #[error("invalid IP address: {0}")]
    InvalidIpAddress(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for ipgeo operations.
pub type Result<T> = std::result::Result<T, Error>;
