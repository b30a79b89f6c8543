//! Registry of geo databases and their live readers.
//!
//! Each [`DatabaseEntry`] guards its reader with a reader/writer lock:
//! lookups hold it shared for the duration of a single query, swaps hold it
//! exclusively only while exchanging the reader pointer and timestamp.

use ahash::AHashMap;
use parking_lot::RwLock;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{Error, Result};
use crate::reader::{AsnRecord, CityRecord, CountryRecord, GeoReader};

/// Kind name of the autonomous system database.
pub const ASN: &str = "asn";
/// Kind name of the city database.
pub const CITY: &str = "city";
/// Kind name of the country database.
pub const COUNTRY: &str = "country";

/// Kinds needed to answer a full IP lookup.
pub const REQUIRED_KINDS: [&str; 3] = [ASN, CITY, COUNTRY];

/// Static description of a database: where it comes from and where it lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSpec {
    pub kind: String,
    pub source_url: String,
    pub local_path: PathBuf,
}

impl DatabaseSpec {
    pub fn new(kind: &str, source_url: &str, local_path: impl AsRef<Path>) -> Self {
        Self {
            kind: kind.to_string(),
            source_url: source_url.to_string(),
            local_path: local_path.as_ref().to_path_buf(),
        }
    }
}

struct EntryState {
    reader: Option<Box<dyn GeoReader>>,
    last_refreshed: Option<SystemTime>,
}

/// One registered database.
pub struct DatabaseEntry {
    kind: String,
    source_url: String,
    local_path: PathBuf,
    state: RwLock<EntryState>,
}

impl DatabaseEntry {
    fn new(spec: DatabaseSpec) -> Self {
        Self {
            kind: spec.kind,
            source_url: spec.source_url,
            local_path: spec.local_path,
            state: RwLock::new(EntryState {
                reader: None,
                last_refreshed: None,
            }),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    /// Sibling path refreshed downloads are written to before being renamed
    /// over [`local_path`](Self::local_path).
    pub fn temp_path(&self) -> PathBuf {
        let mut name = self.local_path.clone().into_os_string();
        name.push(".new");
        PathBuf::from(name)
    }

    /// Time of the last successful download, or the file's modification time
    /// if it was not downloaded during this run.
    pub fn last_refreshed(&self) -> Option<SystemTime> {
        self.state.read().last_refreshed
    }

    /// Whether a reader is installed.
    pub fn is_ready(&self) -> bool {
        self.state.read().reader.is_some()
    }

    pub fn asn(&self, ip: IpAddr) -> Result<AsnRecord> {
        self.with_reader(|r| r.asn(ip))
    }

    pub fn city(&self, ip: IpAddr) -> Result<CityRecord> {
        self.with_reader(|r| r.city(ip))
    }

    pub fn country(&self, ip: IpAddr) -> Result<CountryRecord> {
        self.with_reader(|r| r.country(ip))
    }

    fn with_reader<T>(&self, f: impl FnOnce(&dyn GeoReader) -> Result<T>) -> Result<T> {
        let state = self.state.read();
        match state.reader.as_deref() {
            Some(reader) => f(reader),
            None => Err(Error::NotInitialized(self.kind.clone())),
        }
    }

    /// Swap in `reader`, optionally advancing the refresh timestamp, then
    /// close the previous reader outside the lock.
    fn install(&self, reader: Box<dyn GeoReader>, refreshed_at: Option<SystemTime>) {
        let previous = {
            let mut state = self.state.write();
            let previous = state.reader.replace(reader);
            if let Some(at) = refreshed_at {
                advance(&mut state.last_refreshed, at);
            }
            previous
        };

        if let Some(old) = previous {
            if let Err(e) = old.close() {
                log::warn!("Failed to close previous {} reader: {}", self.kind, e);
            }
        }
    }

    pub(crate) fn record_refresh(&self, at: SystemTime) {
        advance(&mut self.state.write().last_refreshed, at);
    }
}

/// Move `slot` forward to `at`, never backwards.
fn advance(slot: &mut Option<SystemTime>, at: SystemTime) {
    match slot {
        Some(current) if *current >= at => {}
        _ => *slot = Some(at),
    }
}

/// Set of databases keyed by kind.
#[derive(Default)]
pub struct Registry {
    entries: AHashMap<String, DatabaseEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from database specs. A later spec with the same kind
    /// replaces an earlier one.
    pub fn from_specs(specs: impl IntoIterator<Item = DatabaseSpec>) -> Self {
        let mut registry = Self::new();
        for spec in specs {
            registry.register(spec);
        }
        registry
    }

    /// Register a database. Its reader stays empty until initialization.
    pub fn register(&mut self, spec: DatabaseSpec) {
        self.entries
            .insert(spec.kind.clone(), DatabaseEntry::new(spec));
    }

    /// Get the entry registered under `kind`.
    pub fn get(&self, kind: &str) -> Result<&DatabaseEntry> {
        self.entries
            .get(kind)
            .ok_or_else(|| Error::UnknownKind(kind.to_string()))
    }

    /// Fail with [`Error::UnknownKind`] unless every kind in `kinds` is registered.
    pub fn require(&self, kinds: &[&str]) -> Result<()> {
        for kind in kinds {
            self.get(kind)?;
        }
        Ok(())
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Entries sorted by kind.
    pub fn entries(&self) -> Vec<&DatabaseEntry> {
        let mut entries: Vec<&DatabaseEntry> = self.entries.values().collect();
        entries.sort_unstable_by(|a, b| a.kind.cmp(&b.kind));
        entries
    }

    /// Atomically swap the reader of `kind` and mark it refreshed now.
    ///
    /// Lookups in flight finish against the old reader; later ones see the
    /// new one. Errors closing the old reader are logged and ignored.
    pub fn replace(&self, kind: &str, reader: Box<dyn GeoReader>) -> Result<()> {
        self.get(kind)?.install(reader, Some(SystemTime::now()));
        Ok(())
    }

    /// Swap the reader of `kind` without touching its refresh timestamp.
    pub fn restore(&self, kind: &str, reader: Box<dyn GeoReader>) -> Result<()> {
        self.get(kind)?.install(reader, None);
        Ok(())
    }
}
