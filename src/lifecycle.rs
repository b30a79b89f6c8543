//! Database lifecycle: cold-start initialization and periodic hot refresh.
//!
//! At startup every registered database is downloaded if missing and opened.
//! Afterwards a background thread periodically re-downloads databases older
//! than the staleness threshold into a `.new` sibling file, renames it over
//! the live file and swaps a freshly opened reader into the registry.
//! Refresh failures never remove a working reader.

use std::fs;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use crate::download::{Fetcher, HttpFetcher};
use crate::error::Result;
use crate::reader::{DatabaseOpener, GeoReader, MaxmindOpener};
use crate::registry::{DatabaseEntry, Registry};

/// Default interval between staleness checks (1 day).
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default age past which a database is re-downloaded (30 days).
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// When to look for stale databases and what counts as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    pub check_interval: Duration,
    pub max_age: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
            max_age: DEFAULT_MAX_AGE,
        }
    }
}

impl RefreshPolicy {
    /// Whether a database last refreshed at `last` is due at `now`.
    ///
    /// Never-refreshed databases are stale; timestamps in the future are not.
    pub fn is_stale(&self, last: Option<SystemTime>, now: SystemTime) -> bool {
        match last {
            None => true,
            Some(last) => now.duration_since(last).unwrap_or(Duration::ZERO) >= self.max_age,
        }
    }
}

/// Result of one refresh cycle for one database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Younger than the staleness threshold; nothing fetched
    Fresh,
    /// New file downloaded, renamed into place and its reader swapped in
    Refreshed,
    /// Download failed; reader and timestamp untouched
    DownloadFailed,
    /// Download succeeded but the rename over the live file failed
    RenameFailed,
    /// Renamed into place but the new file could not be opened
    OpenFailed,
}

/// Drives initialization and refresh of every database in a [`Registry`].
pub struct LifecycleManager {
    registry: Arc<Registry>,
    fetcher: Arc<dyn Fetcher>,
    opener: Arc<dyn DatabaseOpener>,
    policy: RefreshPolicy,
}

impl LifecycleManager {
    /// Create a manager downloading over HTTP and opening MaxMind databases.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            fetcher: Arc::new(HttpFetcher::new()),
            opener: Arc::new(MaxmindOpener),
            policy: RefreshPolicy::default(),
        }
    }

    /// Use a custom download primitive.
    pub fn with_fetcher(mut self, fetcher: impl Fetcher + 'static) -> Self {
        self.fetcher = Arc::new(fetcher);
        self
    }

    /// Use a custom reader opener.
    pub fn with_opener(mut self, opener: impl DatabaseOpener + 'static) -> Self {
        self.opener = Arc::new(opener);
        self
    }

    /// Set a custom refresh policy.
    pub fn with_policy(mut self, policy: RefreshPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Make every database available: download missing files and open readers.
    ///
    /// Any failure is returned and must abort startup. Readers are installed
    /// only once all databases opened, so on error no entry has a reader.
    pub fn initialize(&self) -> Result<()> {
        let entries = self.registry.entries();
        let mut staged: Vec<(&DatabaseEntry, Box<dyn GeoReader>, SystemTime)> =
            Vec::with_capacity(entries.len());

        for entry in entries {
            match self.prepare(entry) {
                Ok((reader, refreshed_at)) => staged.push((entry, reader, refreshed_at)),
                Err(e) => {
                    log::error!("Failed to initialize {} database: {}", entry.kind(), e);
                    for (_, reader, _) in staged {
                        let _ = reader.close();
                    }
                    return Err(e);
                }
            }
        }

        for (entry, reader, refreshed_at) in staged {
            self.registry.restore(entry.kind(), reader)?;
            entry.record_refresh(refreshed_at);
        }
        Ok(())
    }

    /// Download `entry` if absent and open it. Returns the reader and the
    /// time the file was last refreshed.
    fn prepare(&self, entry: &DatabaseEntry) -> Result<(Box<dyn GeoReader>, SystemTime)> {
        let path = entry.local_path();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut downloaded_at = None;
        if !path.exists() {
            log::info!(
                "Database {} not found, downloading from {}",
                entry.kind(),
                entry.source_url()
            );
            self.fetcher.fetch(entry.source_url(), path)?;
            downloaded_at = Some(SystemTime::now());
        }

        let reader = self.opener.open(path)?;
        log::info!("Successfully opened {} database", entry.kind());

        let refreshed_at = downloaded_at
            .or_else(|| fs::metadata(path).and_then(|m| m.modified()).ok())
            .unwrap_or_else(SystemTime::now);
        Ok((reader, refreshed_at))
    }

    /// Refresh every database older than the staleness threshold.
    ///
    /// Failures are logged and isolated per database; the cycle always
    /// continues to the next one.
    pub fn refresh_if_stale(&self) -> Vec<(String, RefreshOutcome)> {
        let now = SystemTime::now();
        self.registry
            .entries()
            .into_iter()
            .map(|entry| {
                let outcome = if self.policy.is_stale(entry.last_refreshed(), now) {
                    self.refresh(entry)
                } else {
                    RefreshOutcome::Fresh
                };
                (entry.kind().to_string(), outcome)
            })
            .collect()
    }

    fn refresh(&self, entry: &DatabaseEntry) -> RefreshOutcome {
        let kind = entry.kind();
        log::info!(
            "Database {} is older than {} days, updating...",
            kind,
            self.policy.max_age.as_secs() / 86400
        );

        let temp_path = entry.temp_path();
        if let Err(e) = self.fetcher.fetch(entry.source_url(), &temp_path) {
            log::warn!("Failed to download updated {} database: {}", kind, e);
            return RefreshOutcome::DownloadFailed;
        }

        if let Err(e) = fs::rename(&temp_path, entry.local_path()) {
            log::error!("Failed to replace {} database file: {}", kind, e);
            let _ = fs::remove_file(&temp_path);
            match self.opener.open(entry.local_path()) {
                Ok(reader) => {
                    if let Err(e) = self.registry.restore(kind, reader) {
                        log::error!("Failed to reinstall {} reader: {}", kind, e);
                    }
                }
                Err(e) => log::warn!("Keeping current {} reader, reopen failed: {}", kind, e),
            }
            return RefreshOutcome::RenameFailed;
        }

        let reader = match self.opener.open(entry.local_path()) {
            Ok(reader) => reader,
            Err(e) => {
                log::error!("Failed to open updated {} database: {}", kind, e);
                return RefreshOutcome::OpenFailed;
            }
        };

        match self.registry.replace(kind, reader) {
            Ok(()) => {
                log::info!("Successfully updated {} database", kind);
                RefreshOutcome::Refreshed
            }
            Err(e) => {
                log::error!("Failed to swap {} reader: {}", kind, e);
                RefreshOutcome::OpenFailed
            }
        }
    }

    /// Run refresh cycles forever, one every `check_interval`.
    pub fn run(&self) {
        loop {
            thread::sleep(self.policy.check_interval);
            let outcomes = self.refresh_if_stale();
            let refreshed = outcomes
                .iter()
                .filter(|(_, o)| *o == RefreshOutcome::Refreshed)
                .count();
            log::debug!(
                "Refresh cycle done: {} of {} databases refreshed",
                refreshed,
                outcomes.len()
            );
        }
    }

    /// Start the refresh loop on a dedicated background thread.
    pub fn spawn_refresher(self: Arc<Self>) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("db-refresh".to_string())
            .spawn(move || self.run())
    }
}
