//! Database download primitive.

use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default timeout for a whole database download (5 minutes).
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(5 * 60);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches a remote database into a local file.
pub trait Fetcher: Send + Sync {
    /// Download `url` into `dest`, creating or truncating it, and return the
    /// number of bytes written. A non-success status is an error.
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64>;
}

/// Blocking HTTP fetcher.
///
/// URLs ending in `.gz` are decompressed while streaming to disk.
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    /// Create a fetcher with the default timeout.
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_DOWNLOAD_TIMEOUT)
    }

    /// Create a fetcher that gives up on a download after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT.min(timeout))
            .timeout(timeout)
            .build();
        Self { agent }
    }

    fn stream_to(&self, url: &str, out: &mut File) -> Result<u64> {
        let response = self.agent.get(url).call().map_err(|e| match e {
            ureq::Error::Status(code, response) => {
                Error::Download(format!("bad status: {} {}", code, response.status_text()))
            }
            ureq::Error::Transport(t) => Error::Download(t.to_string()),
        })?;

        if !(200..300).contains(&response.status()) {
            return Err(Error::Download(format!(
                "bad status: {} {}",
                response.status(),
                response.status_text()
            )));
        }

        let mut body = response.into_reader();
        let written = if url.ends_with(".gz") {
            io::copy(&mut GzDecoder::new(body), out)?
        } else {
            io::copy(&mut body, out)?
        };
        out.sync_all()?;
        Ok(written)
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        let mut out = File::create(dest)?;

        match self.stream_to(url, &mut out) {
            Ok(written) => {
                log::info!("Downloaded {} ({} bytes) to {:?}", url, written, dest);
                Ok(written)
            }
            Err(e) => {
                drop(out);
                if let Err(rm) = fs::remove_file(dest) {
                    log::debug!("Could not remove partial download {:?}: {}", dest, rm);
                }
                Err(e)
            }
        }
    }
}
