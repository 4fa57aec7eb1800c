//! Blocking HTTP fetch/file-write primitive.
//!
//! The single-resource download step the crawler's task handlers are
//! built on: fetch a URI and save the body under a local path, creating
//! parent directories as needed. An existing local file short-circuits
//! the request unless the caller asked to overwrite.

use std::fs;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;
use url::Url;

/// Errors from the fetch primitive.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Filesystem error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration for a [`Downloader`].
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Skip TLS certificate verification. Off by default.
    pub accept_invalid_certs: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            accept_invalid_certs: false,
        }
    }
}

/// How a download request was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Fetched over HTTP and written to disk.
    Fetched,
    /// Local file already present and overwrite was not requested.
    AlreadyPresent,
}

/// Blocking HTTP downloader over a shared [`reqwest`] client.
#[derive(Debug)]
pub struct Downloader {
    client: reqwest::blocking::Client,
}

impl Downloader {
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;
        Ok(Self { client })
    }

    /// Download `uri` and save the body as `local`.
    ///
    /// When `local` already exists it is removed first if `overwrite`
    /// is set, otherwise the download is skipped and
    /// [`FetchOutcome::AlreadyPresent`] returned without any request.
    /// Non-2xx responses are errors.
    pub fn download(
        &self,
        uri: &Url,
        local: &Path,
        overwrite: bool,
    ) -> Result<FetchOutcome, FetchError> {
        debug!("downloading {uri} to {}", local.display());

        if local.exists() {
            if overwrite {
                fs::remove_file(local)?;
            } else {
                debug!("{} exists, skipping fetch", local.display());
                return Ok(FetchOutcome::AlreadyPresent);
            }
        }

        if let Some(parent) = local.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let resp = self.client.get(uri.clone()).send()?.error_for_status()?;
        let body = resp.bytes()?;
        fs::write(local, &body)?;
        Ok(FetchOutcome::Fetched)
    }
}
