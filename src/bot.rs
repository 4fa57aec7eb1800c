//! Generic stream-crawling driver over the pool engine.
//!
//! A [`Bot`] fans out one download task per resource URI, polls the pool
//! for completion and reports final statuses keyed by URI. Resolving a
//! manifest into concrete segment URIs is not its business: VOD callers
//! hand it a finished list, live callers implement [`SegmentSource`]
//! and the bot re-polls it until a target cumulative duration is
//! covered. Re-enumerated segments are harmless because the pool
//! deduplicates on URI.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::fetch::{Downloader, FetchConfig, FetchError};
use crate::pool::{Pool, PoolConfig, PoolError, Task, TaskHandler, TaskStatus};

/// Errors from the driver layer.
#[derive(Error, Debug)]
pub enum BotError {
    #[error("{0} is not a full http(s) URI")]
    NotFullUri(String),
    #[error("URI parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error("Segment source error: {0}")]
    Source(String),
}

/// Payload of one download task: everything the handler needs to fetch
/// a single resource. Opaque to the pool.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub uri: Url,
    pub local: PathBuf,
    pub overwrite: bool,
}

/// One round of segment enumeration from a (possibly live) manifest.
#[derive(Debug, Clone)]
pub struct SegmentBatch {
    /// Absolute URIs of the enumerated segments.
    pub uris: Vec<String>,
    /// Stream duration covered by this batch.
    pub duration: Duration,
}

/// Live-manifest collaborator: re-resolves a manifest into fetchable
/// segment URIs on every poll. Format-specific parsing (HLS, DASH,
/// byte-range detection) lives behind this seam.
pub trait SegmentSource {
    fn poll(&mut self) -> Result<SegmentBatch, BotError>;
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Worker threads in the download pool.
    pub workers: usize,
    /// Root directory the URI path is mirrored under.
    pub output_dir: PathBuf,
    /// Delay between live-manifest polls; `None` polls back to back.
    pub refresh_interval: Option<Duration>,
    /// Cumulative stream duration to capture in a live run.
    pub target_duration: Duration,
    /// Delay between completion polls.
    pub poll_interval: Duration,
    /// Completion polls before giving up the wait.
    pub max_polls: usize,
    /// Fetch primitive settings.
    pub fetch: FetchConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            workers: crate::pool::DEFAULT_WORKERS,
            output_dir: PathBuf::from("output"),
            refresh_interval: None,
            target_duration: Duration::from_secs(60),
            poll_interval: Duration::from_secs(1),
            max_polls: 50,
            fetch: FetchConfig::default(),
        }
    }
}

/// Final statuses keyed by resource URI, split by outcome.
#[derive(Debug, Default)]
pub struct BotReport {
    pub done: Vec<String>,
    pub failed: Vec<String>,
    pub pending: Vec<String>,
}

impl BotReport {
    fn from_snapshot(snapshot: HashMap<String, Task<String, DownloadJob>>) -> Self {
        let mut report = Self::default();
        for (uri, task) in snapshot {
            match task.status() {
                TaskStatus::Done => report.done.push(uri),
                TaskStatus::Failed => report.failed.push(uri),
                TaskStatus::Pending => report.pending.push(uri),
            }
        }
        report.done.sort();
        report.failed.sort();
        report.pending.sort();
        report
    }

    pub fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }
}

/// True for absolute http/https URIs, the only kind a task may carry.
pub fn is_full_uri(uri: &str) -> bool {
    uri.starts_with("http://") || uri.starts_with("https://")
}

/// Local path mirroring the URI path under `output_dir`, e.g.
/// `http://host/path/to/seg.ts` → `output_dir/path/to/seg.ts`.
pub fn local_path(uri: &Url, output_dir: &Path) -> PathBuf {
    output_dir.join(uri.path().trim_start_matches('/'))
}

/// Build a download task for an absolute URI. The URI itself is the
/// task identity, which is what makes re-enumeration dedup-safe.
pub fn download_task(
    uri: &str,
    output_dir: &Path,
    overwrite: bool,
) -> Result<Task<String, DownloadJob>, BotError> {
    if !is_full_uri(uri) {
        return Err(BotError::NotFullUri(uri.to_string()));
    }
    let parsed = Url::parse(uri)?;
    let local = local_path(&parsed, output_dir);
    Ok(Task::new(
        uri.to_string(),
        DownloadJob {
            uri: parsed,
            local,
            overwrite,
        },
    ))
}

/// Stream crawler driver owning a download pool.
pub struct Bot {
    config: BotConfig,
    pool: Pool<String, DownloadJob>,
    handler: TaskHandler<String, DownloadJob>,
}

impl Bot {
    /// A bot whose handler fetches over HTTP with a [`Downloader`].
    pub fn new(config: BotConfig) -> Result<Self, BotError> {
        let downloader = Arc::new(Downloader::new(config.fetch.clone())?);
        let handler: TaskHandler<String, DownloadJob> = Arc::new(move |task| {
            let job = task.payload();
            match downloader.download(&job.uri, &job.local, job.overwrite) {
                Ok(_) => true,
                Err(e) => {
                    warn!("download of {} failed: {e}", job.uri);
                    false
                }
            }
        });
        Ok(Self::with_handler(config, handler))
    }

    /// A bot with a caller-supplied handler.
    pub fn with_handler(config: BotConfig, handler: TaskHandler<String, DownloadJob>) -> Self {
        let pool = Pool::new(PoolConfig {
            workers: config.workers,
        });
        Self {
            config,
            pool,
            handler,
        }
    }

    /// Fetch a fixed set of resources (the VOD flow): submit one task
    /// per URI, wait for completion, stop the pool, report.
    pub fn run(&self, uris: &[String]) -> Result<BotReport, BotError> {
        // Validate everything up front so the pool never starts for a
        // malformed list.
        let mut tasks = Vec::with_capacity(uris.len());
        for uri in uris {
            tasks.push(download_task(uri, &self.config.output_dir, false)?);
        }

        self.pool.start(self.handler.clone())?;
        info!("bot fetching {} resources", tasks.len());
        for task in tasks {
            if let Err(e) = self.pool.submit(task) {
                self.pool.shutdown();
                return Err(e.into());
            }
        }

        self.wait_for_completion();
        self.pool.shutdown();
        Ok(BotReport::from_snapshot(self.pool.snapshot()))
    }

    /// Follow a live source (the live flow): poll it for fresh segment
    /// batches until the cumulative covered duration reaches
    /// `target_duration`, then drain and stop.
    pub fn run_live(&self, source: &mut dyn SegmentSource) -> Result<BotReport, BotError> {
        self.pool.start(self.handler.clone())?;

        let mut covered = Duration::ZERO;
        loop {
            let batch = match source.poll() {
                Ok(batch) => batch,
                Err(e) => {
                    self.pool.shutdown();
                    return Err(e);
                }
            };
            debug!(
                "live batch: {} segments covering {:?}",
                batch.uris.len(),
                batch.duration
            );
            for uri in &batch.uris {
                let task = match download_task(uri, &self.config.output_dir, false) {
                    Ok(task) => task,
                    Err(e) => {
                        self.pool.shutdown();
                        return Err(e);
                    }
                };
                // Duplicate outcomes are expected: live manifests
                // re-list recent segments on every refresh.
                if let Err(e) = self.pool.submit(task) {
                    self.pool.shutdown();
                    return Err(e.into());
                }
            }

            covered += batch.duration;
            if covered >= self.config.target_duration {
                info!("target duration {:?} covered", self.config.target_duration);
                break;
            }
            if let Some(interval) = self.config.refresh_interval {
                thread::sleep(interval);
            }
        }

        self.wait_for_completion();
        self.pool.shutdown();
        Ok(BotReport::from_snapshot(self.pool.snapshot()))
    }

    fn wait_for_completion(&self) {
        let mut polls = 0;
        while !self.pool.all_done() {
            debug!("waiting for {} tasks to finish", self.pool.task_count());
            thread::sleep(self.config.poll_interval);
            polls += 1;
            if polls >= self.config.max_polls {
                warn!("gave up waiting after {} polls", polls);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_uri_check() {
        assert!(is_full_uri("http://host/a.ts"));
        assert!(is_full_uri("https://host/a.ts"));
        assert!(!is_full_uri("/relative/a.ts"));
        assert!(!is_full_uri("ftp://host/a.ts"));
    }

    #[test]
    fn local_path_mirrors_uri_path() {
        let uri = Url::parse("http://host.com/path/to/playlist.m3u8").unwrap();
        let local = local_path(&uri, Path::new("output"));
        assert_eq!(local, PathBuf::from("output/path/to/playlist.m3u8"));
    }

    #[test]
    fn download_task_rejects_relative_uri() {
        let err = download_task("path/to/seg.ts", Path::new("output"), false).unwrap_err();
        assert!(matches!(err, BotError::NotFullUri(_)));
    }

    #[test]
    fn defaults_mirror_the_crawler_constants() {
        let config = BotConfig::default();
        assert_eq!(config.workers, 3);
        assert_eq!(config.output_dir, PathBuf::from("output"));
        assert!(config.refresh_interval.is_none());
        assert_eq!(config.target_duration, Duration::from_secs(60));
        assert_eq!(config.max_polls, 50);
    }

    #[test]
    fn download_task_identity_is_the_uri() {
        let task = download_task("http://host/seg-1.ts", Path::new("out"), true).unwrap();
        assert_eq!(task.identity(), "http://host/seg-1.ts");
        assert!(task.payload().overwrite);
        assert_eq!(task.payload().local, PathBuf::from("out/seg-1.ts"));
    }
}
