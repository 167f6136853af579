//! Recursive export of a remote directory listing tree.
//!
//! The [`Exporter`] walks the remote tree depth-first in listing order. For
//! every directory it creates the local counterpart, reads the index page,
//! recurses into subdirectories inline and hands files to a worker pool.
//!
//! # Concurrency Model
//!
//! - The walk itself is sequential: sibling directories are never listed in
//!   parallel, only file downloads run concurrently
//! - A local directory is created before any task targeting it is queued
//! - One semaphore of `budget` permits caps simultaneous downloads for the
//!   whole run; permits are released on every path (RAII)
//! - [`Schedule::Global`] feeds one pool of `budget` workers while the walk
//!   continues; [`Schedule::PerDirectory`] drains each directory's files
//!   before returning to its parent
//!
//! # Error Handling
//!
//! Failures never abort the run. An unreadable listing skips that subtree, a
//! failed download skips that file; both are recorded in the
//! [`ExportSummary`]. Only an invalid root URL or an uncreatable target
//! directory fail [`Exporter::export`].
//!
//! # Example
//!
//! ```no_run
//! use dirmirror_core::{ExportConfig, Exporter};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let exporter = Exporter::new(ExportConfig::new(8)?)?;
//! let summary = exporter
//!     .export("https://mirror.example.org/pub/", Path::new("./pub"))
//!     .await?;
//! println!("Mirrored {} files, {} failures", summary.completed, summary.failure_count());
//! # Ok(())
//! # }
//! ```

mod pool;
mod stats;
mod task;

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::{ExportConfig, Schedule};
use crate::download::{DownloadError, HttpClient};
use crate::listing::{EntryKind, parse_listing};

use pool::{DownloadContext, TaskSender, WorkerPool, drain_level};

pub use stats::{ExportStats, ExportSummary};
pub use task::{DownloadTask, SkipReason, TaskFailure, TaskOutcome};

/// Errors that stop an export before it starts.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The root URL is not an absolute http(s) URL.
    #[error("invalid export URL: {url}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
    },

    /// The local target directory could not be created.
    #[error("failed to create target directory {path}: {source}")]
    CreateTarget {
        /// Target directory.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The HTTP client could not be built.
    #[error(transparent)]
    Client(#[from] DownloadError),
}

/// Mirrors remote directory listings onto local disk.
#[derive(Debug, Clone)]
pub struct Exporter {
    config: ExportConfig,
    client: HttpClient,
}

impl Exporter {
    /// Creates an exporter with an HTTP client built from the config timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Client`] if the HTTP client cannot be built.
    pub fn new(config: ExportConfig) -> Result<Self, ExportError> {
        let client =
            HttpClient::with_timeouts(config.connect_timeout_secs(), config.read_timeout_secs())?;
        Ok(Self::with_client(config, client))
    }

    /// Creates an exporter around an existing HTTP client.
    #[must_use]
    pub fn with_client(config: ExportConfig, client: HttpClient) -> Self {
        Self { config, client }
    }

    /// Returns the configuration this exporter was built with.
    #[must_use]
    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Mirrors the listing tree rooted at `remote_url` into `local_dir`.
    ///
    /// Returns once every queued download has finished.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::InvalidUrl`] if `remote_url` is not an absolute
    /// http(s) URL and [`ExportError::CreateTarget`] if `local_dir` cannot be
    /// created. Everything else is reported in the summary.
    #[instrument(
        skip_all,
        fields(
            remote = %remote_url,
            local = %local_dir.display(),
            budget = self.config.budget(),
            schedule = self.config.schedule().as_str()
        )
    )]
    pub async fn export(
        &self,
        remote_url: &str,
        local_dir: &Path,
    ) -> Result<ExportSummary, ExportError> {
        let root_url = normalize_dir_url(remote_url);
        validate_root_url(&root_url)?;

        tokio::fs::create_dir_all(local_dir)
            .await
            .map_err(|source| ExportError::CreateTarget {
                path: local_dir.to_path_buf(),
                source,
            })?;

        let stats = Arc::new(ExportStats::new());
        let ctx = DownloadContext::new(self.client.clone(), self.config.budget(), Arc::clone(&stats));

        info!("starting export");
        match self.config.schedule() {
            Schedule::Global => {
                let (pool, sender) = WorkerPool::start(&ctx);
                let walker = Walker {
                    ctx: &ctx,
                    sender: Some(sender),
                };
                walker.export_dir(root_url, local_dir.to_path_buf()).await;
                // Dropping the walker drops the last sender; workers drain and exit.
                drop(walker);
                pool.join().await;
            }
            Schedule::PerDirectory => {
                let walker = Walker {
                    ctx: &ctx,
                    sender: None,
                };
                walker.export_dir(root_url, local_dir.to_path_buf()).await;
            }
        }

        let summary = stats.summary();
        info!(
            completed = summary.completed,
            failed = summary.failed,
            listing_failures = summary.listing_failures,
            skipped = summary.skipped_branches,
            directories = summary.directories,
            bytes = summary.bytes,
            peak_in_flight = summary.peak_in_flight,
            "export complete"
        );
        Ok(summary)
    }
}

/// One export walk. With a sender, files go to the shared pool; without one,
/// each directory drains its own files before returning.
struct Walker<'a> {
    ctx: &'a DownloadContext,
    sender: Option<TaskSender>,
}

impl Walker<'_> {
    fn export_dir(&self, url: String, dir: PathBuf) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let url = normalize_dir_url(&url);
            let stats = self.ctx.stats();

            if let Err(e) = tokio::fs::create_dir_all(&dir).await {
                warn!(url = %url, path = %dir.display(), error = %e, "failed to create directory; skipping branch");
                stats.record_skipped_branch(&url, dir, SkipReason::create_directory(&e));
                return;
            }
            stats.record_directory();

            let html = match self.ctx.client().fetch_listing(&url).await {
                Ok(html) => html,
                Err(e) => {
                    warn!(url = %url, error = %e, "failed to read listing; skipping directory");
                    stats.record_listing_failure(&url, dir, SkipReason::listing(&e));
                    return;
                }
            };

            let entries = parse_listing(&html);
            debug!(url = %url, entries = entries.len(), "listing parsed");

            let mut level_tasks = Vec::new();
            for entry in entries {
                let child_url = format!("{url}{}", entry.href());
                let name = entry.local_name();
                if !is_safe_local_name(&name, entry.kind()) {
                    warn!(url = %child_url, name = %name, "entry escapes its directory; skipping");
                    stats.record_skipped_branch(&child_url, dir.clone(), SkipReason::UnsafePath);
                    continue;
                }
                let child_path = dir.join(&name);

                match entry.kind() {
                    EntryKind::Directory => self.export_dir(child_url, child_path).await,
                    EntryKind::File => {
                        let task = DownloadTask::new(child_url, child_path);
                        match &self.sender {
                            Some(sender) => sender.submit(task).await,
                            None => level_tasks.push(task),
                        }
                    }
                }
            }

            if self.sender.is_none() {
                drain_level(self.ctx, level_tasks).await;
            }
        })
    }
}

/// Appends the trailing separator a directory URL needs before entries are joined to it.
#[must_use]
pub fn normalize_dir_url(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}

fn validate_root_url(url: &str) -> Result<(), ExportError> {
    match Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        _ => Err(ExportError::InvalidUrl {
            url: url.to_string(),
        }),
    }
}

/// Returns true if `name` stays inside the directory it is joined to.
///
/// Root, prefix, `.` and `..` components are never allowed. A directory name
/// may span several components, since `create_dir_all` creates them all; a
/// file name must be a single component because its parent is never created.
fn is_safe_local_name(name: &str, kind: EntryKind) -> bool {
    let mut components = Path::new(name).components().peekable();
    if components.peek().is_none() {
        return false;
    }
    match kind {
        EntryKind::Directory => components.all(|c| matches!(c, Component::Normal(_))),
        EntryKind::File => {
            matches!(components.next(), Some(Component::Normal(_))) && components.next().is_none()
        }
    }
}
