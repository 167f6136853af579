//! Counters shared by the walker and the workers, and the final summary.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use super::task::{DownloadTask, SkipReason, TaskFailure, TaskOutcome};

/// Statistics for one export run.
///
/// Uses atomic counters for thread-safe updates from concurrent workers.
/// Skipped files and branches are kept in full for the summary.
#[derive(Debug, Default)]
pub struct ExportStats {
    completed: AtomicUsize,
    failed: AtomicUsize,
    listing_failures: AtomicUsize,
    skipped_branches: AtomicUsize,
    directories: AtomicUsize,
    bytes: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    failures: Mutex<Vec<TaskFailure>>,
}

impl ExportStats {
    /// Creates a new stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of files written in full.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Returns the number of file downloads that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Returns the number of directories whose index page could not be read.
    #[must_use]
    pub fn listing_failures(&self) -> usize {
        self.listing_failures.load(Ordering::SeqCst)
    }

    /// Returns the number of entries skipped before download (unsafe names,
    /// directory creation failures).
    #[must_use]
    pub fn skipped_branches(&self) -> usize {
        self.skipped_branches.load(Ordering::SeqCst)
    }

    /// Returns the number of local directories created or confirmed.
    #[must_use]
    pub fn directories(&self) -> usize {
        self.directories.load(Ordering::SeqCst)
    }

    /// Returns the total bytes written.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::SeqCst)
    }

    /// Returns the number of downloads currently running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Returns the highest number of downloads that ran at the same time.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Marks a download as running until the returned guard is dropped.
    pub(crate) fn begin_download(&self) -> InFlightGuard<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlightGuard { stats: self }
    }

    /// Records the outcome of one download task.
    pub(crate) fn record_outcome(&self, task: &DownloadTask, outcome: TaskOutcome) {
        match outcome {
            TaskOutcome::Completed { bytes } => {
                self.completed.fetch_add(1, Ordering::SeqCst);
                self.bytes.fetch_add(bytes, Ordering::SeqCst);
            }
            TaskOutcome::Skipped { reason } => {
                self.failed.fetch_add(1, Ordering::SeqCst);
                self.push_failure(task.url(), task.path().to_path_buf(), reason);
            }
        }
    }

    /// Records a directory whose listing could not be read.
    pub(crate) fn record_listing_failure(&self, url: &str, path: PathBuf, reason: SkipReason) {
        self.listing_failures.fetch_add(1, Ordering::SeqCst);
        self.push_failure(url, path, reason);
    }

    /// Records an entry skipped before it reached a worker.
    pub(crate) fn record_skipped_branch(&self, url: &str, path: PathBuf, reason: SkipReason) {
        self.skipped_branches.fetch_add(1, Ordering::SeqCst);
        self.push_failure(url, path, reason);
    }

    /// Increments the directory counter.
    pub(crate) fn record_directory(&self) {
        self.directories.fetch_add(1, Ordering::SeqCst);
    }

    fn push_failure(&self, url: &str, path: PathBuf, reason: SkipReason) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(TaskFailure {
                url: url.to_string(),
                path,
                reason,
            });
    }

    /// Takes a snapshot of the counters and the failures recorded so far.
    #[must_use]
    pub fn summary(&self) -> ExportSummary {
        ExportSummary {
            completed: self.completed(),
            failed: self.failed(),
            listing_failures: self.listing_failures(),
            skipped_branches: self.skipped_branches(),
            directories: self.directories(),
            bytes: self.bytes(),
            peak_in_flight: self.peak_in_flight(),
            failures: self
                .failures
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}

/// Decrements the in-flight counter on drop, whatever the download outcome.
pub(crate) struct InFlightGuard<'a> {
    stats: &'a ExportStats,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Final result of an export run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    /// Files written in full.
    pub completed: usize,
    /// File downloads that failed.
    pub failed: usize,
    /// Directories whose index page could not be read.
    pub listing_failures: usize,
    /// Entries skipped before download.
    pub skipped_branches: usize,
    /// Local directories created or confirmed.
    pub directories: usize,
    /// Total bytes written.
    pub bytes: u64,
    /// Highest number of simultaneous downloads observed.
    pub peak_in_flight: usize,
    /// Everything that was not mirrored, in the order it was recorded.
    pub failures: Vec<TaskFailure>,
}

impl ExportSummary {
    /// Total of everything that went wrong: failed files, unreadable
    /// listings and skipped entries.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failed + self.listing_failures + self.skipped_branches
    }
}
