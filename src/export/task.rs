//! Download tasks and their outcomes.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::download::DownloadError;

/// One file to fetch: source URL and destination path.
///
/// Tasks are immutable and consumed by exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    url: String,
    path: PathBuf,
}

impl DownloadTask {
    /// Creates a task.
    #[must_use]
    pub fn new(url: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            path: path.into(),
        }
    }

    /// Source URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Destination file path. Its parent directory exists before the task is queued.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Why a file or a directory branch was not mirrored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The file GET or the write to disk failed.
    Download {
        /// Error message.
        message: String,
        /// HTTP status, when the server answered with an error status.
        status: Option<u16>,
    },
    /// The index page of a directory could not be fetched or read.
    Listing {
        /// Error message.
        message: String,
    },
    /// The local directory for a branch could not be created.
    CreateDirectory {
        /// Error message.
        message: String,
    },
    /// The entry would resolve outside its parent directory.
    UnsafePath,
    /// The worker pool stopped before the task could run.
    Aborted,
}

impl SkipReason {
    /// Builds a download skip from the error that caused it.
    #[must_use]
    pub fn download(error: &DownloadError) -> Self {
        Self::Download {
            message: error.to_string(),
            status: error.status(),
        }
    }

    /// Builds a listing skip from the error that caused it.
    #[must_use]
    pub fn listing(error: &DownloadError) -> Self {
        Self::Listing {
            message: error.to_string(),
        }
    }

    /// Builds a directory creation skip.
    #[must_use]
    pub fn create_directory(error: &std::io::Error) -> Self {
        Self::CreateDirectory {
            message: error.to_string(),
        }
    }

    /// Short machine-friendly label.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Download { .. } => "download",
            Self::Listing { .. } => "listing",
            Self::CreateDirectory { .. } => "create-directory",
            Self::UnsafePath => "unsafe-path",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Download { message, .. }
            | Self::Listing { message }
            | Self::CreateDirectory { message } => write!(f, "{}: {message}", self.label()),
            Self::UnsafePath => f.write_str("unsafe-path: entry escapes its directory"),
            Self::Aborted => f.write_str("aborted: worker pool stopped"),
        }
    }
}

/// Result of processing one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// File written in full.
    Completed {
        /// Bytes written to disk.
        bytes: u64,
    },
    /// Task abandoned; nothing retried.
    Skipped {
        /// Why it was abandoned.
        reason: SkipReason,
    },
}

/// A file or directory that was not mirrored, kept for the final summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    /// Remote URL of the file or directory.
    pub url: String,
    /// Local path it would have been written to.
    pub path: PathBuf,
    /// Why it was skipped.
    pub reason: SkipReason,
}
