//! Dirmirror Core Library
//!
//! This library mirrors a remote, HTTP-served directory listing tree (Apache-style
//! auto-generated index pages) onto local disk.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`listing`] - Extracts child entries from one index page
//! - [`download`] - HTTP client for listing fetches and file downloads
//! - [`export`] - Recursive export pipeline with a bounded worker pool
//! - [`cleanup`] - Post-export removal of scheme-named stray directories
//! - [`config`] - Export configuration and optional config file
//! - [`exit`] - Mapping export results to a process exit outcome

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cleanup;
pub mod config;
pub mod download;
pub mod exit;
pub mod export;
pub mod listing;
mod user_agent;

// Re-export commonly used types
pub use cleanup::{CleanupReport, remove_scheme_dirs};
pub use config::{
    ConfigError, DEFAULT_BUDGET, ExportConfig, FileConfig, MAX_BUDGET, Schedule, effective_budget,
};
pub use download::{DownloadError, HttpClient};
pub use exit::{ProcessExit, determine_exit_outcome};
pub use export::{
    DownloadTask, ExportError, ExportStats, ExportSummary, Exporter, SkipReason, TaskFailure,
    TaskOutcome,
};
pub use listing::{EntryKind, ListingEntry, parse_listing};
