//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use dirmirror_core::{ConfigError, DEFAULT_BUDGET, ExportConfig, FileConfig, Schedule};

/// Mirror an HTTP directory listing tree onto local disk.
///
/// Dirmirror reads auto-generated index pages (Apache, nginx autoindex),
/// recreates the directory structure under the target and downloads every
/// file with a bounded number of concurrent downloads.
#[derive(Parser, Debug)]
#[command(name = "dirmirror")]
#[command(author, version, about)]
pub struct Args {
    /// URL of the remote directory listing to export
    #[arg(long, value_name = "URL")]
    pub export: String,

    /// Local directory to populate
    #[arg(long, value_name = "PATH")]
    pub target: PathBuf,

    /// Suppress all progress and error logging
    #[arg(long)]
    pub silent: bool,

    /// Maximum concurrent downloads, capped at 50 [default: 50]
    #[arg(long, value_name = "N", value_parser = parse_thread_count)]
    pub thread: Option<usize>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Download scheduling across directory levels [default: global]
    #[arg(long, value_enum)]
    pub schedule: Option<ScheduleArg>,

    /// Exit non-zero when more than N files or directories fail
    #[arg(long, value_name = "N")]
    pub max_failures: Option<usize>,

    /// Keep directories named like `http:` left by malformed index links
    #[arg(long)]
    pub skip_cleanup: bool,

    /// Read defaults from this TOML file instead of the default location
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Parses `--thread`: any positive integer, saturating instead of overflowing.
fn parse_thread_count(raw: &str) -> Result<usize, String> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("'{raw}' is not a positive integer"));
    }
    let count = raw.parse::<usize>().unwrap_or(usize::MAX);
    if count == 0 {
        return Err("must be at least 1".to_string());
    }
    Ok(count)
}

/// CLI spelling of [`Schedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScheduleArg {
    /// One worker pool for the whole tree
    Global,
    /// A fresh worker pool per directory, drained before returning to the parent
    PerDirectory,
}

impl From<ScheduleArg> for Schedule {
    fn from(arg: ScheduleArg) -> Self {
        match arg {
            ScheduleArg::Global => Schedule::Global,
            ScheduleArg::PerDirectory => Schedule::PerDirectory,
        }
    }
}

/// Effective run settings after layering CLI flags over the config file.
#[derive(Debug, Clone)]
pub struct Settings {
    pub export: ExportConfig,
    pub skip_cleanup: bool,
}

impl Args {
    /// Merges CLI flags over config file values; flags given on the command line win.
    pub fn resolve(&self, file: Option<&FileConfig>) -> Result<Settings, ConfigError> {
        let empty = FileConfig::default();
        let file = file.unwrap_or(&empty);

        let requested_threads = self
            .thread
            .or(file.thread)
            .unwrap_or(DEFAULT_BUDGET);
        let defaults = ExportConfig::default();
        let export = ExportConfig::new(requested_threads)?
            .with_silent(self.silent || file.silent.unwrap_or(false))
            .with_schedule(
                self.schedule
                    .map(Schedule::from)
                    .or(file.schedule)
                    .unwrap_or_default(),
            )
            .with_max_failures(self.max_failures.or(file.max_failures))
            .with_timeouts(
                file.connect_timeout_secs
                    .unwrap_or(defaults.connect_timeout_secs()),
                file.read_timeout_secs
                    .unwrap_or(defaults.read_timeout_secs()),
            )?;

        Ok(Settings {
            export,
            skip_cleanup: self.skip_cleanup || file.skip_cleanup.unwrap_or(false),
        })
    }
}
