//! Post-export removal of directories named after URL schemes.
//!
//! A malformed index link such as `http:/host/x/` slips past the listing
//! filter and is mirrored as the nested path `http:/host/x`. This pass walks
//! the export root bottom-up and removes every directory whose name starts
//! with a scheme token, together with everything under it.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

/// Directory name prefixes that mark a leaked URL.
const SCHEME_PREFIXES: [&str; 2] = ["http:", "https:"];

/// What the cleanup pass removed and what it could not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Directories removed, in removal order.
    pub removed: Vec<PathBuf>,
    /// Directories that could not be removed, with the error message.
    pub failed: Vec<(PathBuf, String)>,
}

/// Returns true if a directory name looks like a URL scheme leaked into a path.
#[must_use]
pub fn is_scheme_dir_name(name: &str) -> bool {
    SCHEME_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

/// Removes every scheme-named directory under `root` (the root itself is kept).
///
/// Best-effort: removal failures are logged and reported, never returned as
/// errors. Blocking; run it on a blocking thread from async code.
#[instrument(fields(root = %root.display()))]
pub fn remove_scheme_dirs(root: &Path) -> CleanupReport {
    let mut report = CleanupReport::default();

    for entry in WalkDir::new(root).min_depth(1).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                // Entries under a directory removed earlier in this walk vanish.
                debug!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if !is_scheme_dir_name(name) {
            continue;
        }

        let path = entry.path();
        // An outer scheme directory already removed its nested ones.
        if !path.exists() {
            continue;
        }
        info!(path = %path.display(), "removing unwanted directory");
        match std::fs::remove_dir_all(path) {
            Ok(()) => report.removed.push(path.to_path_buf()),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to remove directory");
                report.failed.push((path.to_path_buf(), e.to_string()));
            }
        }
    }

    report
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_is_scheme_dir_name() {
        assert!(is_scheme_dir_name("http:"));
        assert!(is_scheme_dir_name("https:"));
        assert!(is_scheme_dir_name("http:foo"));
        assert!(!is_scheme_dir_name("http"));
        assert!(!is_scheme_dir_name("docs"));
        assert!(!is_scheme_dir_name("xhttp:"));
    }

    #[test]
    fn test_remove_scheme_dirs_removes_leaked_url_paths() {
        let root = tempfile::tempdir().unwrap();
        let base = root.path();
        fs::create_dir_all(base.join("sub")).unwrap();
        fs::write(base.join("a.txt"), b"a").unwrap();
        fs::write(base.join("sub/b.txt"), b"b").unwrap();
        fs::create_dir_all(base.join("http:/evil.example/x")).unwrap();
        fs::write(base.join("http:/evil.example/x/payload"), b"p").unwrap();
        fs::create_dir_all(base.join("sub/https:/other")).unwrap();

        let report = remove_scheme_dirs(base);

        assert!(!base.join("http:").exists());
        assert!(!base.join("sub/https:").exists());
        assert!(base.join("a.txt").exists());
        assert!(base.join("sub/b.txt").exists());
        assert_eq!(report.removed.len(), 2);
        assert!(report.failed.is_empty());
    }

    #[test]
    fn test_remove_scheme_dirs_handles_nested_scheme_dirs() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("http:/a/http:/b")).unwrap();

        let report = remove_scheme_dirs(root.path());

        assert!(!root.path().join("http:").exists());
        assert!(report.failed.is_empty());
        assert!(!report.removed.is_empty());
    }

    #[test]
    fn test_remove_scheme_dirs_keeps_scheme_named_files() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("http:notes"), b"file").unwrap();

        let report = remove_scheme_dirs(root.path());

        assert!(root.path().join("http:notes").exists());
        assert!(report.removed.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_remove_scheme_dirs_reports_removal_failure() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempfile::tempdir().unwrap();
        let locked = root.path().join("locked");
        fs::create_dir_all(locked.join("http:/evil.example")).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();

        // Privileged users ignore directory permissions; nothing to observe then.
        if fs::write(locked.join("canary"), b"").is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let report = remove_scheme_dirs(root.path());
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert!(report.removed.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, locked.join("http:"));
        assert!(locked.join("http:").exists());
    }

    #[test]
    fn test_remove_scheme_dirs_missing_root_is_empty_report() {
        let root = tempfile::tempdir().unwrap();
        let report = remove_scheme_dirs(&root.path().join("absent"));
        assert_eq!(report, CleanupReport::default());
    }
}
