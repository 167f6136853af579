//! Entries discovered on an index page.

use std::fmt;

/// Whether a listing entry names a subdirectory or a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Target ends with `/`; the exporter recurses into it.
    Directory,
    /// Anything else; the exporter downloads it.
    File,
}

/// One child entry referenced by an anchor on an index page.
///
/// Holds the raw (still percent-encoded) `href` target. Classification is
/// derived from the target on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    href: String,
}

impl ListingEntry {
    /// Creates an entry from an anchor target.
    #[must_use]
    pub fn new(href: impl Into<String>) -> Self {
        Self { href: href.into() }
    }

    /// Returns the raw anchor target, suitable for appending to the listing URL.
    #[must_use]
    pub fn href(&self) -> &str {
        &self.href
    }

    /// Classifies the entry by its trailing separator.
    #[must_use]
    pub fn kind(&self) -> EntryKind {
        if self.href.ends_with('/') {
            EntryKind::Directory
        } else {
            EntryKind::File
        }
    }

    /// Returns true if the entry names a subdirectory.
    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.kind() == EntryKind::Directory
    }

    /// Returns the name to use on local disk.
    ///
    /// The trailing separator of directory entries is dropped and the target
    /// is percent-decoded. Targets that do not decode to UTF-8, or whose
    /// decoding introduces a path separator or NUL, are used raw.
    #[must_use]
    pub fn local_name(&self) -> String {
        let trimmed = self.href.strip_suffix('/').unwrap_or(&self.href);
        match urlencoding::decode(trimmed) {
            Ok(name) if separator_count(&name) == separator_count(trimmed) => name.into_owned(),
            _ => trimmed.to_string(),
        }
    }
}

/// Counts characters that would change the path structure of a local name.
fn separator_count(name: &str) -> usize {
    name.chars()
        .filter(|c| matches!(c, '/' | '\\' | '\0'))
        .count()
}

impl fmt::Display for ListingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.href)
    }
}
