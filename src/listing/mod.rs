//! Listing parser for auto-generated HTTP directory index pages.
//!
//! Index pages served by Apache, nginx `autoindex` and friends are plain HTML
//! with one anchor per child entry. This module scans such a page for anchor
//! `href` targets and returns the ones that name children of the listed
//! directory.
//!
//! # Exclusions
//!
//! - the parent-directory link (`../`)
//! - column sort links and other query-only targets (`?C=N;O=D`)
//! - absolute external links (`http://...`, `https://...`)
//!
//! # Example
//!
//! ```
//! use dirmirror_core::listing::{EntryKind, parse_listing};
//!
//! let html = r#"<a href="../">Parent</a> <a href="docs/">docs/</a> <a href="a.txt">a.txt</a>"#;
//! let entries = parse_listing(html);
//! assert_eq!(entries.len(), 2);
//! assert_eq!(entries[0].kind(), EntryKind::Directory);
//! assert_eq!(entries[1].href(), "a.txt");
//! ```

mod entry;

use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;

pub use entry::{EntryKind, ListingEntry};

/// Target of the conventional "go up one level" anchor.
const PARENT_LINK: &str = "../";

/// Prefixes that mark a link as an absolute external URL.
const EXTERNAL_PREFIXES: [&str; 2] = ["http://", "https://"];

/// Comments and raw-text elements; anchors inside them are not markup.
/// An unterminated block hides the rest of the page.
static NON_MARKUP_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(
        r"(?is)<!--.*?(?:-->|\z)|<script\b[^>]*>.*?(?:</script\s*>|\z)|<style\b[^>]*>.*?(?:</style\s*>|\z)",
    )
});

/// Anchor start tag; quoted attribute values may contain `>`.
static ANCHOR_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r#"(?is)<a\s((?:[^>"']|"[^"]*"|'[^']*')*)>"#)
});

/// One attribute inside a start tag (double-quoted, single-quoted, bare or valueless).
static ATTRIBUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(
        r#"(?s)([^\s"'>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#,
    )
});

/// Character reference: decimal, hexadecimal or named.
static CHAR_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r"&(?:#([0-9]+);?|#[xX]([0-9a-fA-F]+);?|([A-Za-z][A-Za-z0-9]*);)")
});

/// Named references decoded in attribute values.
const NAMED_REFS: [(&str, &str); 6] = [
    ("amp", "&"),
    ("lt", "<"),
    ("gt", ">"),
    ("quot", "\""),
    ("apos", "'"),
    ("nbsp", "\u{a0}"),
];

/// Compiles a regex at static init; panics on invalid pattern.
fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

/// Extracts child entries from the HTML body of a directory index page.
///
/// Entries are returned in document order and are not deduplicated. Parsing is
/// permissive: markup that does not look like an anchor start tag is skipped,
/// so malformed pages yield whatever anchors can still be recognized. Anchors
/// inside comments, `<script>` and `<style>` are not entries.
#[must_use]
pub fn parse_listing(html: &str) -> Vec<ListingEntry> {
    let markup = NON_MARKUP_RE.replace_all(html, "");
    let entries: Vec<ListingEntry> = ANCHOR_TAG_RE
        .captures_iter(&markup)
        .filter_map(|tag| tag.get(1))
        .flat_map(|attributes| anchor_hrefs(attributes.as_str()))
        .filter(|href| !is_excluded(href))
        .map(ListingEntry::new)
        .collect();

    trace!(entries = entries.len(), "parsed listing");
    entries
}

/// Returns every `href` value of one anchor tag, decoded, in attribute order.
fn anchor_hrefs(attributes: &str) -> Vec<String> {
    ATTRIBUTE_RE
        .captures_iter(attributes)
        .filter(|attr| attr[1].eq_ignore_ascii_case("href"))
        .filter_map(|attr| {
            attr.get(2)
                .or_else(|| attr.get(3))
                .or_else(|| attr.get(4))
                .map(|value| unescape_attribute(value.as_str()))
        })
        .collect()
}

/// Returns true if an anchor target does not name a child of the listed directory.
#[must_use]
pub fn is_excluded(href: &str) -> bool {
    href.is_empty()
        || href == PARENT_LINK
        || href.starts_with('?')
        || EXTERNAL_PREFIXES
            .iter()
            .any(|prefix| href.starts_with(prefix))
}

/// Decodes character references in an attribute value.
///
/// Numeric references outside the Unicode scalar range (and NUL) become
/// U+FFFD. Unknown named references are kept as written.
fn unescape_attribute(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    CHAR_REF_RE
        .replace_all(raw, |caps: &regex::Captures<'_>| {
            if let Some(decimal) = caps.get(1) {
                decode_code_point(decimal.as_str(), 10)
            } else if let Some(hex) = caps.get(2) {
                decode_code_point(hex.as_str(), 16)
            } else {
                NAMED_REFS
                    .iter()
                    .find(|(name, _)| *name == &caps[3])
                    .map_or_else(|| caps[0].to_string(), |(_, text)| (*text).to_string())
            }
        })
        .into_owned()
}

fn decode_code_point(digits: &str, radix: u32) -> String {
    u32::from_str_radix(digits, radix)
        .ok()
        .filter(|&code| code != 0)
        .and_then(char::from_u32)
        .unwrap_or(char::REPLACEMENT_CHARACTER)
        .to_string()
}
