//! Whitelist parsing.
//!
//! The remote document holds one identity per line. Any line-ending
//! convention is accepted (`\n`, `\r\n`, or a lone `\r`). Lines are trimmed
//! and blank lines dropped; order and duplicates are kept as written.

use crate::decision::is_member;

/// Parse raw text into an ordered list of trimmed, non-empty entries.
///
/// Total: empty input yields an empty list.
pub fn parse(raw: &str) -> Vec<String> {
    raw.split(['\n', '\r'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// A parsed whitelist, recomputed from the replicated text on every change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Whitelist {
    entries: Vec<String>,
}

impl Whitelist {
    /// Create an empty whitelist.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a whitelist from raw text.
    pub fn parse(raw: &str) -> Self {
        Self {
            entries: parse(raw),
        }
    }

    /// Entries in first-seen order.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check whether `identity` appears verbatim in the list.
    ///
    /// An unresolved identity (`None`) is never a member.
    pub fn contains(&self, identity: Option<&str>) -> bool {
        is_member(&self.entries, identity)
    }
}
