//! Change-feed records.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use modproxy_db::version;
use serde::Deserialize;
use std::collections::HashMap;
use time::OffsetDateTime;

/// One line of the change feed: a version of a module published at a time.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IndexEntry {
    /// Decoded module path, e.g. `github.com/BurntSushi/toml`.
    pub path: String,
    pub version: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl IndexEntry {
    pub fn parse(line: &str) -> Result<Self> {
        serde_json::from_str(line).or_raise(|| ErrorKind::Parse(line.to_string()))
    }
}

/// Parse a page of newline-delimited entries.
///
/// Blank lines are ignored; malformed lines are logged and skipped.
pub fn parse_page(body: &str) -> Vec<IndexEntry> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match IndexEntry::parse(line) {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!(error = ?err, "skipping malformed index line");
                None
            },
        })
        .collect()
}

/// Collapse entries to one per path, keeping the greatest semantic version.
///
/// Entries are considered in timestamp order and the output keeps the order in
/// which each path first appeared. An entry whose version doesn't parse is
/// logged and never replaces (or displaces) another entry for its path.
pub fn dedupe(mut entries: Vec<IndexEntry>) -> Vec<IndexEntry> {
    entries.sort_by_key(|entry| entry.timestamp);
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<IndexEntry> = Vec::new();
    for entry in entries {
        if let Err(err) = version::parse(&entry.version) {
            tracing::warn!(path = %entry.path, error = ?err, "skipping entry with unparseable version");
            continue;
        }
        match positions.get(&entry.path) {
            None => {
                positions.insert(entry.path.clone(), unique.len());
                unique.push(entry);
            },
            Some(&position) => {
                if let Ok(true) = version::is_newer(&entry.version, &unique[position].version) {
                    unique[position] = entry;
                }
            },
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn entry(path: &str, version: &str, minute: u8) -> IndexEntry {
        IndexEntry {
            path: path.to_string(),
            version: version.to_string(),
            timestamp: datetime!(2024-03-01 00:00:00 UTC).replace_minute(minute).unwrap(),
        }
    }

    #[test]
    fn test_parse_line() {
        let line = r#"{"Path":"github.com/BurntSushi/toml","Version":"v1.3.2","Timestamp":"2024-03-01T10:20:30.123456Z"}"#;
        let parsed = IndexEntry::parse(line).unwrap();
        assert_eq!(parsed.path, "github.com/BurntSushi/toml");
        assert_eq!(parsed.version, "v1.3.2");
        assert_eq!(parsed.timestamp, datetime!(2024-03-01 10:20:30.123456 UTC));
    }

    #[test]
    fn test_parse_page_skips_malformed_lines() {
        let body = concat!(
            r#"{"Path":"a/m","Version":"v1.0.0","Timestamp":"2024-03-01T00:00:00Z"}"#,
            "\n",
            "not json at all\n",
            "\n",
            r#"{"Path":"a/n","Version":"v0.1.0","Timestamp":"yesterday"}"#,
            "\n",
            r#"{"Path":"b/m","Version":"v2.0.0","Timestamp":"2024-03-01T00:01:00Z"}"#,
            "\n",
        );
        let entries = parse_page(body);
        let paths: Vec<_> = entries.iter().map(|entry| entry.path.as_str()).collect();
        assert_eq!(paths, ["a/m", "b/m"]);
    }

    #[test]
    fn test_dedupe_keeps_highest_version() {
        let entries = vec![entry("a/m", "v1.0.0", 0), entry("a/m", "v1.2.0", 1), entry("a/m", "v0.9.0", 2)];
        assert_eq!(dedupe(entries), vec![entry("a/m", "v1.2.0", 1)]);
    }

    #[test]
    fn test_dedupe_orders_by_first_appearance_in_time() {
        let entries = vec![
            entry("b/m", "v1.0.0", 5),
            entry("a/m", "v1.0.0", 1),
            entry("b/m", "v1.1.0", 6),
            entry("c/m", "v0.1.0", 3),
        ];
        let paths: Vec<_> = dedupe(entries).into_iter().map(|entry| (entry.path, entry.version)).collect();
        assert_eq!(
            paths,
            [
                ("a/m".to_string(), "v1.0.0".to_string()),
                ("c/m".to_string(), "v0.1.0".to_string()),
                ("b/m".to_string(), "v1.1.0".to_string()),
            ]
        );
    }

    #[test]
    fn test_dedupe_skips_unparseable_versions() {
        let entries = vec![entry("a/m", "garbage", 0), entry("a/m", "v1.0.0", 1), entry("a/m", "also-bad", 2)];
        assert_eq!(dedupe(entries), vec![entry("a/m", "v1.0.0", 1)]);
    }

    #[test]
    fn test_dedupe_compares_prereleases_by_precedence() {
        let entries = vec![entry("a/m", "v1.0.0-rc.1", 0), entry("a/m", "v1.0.0", 1), entry("a/m", "v1.0.0-rc.2", 2)];
        assert_eq!(dedupe(entries), vec![entry("a/m", "v1.0.0", 1)]);
    }
}
