//! Case escaping for module paths.
//!
//! Registries serve module paths over case-insensitive storage, so every
//! upper-case ASCII letter is written as `!` followed by its lower-case form
//! (`github.com/Azure/go` ⇄ `github.com/!azure/go`). Clients already send the
//! escaped form; the change feed publishes the decoded one.

use crate::error::{ErrorKind, Result};

/// Escape a decoded module path for use in URLs and keys.
///
/// ```
/// use modproxy_keys::escape_path;
/// assert_eq!(escape_path("github.com/Azure/go-sdk").unwrap(), "github.com/!azure/go-sdk");
/// assert!(escape_path("github.com/a!b").is_err());
/// ```
pub fn escape_path(path: &str) -> Result<String> {
    let mut escaped = String::with_capacity(path.len() + 4);
    for c in path.chars() {
        match c {
            '!' => exn::bail!(ErrorKind::InvalidEscape(path.to_string())),
            c if c.is_ascii_uppercase() => {
                escaped.push('!');
                escaped.push(c.to_ascii_lowercase());
            },
            c => escaped.push(c),
        }
    }
    Ok(escaped)
}

/// Decode an escaped module path back into its canonical form.
///
/// ```
/// use modproxy_keys::unescape_path;
/// assert_eq!(unescape_path("github.com/!burnt!sushi/toml").unwrap(), "github.com/BurntSushi/toml");
/// assert!(unescape_path("github.com/Azure/go").is_err());
/// ```
pub fn unescape_path(escaped: &str) -> Result<String> {
    let mut decoded = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        match c {
            '!' => match chars.next() {
                Some(next) if next.is_ascii_lowercase() => decoded.push(next.to_ascii_uppercase()),
                _ => exn::bail!(ErrorKind::InvalidEscape(escaped.to_string())),
            },
            // An escaped path never carries upper-case letters.
            c if c.is_ascii_uppercase() => exn::bail!(ErrorKind::InvalidEscape(escaped.to_string())),
            c => decoded.push(c),
        }
    }
    Ok(decoded)
}
