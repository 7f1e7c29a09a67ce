//! Object key validation.
//!
//! Keys produced by [`modproxy_keys`] are always well formed, but versions
//! and checksum-database trails originate from client requests. Anything
//! that could escape its prefix is rejected before it reaches a backend.

use crate::error::{ErrorKind, Result};

/// Rejects object keys that are empty, absolute or escape their prefix.
///
/// Keys are `/`-separated, relative, and every segment must be non-empty and
/// must not be `.` or `..`. Null bytes and backslashes are rejected outright.
///
/// # Examples
///
/// ```
/// use modproxy_storage::validate_key;
/// assert!(validate_key("abcd/ef01/2345/6789/rest/v1.0.0.zip").is_ok());
/// assert!(validate_key("deadbeef.list").is_ok());
/// assert!(validate_key("../etc/passwd").is_err());
/// assert!(validate_key("a//b").is_err());
/// assert!(validate_key("/absolute").is_err());
/// ```
pub fn validate(key: &str) -> Result<&str> {
    let valid = !key.is_empty()
        && !key.contains(['\0', '\\'])
        && key.split('/').all(|segment| !segment.is_empty() && segment != "." && segment != "..");
    match valid {
        true => Ok(key),
        false => exn::bail!(ErrorKind::InvalidKey(key.to_string())),
    }
}
