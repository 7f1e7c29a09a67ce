//! Semantic-version ordering for module versions.
//!
//! Module versions are semantic versions with a leading `v` (`v1.2.3`,
//! `v0.0.0-20230101000000-abcdef123456`, `v2.0.0+incompatible`).

use crate::error::{ErrorKind, Result};
use std::cmp::Ordering;

/// Parse a module version, with or without its leading `v`.
///
/// ```
/// use modproxy_db::version::parse;
/// assert_eq!(parse("v1.2.3").unwrap(), semver::Version::new(1, 2, 3));
/// assert!(parse("latest").is_err());
/// ```
pub fn parse(version: &str) -> Result<semver::Version> {
    let trimmed = version.strip_prefix('v').unwrap_or(version);
    semver::Version::parse(trimmed).map_err(|_| exn::Exn::from(ErrorKind::InvalidVersion(version.to_string())))
}

/// Compare two module versions by semantic-version precedence.
pub fn compare(left: &str, right: &str) -> Result<Ordering> {
    Ok(parse(left)?.cmp_precedence(&parse(right)?))
}

/// Whether `candidate` is strictly newer than `current`.
pub fn is_newer(candidate: &str, current: &str) -> Result<bool> {
    Ok(compare(candidate, current)? == Ordering::Greater)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("v1.1.0", "v1.0.0", true)]
    #[case("v1.0.0", "v1.0.0", false)]
    #[case("v0.9.0", "v1.0.0", false)]
    #[case("v1.10.0", "v1.9.0", true)]
    #[case("v1.0.0", "v1.0.0-rc.1", true)]
    #[case("v0.0.0-20230102000000-abcdef123456", "v0.0.0-20230101000000-abcdef123456", true)]
    #[case("v2.0.0+incompatible", "v2.0.0", false)]
    #[case("1.2.0", "v1.1.0", true)]
    fn test_is_newer(#[case] candidate: &str, #[case] current: &str, #[case] expected: bool) {
        assert_eq!(is_newer(candidate, current).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("v1")]
    #[case("v1.2")]
    #[case("master")]
    fn test_unparseable(#[case] version: &str) {
        let err = parse(version).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidVersion(_)));
    }
}
