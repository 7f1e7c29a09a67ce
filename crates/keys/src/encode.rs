//! Storage key derivation.
//!
//! Keys are BLAKE3 digests of a length-prefixed encoding of the identifying
//! components, so `("ab", "c", "d")` and `("a", "bc", "d")` never collide.
//! The hex digest is sharded into `hhhh/hhhh/hhhh/hhhh/<rest>` to bound the
//! number of entries under any one prefix of the object store.

use crate::coordinate::{ArtifactKind, ModuleCoordinate, validate_version};
use crate::error::{ErrorKind, Result};

/// Widths (in hex characters) of the leading shard directories.
const SHARD_WIDTHS: [usize; 4] = [4, 4, 4, 4];

/// Storage keys for a single artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Object path in the durable tier.
    path: String,
    /// Key in the volatile and shared tiers.
    tier_key: String,
    kind: Option<ArtifactKind>,
}
impl CacheKey {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn tier_key(&self) -> &str {
        &self.tier_key
    }

    /// `None` for checksum-database entries.
    pub fn kind(&self) -> Option<ArtifactKind> {
        self.kind
    }
}

fn digest_parts(parts: &[&str]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    *hasher.finalize().as_bytes()
}

/// 256-bit digest identifying a module coordinate.
pub fn coordinate_digest(coordinate: &ModuleCoordinate) -> [u8; 32] {
    digest_parts(&[coordinate.domain(), coordinate.user(), coordinate.repo()])
}

/// 64-bit hash of a disambiguating string.
pub fn secondary_hash(extra: &str) -> u64 {
    let digest = blake3::hash(extra.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(head)
}

/// Coordinate digest followed by the little-endian [`secondary_hash`] of
/// `extra`, for entries that need per-version disambiguation.
pub fn extended_digest(coordinate: &ModuleCoordinate, extra: &str) -> [u8; 40] {
    let mut key = [0u8; 40];
    key[..32].copy_from_slice(&coordinate_digest(coordinate));
    key[32..].copy_from_slice(&secondary_hash(extra).to_le_bytes());
    key
}

/// Split a 256-bit digest into the sharded hierarchical layout.
///
/// ```
/// let path = modproxy_keys::sharded_path(&[0xab; 32]);
/// assert!(path.starts_with("abab/abab/abab/abab/"));
/// assert_eq!(path.len(), 64 + 4);
/// ```
pub fn sharded_path(digest: &[u8; 32]) -> String {
    let hex = hex::encode(digest);
    let mut path = String::with_capacity(hex.len() + SHARD_WIDTHS.len());
    let mut offset = 0;
    for width in SHARD_WIDTHS {
        path.push_str(&hex[offset..offset + width]);
        path.push('/');
        offset += width;
    }
    path.push_str(&hex[offset..]);
    path
}

/// Derive the storage keys for an artifact of `coordinate`.
///
/// Versioned kinds (`info`, `mod`, `zip`) require a version; `list` and
/// `latest` must not be given one.
///
/// ```
/// use modproxy_keys::{ArtifactKind, ModuleCoordinate, encode};
/// let coordinate = ModuleCoordinate::parse("github.com/user/repo").unwrap();
/// let key = encode(&coordinate, ArtifactKind::Zip, Some("v1.0.0")).unwrap();
/// assert!(key.path().ends_with("/v1.0.0.zip"));
/// assert_eq!(key, encode(&coordinate, ArtifactKind::Zip, Some("v1.0.0")).unwrap());
/// ```
pub fn encode(coordinate: &ModuleCoordinate, kind: ArtifactKind, version: Option<&str>) -> Result<CacheKey> {
    let digest = coordinate_digest(coordinate);
    let (path, tier_key) = match (kind.is_versioned(), version) {
        (true, Some(version)) => {
            let version = validate_version(version)?;
            let leaf = format!("{version}.{}", kind.extension());
            let path = format!("{}/{leaf}", sharded_path(&digest));
            let tier_key = format!("{}.{}", hex::encode(extended_digest(coordinate, &leaf)), kind.extension());
            (path, tier_key)
        },
        (false, None) => {
            let path = format!("{}.{}", hex::encode(digest), kind.extension());
            (path.clone(), path)
        },
        (true, None) => exn::bail!(ErrorKind::KindMismatch("versioned artifact requires a version")),
        (false, Some(_)) => exn::bail!(ErrorKind::KindMismatch("unversioned artifact cannot take a version")),
    };
    Ok(CacheKey {
        path,
        tier_key,
        kind: Some(kind),
    })
}

/// Keys for a checksum-database lookup: only the domain and trail identify it.
pub fn sumdb_key(domain: &str, trail: &str) -> CacheKey {
    let path = format!("{}.sum", hex::encode(digest_parts(&[domain, trail])));
    CacheKey {
        tier_key: path.clone(),
        path,
        kind: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn coordinate(path: &str) -> ModuleCoordinate {
        ModuleCoordinate::parse(path).unwrap()
    }

    #[rstest]
    #[case(ArtifactKind::List, None)]
    #[case(ArtifactKind::Latest, None)]
    #[case(ArtifactKind::Info, Some("v1.2.3"))]
    #[case(ArtifactKind::Mod, Some("v1.2.3"))]
    #[case(ArtifactKind::Zip, Some("v1.2.3"))]
    fn test_encode_is_deterministic(#[case] kind: ArtifactKind, #[case] version: Option<&str>) {
        let first = encode(&coordinate("github.com/user/repo"), kind, version).unwrap();
        let second = encode(&coordinate("github.com/user/repo"), kind, version).unwrap();
        assert_eq!(first, second);
        assert!(first.path().ends_with(kind.extension()));
    }

    #[test]
    fn test_known_layout() {
        let key = encode(&coordinate("github.com/user/repo"), ArtifactKind::Mod, Some("v1.0.0")).unwrap();
        let segments: Vec<&str> = key.path().split('/').collect();
        assert_eq!(segments.len(), 6);
        assert!(segments[..4].iter().all(|s| s.len() == 4));
        assert_eq!(segments[4].len(), 48);
        assert_eq!(segments[5], "v1.0.0.mod");
        // Tier key: 40-byte extended digest in hex, plus the kind.
        assert_eq!(key.tier_key().len(), 80 + ".mod".len());
    }

    #[test]
    fn test_component_boundaries_do_not_collide() {
        let a = ModuleCoordinate::new("ab.com", "c", "d").unwrap();
        let b = ModuleCoordinate::new("ab.co", "mc", "d").unwrap();
        assert_ne!(coordinate_digest(&a), coordinate_digest(&b));
        let short = coordinate("gopkg.in/yaml.v3");
        let long = ModuleCoordinate::new("gopkg.in", "yaml", "v3").unwrap();
        assert_ne!(coordinate_digest(&short), coordinate_digest(&long));
    }

    #[test]
    fn test_versions_and_kinds_are_distinct() {
        let c = coordinate("github.com/user/repo");
        let v1 = encode(&c, ArtifactKind::Zip, Some("v1.0.0")).unwrap();
        let v2 = encode(&c, ArtifactKind::Zip, Some("v1.0.1")).unwrap();
        let info = encode(&c, ArtifactKind::Info, Some("v1.0.0")).unwrap();
        assert_ne!(v1.tier_key(), v2.tier_key());
        assert_ne!(v1.tier_key(), info.tier_key());
        let list = encode(&c, ArtifactKind::List, None).unwrap();
        let latest = encode(&c, ArtifactKind::Latest, None).unwrap();
        assert_ne!(list.tier_key(), latest.tier_key());
    }

    #[test]
    fn test_extended_digest_layout() {
        let c = coordinate("github.com/user/repo");
        let extended = extended_digest(&c, "v1.0.0");
        assert_eq!(extended[..32], coordinate_digest(&c));
        assert_eq!(extended[32..], secondary_hash("v1.0.0").to_le_bytes());
    }

    #[test]
    fn test_kind_mismatch() {
        let c = coordinate("github.com/user/repo");
        assert!(matches!(&*encode(&c, ArtifactKind::Zip, None).unwrap_err(), ErrorKind::KindMismatch(_)));
        assert!(matches!(&*encode(&c, ArtifactKind::List, Some("v1")).unwrap_err(), ErrorKind::KindMismatch(_)));
        assert!(matches!(&*encode(&c, ArtifactKind::Zip, Some("../x")).unwrap_err(), ErrorKind::InvalidVersion(_)));
    }

    #[test]
    fn test_sumdb_key() {
        let key = sumdb_key("sum.golang.org", "lookup/github.com/user/repo@v1.0.0");
        assert_eq!(key, sumdb_key("sum.golang.org", "lookup/github.com/user/repo@v1.0.0"));
        assert!(key.path().ends_with(".sum"));
        assert_eq!(key.kind(), None);
        assert_ne!(key, sumdb_key("sum.golang.org", "latest"));
    }
}
