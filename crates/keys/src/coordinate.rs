use crate::error::{ErrorKind, Result};
use crate::escape::{escape_path, unescape_path};
use derive_more::Display;

/// The artifacts a registry serves for a module.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// `@v/list`: newline separated list of known versions.
    #[display("list")]
    List,
    /// `@latest`: info document for the newest version.
    #[display("latest")]
    Latest,
    /// `@v/{version}.info`: JSON version metadata.
    #[display("info")]
    Info,
    /// `@v/{version}.mod`: the module's manifest.
    #[display("mod")]
    Mod,
    /// `@v/{version}.zip`: the module's source archive.
    #[display("zip")]
    Zip,
}
impl ArtifactKind {
    /// Whether this artifact is addressed by a version.
    pub fn is_versioned(self) -> bool {
        matches!(self, Self::Info | Self::Mod | Self::Zip)
    }

    /// File extension used in both the registry URL and the storage key.
    pub fn extension(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Latest => "latest",
            Self::Info => "info",
            Self::Mod => "mod",
            Self::Zip => "zip",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Info | Self::Latest => "application/json",
            Self::Zip => "application/zip",
            Self::List | Self::Mod => "text/plain; charset=utf-8",
        }
    }

    /// Mutable artifacts change whenever a new version is published, so they
    /// are never persisted in the durable tier.
    pub fn is_durable(self) -> bool {
        self.is_versioned()
    }
}

/// A module's origin: `{domain}/{user}/{repo}`.
///
/// Components hold the escaped (wire) form of the module path. `repo` is
/// everything after the second segment and may itself contain slashes
/// (`golang.org/x/tools/gopls`), or be empty for two-segment paths such as
/// `gopkg.in/yaml.v3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleCoordinate {
    domain: String,
    user: String,
    repo: String,
}
impl ModuleCoordinate {
    /// Build a coordinate from already-split, escaped components.
    pub fn new(domain: impl Into<String>, user: impl Into<String>, repo: impl Into<String>) -> Result<Self> {
        let coordinate = Self {
            domain: domain.into(),
            user: user.into(),
            repo: repo.into(),
        };
        let joined = coordinate.escaped_path();
        let valid = !coordinate.domain.contains('/')
            && !coordinate.user.contains('/')
            && joined.split('/').all(valid_segment);
        match valid {
            true => Ok(coordinate),
            false => exn::bail!(ErrorKind::InvalidPath(joined)),
        }
    }

    /// Split an escaped module path (as it appears in a request URL).
    ///
    /// ```
    /// use modproxy_keys::ModuleCoordinate;
    /// let long = ModuleCoordinate::parse("golang.org/x/tools/gopls").unwrap();
    /// assert_eq!((long.domain(), long.user(), long.repo()), ("golang.org", "x", "tools/gopls"));
    /// let short = ModuleCoordinate::parse("gopkg.in/yaml.v3").unwrap();
    /// assert_eq!((short.domain(), short.user(), short.repo()), ("gopkg.in", "yaml.v3", ""));
    /// ```
    pub fn parse(escaped_path: &str) -> Result<Self> {
        let trimmed = escaped_path.trim_matches('/');
        let mut parts = trimmed.splitn(3, '/');
        let (Some(domain), Some(user)) = (parts.next(), parts.next()) else {
            exn::bail!(ErrorKind::InvalidPath(escaped_path.to_string()));
        };
        Self::new(domain, user, parts.next().unwrap_or_default())
    }

    /// Build a coordinate from a decoded module path (as published by the
    /// change feed), escaping upper-case letters first.
    pub fn from_module_path(path: &str) -> Result<Self> {
        Self::parse(&escape_path(path)?)
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// The escaped module path, suitable for registry URLs.
    pub fn escaped_path(&self) -> String {
        match self.repo.is_empty() {
            true => format!("{}/{}", self.domain, self.user),
            false => format!("{}/{}/{}", self.domain, self.user, self.repo),
        }
    }

    /// The decoded module path, as persisted in module records.
    pub fn module_path(&self) -> Result<String> {
        unescape_path(&self.escaped_path())
    }
}

fn valid_segment(segment: &str) -> bool {
    !segment.is_empty() && segment != "." && segment != ".." && !segment.contains(['\0', '@', '\\'])
}

/// Versions are appended to storage keys, so they must stay a single,
/// non-traversing path segment.
pub(crate) fn validate_version(version: &str) -> Result<&str> {
    match !version.starts_with('.') && valid_segment(version) && !version.contains('/') {
        true => Ok(version),
        false => exn::bail!(ErrorKind::InvalidVersion(version.to_string())),
    }
}
