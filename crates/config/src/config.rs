use crate::Secret;
use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "MODPROXY_";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub listen: SocketAddr,
    pub upstream: UpstreamConfig,
    pub storage: StorageConfig,
    pub redis: RedisConfig,
    pub database: DatabaseConfig,
    pub ttl: TtlConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    pub proxy_url: String,
    pub index_url: String,
    #[serde(with = "crate::seconds")]
    pub timeout: Duration,
    /// Checksum databases that `/sumdb/{host}/...` may be forwarded to.
    pub sumdb_hosts: Vec<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            proxy_url: "https://proxy.golang.org".to_string(),
            index_url: "https://index.golang.org/index".to_string(),
            timeout: Duration::from_secs(60),
            sumdb_hosts: vec!["sum.golang.org".to_string()],
        }
    }
}

/// S3-compatible object store holding the durable tier.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub bucket: String,
    pub endpoint: String,
    pub key_id: String,
    pub key_secret: Secret,
    #[serde(default = "default_region")]
    pub region: String,
    /// Key prefix inside the bucket.
    #[serde(default)]
    pub prefix: Option<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisConfig {
    /// May carry credentials, so it's treated as a secret.
    pub url: Secret,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

/// How long entries live in each tier, by artifact kind.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct TtlConfig {
    /// Upper bound for the in-process tier.
    #[serde(with = "crate::seconds")]
    pub memory: Duration,
    #[serde(with = "crate::seconds")]
    pub list: Duration,
    #[serde(with = "crate::seconds")]
    pub latest: Duration,
    #[serde(with = "crate::seconds")]
    pub sumdb: Duration,
    /// `.info`, `.mod` and `.zip` files, which never change once published.
    #[serde(with = "crate::seconds")]
    pub artifact: Duration,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            memory: Duration::from_secs(30),
            list: Duration::from_secs(60),
            latest: Duration::from_secs(30),
            sumdb: Duration::from_secs(600),
            artifact: Duration::from_secs(86_400),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct SyncConfig {
    pub enabled: bool,
    #[serde(with = "crate::seconds")]
    pub interval: Duration,
    /// How far back the first pass after startup reads the change feed.
    #[serde(with = "crate::seconds")]
    pub lookback: Duration,
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(3600),
            lookback: Duration::from_secs(3600),
            workers: 10,
            queue_capacity: 10,
        }
    }
}

/// Settings that have a default. Required ones are absent until a file or
/// the environment provides them.
#[derive(Serialize)]
struct Defaults {
    listen: SocketAddr,
    upstream: UpstreamConfig,
    ttl: TtlConfig,
    sync: SyncConfig,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            upstream: UpstreamConfig::default(),
            ttl: TtlConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

/// `config.toml` in the platform's configuration directory for modproxy.
pub fn default_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "modproxy").map(|dirs| dirs.config_dir().join("config.toml"))
}

impl Config {
    /// Load and validate the configuration.
    ///
    /// With `path`, that file must exist. Without it, the default location is
    /// used if a file is there.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) if !path.is_file() => exn::bail!(ErrorKind::FileNotFound(path.display().to_string())),
            Some(path) => Some(path.to_path_buf()),
            None => default_path().filter(|path| path.is_file()),
        };
        if let Some(file) = &file {
            tracing::debug!(path = %file.display(), "reading configuration file");
        }
        let config: Self = Self::figment(file.as_deref()).extract().map_err(classify)?;
        config.validate()?;
        Ok(config)
    }

    /// The merged providers, without extracting or validating.
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Defaults::default()));
        if let Some(file) = file {
            figment = figment.merge(Toml::file_exact(file));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split(ENV_SEPARATOR))
    }

    fn validate(&self) -> Result<()> {
        let required = [
            ("storage.bucket", self.storage.bucket.as_str()),
            ("storage.endpoint", self.storage.endpoint.as_str()),
            ("storage.key_id", self.storage.key_id.as_str()),
            ("storage.key_secret", self.storage.key_secret.expose()),
            ("redis.url", self.redis.url.expose()),
        ];
        if let Some((key, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            exn::bail!(ErrorKind::Missing(key.to_string()));
        }
        if self.database.path.as_os_str().is_empty() {
            exn::bail!(ErrorKind::Missing("database.path".to_string()));
        }
        if self.sync.enabled && self.sync.interval.is_zero() {
            exn::bail!(ErrorKind::Invalid("sync.interval must be greater than zero".to_string()));
        }
        if self.ttl.memory.is_zero() {
            exn::bail!(ErrorKind::Invalid("ttl.memory must be greater than zero".to_string()));
        }
        Ok(())
    }
}

fn classify(err: figment::Error) -> crate::error::Error {
    let kind = match &err.kind {
        figment::error::Kind::MissingField(field) => {
            let mut key = err.path.clone();
            key.push(field.to_string());
            ErrorKind::Missing(key.join("."))
        },
        _ => ErrorKind::Invalid(err.to_string()),
    };
    exn::Exn::from(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    const COMPLETE: &str = r#"
        [storage]
        bucket = "modules"
        endpoint = "http://localhost:9000"
        key_id = "minio"
        key_secret = "minio123"

        [redis]
        url = "redis://localhost:6379"

        [database]
        path = "modules.db"
    "#;

    #[test]
    fn test_defaults_apply_to_optional_settings() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", COMPLETE)?;
            let config = Config::load(Some(Path::new("config.toml"))).unwrap();
            assert_eq!(config.listen, SocketAddr::from(([0, 0, 0, 0], 8080)));
            assert_eq!(config.upstream.proxy_url, "https://proxy.golang.org");
            assert_eq!(config.upstream.timeout, Duration::from_secs(60));
            assert_eq!(config.storage.region, "us-east-1");
            assert_eq!(config.ttl.list, Duration::from_secs(60));
            assert_eq!(config.ttl.sumdb, Duration::from_secs(600));
            assert_eq!(config.sync.workers, 10);
            assert_eq!(config.sync.queue_capacity, 10);
            assert!(config.sync.enabled);
            Ok(())
        });
    }

    #[test]
    fn test_environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", COMPLETE)?;
            jail.set_env("MODPROXY_STORAGE__BUCKET", "from-env");
            jail.set_env("MODPROXY_TTL__LIST", "5");
            jail.set_env("MODPROXY_LISTEN", "127.0.0.1:3000");
            let config = Config::load(Some(Path::new("config.toml"))).unwrap();
            assert_eq!(config.storage.bucket, "from-env");
            assert_eq!(config.ttl.list, Duration::from_secs(5));
            assert_eq!(config.listen, SocketAddr::from(([127, 0, 0, 1], 3000)));
            Ok(())
        });
    }

    #[test]
    fn test_environment_alone_is_enough() {
        Jail::expect_with(|jail| {
            jail.set_env("MODPROXY_STORAGE__BUCKET", "modules");
            jail.set_env("MODPROXY_STORAGE__ENDPOINT", "http://localhost:9000");
            jail.set_env("MODPROXY_STORAGE__KEY_ID", "minio");
            jail.set_env("MODPROXY_STORAGE__KEY_SECRET", "minio123");
            jail.set_env("MODPROXY_REDIS__URL", "redis://localhost:6379");
            jail.set_env("MODPROXY_DATABASE__PATH", "modules.db");
            let config: Config = Config::figment(None).extract()?;
            assert_eq!(config.storage.key_secret.expose(), "minio123");
            assert_eq!(config.database.path, PathBuf::from("modules.db"));
            Ok(())
        });
    }

    #[rstest]
    #[case("bucket", "storage.bucket")]
    #[case("key_secret", "storage.key_secret")]
    fn test_missing_required_setting_is_named(#[case] field: &str, #[case] expected: &str) {
        Jail::expect_with(|jail| {
            let partial: String = COMPLETE
                .lines()
                .filter(|line| !line.trim_start().starts_with(&format!("{field} ")))
                .collect::<Vec<_>>()
                .join("\n");
            jail.create_file("config.toml", &partial)?;
            let err = Config::load(Some(Path::new("config.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Missing(key) if key == expected), "{err:?}");
            Ok(())
        });
    }

    #[test]
    fn test_missing_section_is_named() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", &COMPLETE.replace("[redis]\n        url = \"redis://localhost:6379\"", ""))?;
            let err = Config::load(Some(Path::new("config.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Missing(key) if key == "redis"), "{err:?}");
            Ok(())
        });
    }

    #[test]
    fn test_empty_required_setting_is_missing() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", COMPLETE)?;
            jail.set_env("MODPROXY_REDIS__URL", "");
            let err = Config::load(Some(Path::new("config.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Missing(key) if key == "redis.url"));
            Ok(())
        });
    }

    #[test]
    fn test_malformed_value_is_invalid() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", COMPLETE)?;
            jail.set_env("MODPROXY_SYNC__WORKERS", "lots");
            let err = Config::load(Some(Path::new("config.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Invalid(_)));
            Ok(())
        });
    }

    #[test]
    fn test_explicit_file_must_exist() {
        Jail::expect_with(|_jail| {
            let err = Config::load(Some(Path::new("nope.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::FileNotFound(_)));
            Ok(())
        });
    }

    #[test]
    fn test_secrets_are_redacted_in_debug_output() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", COMPLETE)?;
            let config = Config::load(Some(Path::new("config.toml"))).unwrap();
            let debug = format!("{config:?}");
            assert!(!debug.contains("minio123"));
            assert!(!debug.contains("redis://localhost"));
            Ok(())
        });
    }
}
