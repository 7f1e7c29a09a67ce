//! Layered configuration for modproxy.
//!
//! Settings are merged from, in increasing precedence:
//!
//! 1. built-in defaults;
//! 2. a TOML file (`--config`, or `config.toml` in the platform config
//!    directory, e.g. `~/.config/modproxy/config.toml`);
//! 3. environment variables prefixed `MODPROXY_`, with `__` between nested
//!    keys (`MODPROXY_STORAGE__BUCKET=modules`).
//!
//! ```toml
//! listen = "0.0.0.0:8080"
//!
//! [storage]
//! bucket = "modules"
//! endpoint = "http://localhost:9000"
//! key_id = "minio"
//! key_secret = "minio123"
//!
//! [redis]
//! url = "redis://localhost:6379"
//!
//! [database]
//! path = "/var/lib/modproxy/modules.db"
//! ```

mod config;
pub mod error;
mod secret;
mod seconds;

pub use crate::config::{
    Config, DatabaseConfig, RedisConfig, StorageConfig, SyncConfig, TtlConfig, UpstreamConfig, default_path,
};
pub use crate::secret::Secret;
