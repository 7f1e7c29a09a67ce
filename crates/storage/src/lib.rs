//! Durable, checksum-verified object storage.
//!
//! The [`BlobStore`] is the only thing the rest of the proxy talks to. It
//! writes a BLAKE3 integrity tag next to every object and refuses to hand
//! back bytes that don't match it. The raw [`ObjectStore`] backends below it
//! know nothing about checksums; they just move bytes and metadata.

pub mod backend;
mod blob;
pub mod error;
mod key;
mod models;

pub use crate::backend::ObjectStore;
pub use crate::blob::{BlobStore, CHECKSUM_METADATA_KEY};
pub use crate::key::validate as validate_key;
pub use crate::models::Object;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn ObjectStore + Send + Sync>;
