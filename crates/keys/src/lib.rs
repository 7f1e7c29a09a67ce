//! Module coordinates and the storage keys derived from them.
//!
//! Everything in this crate is pure: no I/O, no clocks, no randomness. The
//! same coordinate always produces the same key, across processes and
//! restarts, which is what lets every tier of the cache (and every node in a
//! fleet) agree on where an artifact lives.

mod coordinate;
mod encode;
pub mod error;
mod escape;

pub use crate::coordinate::{ArtifactKind, ModuleCoordinate};
pub use crate::encode::{CacheKey, coordinate_digest, encode, extended_digest, secondary_hash, sharded_path, sumdb_key};
pub use crate::escape::{escape_path, unescape_path};
