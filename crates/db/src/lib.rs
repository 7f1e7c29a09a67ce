//! SQLite persistence for module records.
//!
//! The database remembers, for every module path the proxy has served, the
//! newest version it knows about. The index synchronizer only tracks modules
//! that appear here; everything else is discovered on demand.
//!
//! It is not the source of truth for any artifact; if it is deleted, the
//! proxy keeps working and simply pre-warms less until it has been refilled.

mod db;
pub mod error;
mod models;
mod repo;
pub mod version;

pub use crate::db::Database;
pub use crate::models::ModuleRecord;
pub use crate::repo::{ModuleRepository, Recorded};
