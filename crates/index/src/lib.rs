//! Change-feed synchronization.
//!
//! The registry publishes a feed of `{Path, Version, Timestamp}` records. A
//! [`Synchronizer`] polls it on an interval, keeps the newest version per
//! path, and for every module the proxy already knows about (one with a
//! [`ModuleRecord`](modproxy_db::ModuleRecord)) that gained a strictly newer
//! version, moves the record forward and queues a [`Workload`].
//!
//! A [`WorkerPool`] drains the queue, fetching each version's source archive
//! into the blob store before any client asks for it. The queue is bounded:
//! when the workers fall behind, the synchronizer waits.

mod entry;
pub mod error;
mod feed;
mod queue;
mod sync;
mod worker;

pub use crate::entry::{IndexEntry, dedupe, parse_page};
pub use crate::feed::{FeedBatch, MAX_PAGES, fetch_since};
pub use crate::queue::{WorkReceiver, WorkSender, Workload, work_queue};
pub use crate::sync::{SyncReport, Synchronizer};
pub use crate::worker::{Warmer, WorkerPool};
