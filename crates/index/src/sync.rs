//! The periodic synchronization pass.

use crate::entry::{IndexEntry, dedupe};
use crate::error::{ErrorKind, Result};
use crate::feed::{MAX_PAGES, fetch_since};
use crate::queue::{WorkSender, Workload};
use exn::ResultExt;
use modproxy_db::error::ErrorKind as DbErrorKind;
use modproxy_db::{ModuleRepository, Recorded};
use modproxy_upstream::UpstreamClient;
use std::time::Duration;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// What one pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    /// Entries read from the feed.
    pub fetched: usize,
    /// Entries left after deduplication.
    pub unique: usize,
    /// Records moved to a newer version, and workloads queued for them.
    pub advanced: usize,
    /// Entries skipped because of a bad version or path.
    pub skipped: usize,
    /// Entries whose record couldn't be written; retried on a later pass only
    /// if the feed repeats them.
    pub failed: usize,
}

/// Polls the change feed and queues newly published versions of known modules.
pub struct Synchronizer {
    client: UpstreamClient,
    records: ModuleRepository,
    queue: WorkSender,
    cursor: OffsetDateTime,
    interval: Duration,
    max_pages: usize,
}

impl Synchronizer {
    /// The first pass reads entries published within `lookback` of now.
    pub fn new(
        client: UpstreamClient,
        records: ModuleRepository,
        queue: WorkSender,
        interval: Duration,
        lookback: Duration,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        let cursor = now.checked_sub(lookback.try_into().unwrap_or(time::Duration::ZERO)).unwrap_or(now);
        Self {
            client,
            records,
            queue,
            cursor,
            interval,
            max_pages: MAX_PAGES,
        }
    }

    /// Resume from an explicit cursor instead.
    pub fn starting_at(mut self, cursor: OffsetDateTime) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn cursor(&self) -> OffsetDateTime {
        self.cursor
    }

    /// Run a pass every `interval` until `token` is cancelled.
    ///
    /// A failed pass is logged and the next one still runs.
    pub async fn run(mut self, token: CancellationToken) {
        tracing::info!(interval = ?self.interval, since = %self.cursor, "index synchronizer started");
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                outcome = self.sync_once() => match outcome {
                    Ok(report) => tracing::info!(?report, cursor = %self.cursor, "index synchronized"),
                    Err(err) => tracing::error!(error = ?err, "index synchronization failed"),
                },
            }
            tokio::select! {
                () = token.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {},
            }
        }
        tracing::info!("index synchronizer stopped");
    }

    /// Read the feed from the current cursor, advance records of known
    /// modules that have a strictly newer version and queue them for warming.
    ///
    /// Waits when the work queue is full.
    #[instrument(skip(self), fields(since = %self.cursor))]
    pub async fn sync_once(&mut self) -> Result<SyncReport> {
        let batch = fetch_since(&self.client, self.cursor, self.max_pages).await;
        let mut report = SyncReport {
            fetched: batch.entries.len(),
            ..SyncReport::default()
        };
        let entries = dedupe(batch.entries);
        report.unique = entries.len();
        for entry in entries {
            match self.advance(&entry).await {
                Ok(true) => report.advanced += 1,
                Ok(false) => {},
                Err(err) if matches!(&*err, ErrorKind::Parse(_) | ErrorKind::InvalidPath(_)) => {
                    tracing::warn!(path = %entry.path, error = ?err, "skipping index entry");
                    report.skipped += 1;
                },
                Err(err) if matches!(&*err, ErrorKind::Database) => {
                    tracing::error!(path = %entry.path, version = %entry.version, error = ?err, "failed to advance module record");
                    report.failed += 1;
                },
                Err(err) => return Err(err),
            }
        }
        self.cursor = batch.cursor;
        Ok(report)
    }

    async fn advance(&self, entry: &IndexEntry) -> Result<bool> {
        let outcome = match self.records.advance_if_known(&entry.path, &entry.version).await {
            Ok(outcome) => outcome,
            Err(err) if matches!(&*err, DbErrorKind::InvalidVersion(_)) => {
                return Err(err).or_raise(|| ErrorKind::Parse(format!("{} {}", entry.path, entry.version)));
            },
            Err(err) => return Err(err).or_raise(|| ErrorKind::Database),
        };
        if outcome != Some(Recorded::Advanced) {
            return Ok(false);
        }
        tracing::debug!(path = %entry.path, version = %entry.version, "module advanced");
        self.queue.push(Workload::from_path(&entry.path, entry.version.as_str())?).await?;
        Ok(true)
    }
}
