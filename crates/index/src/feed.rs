//! Paging through the change feed.

use crate::entry::{IndexEntry, parse_page};
use modproxy_upstream::UpstreamClient;
use time::OffsetDateTime;
use tracing::instrument;

/// Upper bound on pages fetched in one pass.
pub const MAX_PAGES: usize = 100;

/// Everything read from the feed in one pass.
#[derive(Debug)]
pub struct FeedBatch {
    pub entries: Vec<IndexEntry>,
    /// Timestamp of the newest entry seen, or the starting cursor if none were.
    pub cursor: OffsetDateTime,
    pub pages: usize,
}

/// Read pages starting at `since` until the feed runs dry.
///
/// Stops on an empty page, a page that doesn't move the cursor forward, a
/// failed or non-2xx request, or after `max_pages`. Entries read before a
/// failure are kept.
#[instrument(skip(client))]
pub async fn fetch_since(client: &UpstreamClient, since: OffsetDateTime, max_pages: usize) -> FeedBatch {
    let mut batch = FeedBatch {
        entries: Vec::new(),
        cursor: since,
        pages: 0,
    };
    while batch.pages < max_pages {
        let response = match client.index_page(batch.cursor).await {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                tracing::warn!(status = response.status, "index request was refused");
                break;
            },
            Err(err) => {
                tracing::warn!(error = ?err, "index request failed");
                break;
            },
        };
        batch.pages += 1;
        let page = parse_page(&String::from_utf8_lossy(&response.body));
        let Some(newest) = page.iter().map(|entry| entry.timestamp).max() else {
            break;
        };
        batch.entries.extend(page);
        if newest <= batch.cursor {
            break;
        }
        batch.cursor = newest;
    }
    if batch.pages == max_pages {
        tracing::warn!(pages = batch.pages, "stopped paging at the page limit");
    }
    batch
}
