// src/ingest/mod.rs
pub mod classify;
pub mod config;
pub mod providers;
pub mod types;

use metrics::{counter, gauge};

use crate::ingest::classify::{EventClassifier, NormalizedEvent};
use crate::ingest::types::{FeedSource, FetchError};

/// What one fetch produced: the page size and its newest valid event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    pub fetched: usize,
    pub newest: Option<NormalizedEvent>,
}

/// Fetch one page from `feed` and classify its newest valid item.
pub async fn run_once(
    feed: &dyn FeedSource,
    classifier: &EventClassifier,
) -> Result<IngestOutcome, FetchError> {
    crate::metrics::ensure_described();

    let raw = match feed.fetch().await {
        Ok(v) => v,
        Err(e) => {
            counter!("poster_fetch_errors_total").increment(1);
            return Err(e);
        }
    };

    let now = chrono::Utc::now().timestamp().max(0);
    counter!("poster_polls_total").increment(1);
    gauge!("poster_last_poll_ts").set(now as f64);

    let newest = classifier.newest(&raw);
    Ok(IngestOutcome {
        fetched: raw.len(),
        newest,
    })
}
