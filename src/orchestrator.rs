// src/orchestrator.rs
//! The poll loop: fetch → pick newest unprocessed event → gate → sleep.
//!
//! Runs as a single task; every port call is awaited before the next starts.
//! Cancellation is checked between cycles, while a fetch is in flight and
//! during sleeps. A publish that has started is allowed to finish.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::ingest::classify::EventClassifier;
use crate::ingest::types::{FeedSource, FetchError};
use crate::publish::gate::{PublishGate, PublishOutcome};
use crate::state::Cursor;

pub const ERROR_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("fetching the feed failed: {0}")]
    Fetch(#[from] FetchError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The feed returned no items at all.
    EmptyFeed,
    /// Nothing valid, or the newest valid event was already handled.
    NoNewEvent,
    Handled { id: String, outcome: PublishOutcome },
    Cancelled,
}

pub struct Orchestrator {
    feed: Arc<dyn FeedSource>,
    classifier: EventClassifier,
    gate: PublishGate,
    cursor: Cursor,
    poll_interval: Duration,
    error_backoff: Duration,
}

impl Orchestrator {
    pub fn new(
        feed: Arc<dyn FeedSource>,
        classifier: EventClassifier,
        gate: PublishGate,
        cursor: Cursor,
        poll_interval: Duration,
    ) -> Self {
        Self {
            feed,
            classifier,
            gate,
            cursor,
            poll_interval,
            error_backoff: ERROR_BACKOFF,
        }
    }

    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// One fetch/handle pass. Handles at most one event.
    pub async fn run_cycle(&mut self, cancel: &CancellationToken) -> Result<CycleOutcome, CycleError> {
        let ingest = tokio::select! {
            _ = cancel.cancelled() => return Ok(CycleOutcome::Cancelled),
            r = crate::ingest::run_once(self.feed.as_ref(), &self.classifier) => r?,
        };
        if cancel.is_cancelled() {
            return Ok(CycleOutcome::Cancelled);
        }

        if ingest.fetched == 0 {
            tracing::info!(target: "poster", provider = self.feed.name(), "feed returned no events");
            return Ok(CycleOutcome::EmptyFeed);
        }

        let Some(event) = ingest.newest else {
            tracing::info!(target: "poster", fetched = ingest.fetched, "no valid events in feed page");
            return Ok(CycleOutcome::NoNewEvent);
        };

        if !self.cursor.is_new(event.timestamp_sec()) {
            tracing::debug!(
                target: "poster",
                id = event.id(),
                posttime = event.timestamp_sec(),
                last_processed = ?self.cursor.last_processed(),
                "newest event already processed"
            );
            return Ok(CycleOutcome::NoNewEvent);
        }

        tracing::info!(
            target: "poster",
            id = event.id(),
            title = event.title(),
            posttime = event.timestamp_sec(),
            "new event"
        );
        let outcome = self.gate.handle(&event, &mut self.cursor).await;
        Ok(CycleOutcome::Handled {
            id: event.id().to_string(),
            outcome,
        })
    }

    /// Poll until `cancel` fires; returns the final cursor.
    pub async fn run(mut self, cancel: CancellationToken) -> Cursor {
        tracing::info!(
            target: "poster",
            provider = self.feed.name(),
            poll_interval_secs = self.poll_interval.as_secs(),
            last_processed = ?self.cursor.last_processed(),
            last_publish = ?self.cursor.last_publish(),
            "poll loop starting"
        );

        while !cancel.is_cancelled() {
            let pause = match self.run_cycle(&cancel).await {
                Ok(CycleOutcome::Cancelled) => break,
                Ok(outcome) => {
                    tracing::debug!(target: "poster", ?outcome, "cycle finished");
                    self.poll_interval
                }
                Err(e) => {
                    tracing::error!(
                        target: "poster",
                        error = %e,
                        backoff_secs = self.error_backoff.as_secs(),
                        "poll cycle failed; backing off"
                    );
                    self.error_backoff
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        tracing::info!(
            target: "poster",
            last_processed = ?self.cursor.last_processed(),
            "poll loop stopped"
        );
        self.cursor
    }
}
