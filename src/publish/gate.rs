// src/publish/gate.rs
//! Rate-limited publish step.
//!
//! Flow per event: rate check → skip or publish → persist cursor.
//! - Inside the minimum interval the event is consumed without publishing, so
//!   it is neither posted too early nor retried forever.
//! - A failed publish leaves the cursor alone; the event is retried next cycle.
//! - The cursor is saved right after each mutation, before any follow-up reply.

use metrics::counter;
use std::sync::Arc;

use super::{LabelId, PublishRequest, Publisher};
use crate::clock::Clock;
use crate::ingest::classify::{Category, NormalizedEvent};
use crate::state::{Cursor, StateStore};
use crate::transform::transform;

pub const MIN_PUBLISH_INTERVAL_SECS: i64 = 7_200;
pub const MAX_TITLE_CHARS: usize = 300;
pub const UPDATE_TITLE_PREFIX: &str = "Counter-Strike 2 Update for";
pub const ANNOUNCEMENT_TITLE_PREFIX: &str = "Counter-Strike 2 Announcement:";
pub const BOT_FOOTER: &str =
    "---\n\n^(I'm a bot that posts CS2 game updates. Issues? Contact my developer.)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Publish,
    Skip { elapsed_secs: i64 },
}

/// Minimum spacing between successful publishes.
#[derive(Debug, Clone, Copy)]
pub struct RateGate {
    min_interval_secs: i64,
}

impl Default for RateGate {
    fn default() -> Self {
        Self::new(MIN_PUBLISH_INTERVAL_SECS)
    }
}

impl RateGate {
    /// `min_interval_secs` < 0 is treated as 0 (no limit).
    pub fn new(min_interval_secs: i64) -> Self {
        Self {
            min_interval_secs: min_interval_secs.max(0),
        }
    }

    pub fn min_interval_secs(&self) -> i64 {
        self.min_interval_secs
    }

    /// `elapsed < min` skips, `elapsed >= min` publishes. No previous publish
    /// means no limit. Saturates on timestamps at the ends of the i64 range.
    pub fn check(&self, last_publish: Option<i64>, now: i64) -> RateDecision {
        match last_publish {
            None => RateDecision::Publish,
            Some(last) => {
                let elapsed_secs = now.saturating_sub(last);
                if elapsed_secs < self.min_interval_secs {
                    RateDecision::Skip { elapsed_secs }
                } else {
                    RateDecision::Publish
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Published,
    Skipped,
    Failed,
}

/// Request plus the optional follow-up reply body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedPost {
    pub request: PublishRequest,
    pub reply: Option<String>,
}

fn truncate_chars(s: String, max: usize) -> String {
    if s.chars().count() <= max {
        s
    } else {
        s.chars().take(max).collect()
    }
}

pub fn update_title(event: &NormalizedEvent) -> String {
    let mut title = format!(
        "{UPDATE_TITLE_PREFIX} {}",
        event.utc_date().format("%B %-d, %Y")
    );
    if event.sequence_number() > 1 {
        title.push_str(&format!(" #{}", event.sequence_number()));
    }
    title
}

pub fn announcement_title(event: &NormalizedEvent) -> String {
    truncate_chars(
        format!("{ANNOUNCEMENT_TITLE_PREFIX} {}", event.title()),
        MAX_TITLE_CHARS,
    )
}

/// Build what gets sent for `event`. Pure.
pub fn prepare(event: &NormalizedEvent, label: Option<LabelId>) -> PreparedPost {
    match event.category() {
        Category::Update => {
            let body = transform(event.body_markup());
            let body = (!body.is_empty()).then_some(body);
            let reply = body.as_ref().map(|b| format!("{b}\n\n{BOT_FOOTER}"));
            PreparedPost {
                request: PublishRequest {
                    title: update_title(event),
                    body,
                    url: Some(event.url().to_string()),
                    category: Category::Update,
                    label,
                },
                reply,
            }
        }
        Category::Announcement => PreparedPost {
            request: PublishRequest {
                title: announcement_title(event),
                body: None,
                url: Some(event.url().to_string()),
                category: Category::Announcement,
                label,
            },
            reply: None,
        },
    }
}

pub struct PublishGate {
    publisher: Arc<dyn Publisher>,
    store: StateStore,
    clock: Arc<dyn Clock>,
    rate: RateGate,
    label_text: Option<String>,
}

impl PublishGate {
    pub fn new(publisher: Arc<dyn Publisher>, store: StateStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            publisher,
            store,
            clock,
            rate: RateGate::default(),
            label_text: None,
        }
    }

    /// Label display text to look up on every publish; empty disables it.
    pub fn with_label(mut self, label_text: Option<String>) -> Self {
        self.label_text = label_text.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn with_rate_gate(mut self, rate: RateGate) -> Self {
        self.rate = rate;
        self
    }

    pub async fn handle(&self, event: &NormalizedEvent, cursor: &mut Cursor) -> PublishOutcome {
        let now = self.clock.now_unix();

        if let RateDecision::Skip { elapsed_secs } = self.rate.check(cursor.last_publish(), now) {
            tracing::info!(
                id = event.id(),
                elapsed_secs,
                min_interval_secs = self.rate.min_interval_secs(),
                "rate gate: consuming event without publishing"
            );
            cursor.mark_processed(event.timestamp_sec());
            self.persist(cursor).await;
            counter!("poster_skipped_total").increment(1);
            return PublishOutcome::Skipped;
        }

        let label = self.resolve_label().await;
        let prepared = prepare(event, label);

        tracing::info!(
            id = event.id(),
            category = ?event.category(),
            title = %prepared.request.title,
            publisher = self.publisher.name(),
            "publishing event"
        );

        let post = match self.publisher.publish(&prepared.request).await {
            Ok(post) => post,
            Err(e) => {
                tracing::error!(
                    id = event.id(),
                    error = %e,
                    "publish failed; event stays eligible for the next cycle"
                );
                counter!("poster_publish_failures_total").increment(1);
                return PublishOutcome::Failed;
            }
        };

        cursor.mark_published(event.timestamp_sec(), now);
        self.persist(cursor).await;
        counter!("poster_published_total").increment(1);
        tracing::info!(id = event.id(), post = %post.id, url = ?post.url, "published");

        if let Some(reply) = prepared.reply.as_deref() {
            match self.publisher.reply(&post, reply).await {
                Ok(r) => tracing::debug!(post = %post.id, reply = %r.id, "attached body reply"),
                Err(e) => {
                    tracing::warn!(post = %post.id, error = %e, "body reply failed; post stands");
                    counter!("poster_reply_failures_total").increment(1);
                }
            }
        }

        PublishOutcome::Published
    }

    async fn resolve_label(&self) -> Option<LabelId> {
        let name = self.label_text.as_deref()?;
        match self.publisher.find_label(name).await {
            Ok(Some(id)) => Some(id),
            Ok(None) => {
                tracing::warn!(label = name, "label not found on target board; posting without it");
                None
            }
            Err(e) => {
                tracing::warn!(label = name, error = %e, "label lookup failed; posting without it");
                None
            }
        }
    }

    async fn persist(&self, cursor: &Cursor) {
        if let Err(e) = self.store.save(cursor).await {
            tracing::error!(
                path = %self.store.path().display(),
                error = %e,
                "saving state failed; keeping in-memory cursor"
            );
            counter!("poster_state_save_errors_total").increment(1);
        }
    }
}
