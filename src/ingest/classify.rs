//! Raw feed item → `NormalizedEvent`.
//!
//! Category comes from a keyword rule table (`CategoryRules`), never from the
//! author. `Update` events additionally get a sequence number: their 1-based
//! rank among same-UTC-day updates in the batch.
//!
//! The sequence scan stops at the first item dated before the target's day, so
//! it relies on the upstream delivering items newest-first. Nothing verifies
//! that ordering; an unordered page undercounts.

use chrono::{DateTime, NaiveDate, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::ingest::types::RawItem;

pub const EVENT_URL_PREFIX: &str = "https://store.steampowered.com/news/app/730/view/";

pub fn event_url(id: &str) -> String {
    format!("{EVENT_URL_PREFIX}{id}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Update,
    Announcement,
}

/// One row of the rule table: any keyword hit maps the headline to `category`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub category: Category,
    pub keywords: Vec<String>,
}

/// Ordered keyword table; the first matching row wins, no match falls back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRules {
    rules: Vec<CategoryRule>,
    fallback: Category,
}

impl Default for CategoryRules {
    fn default() -> Self {
        Self::new(
            vec![CategoryRule {
                category: Category::Update,
                keywords: vec!["update".into(), "release notes".into(), "patch".into()],
            }],
            Category::Announcement,
        )
    }
}

impl CategoryRules {
    /// Keywords are lowercased and trimmed; empty keywords are dropped so they
    /// can never match everything.
    pub fn new(rules: Vec<CategoryRule>, fallback: Category) -> Self {
        let rules = rules
            .into_iter()
            .map(|r| CategoryRule {
                category: r.category,
                keywords: r
                    .keywords
                    .iter()
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect(),
            })
            .filter(|r| !r.keywords.is_empty())
            .collect();
        Self { rules, fallback }
    }

    pub fn rules(&self) -> &[CategoryRule] {
        &self.rules
    }

    pub fn fallback(&self) -> Category {
        self.fallback
    }

    pub fn categorize(&self, headline: &str) -> Category {
        let h = headline.to_lowercase();
        self.rules
            .iter()
            .find(|r| r.keywords.iter().any(|k| h.contains(k.as_str())))
            .map(|r| r.category)
            .unwrap_or(self.fallback)
    }
}

/// Validated, immutable event ready for publishing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedEvent {
    id: String,
    title: String,
    body_markup: String,
    timestamp_sec: i64,
    url: String,
    category: Category,
    sequence_number: u32,
}

impl NormalizedEvent {
    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn body_markup(&self) -> &str {
        &self.body_markup
    }
    pub fn timestamp_sec(&self) -> i64 {
        self.timestamp_sec
    }
    pub fn url(&self) -> &str {
        &self.url
    }
    pub fn category(&self) -> Category {
        self.category
    }
    pub fn sequence_number(&self) -> u32 {
        self.sequence_number
    }

    pub fn utc_date(&self) -> NaiveDate {
        utc_date(self.timestamp_sec).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Missing {
    Id,
    Headline,
    Timestamp,
}

impl Missing {
    fn as_str(self) -> &'static str {
        match self {
            Missing::Id => "id",
            Missing::Headline => "headline",
            Missing::Timestamp => "timestamp",
        }
    }
}

struct Fields<'a> {
    id: &'a str,
    headline: &'a str,
    timestamp: i64,
    date: NaiveDate,
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn utc_date(ts: i64) -> Option<NaiveDate> {
    DateTime::<Utc>::from_timestamp(ts, 0).map(|dt| dt.date_naive())
}

fn fields(raw: &RawItem) -> Result<Fields<'_>, Missing> {
    let id = non_empty(&raw.id).ok_or(Missing::Id)?;
    let headline = non_empty(&raw.headline).ok_or(Missing::Headline)?;
    let timestamp = raw.timestamp.ok_or(Missing::Timestamp)?;
    let date = utc_date(timestamp).ok_or(Missing::Timestamp)?;
    Ok(Fields {
        id,
        headline,
        timestamp,
        date,
    })
}

fn log_drop(raw: &RawItem, missing: Missing) {
    counter!("poster_items_dropped_total").increment(1);
    match missing {
        // An item without id cannot be referenced later; flag it louder.
        Missing::Id => tracing::warn!(field = missing.as_str(), headline = ?raw.headline, "dropping feed item"),
        _ => tracing::debug!(field = missing.as_str(), id = ?raw.id, "dropping feed item"),
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventClassifier {
    rules: CategoryRules,
}

impl EventClassifier {
    pub fn new(rules: CategoryRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &CategoryRules {
        &self.rules
    }

    /// Normalize `raw`; `batch` is the whole page it came from (newest-first)
    /// and is only consulted for the sequence number.
    pub fn classify(&self, raw: &RawItem, batch: &[RawItem]) -> Option<NormalizedEvent> {
        let f = match fields(raw) {
            Ok(f) => f,
            Err(missing) => {
                log_drop(raw, missing);
                return None;
            }
        };

        let category = self.rules.categorize(f.headline);
        let sequence_number = match category {
            Category::Update => self.sequence_number(f.timestamp, f.date, batch),
            Category::Announcement => 1,
        };

        Some(NormalizedEvent {
            id: f.id.to_string(),
            title: f.headline.to_string(),
            body_markup: raw.body.clone().unwrap_or_default(),
            timestamp_sec: f.timestamp,
            url: event_url(f.id),
            category,
            sequence_number,
        })
    }

    /// The newest valid item of the page, classified. Ties keep the item that
    /// appears first.
    pub fn newest(&self, batch: &[RawItem]) -> Option<NormalizedEvent> {
        let mut best: Option<(usize, i64)> = None;
        for (idx, raw) in batch.iter().enumerate() {
            match fields(raw) {
                Ok(f) => {
                    if best.map_or(true, |(_, ts)| f.timestamp > ts) {
                        best = Some((idx, f.timestamp));
                    }
                }
                Err(missing) => log_drop(raw, missing),
            }
        }
        let (idx, _) = best?;
        self.classify(&batch[idx], batch)
    }

    fn sequence_number(&self, target_ts: i64, target_date: NaiveDate, batch: &[RawItem]) -> u32 {
        let mut rank = 0u32;
        for raw in batch {
            let Ok(f) = fields(raw) else { continue };
            if f.date < target_date {
                break;
            }
            if f.date == target_date
                && f.timestamp <= target_ts
                && self.rules.categorize(f.headline) == Category::Update
            {
                rank += 1;
            }
        }
        rank.max(1)
    }
}
