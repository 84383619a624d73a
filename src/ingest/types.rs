// src/ingest/types.rs
use serde_json::{Map, Value};

/// One entry of the upstream feed, before normalization.
/// Every modeled field is optional: the payload is untrusted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawItem {
    pub id: Option<String>,
    pub headline: Option<String>,
    pub body: Option<String>, // BBCode
    pub timestamp: Option<i64>, // unix seconds
    pub metadata: Map<String, Value>,
}

impl RawItem {
    /// Convenience constructor used by fixtures and tests.
    pub fn new(id: &str, headline: &str, body: &str, timestamp: i64) -> Self {
        Self {
            id: Some(id.to_string()),
            headline: Some(headline.to_string()),
            body: Some(body.to_string()),
            timestamp: Some(timestamp),
            metadata: Map::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("feed request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("feed returned HTTP {status}")]
    Status { status: u16 },

    #[error("feed payload malformed: {0}")]
    Malformed(String),

    #[error("feed reported failure: {0}")]
    Rejected(String),
}

/// Port to the upstream content feed. One call returns one bounded page,
/// in the order the upstream delivered it.
#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<RawItem>, FetchError>;
    fn name(&self) -> &'static str;
}
