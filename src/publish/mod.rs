// src/publish/mod.rs
pub mod gate;
pub mod reddit;

use crate::ingest::classify::Category;

/// Platform id of a post label (Reddit: link flair template id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelId(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostHandle {
    pub id: String,
    /// Fully qualified id used as a reply target (Reddit: `t3_<id>`).
    pub fullname: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyHandle {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub title: String,
    pub body: Option<String>,
    pub url: Option<String>,
    pub category: Category,
    pub label: Option<LabelId>,
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("publisher request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("publisher returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("publisher rejected request: {0}")]
    Rejected(String),

    #[error("unexpected publisher response: {0}")]
    Malformed(String),

    #[error("publisher authentication failed: {0}")]
    Auth(String),
}

/// Port to the downstream discussion platform.
#[async_trait::async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, req: &PublishRequest) -> Result<PostHandle, PublishError>;
    async fn reply(&self, post: &PostHandle, body: &str) -> Result<ReplyHandle, PublishError>;
    /// Look a label up by display name; `Ok(None)` when the board has no such label.
    async fn find_label(&self, name: &str) -> Result<Option<LabelId>, PublishError>;
    fn name(&self) -> &'static str;
}
