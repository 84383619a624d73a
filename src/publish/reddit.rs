use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::{LabelId, PostHandle, PublishError, PublishRequest, Publisher, ReplyHandle};
use crate::config::app::RedditCredentials;

pub const REDDIT_AUTH_BASE: &str = "https://www.reddit.com";
pub const REDDIT_API_BASE: &str = "https://oauth.reddit.com";

/// Refresh the access token this long before Reddit says it expires.
const TOKEN_SLACK: Duration = Duration::from_secs(60);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// Reddit script-app client authenticated with a permanent refresh token.
pub struct RedditPublisher {
    client: Client,
    creds: RedditCredentials,
    refresh_token: String,
    subreddit: String,
    auth_base: String,
    api_base: String,
    token: Mutex<Option<AccessToken>>,
}

impl RedditPublisher {
    pub fn new(creds: RedditCredentials, subreddit: impl Into<String>) -> Result<Self, PublishError> {
        let refresh_token = creds
            .refresh_token
            .clone()
            .ok_or_else(|| PublishError::Auth("no refresh token configured".into()))?;
        let client = Client::builder()
            .user_agent(creds.user_agent.clone())
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            creds,
            refresh_token,
            subreddit: subreddit.into(),
            auth_base: REDDIT_AUTH_BASE.to_string(),
            api_base: REDDIT_API_BASE.to_string(),
            token: Mutex::new(None),
        })
    }

    /// Point at a different host pair (staging, local stub).
    pub fn with_base_urls(mut self, auth_base: impl Into<String>, api_base: impl Into<String>) -> Self {
        self.auth_base = auth_base.into();
        self.api_base = api_base.into();
        self
    }

    pub fn subreddit(&self) -> &str {
        &self.subreddit
    }

    async fn access_token(&self) -> Result<String, PublishError> {
        let mut guard = self.token.lock().await;
        if let Some(t) = guard.as_ref() {
            if t.expires_at > Instant::now() + TOKEN_SLACK {
                return Ok(t.value.clone());
            }
        }

        let resp = self
            .client
            .post(format!("{}/api/v1/access_token", self.auth_base))
            .basic_auth(&self.creds.client_id, Some(&self.creds.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.refresh_token.as_str()),
            ])
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(PublishError::Auth(format!("token endpoint HTTP {status}: {}", snippet(&body))));
        }
        let tok: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| PublishError::Malformed(format!("token response: {e}")))?;
        let value = match (tok.access_token, tok.error) {
            (Some(v), _) => v,
            (None, Some(err)) => return Err(PublishError::Auth(err)),
            (None, None) => return Err(PublishError::Auth("token response without access_token".into())),
        };
        let ttl = Duration::from_secs(tok.expires_in.unwrap_or(3_600));
        tracing::debug!(ttl_secs = ttl.as_secs(), "refreshed reddit access token");
        *guard = Some(AccessToken {
            value: value.clone(),
            expires_at: Instant::now() + ttl,
        });
        Ok(value)
    }

    async fn read_json(&self, resp: reqwest::Response) -> Result<Value, PublishError> {
        let status = resp.status();
        let body = resp.text().await?;
        if status == StatusCode::UNAUTHORIZED {
            // Force a token refresh on the next call.
            *self.token.lock().await = None;
        }
        if !status.is_success() {
            return Err(PublishError::Status {
                status: status.as_u16(),
                body: snippet(&body),
            });
        }
        serde_json::from_str(&body).map_err(|e| PublishError::Malformed(format!("{e}")))
    }

    async fn api_post(&self, path: &str, form: &[(&str, String)]) -> Result<Value, PublishError> {
        let token = self.access_token().await?;
        let resp = self
            .client
            .post(format!("{}{path}", self.api_base))
            .bearer_auth(token)
            .form(form)
            .send()
            .await?;
        self.read_json(resp).await
    }

    async fn api_get(&self, path: &str) -> Result<Value, PublishError> {
        let token = self.access_token().await?;
        let resp = self
            .client
            .get(format!("{}{path}", self.api_base))
            .bearer_auth(token)
            .send()
            .await?;
        self.read_json(resp).await
    }

    /// Confirm the credentials work; returns the authenticated user name.
    pub async fn verify(&self) -> Result<String, PublishError> {
        let me = self.api_get("/api/v1/me").await?;
        me.get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| PublishError::Malformed("/api/v1/me without name".into()))
    }
}

fn snippet(body: &str) -> String {
    body.chars().take(300).collect()
}

/// Reddit reports API-level failures as `{"json": {"errors": [[code, msg, field], ...]}}`.
fn api_errors(v: &Value) -> Option<String> {
    let errors = v.pointer("/json/errors")?.as_array()?;
    if errors.is_empty() {
        return None;
    }
    let parts: Vec<String> = errors
        .iter()
        .map(|e| match e.as_array() {
            Some(parts) => parts
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(": "),
            None => e.to_string(),
        })
        .collect();
    Some(parts.join("; "))
}

fn str_at<'a>(v: &'a Value, pointer: &str) -> Option<&'a str> {
    v.pointer(pointer).and_then(Value::as_str)
}

pub(crate) fn parse_submit(v: &Value) -> Result<PostHandle, PublishError> {
    if let Some(msg) = api_errors(v) {
        return Err(PublishError::Rejected(msg));
    }
    let id = str_at(v, "/json/data/id")
        .ok_or_else(|| PublishError::Malformed("submit response without id".into()))?;
    let fullname = str_at(v, "/json/data/name")
        .map(str::to_string)
        .unwrap_or_else(|| format!("t3_{id}"));
    Ok(PostHandle {
        id: id.to_string(),
        fullname,
        url: str_at(v, "/json/data/url").map(str::to_string),
    })
}

pub(crate) fn parse_comment(v: &Value) -> Result<ReplyHandle, PublishError> {
    if let Some(msg) = api_errors(v) {
        return Err(PublishError::Rejected(msg));
    }
    str_at(v, "/json/data/things/0/data/id")
        .map(|id| ReplyHandle { id: id.to_string() })
        .ok_or_else(|| PublishError::Malformed("comment response without id".into()))
}

/// Case-insensitive match on the flair template's display text.
pub(crate) fn find_flair(templates: &Value, name: &str) -> Option<LabelId> {
    let wanted = name.trim();
    templates.as_array()?.iter().find_map(|t| {
        let text = t.get("text").and_then(Value::as_str)?;
        if text.trim().eq_ignore_ascii_case(wanted) {
            t.get("id").and_then(Value::as_str).map(|id| LabelId(id.to_string()))
        } else {
            None
        }
    })
}

/// Self-post text: the body, then a source line pointing at the canonical URL.
pub(crate) fn self_text(body: &str, url: Option<&str>) -> String {
    match url {
        Some(url) => format!("{body}\n\n---\n\nSource: [Steam announcement]({url})"),
        None => body.to_string(),
    }
}

/// Form for `/api/submit`. A body makes a self post that carries the URL as a
/// source line; without a body the URL itself is submitted as a link post.
pub(crate) fn submit_form(subreddit: &str, req: &PublishRequest) -> Vec<(&'static str, String)> {
    let mut form: Vec<(&'static str, String)> = vec![
        ("api_type", "json".into()),
        ("sr", subreddit.to_string()),
        ("title", req.title.clone()),
        ("resubmit", "true".into()),
    ];
    match (req.body.as_deref(), req.url.as_deref()) {
        (None, Some(url)) => {
            form.push(("kind", "link".into()));
            form.push(("url", url.to_string()));
        }
        (body, url) => {
            form.push(("kind", "self".into()));
            form.push(("text", self_text(body.unwrap_or_default(), url)));
        }
    }
    if let Some(LabelId(id)) = &req.label {
        form.push(("flair_id", id.clone()));
    }
    form
}

#[async_trait]
impl Publisher for RedditPublisher {
    async fn publish(&self, req: &PublishRequest) -> Result<PostHandle, PublishError> {
        let form = submit_form(&self.subreddit, req);
        let v = self.api_post("/api/submit", &form).await?;
        let post = parse_submit(&v)?;
        tracing::debug!(subreddit = %self.subreddit, post = %post.id, "reddit submission created");
        Ok(post)
    }

    async fn reply(&self, post: &PostHandle, body: &str) -> Result<ReplyHandle, PublishError> {
        let form: Vec<(&str, String)> = vec![
            ("api_type", "json".into()),
            ("thing_id", post.fullname.clone()),
            ("text", body.to_string()),
        ];
        let v = self.api_post("/api/comment", &form).await?;
        parse_comment(&v)
    }

    async fn find_label(&self, name: &str) -> Result<Option<LabelId>, PublishError> {
        let v = self
            .api_get(&format!("/r/{}/api/link_flair_v2", self.subreddit))
            .await?;
        Ok(find_flair(&v, name))
    }

    fn name(&self) -> &'static str {
        "reddit"
    }
}
