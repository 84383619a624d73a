// src/config/app.rs
//! Process configuration, read from the environment (`.env` is loaded by the binary).

use anyhow::{anyhow, bail, Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::state::DEFAULT_STATE_PATH;

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_FLAIR_TEXT: &str = "Game Update";

/// Reddit script-app credentials.
#[derive(Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    /// Absent until `auth refresh-token` has been run once.
    pub refresh_token: Option<String>,
    pub user_agent: String,
}

// Keep secrets out of logs.
impl std::fmt::Debug for RedditCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "***"))
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    match lookup(key).map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => bail!("missing required environment variable {key}"),
    }
}

fn optional(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl RedditCredentials {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            client_id: required(&lookup, "PRAW_CLIENT_ID")?,
            client_secret: required(&lookup, "PRAW_CLIENT_SECRET")?,
            refresh_token: optional(&lookup, "PRAW_REFRESH_TOKEN"),
            user_agent: required(&lookup, "PRAW_USER_AGENT")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub reddit: RedditCredentials,
    pub subreddit: String,
    /// `None` posts without a label.
    pub flair_text: Option<String>,
    pub poll_interval: Duration,
    pub state_file: PathBuf,
    pub category_rules_path: Option<PathBuf>,
    pub metrics_addr: Option<SocketAddr>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Same as [`AppConfig::from_env`] over an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let reddit = RedditCredentials::from_lookup(&lookup)?;
        if reddit.refresh_token.is_none() {
            bail!(
                "missing required environment variable PRAW_REFRESH_TOKEN \
                 (run `cs2-update-poster auth refresh-token` to obtain one)"
            );
        }

        let subreddit = required(&lookup, "REDDIT_SUBREDDIT")?;
        let subreddit = subreddit
            .strip_prefix("r/")
            .or_else(|| subreddit.strip_prefix("/r/"))
            .unwrap_or(&subreddit)
            .to_string();

        // Unset means the default label; set-but-empty disables it.
        let flair_text = match lookup("REDDIT_FLAIR_TEXT") {
            None => Some(DEFAULT_FLAIR_TEXT.to_string()),
            Some(v) => Some(v.trim().to_string()).filter(|v| !v.is_empty()),
        };

        let poll_secs = match optional(&lookup, "STEAM_POLL_INTERVAL_SECONDS") {
            None => DEFAULT_POLL_INTERVAL_SECS,
            Some(v) => v
                .parse::<u64>()
                .with_context(|| format!("STEAM_POLL_INTERVAL_SECONDS is not a whole number: {v:?}"))?,
        };
        if poll_secs == 0 {
            bail!("STEAM_POLL_INTERVAL_SECONDS must be greater than 0");
        }

        let state_file = optional(&lookup, "STATE_FILE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_PATH));

        let metrics_addr = optional(&lookup, "METRICS_ADDR")
            .map(|v| {
                v.parse::<SocketAddr>()
                    .map_err(|e| anyhow!("METRICS_ADDR is not host:port ({v:?}): {e}"))
            })
            .transpose()?;

        Ok(Self {
            reddit,
            subreddit,
            flair_text,
            poll_interval: Duration::from_secs(poll_secs),
            state_file,
            category_rules_path: optional(&lookup, crate::ingest::config::ENV_PATH).map(PathBuf::from),
            metrics_addr,
        })
    }
}
