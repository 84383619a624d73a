use async_trait::async_trait;
use metrics::histogram;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

use crate::ingest::types::{FeedSource, FetchError, RawItem};

pub const STEAM_EVENTS_URL: &str =
    "https://store.steampowered.com/events/ajaxgetpartnereventspageable/";
pub const CS2_APP_ID: u32 = 730;
const PAGE_SIZE: u32 = 100;
const USER_AGENT: &str = "CS2UpdateAnnouncer/1.0";

#[derive(Debug, Deserialize)]
struct EventsPage {
    success: Option<i64>,
    err_msg: Option<String>,
    #[serde(default)]
    events: Option<Value>,
}

/// Steam partner events for Counter-Strike 2, one page per fetch.
pub struct SteamEventsFeed {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl SteamEventsFeed {
    /// HTTP mode. The client timeout equals the poll interval.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        Self::with_url(STEAM_EVENTS_URL, timeout)
    }

    pub fn with_url(url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            mode: Mode::Http {
                url: url.into(),
                client,
            },
        })
    }

    /// Serve a captured response body instead of hitting the network.
    pub fn from_fixture_str(s: &str) -> Self {
        Self {
            mode: Mode::Fixture(s.to_string()),
        }
    }

    fn query() -> [(&'static str, String); 6] {
        [
            ("clan_accountid", "0".to_string()),
            ("appid", CS2_APP_ID.to_string()),
            ("offset", "0".to_string()),
            ("count", PAGE_SIZE.to_string()),
            ("l", "english".to_string()),
            ("origin", "https://www.counter-strike.net".to_string()),
        ]
    }

    pub(crate) fn parse_page(body: &str) -> Result<Vec<RawItem>, FetchError> {
        let t0 = std::time::Instant::now();
        let top: Value = serde_json::from_str(body)
            .map_err(|e| FetchError::Malformed(format!("invalid JSON: {e}")))?;
        if !top.is_object() {
            return Err(FetchError::Malformed("top-level payload is not an object".into()));
        }
        let page: EventsPage = serde_json::from_value(top)
            .map_err(|e| FetchError::Malformed(format!("unexpected shape: {e}")))?;

        if page.success != Some(1) {
            return Err(FetchError::Rejected(
                page.err_msg.unwrap_or_else(|| "no error message".to_string()),
            ));
        }

        let events = match page.events {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(v)) => v,
            Some(_) => return Err(FetchError::Malformed("`events` is not an array".into())),
        };

        let out: Vec<RawItem> = events.iter().map(raw_item_from_event).collect();

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("poster_feed_parse_ms").record(ms);
        tracing::debug!(items = out.len(), "parsed steam events page");
        Ok(out)
    }
}

/// Steam ids arrive as strings but are occasionally numbers.
fn id_value(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn raw_item_from_event(event: &Value) -> RawItem {
    let ann = event.get("announcement_body");

    let mut metadata = Map::new();
    for key in ["gid", "event_name", "event_type", "rtime32_start_time"] {
        if let Some(v) = event.get(key) {
            metadata.insert(key.to_string(), v.clone());
        }
    }
    if let Some(tags) = ann.and_then(|a| a.get("tags")) {
        metadata.insert("tags".to_string(), tags.clone());
    }

    let Some(ann) = ann.filter(|a| a.is_object()) else {
        return RawItem {
            metadata,
            ..RawItem::default()
        };
    };

    RawItem {
        id: id_value(ann.get("gid")),
        headline: ann.get("headline").and_then(Value::as_str).map(str::to_string),
        body: ann.get("body").and_then(Value::as_str).map(str::to_string),
        timestamp: ann.get("posttime").and_then(Value::as_i64),
        metadata,
    }
}

#[async_trait]
impl FeedSource for SteamEventsFeed {
    async fn fetch(&self) -> Result<Vec<RawItem>, FetchError> {
        match &self.mode {
            Mode::Fixture(s) => Self::parse_page(s),
            Mode::Http { url, client } => {
                let resp = client.get(url).query(&Self::query()).send().await?;
                let status = resp.status();
                if !status.is_success() {
                    tracing::debug!(%status, "steam events request rejected");
                    return Err(FetchError::Status {
                        status: status.as_u16(),
                    });
                }
                let body = resp.text().await?;
                Self::parse_page(&body)
            }
        }
    }

    fn name(&self) -> &'static str {
        "steam"
    }
}
