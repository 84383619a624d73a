// src/state.rs
//! Persisted cursor: which event was handled last and when we last published.
//!
//! File shape (one JSON object):
//! `{"version": 1, "last_processed_event_posttime": 1710460800, "last_publish_time": 1710461000}`
//!
//! Files without `version` come from the first release and carry the same keys;
//! they are upgraded on the next save. Newer versions are refused.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

pub const STATE_VERSION: u32 = 1;
pub const DEFAULT_STATE_PATH: &str = "app_state.json";
/// How far ahead of the local clock a stored timestamp may lie.
pub const MAX_FUTURE_SKEW_SECS: i64 = 86_400;

/// Cursor over the upstream feed. `last_processed` never moves backwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    last_processed: Option<i64>,
    last_publish: Option<i64>,
}

impl Cursor {
    pub fn new(last_processed: Option<i64>, last_publish: Option<i64>) -> Self {
        Self {
            last_processed,
            last_publish,
        }
    }

    pub fn last_processed(&self) -> Option<i64> {
        self.last_processed
    }

    pub fn last_publish(&self) -> Option<i64> {
        self.last_publish
    }

    /// True if an event stamped `ts` has not been handled yet.
    pub fn is_new(&self, ts: i64) -> bool {
        self.last_processed.map_or(true, |p| ts > p)
    }

    pub fn mark_processed(&mut self, event_ts: i64) {
        self.last_processed = Some(self.last_processed.map_or(event_ts, |p| p.max(event_ts)));
    }

    pub fn mark_published(&mut self, event_ts: i64, now: i64) {
        self.mark_processed(event_ts);
        self.last_publish = Some(now);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("state file I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("state file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("state file top level is not an object")]
    NotAnObject,

    #[error("state file version {0} is newer than supported version {max}", max = STATE_VERSION)]
    UnsupportedVersion(u32),

    #[error("state file field `{field}` holds implausible timestamp {value}")]
    OutOfRange { field: &'static str, value: i64 },
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateRecord {
    #[serde(default)]
    version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_processed_event_posttime: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_publish_time: Option<i64>,
}

impl From<&Cursor> for StateRecord {
    fn from(c: &Cursor) -> Self {
        Self {
            version: Some(STATE_VERSION),
            last_processed_event_posttime: c.last_processed,
            last_publish_time: c.last_publish,
        }
    }
}

/// Parse the on-disk representation. Unknown keys are ignored.
pub fn decode(s: &str) -> Result<Cursor, StateError> {
    decode_at(s, chrono::Utc::now().timestamp())
}

/// Timestamps must be positive and at most [`MAX_FUTURE_SKEW_SECS`] past `now`.
fn check_ts(field: &'static str, value: Option<i64>, now: i64) -> Result<(), StateError> {
    match value {
        Some(v) if v <= 0 || v > now.saturating_add(MAX_FUTURE_SKEW_SECS) => {
            Err(StateError::OutOfRange { field, value: v })
        }
        _ => Ok(()),
    }
}

/// [`decode`] against an explicit clock reading.
pub fn decode_at(s: &str, now: i64) -> Result<Cursor, StateError> {
    let v: Value = serde_json::from_str(s)?;
    if !v.is_object() {
        return Err(StateError::NotAnObject);
    }
    let rec: StateRecord = serde_json::from_value(v)?;
    match rec.version {
        None | Some(0) => {
            tracing::debug!("upgrading unversioned state record");
        }
        Some(STATE_VERSION) => {}
        Some(v) => return Err(StateError::UnsupportedVersion(v)),
    }
    check_ts("last_processed_event_posttime", rec.last_processed_event_posttime, now)?;
    check_ts("last_publish_time", rec.last_publish_time, now)?;
    Ok(Cursor::new(
        rec.last_processed_event_posttime,
        rec.last_publish_time,
    ))
}

pub fn encode(cursor: &Cursor) -> Result<Vec<u8>, StateError> {
    Ok(serde_json::to_vec_pretty(&StateRecord::from(cursor))?)
}

#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Never fails: a missing or unusable file yields an empty cursor.
    pub async fn load(&self) -> Cursor {
        match fs::read_to_string(&self.path).await {
            Ok(s) => match decode(&s) {
                Ok(c) => {
                    tracing::info!(
                        path = %self.path.display(),
                        last_processed = ?c.last_processed,
                        last_publish = ?c.last_publish,
                        "loaded state"
                    );
                    c
                }
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), "ignoring state file: {e}; starting empty");
                    Cursor::default()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no state file; starting empty");
                Cursor::default()
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "cannot read state file: {e}; starting empty");
                Cursor::default()
            }
        }
    }

    /// Write to a sibling temp file, then rename over the target.
    pub async fn save(&self, cursor: &Cursor) -> Result<(), StateError> {
        let bytes = encode(cursor)?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await?;
        }
        let tmp = self.tmp_path();
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &self.path).await?;
        tracing::debug!(path = %self.path.display(), "saved state");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| DEFAULT_STATE_PATH.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
