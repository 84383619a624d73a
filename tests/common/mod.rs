// tests/common/mod.rs
#![allow(dead_code)]

use async_trait::async_trait;
use cs2_update_poster::clock::FixedClock;
use cs2_update_poster::ingest::classify::EventClassifier;
use cs2_update_poster::ingest::types::{FeedSource, FetchError, RawItem};
use cs2_update_poster::publish::{
    LabelId, PostHandle, PublishError, PublishRequest, Publisher, ReplyHandle,
};
use cs2_update_poster::{Cursor, Orchestrator, PublishGate, StateStore};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Feed whose next page can be swapped between cycles.
#[derive(Default)]
pub struct ScriptedFeed {
    page: Mutex<Option<Vec<RawItem>>>,
    pub calls: AtomicUsize,
}

impl ScriptedFeed {
    pub fn serving(items: Vec<RawItem>) -> Self {
        let f = Self::default();
        f.set(items);
        f
    }

    pub fn failing() -> Self {
        Self::default()
    }

    pub fn set(&self, items: Vec<RawItem>) {
        *self.page.lock().unwrap() = Some(items);
    }

    pub fn fail(&self) {
        *self.page.lock().unwrap() = None;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedSource for ScriptedFeed {
    async fn fetch(&self) -> Result<Vec<RawItem>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.page
            .lock()
            .unwrap()
            .clone()
            .ok_or(FetchError::Status { status: 502 })
    }
    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Publisher that records every call; failures can be switched on.
#[derive(Default)]
pub struct RecordingPublisher {
    pub published: Mutex<Vec<PublishRequest>>,
    pub replies: Mutex<Vec<(String, String)>>,
    pub label_lookups: Mutex<Vec<String>>,
    pub labels: Mutex<Vec<(String, String)>>,
    pub fail_publish: Mutex<bool>,
    pub fail_reply: Mutex<bool>,
}

impl RecordingPublisher {
    pub fn with_label(text: &str, id: &str) -> Self {
        let p = Self::default();
        p.labels.lock().unwrap().push((text.to_string(), id.to_string()));
        p
    }

    pub fn published(&self) -> Vec<PublishRequest> {
        self.published.lock().unwrap().clone()
    }

    pub fn replies(&self) -> Vec<(String, String)> {
        self.replies.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, req: &PublishRequest) -> Result<PostHandle, PublishError> {
        if *self.fail_publish.lock().unwrap() {
            return Err(PublishError::Rejected("SUBREDDIT_NOTALLOWED".into()));
        }
        let mut published = self.published.lock().unwrap();
        published.push(req.clone());
        let id = format!("p{}", published.len());
        Ok(PostHandle {
            fullname: format!("t3_{id}"),
            url: Some(format!("https://www.reddit.com/r/test/comments/{id}/")),
            id,
        })
    }

    async fn reply(&self, post: &PostHandle, body: &str) -> Result<ReplyHandle, PublishError> {
        if *self.fail_reply.lock().unwrap() {
            return Err(PublishError::Status {
                status: 500,
                body: "internal".into(),
            });
        }
        self.replies
            .lock()
            .unwrap()
            .push((post.fullname.clone(), body.to_string()));
        Ok(ReplyHandle { id: "c1".into() })
    }

    async fn find_label(&self, name: &str) -> Result<Option<LabelId>, PublishError> {
        self.label_lookups.lock().unwrap().push(name.to_string());
        Ok(self
            .labels
            .lock()
            .unwrap()
            .iter()
            .find(|(text, _)| text.eq_ignore_ascii_case(name))
            .map(|(_, id)| LabelId(id.clone())))
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub state_path: PathBuf,
    pub feed: Arc<ScriptedFeed>,
    pub publisher: Arc<RecordingPublisher>,
    pub clock: Arc<FixedClock>,
    pub orchestrator: Orchestrator,
}

impl Harness {
    pub fn state_path(&self) -> PathBuf {
        self.state_path.clone()
    }

    pub fn store(&self) -> StateStore {
        StateStore::new(self.state_path())
    }
}

pub fn harness(
    feed: ScriptedFeed,
    publisher: RecordingPublisher,
    now: i64,
    cursor: Cursor,
    label: Option<&str>,
) -> Harness {
    harness_with_state(feed, publisher, now, cursor, label, |dir| dir.join("app_state.json"))
}

/// Like [`harness`], with the state file location chosen inside the temp dir.
pub fn harness_with_state(
    feed: ScriptedFeed,
    publisher: RecordingPublisher,
    now: i64,
    cursor: Cursor,
    label: Option<&str>,
    state_path: impl FnOnce(&Path) -> PathBuf,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let state_path = state_path(dir.path());
    let feed = Arc::new(feed);
    let publisher = Arc::new(publisher);
    let clock = Arc::new(FixedClock::new(now));
    let gate = PublishGate::new(
        publisher.clone(),
        StateStore::new(&state_path),
        clock.clone(),
    )
    .with_label(label.map(str::to_string));
    let orchestrator = Orchestrator::new(
        feed.clone(),
        EventClassifier::default(),
        gate,
        cursor,
        Duration::from_secs(10),
    );
    Harness {
        dir,
        state_path,
        feed,
        publisher,
        clock,
        orchestrator,
    }
}
