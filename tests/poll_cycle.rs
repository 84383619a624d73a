// tests/poll_cycle.rs
mod common;

use chrono::{TimeZone, Utc};
use common::{harness, harness_with_state, RecordingPublisher, ScriptedFeed};
use cs2_update_poster::ingest::classify::Category;
use cs2_update_poster::ingest::types::RawItem;
use cs2_update_poster::{Cursor, CycleOutcome, PublishOutcome};
use tokio_util::sync::CancellationToken;

fn ts(y: i32, m: u32, d: u32, h: u32) -> i64 {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap().timestamp()
}

fn handled(id: &str, outcome: PublishOutcome) -> CycleOutcome {
    CycleOutcome::Handled {
        id: id.to_string(),
        outcome,
    }
}

#[tokio::test]
async fn empty_feed_publishes_nothing_and_keeps_cursor() {
    let start = Cursor::new(Some(100), Some(50));
    let mut h = harness(
        ScriptedFeed::serving(vec![]),
        RecordingPublisher::default(),
        1_000,
        start,
        None,
    );
    let out = h.orchestrator.run_cycle(&CancellationToken::new()).await.unwrap();
    assert_eq!(out, CycleOutcome::EmptyFeed);
    assert!(h.publisher.published().is_empty());
    assert_eq!(*h.orchestrator.cursor(), start);
    assert!(!h.state_path().exists());
}

#[tokio::test]
async fn first_update_is_published_and_both_fields_persist() {
    let posted = ts(2025, 3, 14, 20);
    let now = posted + 120;
    let mut h = harness(
        ScriptedFeed::serving(vec![RawItem::new(
            "600",
            "Counter-Strike 2 Update",
            "[ MAPS ]\nFixed Anubis",
            posted,
        )]),
        RecordingPublisher::with_label("game update", "flair-9"),
        now,
        Cursor::default(),
        Some("Game Update"),
    );

    let out = h.orchestrator.run_cycle(&CancellationToken::new()).await.unwrap();
    assert_eq!(out, handled("600", PublishOutcome::Published));

    let published = h.publisher.published();
    assert_eq!(published.len(), 1);
    let req = &published[0];
    assert_eq!(req.title, "Counter-Strike 2 Update for March 14, 2025");
    assert_eq!(req.category, Category::Update);
    assert_eq!(
        req.url.as_deref(),
        Some("https://store.steampowered.com/news/app/730/view/600")
    );
    assert_eq!(req.label.as_ref().map(|l| l.0.as_str()), Some("flair-9"));

    let replies = h.publisher.replies();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].0, "t3_p1");
    assert!(replies[0].1.starts_with("### MAPS\nFixed Anubis"));

    let expected = Cursor::new(Some(posted), Some(now));
    assert_eq!(*h.orchestrator.cursor(), expected);
    assert_eq!(h.store().load().await, expected);
}

#[tokio::test]
async fn refetching_the_processed_event_does_not_republish() {
    let posted = ts(2025, 3, 14, 20);
    let mut h = harness(
        ScriptedFeed::serving(vec![RawItem::new("600", "Release Notes", "x", posted)]),
        RecordingPublisher::default(),
        posted + 60,
        Cursor::default(),
        None,
    );
    let cancel = CancellationToken::new();
    assert_eq!(
        h.orchestrator.run_cycle(&cancel).await.unwrap(),
        handled("600", PublishOutcome::Published)
    );
    for _ in 0..3 {
        assert_eq!(
            h.orchestrator.run_cycle(&cancel).await.unwrap(),
            CycleOutcome::NoNewEvent
        );
    }
    assert_eq!(h.publisher.published().len(), 1);
}

#[tokio::test]
async fn failed_publish_keeps_cursor_and_retries_next_cycle() {
    let posted = ts(2025, 3, 14, 20);
    let start = Cursor::new(Some(posted - 86_400), None);
    let publisher = RecordingPublisher::default();
    *publisher.fail_publish.lock().unwrap() = true;
    let mut h = harness(
        ScriptedFeed::serving(vec![RawItem::new("600", "Counter-Strike 2 Update", "x", posted)]),
        publisher,
        posted + 60,
        start,
        None,
    );
    let cancel = CancellationToken::new();

    assert_eq!(
        h.orchestrator.run_cycle(&cancel).await.unwrap(),
        handled("600", PublishOutcome::Failed)
    );
    assert_eq!(*h.orchestrator.cursor(), start);
    assert!(!h.state_path().exists());

    *h.publisher.fail_publish.lock().unwrap() = false;
    assert_eq!(
        h.orchestrator.run_cycle(&cancel).await.unwrap(),
        handled("600", PublishOutcome::Published)
    );
    assert_eq!(h.orchestrator.cursor().last_processed(), Some(posted));
}

#[tokio::test]
async fn event_inside_rate_window_is_consumed_without_publishing() {
    let last_publish = ts(2025, 3, 14, 10);
    let posted = last_publish + 3_000;
    let mut h = harness(
        ScriptedFeed::serving(vec![RawItem::new("601", "Counter-Strike 2 Update", "x", posted)]),
        RecordingPublisher::default(),
        last_publish + 7_199,
        Cursor::new(Some(last_publish - 10), Some(last_publish)),
        None,
    );
    let cancel = CancellationToken::new();

    assert_eq!(
        h.orchestrator.run_cycle(&cancel).await.unwrap(),
        handled("601", PublishOutcome::Skipped)
    );
    assert!(h.publisher.published().is_empty());
    let expected = Cursor::new(Some(posted), Some(last_publish));
    assert_eq!(*h.orchestrator.cursor(), expected);
    assert_eq!(h.store().load().await, expected);

    // The skipped event is not revisited once the window has passed.
    h.clock.advance(1);
    assert_eq!(
        h.orchestrator.run_cycle(&cancel).await.unwrap(),
        CycleOutcome::NoNewEvent
    );

    // A newer event exactly at the boundary goes out.
    h.feed.set(vec![
        RawItem::new("602", "Counter-Strike 2 Update", "y", posted + 100),
        RawItem::new("601", "Counter-Strike 2 Update", "x", posted),
    ]);
    assert_eq!(
        h.orchestrator.run_cycle(&cancel).await.unwrap(),
        handled("602", PublishOutcome::Published)
    );
    assert_eq!(h.publisher.published()[0].title.chars().last(), Some('2'));
}

#[tokio::test]
async fn reply_failure_still_counts_as_published() {
    let posted = ts(2025, 3, 14, 20);
    let publisher = RecordingPublisher::default();
    *publisher.fail_reply.lock().unwrap() = true;
    let mut h = harness(
        ScriptedFeed::serving(vec![RawItem::new("600", "Counter-Strike 2 Update", "[b]x[/b]", posted)]),
        publisher,
        posted + 60,
        Cursor::default(),
        None,
    );
    assert_eq!(
        h.orchestrator.run_cycle(&CancellationToken::new()).await.unwrap(),
        handled("600", PublishOutcome::Published)
    );
    assert!(h.publisher.replies().is_empty());
    assert_eq!(
        h.store().load().await,
        Cursor::new(Some(posted), Some(posted + 60))
    );
}

#[tokio::test]
async fn missing_label_posts_without_one() {
    let mut h = harness(
        ScriptedFeed::serving(vec![RawItem::new("700", "Major announced", "", 1_700_000_000)]),
        RecordingPublisher::with_label("Discussion", "f-1"),
        1_700_000_100,
        Cursor::default(),
        Some("Game Update"),
    );
    assert_eq!(
        h.orchestrator.run_cycle(&CancellationToken::new()).await.unwrap(),
        handled("700", PublishOutcome::Published)
    );
    assert_eq!(*h.publisher.label_lookups.lock().unwrap(), vec!["Game Update"]);
    let req = &h.publisher.published()[0];
    assert!(req.label.is_none());
    assert_eq!(req.category, Category::Announcement);
    assert_eq!(req.title, "Counter-Strike 2 Announcement: Major announced");
    // announcements carry no body reply
    assert!(h.publisher.replies().is_empty());
}

#[tokio::test]
async fn fetch_error_surfaces_as_cycle_error() {
    let mut h = harness(
        ScriptedFeed::failing(),
        RecordingPublisher::default(),
        0,
        Cursor::default(),
        None,
    );
    let err = h
        .orchestrator
        .run_cycle(&CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("502"));
    assert!(h.publisher.published().is_empty());
}

#[tokio::test]
async fn unwritable_state_file_keeps_in_memory_cursor_and_loop_alive() {
    let posted = ts(2025, 3, 14, 20);
    let now = posted + 60;
    // The state file's parent is a regular file, so every save fails.
    let mut h = harness_with_state(
        ScriptedFeed::serving(vec![RawItem::new("600", "Counter-Strike 2 Update", "x", posted)]),
        RecordingPublisher::default(),
        now,
        Cursor::default(),
        None,
        |dir| {
            std::fs::write(dir.join("blocker"), "not a directory").unwrap();
            dir.join("blocker").join("app_state.json")
        },
    );
    let cancel = CancellationToken::new();

    assert_eq!(
        h.orchestrator.run_cycle(&cancel).await.unwrap(),
        handled("600", PublishOutcome::Published)
    );
    assert_eq!(*h.orchestrator.cursor(), Cursor::new(Some(posted), Some(now)));
    assert!(!h.state_path().exists());

    // Same event again: the in-memory cursor still suppresses it.
    assert_eq!(
        h.orchestrator.run_cycle(&cancel).await.unwrap(),
        CycleOutcome::NoNewEvent
    );

    // A newer event inside the rate window is consumed in memory only.
    h.feed.set(vec![RawItem::new("601", "Counter-Strike 2 Update", "y", posted + 30)]);
    h.clock.advance(60);
    assert_eq!(
        h.orchestrator.run_cycle(&cancel).await.unwrap(),
        handled("601", PublishOutcome::Skipped)
    );
    assert_eq!(*h.orchestrator.cursor(), Cursor::new(Some(posted + 30), Some(now)));
    assert_eq!(h.publisher.published().len(), 1);
    assert!(!h.state_path().exists());
}

#[tokio::test]
async fn extreme_last_publish_does_not_abort_the_cycle() {
    let posted = ts(2025, 3, 14, 20);
    for last_publish in [i64::MIN, i64::MAX, 10_000_000_000_000_000] {
        let mut h = harness(
            ScriptedFeed::serving(vec![RawItem::new("600", "Release Notes", "x", posted)]),
            RecordingPublisher::default(),
            posted + 60,
            Cursor::new(None, Some(last_publish)),
            None,
        );
        let out = h.orchestrator.run_cycle(&CancellationToken::new()).await.unwrap();
        assert!(matches!(out, CycleOutcome::Handled { .. }), "{last_publish}: {out:?}");
        assert_eq!(h.orchestrator.cursor().last_processed(), Some(posted));
    }
}

#[tokio::test]
async fn implausible_state_file_restarts_from_empty_cursor() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app_state.json");
    std::fs::write(
        &path,
        r#"{"version":1,"last_processed_event_posttime":1710460800,"last_publish_time":-9223372036854775808}"#,
    )
    .unwrap();
    let cursor = cs2_update_poster::StateStore::new(&path).load().await;
    assert_eq!(cursor, Cursor::default());

    let posted = ts(2025, 3, 14, 20);
    let mut h = harness(
        ScriptedFeed::serving(vec![RawItem::new("600", "Release Notes", "x", posted)]),
        RecordingPublisher::default(),
        posted + 60,
        cursor,
        None,
    );
    assert_eq!(
        h.orchestrator.run_cycle(&CancellationToken::new()).await.unwrap(),
        handled("600", PublishOutcome::Published)
    );
}
