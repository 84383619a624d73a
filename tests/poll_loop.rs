// tests/poll_loop.rs
mod common;

use common::{harness, RecordingPublisher, ScriptedFeed};
use cs2_update_poster::ingest::types::RawItem;
use cs2_update_poster::Cursor;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn loop_sleeps_poll_interval_between_cycles() {
    let h = harness(
        ScriptedFeed::serving(vec![]),
        RecordingPublisher::default(),
        0,
        Cursor::default(),
        None,
    );
    let feed = h.feed.clone();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(h.orchestrator.run(cancel.clone()));

    // cycles at t = 0, 10, 20
    tokio::time::sleep(Duration::from_secs(25)).await;
    cancel.cancel();
    let cursor = task.await.unwrap();
    assert_eq!(feed.calls(), 3);
    assert_eq!(cursor, Cursor::default());
}

#[tokio::test(start_paused = true)]
async fn fetch_errors_back_off_then_recover() {
    let h = harness(
        ScriptedFeed::failing(),
        RecordingPublisher::default(),
        1_700_000_000,
        Cursor::default(),
        None,
    );
    let feed = h.feed.clone();
    let publisher = h.publisher.clone();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(h.orchestrator.run(cancel.clone()));

    // failures at t = 0 and 30
    tokio::time::sleep(Duration::from_secs(45)).await;
    assert_eq!(feed.calls(), 2);

    // next attempt at t = 60 succeeds and publishes
    feed.set(vec![RawItem::new("1", "Release Notes", "x", 1_699_999_000)]);
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(feed.calls(), 3);
    assert_eq!(publisher.published().len(), 1);

    cancel.cancel();
    let cursor = task.await.unwrap();
    assert_eq!(cursor.last_processed(), Some(1_699_999_000));
    assert_eq!(cursor.last_publish(), Some(1_700_000_000));
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_the_sleep() {
    let h = harness(
        ScriptedFeed::failing(),
        RecordingPublisher::default(),
        0,
        Cursor::default(),
        None,
    );
    let feed = h.feed.clone();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(h.orchestrator.run(cancel.clone()));

    tokio::time::sleep(Duration::from_secs(1)).await;
    cancel.cancel();
    // returns without waiting out the 30 s back-off
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("loop did not stop")
        .unwrap();
    assert_eq!(feed.calls(), 1);
}
