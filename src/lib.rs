// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod auth;
pub mod clock;
pub mod config;
pub mod ingest;
pub mod metrics;
pub mod orchestrator;
pub mod publish;
pub mod state;
pub mod transform;

// ---- Re-exports for stable public API ----
pub use crate::config::AppConfig;
pub use crate::orchestrator::{CycleOutcome, Orchestrator};
pub use crate::publish::gate::{PublishGate, PublishOutcome};
pub use crate::state::{Cursor, StateStore};

use anyhow::Context;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::clock::SystemClock;
use crate::ingest::classify::EventClassifier;
use crate::ingest::providers::steam::SteamEventsFeed;
use crate::publish::reddit::RedditPublisher;

/// Wire the live adapters together and poll until `cancel` fires.
pub async fn run_poster(config: AppConfig, cancel: CancellationToken) -> anyhow::Result<()> {
    if let Some(addr) = config.metrics_addr {
        crate::metrics::install_exporter(addr)?;
    }

    let rules = match &config.category_rules_path {
        Some(path) => ingest::config::load_rules_from(path)?,
        None => ingest::config::load_rules_default()?,
    };
    tracing::info!(rules = rules.rules().len(), fallback = ?rules.fallback(), "category rules loaded");

    // Steam requests may take at most one poll interval.
    let feed = SteamEventsFeed::new(config.poll_interval).context("building Steam client")?;

    let reddit = RedditPublisher::new(config.reddit.clone(), config.subreddit.clone())
        .context("building Reddit client")?;
    let user = reddit
        .verify()
        .await
        .context("Reddit authentication failed; check PRAW_* credentials")?;
    tracing::info!(user = %user, subreddit = %reddit.subreddit(), "authenticated with Reddit");

    let store = StateStore::new(&config.state_file);
    let cursor = store.load().await;

    let gate = PublishGate::new(Arc::new(reddit), store, Arc::new(SystemClock))
        .with_label(config.flair_text.clone());

    let orchestrator = Orchestrator::new(
        Arc::new(feed),
        EventClassifier::new(rules),
        gate,
        cursor,
        config.poll_interval,
    );
    orchestrator.run(cancel).await;
    Ok(())
}
