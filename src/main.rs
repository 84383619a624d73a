//! cs2-update-poster: binary entrypoint.
//! `run` (default) starts the poll loop; `auth refresh-token` mints Reddit credentials.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cs2_update_poster::config::{AppConfig, RedditCredentials};

/// Republish Counter-Strike 2 Steam updates to a subreddit.
#[derive(Parser)]
#[command(name = "cs2-update-poster")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the Steam feed and publish new events (default)
    Run,

    /// Reddit OAuth helpers
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
}

#[derive(Subcommand)]
enum AuthAction {
    /// Interactively obtain a permanent PRAW_REFRESH_TOKEN
    RefreshToken,
}

/// `RUST_LOG` filters (default `info`); `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let config = AppConfig::from_env()?;
            tracing::info!(
                subreddit = %config.subreddit,
                poll_interval_secs = config.poll_interval.as_secs(),
                state_file = %config.state_file.display(),
                "starting cs2-update-poster"
            );

            let cancel = CancellationToken::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                trigger.cancel();
            });

            cs2_update_poster::run_poster(config, cancel).await?;
            tracing::info!("shut down cleanly");
        }
        Commands::Auth {
            action: AuthAction::RefreshToken,
        } => {
            let creds = RedditCredentials::from_env()?;
            let token = cs2_update_poster::auth::run_refresh_token_flow(&creds).await?;
            println!("\nYour new PRAW_REFRESH_TOKEN is: {token}\n");
            println!("Add it to your environment or .env file:\nPRAW_REFRESH_TOKEN='{token}'");
        }
    }
    Ok(())
}
