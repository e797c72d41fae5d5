//! Leaderboard sync binary: follows the live leaderboard and logs every change.

use anyhow::Context;
use leaderboard_sync::{ClientConfig, Connectivity, SyncClient, SyncState};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = ClientConfig::load();
    let client = SyncClient::start(&config).context("starting leaderboard sync")?;
    info!(session = %client.session_id(), "leaderboard sync running");

    let mut updates = client.subscribe();
    let mut last = SyncState::default();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = updates.borrow_and_update().clone();
                report(&config, &last, &current);
                last = current;
            }
        }
    }

    info!("shutting down");
    client.dispose().await;
    Ok(())
}

/// Log what changed between two published states.
fn report(config: &ClientConfig, previous: &SyncState, current: &SyncState) {
    if previous.connectivity != current.connectivity {
        match current.connectivity {
            Connectivity::Disconnected => info!("push channel down; showing last known leaderboard"),
            other => info!(connectivity = %other, "connectivity changed"),
        }
    }

    if previous.leaderboard != current.leaderboard {
        for standing in current.leaderboard.standings(&config.prizes) {
            info!(
                rank = standing.entry.rank,
                username = %standing.entry.username,
                wagered = standing.entry.wagered,
                prize = standing.prize,
                "standing"
            );
        }
    }

    if previous.countdown != current.countdown {
        debug!(remaining = %current.countdown, "countdown");
    }
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,leaderboard_sync=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
