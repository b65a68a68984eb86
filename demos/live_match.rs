//! # Live Match Example
//!
//! Drives a short match against the in-process server:
//!
//! 1. Create a game with a 5-second period
//! 2. Start the clock (the home team gets the first possession)
//! 3. Record a few events and hand the ball over
//! 4. Let the period run out and record one more event through the prompt
//! 5. Advance to the next period and end the match
//!
//! ## Running
//!
//! ```sh
//! cargo run --example live_match
//!
//! # See every tick and remote call:
//! RUST_LOG=debug cargo run --example live_match
//! ```

use std::sync::Arc;
use std::time::Duration;

use match_clock_sync::protocol::MatchEvent;
use match_clock_sync::{
    ConfirmPrompt, InMemoryMatchServer, MatchSession, PeriodOpening, SessionConfig, SessionEvent,
    SystemClock,
};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Answers every period-end prompt with "yes" and logs the question.
struct LoggingPrompt;

impl ConfirmPrompt for LoggingPrompt {
    fn confirm(&self, message: &str) -> bool {
        tracing::info!("prompt: {message} -> yes");
        true
    }
}

fn spawn_event_logger(mut events: mpsc::Receiver<SessionEvent>) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::CountdownTick { time_remaining } => {
                    tracing::info!("clock {}:{:02}", time_remaining / 60, time_remaining % 60);
                }
                SessionEvent::PossessionDurationTick { seconds } => {
                    tracing::debug!("possession {seconds}s");
                }
                other => tracing::info!("{other:?}"),
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Setup ───────────────────────────────────────────────────────
    let clock = Arc::new(SystemClock);
    let server = Arc::new(InMemoryMatchServer::new(Arc::clone(&clock)).with_max_periods(2));
    let game = server.create_game(5);
    let (home, away) = (Uuid::new_v4(), Uuid::new_v4());
    let player = Uuid::new_v4();

    let config = SessionConfig::new(game, home, away)
        .with_max_periods(2)
        .with_reconcile_interval(Duration::from_secs(2))
        .with_period_opening(PeriodOpening::Alternate);
    let (session, events) =
        MatchSession::connect(Arc::clone(&server), clock, Arc::new(LoggingPrompt), config)
            .await?;
    spawn_event_logger(events);

    // ── Period 1 ────────────────────────────────────────────────────
    session.start().await?;
    tokio::time::sleep(Duration::from_secs(2)).await;
    session
        .record_event(MatchEvent::Shot {
            team_id: home,
            player_id: player,
            scored: true,
        })
        .await?;
    session.change_possession(away).await?;
    session
        .record_event(MatchEvent::Fault {
            team_id: away,
            player_id: None,
        })
        .await?;

    // Let the period run out.
    tokio::time::sleep(Duration::from_secs(4)).await;
    tracing::info!("period ended: {}", session.period_ended().await);
    session
        .record_event(MatchEvent::Timeout { team_id: home })
        .await?;

    // ── Period 2 ────────────────────────────────────────────────────
    session.advance_period().await?;
    session.start().await?;
    tokio::time::sleep(Duration::from_secs(2)).await;
    session.end_match().await?;

    let snapshot = session.snapshot().await;
    tracing::info!("final: {}", serde_json::to_string(&snapshot)?);
    tracing::info!(
        "server recorded {} events across {} possessions",
        server.events(game).len(),
        server.possessions(game).len()
    );
    Ok(())
}
