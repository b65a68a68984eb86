//! In-process authoritative match server.
//!
//! [`InMemoryMatchServer`] keeps the server side of the model in memory and
//! enforces the same rules a real backend would: clock transitions are only
//! accepted from their valid source state, a game never has two active
//! possessions, and periods stop at the configured maximum. Its countdown is
//! derived from its own [`Clock`], so sharing a
//! [`ManualClock`](crate::clock::ManualClock) with a session gives fully
//! deterministic drift.
//!
//! # Feature gate
//!
//! Only available with the `memory-server` feature (enabled by default).
//!
//! # Example
//!
//! ```
//! # async fn example() -> match_clock_sync::Result<()> {
//! use std::sync::Arc;
//! use match_clock_sync::backends::InMemoryMatchServer;
//! use match_clock_sync::clock::SystemClock;
//! use match_clock_sync::protocol::{ClockAction, TimerState};
//! use match_clock_sync::MatchApi;
//!
//! let server = InMemoryMatchServer::new(Arc::new(SystemClock));
//! let game = server.create_game(600);
//! let clock = server.transition_clock(game, ClockAction::Start).await?;
//! assert_eq!(clock.timer_state, TimerState::Running);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::api::MatchApi;
use crate::clock::Clock;
use crate::error::{MatchClockError, Result};
use crate::error_codes::ErrorCode;
use crate::protocol::{
    ClockAction, GameId, MatchClock, MatchEvent, Possession, PossessionId, TeamId, TimerState,
};

const DEFAULT_MAX_PERIODS: u32 = 4;

fn rejected(code: ErrorCode) -> MatchClockError {
    MatchClockError::ServerError {
        message: String::new(),
        error_code: Some(code),
    }
}

/// Server-side record of one game's clock.
#[derive(Debug, Clone)]
struct GameRecord {
    clock: MatchClock,
    /// Countdown at the moment the clock last started running.
    running_since: Option<DateTime<Utc>>,
}

impl GameRecord {
    /// Authoritative clock as of `now`.
    fn current(&self, now: DateTime<Utc>) -> MatchClock {
        let mut clock = self.clock.clone();
        if let Some(since) = self.running_since {
            let elapsed = (now - since).num_seconds().max(0);
            clock.time_remaining_seconds = (clock.time_remaining_seconds - elapsed).max(0);
        }
        clock
    }

    /// Fold elapsed running time into the stored countdown.
    fn settle(&mut self, now: DateTime<Utc>) {
        self.clock = self.current(now);
        if self.running_since.is_some() {
            self.running_since = Some(now);
        }
    }
}

#[derive(Debug, Default)]
struct ServerState {
    games: HashMap<GameId, GameRecord>,
    possessions: Vec<Possession>,
    events: Vec<(GameId, MatchEvent)>,
}

impl ServerState {
    fn game_mut(&mut self, game_id: GameId) -> Result<&mut GameRecord> {
        self.games
            .get_mut(&game_id)
            .ok_or_else(|| rejected(ErrorCode::GameNotFound))
    }
}

/// Authoritative [`MatchApi`] living in the same process.
pub struct InMemoryMatchServer {
    clock: Arc<dyn Clock>,
    max_periods: u32,
    state: Mutex<ServerState>,
}

impl InMemoryMatchServer {
    pub fn new<C: Clock>(clock: Arc<C>) -> Self {
        Self {
            clock,
            max_periods: DEFAULT_MAX_PERIODS,
            state: Mutex::new(ServerState::default()),
        }
    }

    /// Number of periods after which `advance_period` is refused.
    #[must_use]
    pub fn with_max_periods(mut self, max_periods: u32) -> Self {
        self.max_periods = max_periods.max(1);
        self
    }

    fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a game with a stopped clock at the start of period 1.
    pub fn create_game(&self, period_duration_seconds: u32) -> GameId {
        let game_id = Uuid::new_v4();
        self.insert_clock(MatchClock {
            game_id,
            current_period: 1,
            timer_state: TimerState::Stopped,
            time_remaining_seconds: i64::from(period_duration_seconds),
            period_duration_seconds,
            started_at: None,
        });
        game_id
    }

    /// Seed or replace a game's clock. A running clock starts counting now.
    pub fn insert_clock(&self, clock: MatchClock) {
        let running_since = clock.timer_state.is_running().then(|| self.clock.now());
        self.state().games.insert(
            clock.game_id,
            GameRecord {
                clock,
                running_since,
            },
        );
    }

    /// Overwrite the authoritative countdown, as an operator correction would.
    pub fn set_time_remaining(&self, game_id: GameId, seconds: i64) -> Result<()> {
        let now = self.clock.now();
        let mut state = self.state();
        let game = state.game_mut(game_id)?;
        game.settle(now);
        game.clock.time_remaining_seconds = seconds;
        Ok(())
    }

    /// Seed a possession record directly.
    pub fn insert_possession(&self, possession: Possession) {
        self.state().possessions.push(possession);
    }

    /// Every possession of a game, oldest first.
    pub fn possessions(&self, game_id: GameId) -> Vec<Possession> {
        self.state()
            .possessions
            .iter()
            .filter(|p| p.game_id == game_id)
            .cloned()
            .collect()
    }

    /// Events recorded for a game, oldest first.
    pub fn events(&self, game_id: GameId) -> Vec<MatchEvent> {
        self.state()
            .events
            .iter()
            .filter(|(id, _)| *id == game_id)
            .map(|(_, event)| event.clone())
            .collect()
    }

    /// Current authoritative clock without going through the async trait.
    pub fn clock_of(&self, game_id: GameId) -> Option<MatchClock> {
        let now = self.clock.now();
        self.state().games.get(&game_id).map(|g| g.current(now))
    }
}

impl std::fmt::Debug for InMemoryMatchServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("InMemoryMatchServer")
            .field("games", &state.games.len())
            .field("possessions", &state.possessions.len())
            .field("max_periods", &self.max_periods)
            .finish()
    }
}

#[async_trait]
impl MatchApi for InMemoryMatchServer {
    async fn get_clock(&self, game_id: GameId) -> Result<MatchClock> {
        self.clock_of(game_id)
            .ok_or_else(|| rejected(ErrorCode::GameNotFound))
    }

    async fn transition_clock(&self, game_id: GameId, action: ClockAction) -> Result<MatchClock> {
        let now = self.clock.now();
        let mut state = self.state();
        let game = state.game_mut(game_id)?;
        game.settle(now);

        let from = game.clock.timer_state;
        match (action, from) {
            (ClockAction::Start, TimerState::Stopped) | (ClockAction::Resume, TimerState::Paused) => {
                game.clock.timer_state = TimerState::Running;
                game.clock.started_at = Some(now);
                game.running_since = Some(now);
            }
            (ClockAction::Start, _) => return Err(rejected(ErrorCode::ClockAlreadyRunning)),
            (ClockAction::Pause, TimerState::Running) => {
                game.clock.timer_state = TimerState::Paused;
                game.running_since = None;
            }
            (ClockAction::Pause, _) => return Err(rejected(ErrorCode::ClockNotRunning)),
            (ClockAction::Resume, _) => return Err(rejected(ErrorCode::InvalidTransition)),
            (ClockAction::Stop, _) => {
                game.clock.timer_state = TimerState::Stopped;
                game.clock.time_remaining_seconds = i64::from(game.clock.period_duration_seconds);
                game.clock.started_at = None;
                game.running_since = None;
            }
        }
        debug!(
            "memory server: game {game_id} {} ({from:?} -> {:?})",
            action.as_str(),
            game.clock.timer_state
        );
        Ok(game.clock.clone())
    }

    async fn advance_period(&self, game_id: GameId) -> Result<MatchClock> {
        let max_periods = self.max_periods;
        let mut state = self.state();
        let game = state.game_mut(game_id)?;
        if game.clock.current_period >= max_periods {
            return Err(rejected(ErrorCode::PeriodLimitReached));
        }
        game.clock.current_period += 1;
        game.clock.timer_state = TimerState::Stopped;
        game.clock.time_remaining_seconds = i64::from(game.clock.period_duration_seconds);
        game.clock.started_at = None;
        game.running_since = None;
        Ok(game.clock.clone())
    }

    async fn set_period_duration(&self, game_id: GameId, seconds: u32) -> Result<MatchClock> {
        if seconds == 0 {
            return Err(rejected(ErrorCode::InvalidInput));
        }
        let now = self.clock.now();
        let mut state = self.state();
        let game = state.game_mut(game_id)?;
        game.settle(now);
        game.clock.period_duration_seconds = seconds;
        debug!("memory server: game {game_id} period duration now {seconds}s");
        Ok(game.clock.clone())
    }

    async fn get_active_possession(&self, game_id: GameId) -> Result<Option<Possession>> {
        let state = self.state();
        if !state.games.contains_key(&game_id) {
            return Err(rejected(ErrorCode::GameNotFound));
        }
        Ok(state
            .possessions
            .iter()
            .find(|p| p.game_id == game_id && p.is_active())
            .cloned())
    }

    async fn create_possession(
        &self,
        game_id: GameId,
        team_id: TeamId,
        period: u32,
    ) -> Result<Possession> {
        let now = self.clock.now();
        let mut state = self.state();
        state.game_mut(game_id)?;
        if state
            .possessions
            .iter()
            .any(|p| p.game_id == game_id && p.is_active())
        {
            return Err(rejected(ErrorCode::PossessionAlreadyActive));
        }
        let possession = Possession {
            id: Uuid::new_v4(),
            game_id,
            team_id,
            period,
            started_at: now,
            ended_at: None,
            shots_taken: 0,
        };
        state.possessions.push(possession.clone());
        Ok(possession)
    }

    async fn end_possession(&self, possession_id: PossessionId) -> Result<Possession> {
        let now = self.clock.now();
        let mut state = self.state();
        let possession = state
            .possessions
            .iter_mut()
            .find(|p| p.id == possession_id)
            .ok_or(MatchClockError::NotFound)?;
        if !possession.is_active() {
            return Err(rejected(ErrorCode::PossessionAlreadyEnded));
        }
        possession.ended_at = Some(now);
        Ok(possession.clone())
    }

    async fn record_event(&self, game_id: GameId, event: MatchEvent) -> Result<()> {
        let mut state = self.state();
        state.game_mut(game_id)?;
        if event.is_shot_attempt() {
            let team_id = event.team_id();
            if let Some(active) = state
                .possessions
                .iter_mut()
                .find(|p| p.game_id == game_id && p.is_active() && p.team_id == team_id)
            {
                active.shots_taken += 1;
            }
        }
        state.events.push((game_id, event));
        Ok(())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn server() -> (InMemoryMatchServer, ManualClock) {
        let clock = ManualClock::new(DateTime::<Utc>::UNIX_EPOCH);
        (InMemoryMatchServer::new(Arc::new(clock.clone())), clock)
    }

    #[test]
    fn memory_server_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<InMemoryMatchServer>();
    }

    #[tokio::test]
    async fn countdown_follows_server_clock() {
        let (server, clock) = server();
        let game = server.create_game(600);
        server
            .transition_clock(game, ClockAction::Start)
            .await
            .unwrap();
        clock.advance_secs(42);
        let current = server.get_clock(game).await.unwrap();
        assert_eq!(current.time_remaining_seconds, 558);

        server
            .transition_clock(game, ClockAction::Pause)
            .await
            .unwrap();
        clock.advance_secs(100);
        let paused = server.get_clock(game).await.unwrap();
        assert_eq!(paused.time_remaining_seconds, 558);
    }

    #[tokio::test]
    async fn rejects_invalid_transitions() {
        let (server, _clock) = server();
        let game = server.create_game(600);
        let err = server
            .transition_clock(game, ClockAction::Pause)
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        server
            .transition_clock(game, ClockAction::Start)
            .await
            .unwrap();
        let err = server
            .transition_clock(game, ClockAction::Start)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MatchClockError::ServerError {
                error_code: Some(ErrorCode::ClockAlreadyRunning),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn only_one_active_possession() {
        let (server, _clock) = server();
        let game = server.create_game(600);
        let first = server
            .create_possession(game, Uuid::from_u128(1), 1)
            .await
            .unwrap();
        let err = server
            .create_possession(game, Uuid::from_u128(2), 1)
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        server.end_possession(first.id).await.unwrap();
        assert!(server.get_active_possession(game).await.unwrap().is_none());
        server
            .create_possession(game, Uuid::from_u128(2), 1)
            .await
            .unwrap();
        assert_eq!(server.possessions(game).len(), 2);
    }

    #[tokio::test]
    async fn stops_at_max_period() {
        let clock = ManualClock::new(DateTime::<Utc>::UNIX_EPOCH);
        let server = InMemoryMatchServer::new(Arc::new(clock)).with_max_periods(2);
        let game = server.create_game(300);
        let clock = server.advance_period(game).await.unwrap();
        assert_eq!(clock.current_period, 2);
        let err = server.advance_period(game).await.unwrap_err();
        assert!(matches!(
            err,
            MatchClockError::ServerError {
                error_code: Some(ErrorCode::PeriodLimitReached),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn shots_count_against_active_possession() {
        let (server, _clock) = server();
        let game = server.create_game(600);
        let team = Uuid::from_u128(5);
        server.create_possession(game, team, 1).await.unwrap();
        server
            .record_event(
                game,
                MatchEvent::Shot {
                    team_id: team,
                    player_id: Uuid::from_u128(9),
                    scored: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(server.possessions(game)[0].shots_taken, 1);
        assert_eq!(server.events(game).len(), 1);
    }

    #[tokio::test]
    async fn period_duration_applies_to_later_resets() {
        let (server, _clock) = server();
        let game = server.create_game(600);
        server
            .transition_clock(game, ClockAction::Start)
            .await
            .unwrap();

        let changed = server.set_period_duration(game, 120).await.unwrap();
        assert_eq!(changed.period_duration_seconds, 120);
        assert_eq!(changed.time_remaining_seconds, 600);

        let stopped = server
            .transition_clock(game, ClockAction::Stop)
            .await
            .unwrap();
        assert_eq!(stopped.time_remaining_seconds, 120);
        let next = server.advance_period(game).await.unwrap();
        assert_eq!(next.time_remaining_seconds, 120);

        let err = server.set_period_duration(game, 0).await.unwrap_err();
        assert!(matches!(
            err,
            MatchClockError::ServerError {
                error_code: Some(ErrorCode::InvalidInput),
                ..
            }
        ));
    }

    #[test]
    fn usable_from_blocking_code() {
        let (server, clock) = server();
        let game = server.create_game(90);
        tokio_test::block_on(async {
            tokio_test::assert_ok!(server.transition_clock(game, ClockAction::Start).await);
            clock.advance_secs(30);
            tokio_test::assert_err!(server.transition_clock(game, ClockAction::Resume).await);
            let stopped =
                tokio_test::assert_ok!(server.transition_clock(game, ClockAction::Stop).await);
            assert_eq!(stopped.time_remaining_seconds, 90);
        });
    }

    #[tokio::test]
    async fn unknown_game_is_rejected() {
        let (server, _clock) = server();
        let err = server.get_clock(Uuid::nil()).await.unwrap_err();
        assert_eq!(err.user_message(), ErrorCode::GameNotFound.description());
    }
}
