#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for match-clock-sync integration tests.
//!
//! Provides [`ScriptedApi`], a [`MatchApi`] wrapper around the in-memory
//! server that records every call and lets a test inject failures or hold a
//! response until the test releases it.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use match_clock_sync::protocol::{
    ClockAction, GameId, MatchClock, MatchEvent, Possession, PossessionId, TeamId, TimerState,
};
use match_clock_sync::{
    ConfirmPrompt, InMemoryMatchServer, ManualClock, MatchApi, MatchClockError, MatchSession,
    Result, SessionConfig, SessionEvent,
};

// ── ScriptedApi ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiOp {
    GetClock,
    TransitionClock,
    AdvancePeriod,
    SetPeriodDuration,
    GetActivePossession,
    CreatePossession,
    EndPossession,
    RecordEvent,
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiCall {
    pub op: ApiOp,
    pub action: Option<ClockAction>,
}

/// How a held call is released.
#[derive(Debug)]
pub enum Release {
    /// Pass the call through to the server.
    Forward,
    /// Fail the call without reaching the server.
    Fail(MatchClockError),
}

pub struct ScriptedApi {
    pub server: Arc<InMemoryMatchServer>,
    calls: StdMutex<Vec<ApiCall>>,
    failures: StdMutex<HashMap<ApiOp, VecDeque<MatchClockError>>>,
    holds: StdMutex<HashMap<ApiOp, VecDeque<oneshot::Receiver<Release>>>>,
}

impl ScriptedApi {
    pub fn new(server: Arc<InMemoryMatchServer>) -> Self {
        Self {
            server,
            calls: StdMutex::new(Vec::new()),
            failures: StdMutex::new(HashMap::new()),
            holds: StdMutex::new(HashMap::new()),
        }
    }

    /// Fail the next call of `op` with `err`.
    pub fn fail_next(&self, op: ApiOp, err: MatchClockError) {
        self.failures
            .lock()
            .unwrap()
            .entry(op)
            .or_default()
            .push_back(err);
    }

    /// Hold the next call of `op` until the returned sender is used.
    pub fn hold_next(&self, op: ApiOp) -> oneshot::Sender<Release> {
        let (tx, rx) = oneshot::channel();
        self.holds
            .lock()
            .unwrap()
            .entry(op)
            .or_default()
            .push_back(rx);
        tx
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, op: ApiOp) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.op == op).count()
    }

    pub fn transitions(&self) -> Vec<ClockAction> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| c.action)
            .collect()
    }

    async fn intercept(&self, op: ApiOp, action: Option<ClockAction>) -> Result<()> {
        self.calls.lock().unwrap().push(ApiCall { op, action });
        let hold = self
            .holds
            .lock()
            .unwrap()
            .get_mut(&op)
            .and_then(VecDeque::pop_front);
        if let Some(rx) = hold {
            if let Ok(Release::Fail(err)) = rx.await {
                return Err(err);
            }
        }
        let failure = self
            .failures
            .lock()
            .unwrap()
            .get_mut(&op)
            .and_then(VecDeque::pop_front);
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MatchApi for ScriptedApi {
    async fn get_clock(&self, game_id: GameId) -> Result<MatchClock> {
        self.intercept(ApiOp::GetClock, None).await?;
        self.server.get_clock(game_id).await
    }

    async fn transition_clock(&self, game_id: GameId, action: ClockAction) -> Result<MatchClock> {
        self.intercept(ApiOp::TransitionClock, Some(action)).await?;
        self.server.transition_clock(game_id, action).await
    }

    async fn advance_period(&self, game_id: GameId) -> Result<MatchClock> {
        self.intercept(ApiOp::AdvancePeriod, None).await?;
        self.server.advance_period(game_id).await
    }

    async fn set_period_duration(&self, game_id: GameId, seconds: u32) -> Result<MatchClock> {
        self.intercept(ApiOp::SetPeriodDuration, None).await?;
        self.server.set_period_duration(game_id, seconds).await
    }

    async fn get_active_possession(&self, game_id: GameId) -> Result<Option<Possession>> {
        self.intercept(ApiOp::GetActivePossession, None).await?;
        self.server.get_active_possession(game_id).await
    }

    async fn create_possession(
        &self,
        game_id: GameId,
        team_id: TeamId,
        period: u32,
    ) -> Result<Possession> {
        self.intercept(ApiOp::CreatePossession, None).await?;
        self.server.create_possession(game_id, team_id, period).await
    }

    async fn end_possession(&self, possession_id: PossessionId) -> Result<Possession> {
        self.intercept(ApiOp::EndPossession, None).await?;
        self.server.end_possession(possession_id).await
    }

    async fn record_event(&self, game_id: GameId, event: MatchEvent) -> Result<()> {
        self.intercept(ApiOp::RecordEvent, None).await?;
        self.server.record_event(game_id, event).await
    }
}

// ── Harness ─────────────────────────────────────────────────────────

pub const HOME: TeamId = Uuid::from_u128(0x11);
pub const AWAY: TeamId = Uuid::from_u128(0x22);

pub fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

pub fn transport_error() -> MatchClockError {
    MatchClockError::Transport("connection reset".into())
}

/// A server, a call-recording API in front of it and a shared manual clock.
pub struct Backend {
    pub server: Arc<InMemoryMatchServer>,
    pub api: Arc<ScriptedApi>,
    pub clock: ManualClock,
    pub game: GameId,
}

impl Backend {
    /// A fresh game: stopped clock, period 1, `period_duration` seconds.
    pub fn new(period_duration: u32) -> Self {
        Self::with_max_periods(period_duration, 4)
    }

    pub fn with_max_periods(period_duration: u32, max_periods: u32) -> Self {
        let clock = ManualClock::new(epoch());
        let server = Arc::new(
            InMemoryMatchServer::new(Arc::new(clock.clone())).with_max_periods(max_periods),
        );
        let game = server.create_game(period_duration);
        let api = Arc::new(ScriptedApi::new(Arc::clone(&server)));
        Self {
            server,
            api,
            clock,
            game,
        }
    }

    /// Put the server's clock into `state` with `remaining` seconds left.
    pub fn seed_clock(&self, state: TimerState, remaining: i64, period_duration: u32) {
        self.server.insert_clock(MatchClock {
            game_id: self.game,
            current_period: 1,
            timer_state: state,
            time_remaining_seconds: remaining,
            period_duration_seconds: period_duration,
            started_at: state.is_running().then(epoch),
        });
    }

    pub fn config(&self) -> SessionConfig {
        SessionConfig::new(self.game, HOME, AWAY)
    }

    pub async fn connect<P: ConfirmPrompt>(
        &self,
        prompt: Arc<P>,
        config: SessionConfig,
    ) -> (MatchSession, mpsc::Receiver<SessionEvent>) {
        MatchSession::connect(
            Arc::clone(&self.api),
            Arc::new(self.clock.clone()),
            prompt,
            config,
        )
        .await
        .expect("connect")
    }
}

/// Collect every event currently queued, without waiting.
pub fn drain(rx: &mut mpsc::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
