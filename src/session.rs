//! Per-match session composing the clock, possession, period and reconcile
//! components.
//!
//! [`MatchSession`] is an explicit object owned by whoever has the match open
//! (one per match view). It holds the only mutable projection of the server's
//! clock and active possession, applies user actions optimistically, issues
//! the remote calls, and keeps three repeating tickers scheduled exactly while
//! they are needed:
//!
//! | ticker     | period              | runs while                              |
//! |------------|---------------------|-----------------------------------------|
//! | countdown  | 1 s                 | clock running                           |
//! | possession | 1 s                 | clock running and a possession active   |
//! | reconcile  | `reconcile_interval` | clock running                          |
//!
//! # Example
//!
//! ```rust,ignore
//! let config = SessionConfig::new(game_id, home, away).with_max_periods(2);
//! let (session, mut events) =
//!     MatchSession::connect(api, Arc::new(SystemClock), prompt, config).await?;
//!
//! session.start().await?;
//! if !session.record_event(MatchEvent::Timeout { team_id: home }).await? {
//!     // blocked at the period-end prompt
//! }
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::api::MatchApi;
use crate::clock::Clock;
use crate::confirm::ConfirmPrompt;
use crate::error::{MatchClockError, Result};
use crate::event::SessionEvent;
use crate::period::{BoundaryOutcome, PeriodLifecycleManager};
use crate::possession::PossessionTracker;
use crate::protocol::{
    ClockAction, GameId, MatchEvent, Possession, SessionSnapshot, TeamId, TimerState,
};
use crate::reconcile::ClockReconciler;
use crate::ticker::Ticker;
use crate::timer::{clamp_remaining, TimerController};

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default number of periods in a match.
const DEFAULT_MAX_PERIODS: u32 = 4;

/// Default interval between server reconciliations.
const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(5);

/// Countdown and possession ticks.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Seconds removed from the countdown per tick.
const COUNTDOWN_STEP_SECONDS: u32 = 1;

// ── Configuration ───────────────────────────────────────────────────

/// Which team, if any, gets a possession when a new period opens.
///
/// Which team starts a period is a rule of the competition, not of the clock,
/// so the engine only offers the common choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeriodOpening {
    /// No possession is created; the user picks one explicitly.
    #[default]
    None,
    /// The home team starts every period.
    HomeTeam,
    /// Home starts odd periods, away starts even periods.
    Alternate,
}

impl PeriodOpening {
    fn team_for(self, period: u32, home: TeamId, away: TeamId) -> Option<TeamId> {
        match self {
            Self::None => None,
            Self::HomeTeam => Some(home),
            Self::Alternate if period % 2 == 0 => Some(away),
            Self::Alternate => Some(home),
        }
    }
}

/// Configuration for a [`MatchSession`].
///
/// # Example
///
/// ```
/// use match_clock_sync::session::{PeriodOpening, SessionConfig};
/// use std::time::Duration;
/// use uuid::Uuid;
///
/// let config = SessionConfig::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4())
///     .with_max_periods(2)
///     .with_reconcile_interval(Duration::from_secs(10))
///     .with_period_opening(PeriodOpening::Alternate);
/// assert_eq!(config.max_periods, 2);
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub game_id: GameId,
    /// Team that receives the automatic first possession.
    pub home_team: TeamId,
    pub away_team: TeamId,
    /// Periods in the match. Defaults to **4**; values below 1 are clamped to 1.
    pub max_periods: u32,
    /// Period duration (seconds) pushed to the server on connect when it
    /// differs from the server's. `None` keeps the server's value.
    pub period_duration: Option<u32>,
    /// How often a running clock is reconciled. Defaults to **5 seconds**.
    pub reconcile_interval: Duration,
    /// Capacity of the bounded event channel. Defaults to **256**; values
    /// below 1 are clamped to 1. A full channel drops events with a warning.
    pub event_channel_capacity: usize,
    pub period_opening: PeriodOpening,
}

impl SessionConfig {
    pub fn new(game_id: GameId, home_team: TeamId, away_team: TeamId) -> Self {
        Self {
            game_id,
            home_team,
            away_team,
            max_periods: DEFAULT_MAX_PERIODS,
            period_duration: None,
            reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            period_opening: PeriodOpening::default(),
        }
    }

    #[must_use]
    pub fn with_max_periods(mut self, max_periods: u32) -> Self {
        self.max_periods = max_periods.max(1);
        self
    }

    #[must_use]
    pub fn with_period_duration(mut self, seconds: u32) -> Self {
        self.period_duration = Some(seconds);
        self
    }

    /// Zero is bumped to one second.
    #[must_use]
    pub fn with_reconcile_interval(mut self, interval: Duration) -> Self {
        self.reconcile_interval = interval.max(Duration::from_secs(1));
        self
    }

    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_period_opening(mut self, opening: PeriodOpening) -> Self {
        self.period_opening = opening;
        self
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// The projection. Only touched through the components' own methods.
struct Engine {
    timer: TimerController,
    possession: PossessionTracker,
    period: PeriodLifecycleManager,
    reconciler: ClockReconciler,
}

#[derive(Default)]
struct Schedules {
    countdown: Option<Ticker>,
    possession: Option<Ticker>,
    reconcile: Option<Ticker>,
}

impl Schedules {
    fn cancel_all(&mut self) {
        for slot in [&mut self.countdown, &mut self.possession, &mut self.reconcile] {
            if let Some(mut ticker) = slot.take() {
                ticker.cancel();
            }
        }
    }
}

struct Shared {
    config: SessionConfig,
    api: Arc<dyn MatchApi>,
    clock: Arc<dyn Clock>,
    prompt: Arc<dyn ConfirmPrompt>,
    engine: Mutex<Engine>,
    schedules: Mutex<Schedules>,
    /// Serializes end-then-create possession sequences.
    possession_ops: Mutex<()>,
    event_tx: mpsc::Sender<SessionEvent>,
    reschedule_tx: mpsc::UnboundedSender<()>,
    closed: AtomicBool,
}

impl Shared {
    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(MatchClockError::SessionClosed)
        } else {
            Ok(())
        }
    }

    /// Emit an event. If the channel is full, log a warning and drop it.
    fn emit(&self, event: SessionEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!(
                    "event channel full, dropping event: {:?}",
                    std::mem::discriminant(&dropped)
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("event channel closed, receiver dropped");
            }
        }
    }

    fn emit_all(&self, events: Vec<SessionEvent>) {
        for event in events {
            self.emit(event);
        }
    }

    /// Ask the scheduler task to re-evaluate the tickers. Used from inside
    /// ticker callbacks, which cannot reschedule themselves directly.
    fn request_reschedule(&self) {
        if self.reschedule_tx.send(()).is_err() {
            debug!("reschedule channel closed, scheduler stopped");
        }
    }

    /// Tell the server about a period-end freeze. Runs on its own task so that
    /// cancelling the ticker that noticed the boundary cannot cancel the call.
    /// A failure leaves the clock frozen: a clock at 0:00 never runs.
    fn spawn_freeze_pause(&self) {
        let api = Arc::clone(&self.api);
        let game_id = self.config.game_id;
        tokio::spawn(async move {
            match api.transition_clock(game_id, ClockAction::Pause).await {
                Ok(_) => debug!("period-end pause acknowledged"),
                Err(e) => warn!("period-end pause rejected, clock stays frozen: {e}"),
            }
        });
    }
}

/// Fold a boundary check into the possession projection and the event list.
/// Returns `true` if the server needs to be told about a freeze.
fn apply_boundary(
    engine: &mut Engine,
    outcome: BoundaryOutcome,
    now: DateTime<Utc>,
    events: &mut Vec<SessionEvent>,
) -> bool {
    if outcome.froze_clock {
        engine
            .possession
            .on_timer_state_changed(TimerState::Running, TimerState::Paused, now);
        events.push(SessionEvent::TimerStateChanged {
            previous: TimerState::Running,
            current: TimerState::Paused,
        });
    }
    if outcome.newly_ended {
        events.push(SessionEvent::PeriodEnded {
            period: engine.timer.current_period(),
        });
    }
    outcome.froze_clock
}

// ── Session handle ──────────────────────────────────────────────────

/// Live view of one match's clock, possession and period.
///
/// Created via [`MatchSession::connect`]. All mutating methods apply their
/// local effect before awaiting the server, so concurrent callers see the
/// newest optimistic state immediately.
pub struct MatchSession {
    shared: Arc<Shared>,
    /// Background task that re-evaluates tickers on request.
    scheduler: Option<tokio::task::JoinHandle<()>>,
}

impl MatchSession {
    /// Load the match from the server and start tracking it.
    ///
    /// A missing active possession is normal and yields a zero duration. If
    /// the match is already underway (clock not stopped, past period 1, some
    /// time used, or a possession exists), no automatic first possession will
    /// be created.
    ///
    /// # Errors
    ///
    /// Returns the error from fetching the clock or the active possession.
    pub async fn connect<A, C, P>(
        api: Arc<A>,
        clock: Arc<C>,
        prompt: Arc<P>,
        config: SessionConfig,
    ) -> Result<(Self, mpsc::Receiver<SessionEvent>)>
    where
        A: MatchApi,
        C: Clock,
        P: ConfirmPrompt,
    {
        let api: Arc<dyn MatchApi> = api;
        let clock: Arc<dyn Clock> = clock;
        let prompt: Arc<dyn ConfirmPrompt> = prompt;
        let game_id = config.game_id;

        let server_clock = api.get_clock(game_id).await?;
        let active = match api.get_active_possession(game_id).await {
            Ok(possession) => possession,
            Err(MatchClockError::NotFound) => None,
            Err(e) => return Err(e),
        };
        // Judged on the server's own duration, before any override.
        let underway = server_clock.timer_state != TimerState::Stopped
            || server_clock.current_period > 1
            || clamp_remaining(server_clock.time_remaining_seconds)
                < server_clock.period_duration_seconds
            || active.as_ref().is_some_and(Possession::is_active);
        let server_clock = match config.period_duration {
            Some(seconds) if seconds != server_clock.period_duration_seconds => {
                api.set_period_duration(game_id, seconds).await?
            }
            _ => server_clock,
        };
        let now = clock.now();

        let timer = TimerController::from_clock(&server_clock);
        let mut possession = PossessionTracker::new();
        possession.set_active(active, timer.timer_state(), now);
        if underway {
            possession.mark_first_start_claimed();
        }

        let mut engine = Engine {
            timer,
            possession,
            period: PeriodLifecycleManager::new(config.max_periods),
            reconciler: ClockReconciler::new(),
        };
        let mut events = Vec::new();
        let outcome = engine.period.enforce_boundary(&mut engine.timer);
        let froze = apply_boundary(&mut engine, outcome, now, &mut events);

        info!(
            "session: game {game_id} period {} {:?}, {}s remaining",
            engine.timer.current_period(),
            engine.timer.timer_state(),
            engine.timer.time_remaining()
        );

        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<SessionEvent>(capacity);
        let (reschedule_tx, reschedule_rx) = mpsc::unbounded_channel::<()>();

        let shared = Arc::new(Shared {
            config,
            api,
            clock,
            prompt,
            engine: Mutex::new(engine),
            schedules: Mutex::new(Schedules::default()),
            possession_ops: Mutex::new(()),
            event_tx,
            reschedule_tx,
            closed: AtomicBool::new(false),
        });

        shared.emit_all(events);
        if froze {
            shared.spawn_freeze_pause();
        }
        sync_schedules(&shared).await;

        let scheduler = tokio::spawn(schedule_loop(Arc::downgrade(&shared), reschedule_rx));
        Ok((
            Self {
                shared,
                scheduler: Some(scheduler),
            },
            event_rx,
        ))
    }

    // ── Clock transitions ───────────────────────────────────────────

    /// Start a stopped clock.
    ///
    /// Returns `Ok(false)` if the clock is not stopped, or if the period has
    /// ended at 0:00. The first successful start of period 1 with no active
    /// possession opens one for the home team; if that fails the error is
    /// returned, but the clock stays started.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection after rolling the clock back.
    pub async fn start(&self) -> Result<bool> {
        self.transition(ClockAction::Start).await
    }

    /// Pause a running clock. `Ok(false)` if not running.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection after rolling the clock back.
    pub async fn pause(&self) -> Result<bool> {
        self.transition(ClockAction::Pause).await
    }

    /// Resume a paused clock. `Ok(false)` if not paused or the period has ended.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection after rolling the clock back.
    pub async fn resume(&self) -> Result<bool> {
        self.transition(ClockAction::Resume).await
    }

    /// Stop the clock and reset the countdown to the current period duration.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection after rolling the clock back.
    pub async fn stop(&self) -> Result<bool> {
        self.transition(ClockAction::Stop).await
    }

    async fn transition(&self, action: ClockAction) -> Result<bool> {
        let shared = &self.shared;
        shared.ensure_open()?;

        let pending = {
            let mut engine = shared.engine.lock().await;
            let Engine {
                timer,
                possession,
                period,
                ..
            } = &mut *engine;
            let starts_clock = matches!(action, ClockAction::Start | ClockAction::Resume);
            if starts_clock && period.is_ended() && timer.time_remaining() == 0 {
                debug!("session: {} ignored, period has ended", action.as_str());
                return Ok(false);
            }
            let Some(pending) = timer.begin(action) else {
                return Ok(false);
            };
            possession.on_timer_state_changed(pending.previous, pending.attempted, shared.now());
            if action == ClockAction::Stop {
                period.enforce_boundary(timer);
            }
            pending
        };
        if pending.previous != pending.attempted {
            shared.emit(SessionEvent::TimerStateChanged {
                previous: pending.previous,
                current: pending.attempted,
            });
        }
        sync_schedules(shared).await;

        match shared
            .api
            .transition_clock(shared.config.game_id, action)
            .await
        {
            Ok(server_clock) => {
                let open_first = {
                    let mut engine = shared.engine.lock().await;
                    engine.timer.acknowledge(pending.request_id, &server_clock);
                    if action == ClockAction::Start {
                        let period = engine.timer.current_period();
                        engine.possession.claim_first_start(period)
                    } else {
                        false
                    }
                };
                if open_first {
                    let _guard = shared.possession_ops.lock().await;
                    // A possession change may have completed while we waited.
                    if shared.engine.lock().await.possession.active().is_some() {
                        debug!("session: possession opened concurrently, skipping first start");
                        return Ok(true);
                    }
                    info!("session: first start, opening possession for home team");
                    if let Err(e) = self.open_possession(shared.config.home_team).await {
                        error!("session: could not open first possession: {e}");
                        return Err(e);
                    }
                }
                Ok(true)
            }
            Err(err) => {
                self.roll_back(action, pending.request_id, &err).await;
                Err(err)
            }
        }
    }

    async fn roll_back(&self, action: ClockAction, request_id: u64, err: &MatchClockError) {
        let shared = &self.shared;
        let now = shared.now();
        let mut events = Vec::new();
        let (restored, froze) = {
            let mut guard = shared.engine.lock().await;
            let engine = &mut *guard;
            let before = engine.timer.timer_state();
            if engine.timer.rollback(request_id).is_none() {
                return;
            }
            let restored = engine.timer.timer_state();
            engine
                .possession
                .on_timer_state_changed(before, restored, now);
            if before != restored {
                events.push(SessionEvent::TimerStateChanged {
                    previous: before,
                    current: restored,
                });
            }
            let outcome = engine.period.enforce_boundary(&mut engine.timer);
            let froze = apply_boundary(engine, outcome, now, &mut events);
            (engine.timer.timer_state(), froze)
        };
        warn!(
            "session: {} rejected ({err}), clock restored to {restored:?}",
            action.as_str()
        );
        events.push(SessionEvent::TransitionRolledBack {
            action,
            restored,
            message: err.user_message(),
        });
        shared.emit_all(events);
        if froze {
            shared.spawn_freeze_pause();
        }
        sync_schedules(shared).await;
    }

    // ── Gate and events ─────────────────────────────────────────────

    /// Consult the period-end gate. Prompts the user on every call once the
    /// period has ended and returns their answer; `true` otherwise.
    pub async fn can_add_events(&self) -> bool {
        let engine = self.shared.engine.lock().await;
        engine
            .period
            .can_add_events(&engine.timer, self.shared.prompt.as_ref())
    }

    /// Record a fault, shot, free shot, timeout or substitution.
    ///
    /// Returns `Ok(false)` without contacting the server when the period has
    /// ended and the user declines the prompt.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection.
    pub async fn record_event(&self, event: MatchEvent) -> Result<bool> {
        let shared = &self.shared;
        shared.ensure_open()?;

        let decision = {
            let engine = shared.engine.lock().await;
            engine
                .period
                .gate(&engine.timer, shared.prompt.as_ref(), event.label())
        };
        if !decision.allows() {
            shared.emit(SessionEvent::EventBlocked { event });
            return Ok(false);
        }

        shared
            .api
            .record_event(shared.config.game_id, event.clone())
            .await?;
        debug!("session: recorded {}", event.label());

        if event.is_shot_attempt() {
            let mut engine = shared.engine.lock().await;
            engine.possession.record_shot(event.team_id());
        }
        shared.emit(SessionEvent::EventRecorded { event });
        Ok(true)
    }

    // ── Possession ──────────────────────────────────────────────────

    /// Give the ball to `team_id`: end the active possession, then open a new
    /// one. Asking for the team already in possession returns that record.
    ///
    /// # Errors
    ///
    /// Returns the error from ending or creating a possession. If ending
    /// fails, nothing is created.
    pub async fn change_possession(&self, team_id: TeamId) -> Result<Possession> {
        let shared = &self.shared;
        shared.ensure_open()?;
        let _guard = shared.possession_ops.lock().await;

        let active = shared.engine.lock().await.possession.active().cloned();
        if let Some(current) = active {
            if current.team_id == team_id {
                return Ok(current);
            }
            self.close_possession(current).await?;
        }
        self.open_possession(team_id).await
    }

    /// Caller holds `possession_ops`.
    async fn open_possession(&self, team_id: TeamId) -> Result<Possession> {
        let shared = &self.shared;
        let period = shared.engine.lock().await.timer.current_period();
        let created = shared
            .api
            .create_possession(shared.config.game_id, team_id, period)
            .await?;
        {
            let mut engine = shared.engine.lock().await;
            let state = engine.timer.timer_state();
            engine
                .possession
                .set_active(Some(created.clone()), state, shared.now());
        }
        shared.emit(SessionEvent::PossessionChanged {
            possession: Some(created.clone()),
        });
        sync_schedules(shared).await;
        Ok(created)
    }

    /// Caller holds `possession_ops`.
    async fn close_possession(&self, current: Possession) -> Result<()> {
        let shared = &self.shared;
        shared.api.end_possession(current.id).await?;
        {
            let mut engine = shared.engine.lock().await;
            if engine.possession.active().map(|p| p.id) == Some(current.id) {
                let state = engine.timer.timer_state();
                engine.possession.set_active(None, state, shared.now());
            }
        }
        shared.emit(SessionEvent::PossessionChanged { possession: None });
        sync_schedules(shared).await;
        Ok(())
    }

    // ── Periods ─────────────────────────────────────────────────────

    /// Move to the next period.
    ///
    /// Returns `Ok(false)` in the final period. Otherwise the clock is stopped
    /// with a full countdown, the previous period's possession is ended and,
    /// per [`PeriodOpening`], a possession is opened for the starting team.
    ///
    /// # Errors
    ///
    /// Returns the error from the server's period change or from the
    /// possession calls that follow it.
    pub async fn advance_period(&self) -> Result<bool> {
        let shared = &self.shared;
        shared.ensure_open()?;

        let next = {
            let engine = shared.engine.lock().await;
            engine.period.next_period(engine.timer.current_period())
        };
        let Some(next) = next else {
            info!("session: already in the final period");
            return Ok(false);
        };

        let server_clock = shared.api.advance_period(shared.config.game_id).await?;
        let now = shared.now();
        let (period, duration, before, carried) = {
            let mut engine = shared.engine.lock().await;
            let duration = server_clock.period_duration_seconds;
            let period = server_clock.current_period.max(next);
            let before = engine.timer.timer_state();
            let Engine {
                timer,
                period: manager,
                possession,
                ..
            } = &mut *engine;
            manager.enter_period(timer, period, duration);
            possession.on_timer_state_changed(before, TimerState::Stopped, now);
            (period, duration, before, possession.active().cloned())
        };
        if before != TimerState::Stopped {
            shared.emit(SessionEvent::TimerStateChanged {
                previous: before,
                current: TimerState::Stopped,
            });
        }
        shared.emit(SessionEvent::PeriodAdvanced {
            period,
            period_duration: duration,
        });
        sync_schedules(shared).await;

        let _guard = shared.possession_ops.lock().await;
        if let Some(previous) = carried {
            self.close_possession(previous).await?;
        }
        let config = &shared.config;
        if let Some(team) = config
            .period_opening
            .team_for(period, config.home_team, config.away_team)
        {
            self.open_possession(team).await?;
        }
        Ok(true)
    }

    /// End the match: stop the clock, end the active possession and cancel
    /// every ticker. Further mutating calls return
    /// [`MatchClockError::SessionClosed`].
    ///
    /// # Errors
    ///
    /// Returns the error from stopping the clock or ending the possession.
    pub async fn end_match(&self) -> Result<()> {
        let shared = &self.shared;
        self.stop().await?;
        {
            let _guard = shared.possession_ops.lock().await;
            let active = shared.engine.lock().await.possession.active().cloned();
            if let Some(current) = active {
                self.close_possession(current).await?;
            }
        }
        shared.closed.store(true, Ordering::Release);
        shared.schedules.lock().await.cancel_all();
        info!("session: match {} ended", shared.config.game_id);
        Ok(())
    }

    /// Change the period duration used by the next `stop` or period change.
    /// The server is updated first; the countdown in progress is untouched.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection; the local duration is then unchanged.
    pub async fn set_period_duration(&self, seconds: u32) -> Result<()> {
        let shared = &self.shared;
        shared.ensure_open()?;
        let server_clock = shared
            .api
            .set_period_duration(shared.config.game_id, seconds)
            .await?;
        shared
            .engine
            .lock()
            .await
            .timer
            .set_period_duration(server_clock.period_duration_seconds);
        info!(
            "session: period duration set to {}s",
            server_clock.period_duration_seconds
        );
        Ok(())
    }

    /// Stop all tickers. In-flight remote calls still complete.
    pub async fn shutdown(&mut self) {
        debug!("MatchSession: shutdown requested");
        self.shared.closed.store(true, Ordering::Release);
        if let Some(task) = self.scheduler.take() {
            task.abort();
        }
        self.shared.schedules.lock().await.cancel_all();
    }

    // ── State accessors ─────────────────────────────────────────────

    pub fn game_id(&self) -> GameId {
        self.shared.config.game_id
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    pub async fn timer_state(&self) -> TimerState {
        self.shared.engine.lock().await.timer.timer_state()
    }

    /// Projected seconds left in the current period.
    pub async fn time_remaining(&self) -> u32 {
        self.shared.engine.lock().await.timer.time_remaining()
    }

    pub async fn current_period(&self) -> u32 {
        self.shared.engine.lock().await.timer.current_period()
    }

    pub async fn period_duration(&self) -> u32 {
        self.shared.engine.lock().await.timer.period_duration()
    }

    pub async fn period_ended(&self) -> bool {
        self.shared.engine.lock().await.period.is_ended()
    }

    /// Displayed duration of the active possession, in seconds.
    pub async fn possession_duration(&self) -> u64 {
        self.shared.engine.lock().await.possession.duration()
    }

    pub async fn active_possession(&self) -> Option<Possession> {
        self.shared.engine.lock().await.possession.active().cloned()
    }

    /// Drift measured by the last reconciliation, `server - projected`.
    pub async fn last_drift(&self) -> Option<i64> {
        self.shared.engine.lock().await.reconciler.last_drift()
    }

    /// Clock transitions still awaiting the server.
    pub async fn pending_transitions(&self) -> usize {
        self.shared.engine.lock().await.timer.in_flight().len()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let engine = self.shared.engine.lock().await;
        SessionSnapshot {
            game_id: self.shared.config.game_id,
            current_period: engine.timer.current_period(),
            timer_state: engine.timer.timer_state(),
            time_remaining_seconds: engine.timer.time_remaining(),
            period_duration_seconds: engine.timer.period_duration(),
            period_ended: engine.period.is_ended(),
            active_possession: engine.possession.active().cloned(),
            possession_duration_seconds: engine.possession.duration(),
            last_drift_seconds: engine.reconciler.last_drift(),
        }
    }

    /// Names of the tickers currently scheduled.
    pub async fn active_tickers(&self) -> Vec<&'static str> {
        let schedules = self.shared.schedules.lock().await;
        [
            ("countdown", &schedules.countdown),
            ("possession", &schedules.possession),
            ("reconcile", &schedules.reconcile),
        ]
        .into_iter()
        .filter(|(_, slot)| slot.as_ref().is_some_and(Ticker::is_active))
        .map(|(name, _)| name)
        .collect()
    }
}

impl std::fmt::Debug for MatchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchSession")
            .field("game_id", &self.shared.config.game_id)
            .field("closed", &self.is_closed())
            .field("has_scheduler", &self.scheduler.is_some())
            .finish()
    }
}

impl Drop for MatchSession {
    fn drop(&mut self) {
        // `Drop` cannot await the schedules lock; tickers that are not
        // cancelled here stop on their own once `Shared` is gone.
        if let Some(task) = self.scheduler.take() {
            task.abort();
        }
        if let Ok(mut schedules) = self.shared.schedules.try_lock() {
            schedules.cancel_all();
        }
    }
}

// ── Scheduling ──────────────────────────────────────────────────────

/// Start or cancel each ticker to match the current projection.
async fn sync_schedules(shared: &Arc<Shared>) {
    let (countdown, possession, reconcile) = if shared.closed.load(Ordering::Acquire) {
        (false, false, false)
    } else {
        let engine = shared.engine.lock().await;
        let state = engine.timer.timer_state();
        (
            state.is_running(),
            engine.possession.should_tick(state),
            engine.reconciler.should_run(state),
        )
    };

    let mut schedules = shared.schedules.lock().await;
    set_ticker(
        &mut schedules.countdown,
        countdown,
        "countdown",
        TICK_INTERVAL,
        shared,
        countdown_tick,
    );
    set_ticker(
        &mut schedules.possession,
        possession,
        "possession",
        TICK_INTERVAL,
        shared,
        possession_tick,
    );
    set_ticker(
        &mut schedules.reconcile,
        reconcile,
        "reconcile",
        shared.config.reconcile_interval,
        shared,
        reconcile_tick,
    );
}

fn set_ticker<F, Fut>(
    slot: &mut Option<Ticker>,
    wanted: bool,
    name: &'static str,
    period: Duration,
    shared: &Arc<Shared>,
    on_tick: F,
) where
    F: Fn(Arc<Shared>) -> Fut + Copy + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let running = slot.as_ref().is_some_and(Ticker::is_active);
    if wanted && !running {
        let weak = Arc::downgrade(shared);
        *slot = Some(Ticker::spawn(name, period, move || {
            let weak = Weak::clone(&weak);
            async move {
                if let Some(shared) = weak.upgrade() {
                    on_tick(shared).await;
                }
            }
        }));
    } else if !wanted {
        if let Some(mut ticker) = slot.take() {
            ticker.cancel();
        }
    }
}

/// Re-evaluates tickers whenever a ticker callback asks for it.
async fn schedule_loop(shared: Weak<Shared>, mut reschedule_rx: mpsc::UnboundedReceiver<()>) {
    debug!("schedule loop started");
    while reschedule_rx.recv().await.is_some() {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        sync_schedules(&shared).await;
    }
    debug!("schedule loop exited");
}

async fn countdown_tick(shared: Arc<Shared>) {
    let now = shared.now();
    let mut events = Vec::new();
    let froze = {
        let mut guard = shared.engine.lock().await;
        let engine = &mut *guard;
        if !engine.timer.timer_state().is_running() {
            return;
        }
        let outcome = engine
            .period
            .on_countdown_tick(&mut engine.timer, COUNTDOWN_STEP_SECONDS);
        events.push(SessionEvent::CountdownTick {
            time_remaining: engine.timer.time_remaining(),
        });
        apply_boundary(engine, outcome, now, &mut events)
    };
    shared.emit_all(events);
    if froze {
        shared.spawn_freeze_pause();
        shared.request_reschedule();
    }
}

async fn possession_tick(shared: Arc<Shared>) {
    let now = shared.now();
    let seconds = {
        let mut engine = shared.engine.lock().await;
        let state = engine.timer.timer_state();
        if !engine.possession.refresh(state, now) {
            return;
        }
        engine.possession.duration()
    };
    shared.emit(SessionEvent::PossessionDurationTick { seconds });
}

async fn reconcile_tick(shared: Arc<Shared>) {
    if !shared.engine.lock().await.timer.timer_state().is_running() {
        return;
    }
    let server_clock = match shared.api.get_clock(shared.config.game_id).await {
        Ok(clock) => clock,
        Err(e) => {
            warn!("reconcile: could not fetch server clock: {e}");
            return;
        }
    };

    let now = shared.now();
    let mut events = Vec::new();
    let froze = {
        let mut guard = shared.engine.lock().await;
        let engine = &mut *guard;
        let Engine {
            timer, reconciler, ..
        } = &mut *engine;
        let Some(drift) = reconciler.reconcile(timer, &server_clock, now) else {
            return;
        };
        events.push(SessionEvent::ClockReconciled {
            drift_seconds: drift,
            time_remaining: engine.timer.time_remaining(),
        });
        let outcome = engine.period.enforce_boundary(&mut engine.timer);
        apply_boundary(engine, outcome, now, &mut events)
    };
    shared.emit_all(events);
    if froze {
        shared.spawn_freeze_pause();
        shared.request_reschedule();
    }
}
