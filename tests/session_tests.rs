#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! End-to-end tests for `MatchSession` against the in-memory server.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{drain, transport_error, ApiOp, Backend, Release, AWAY, HOME};
use match_clock_sync::protocol::{MatchEvent, TimerState};
use match_clock_sync::{
    AlwaysConfirm, ErrorCode, MatchClockError, MatchSession, PeriodOpening, ScriptedConfirm,
    SessionEvent,
};
use uuid::Uuid;

const PLAYER: Uuid = Uuid::from_u128(0x99);

fn shot() -> MatchEvent {
    MatchEvent::Shot {
        team_id: HOME,
        player_id: PLAYER,
        scored: false,
    }
}

async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

// ── Connecting ──────────────────────────────────────────────────────

#[tokio::test]
async fn connect_hydrates_from_server() {
    let backend = Backend::new(600);
    backend.seed_clock(TimerState::Paused, 412, 600);

    let (session, _events) = backend
        .connect(Arc::new(AlwaysConfirm), backend.config())
        .await;

    assert_eq!(session.timer_state().await, TimerState::Paused);
    assert_eq!(session.time_remaining().await, 412);
    assert_eq!(session.current_period().await, 1);
    assert_eq!(session.possession_duration().await, 0);
    assert!(session.active_tickers().await.is_empty());
}

#[tokio::test]
async fn missing_possession_is_not_an_error() {
    let backend = Backend::new(600);
    backend
        .api
        .fail_next(ApiOp::GetActivePossession, MatchClockError::NotFound);

    let (session, _events) = backend
        .connect(Arc::new(AlwaysConfirm), backend.config())
        .await;

    assert!(session.active_possession().await.is_none());
    assert_eq!(session.possession_duration().await, 0);
}

#[tokio::test]
async fn other_hydration_failures_abort_connect() {
    let backend = Backend::new(600);
    backend
        .api
        .fail_next(ApiOp::GetActivePossession, transport_error());

    let result = MatchSession::connect(
        Arc::clone(&backend.api),
        Arc::new(backend.clock.clone()),
        Arc::new(AlwaysConfirm),
        backend.config(),
    )
    .await;

    assert!(matches!(result, Err(MatchClockError::Transport(_))));
}

// ── Clock transitions ───────────────────────────────────────────────

#[tokio::test]
async fn noop_transitions_skip_the_server() {
    let backend = Backend::new(600);
    let (session, _events) = backend
        .connect(Arc::new(AlwaysConfirm), backend.config())
        .await;

    assert!(!session.pause().await.unwrap());
    assert!(!session.resume().await.unwrap());
    assert_eq!(backend.api.count(ApiOp::TransitionClock), 0);
}

#[tokio::test]
async fn rejected_start_rolls_back() {
    let backend = Backend::new(600);
    let (session, mut events) = backend
        .connect(Arc::new(AlwaysConfirm), backend.config())
        .await;
    backend.api.fail_next(
        ApiOp::TransitionClock,
        MatchClockError::ServerError {
            message: String::new(),
            error_code: Some(ErrorCode::ClockAlreadyRunning),
        },
    );

    let err = session.start().await.unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(session.timer_state().await, TimerState::Stopped);
    assert_eq!(session.pending_transitions().await, 0);
    assert!(session.active_tickers().await.is_empty());
    assert_eq!(backend.api.count(ApiOp::CreatePossession), 0);

    let events = drain(&mut events);
    assert!(events.contains(&SessionEvent::TimerStateChanged {
        previous: TimerState::Stopped,
        current: TimerState::Running,
    }));
    assert!(events.contains(&SessionEvent::TransitionRolledBack {
        action: match_clock_sync::ClockAction::Start,
        restored: TimerState::Stopped,
        message: ErrorCode::ClockAlreadyRunning.description().to_string(),
    }));
}

#[tokio::test]
async fn failed_stop_restores_countdown() {
    let backend = Backend::new(600);
    backend.seed_clock(TimerState::Paused, 250, 600);
    let (session, _events) = backend
        .connect(Arc::new(AlwaysConfirm), backend.config())
        .await;
    backend
        .api
        .fail_next(ApiOp::TransitionClock, transport_error());

    assert!(session.stop().await.is_err());
    assert_eq!(session.timer_state().await, TimerState::Paused);
    assert_eq!(session.time_remaining().await, 250);
}

#[tokio::test]
async fn later_failure_restores_its_own_prior_state() {
    let backend = Backend::new(600);
    let (session, _events) = backend
        .connect(Arc::new(AlwaysConfirm), backend.config())
        .await;
    let session = Arc::new(session);

    let release_start = backend.api.hold_next(ApiOp::TransitionClock);
    let s = Arc::clone(&session);
    let start = tokio::spawn(async move { s.start().await });
    while session.pending_transitions().await < 1 {
        tokio::task::yield_now().await;
    }

    let release_pause = backend.api.hold_next(ApiOp::TransitionClock);
    let s = Arc::clone(&session);
    let pause = tokio::spawn(async move { s.pause().await });
    while session.pending_transitions().await < 2 {
        tokio::task::yield_now().await;
    }
    assert_eq!(session.timer_state().await, TimerState::Paused);

    release_start.send(Release::Forward).unwrap();
    assert!(start.await.unwrap().unwrap());
    assert_eq!(session.timer_state().await, TimerState::Paused);

    release_pause
        .send(Release::Fail(transport_error()))
        .unwrap();
    assert!(pause.await.unwrap().is_err());
    assert_eq!(session.timer_state().await, TimerState::Running);
    assert_eq!(session.pending_transitions().await, 0);
}

#[tokio::test]
async fn earlier_failure_restores_its_own_prior_state() {
    let backend = Backend::new(600);
    let (session, _events) = backend
        .connect(Arc::new(AlwaysConfirm), backend.config())
        .await;
    let session = Arc::new(session);

    let release_start = backend.api.hold_next(ApiOp::TransitionClock);
    let s = Arc::clone(&session);
    let start = tokio::spawn(async move { s.start().await });
    while session.pending_transitions().await < 1 {
        tokio::task::yield_now().await;
    }
    let release_pause = backend.api.hold_next(ApiOp::TransitionClock);
    let s = Arc::clone(&session);
    let pause = tokio::spawn(async move { s.pause().await });
    while session.pending_transitions().await < 2 {
        tokio::task::yield_now().await;
    }

    release_start
        .send(Release::Fail(transport_error()))
        .unwrap();
    assert!(start.await.unwrap().is_err());
    assert_eq!(session.timer_state().await, TimerState::Stopped);

    release_pause
        .send(Release::Fail(transport_error()))
        .unwrap();
    assert!(pause.await.unwrap().is_err());
    assert_eq!(session.timer_state().await, TimerState::Running);
}

// ── Possession ──────────────────────────────────────────────────────

#[tokio::test]
async fn first_start_opens_home_possession_once() {
    let backend = Backend::new(600);
    let (session, _events) = backend
        .connect(Arc::new(AlwaysConfirm), backend.config())
        .await;

    assert!(session.start().await.unwrap());
    let active = session.active_possession().await.unwrap();
    assert_eq!(active.team_id, HOME);
    assert_eq!(active.period, 1);

    assert!(session.pause().await.unwrap());
    assert!(session.resume().await.unwrap());
    assert!(session.stop().await.unwrap());
    assert!(session.start().await.unwrap());

    assert_eq!(backend.api.count(ApiOp::CreatePossession), 1);
    assert_eq!(backend.server.possessions(backend.game).len(), 1);
}

#[tokio::test]
async fn longer_configured_duration_still_opens_first_possession() {
    let backend = Backend::new(600);
    let config = backend.config().with_period_duration(900);
    let (session, _events) = backend.connect(Arc::new(AlwaysConfirm), config).await;

    assert_eq!(session.period_duration().await, 900);
    assert_eq!(session.time_remaining().await, 600);
    assert_eq!(backend.api.count(ApiOp::SetPeriodDuration), 1);

    assert!(session.start().await.unwrap());
    assert_eq!(session.active_possession().await.unwrap().team_id, HOME);
    assert_eq!(backend.api.count(ApiOp::CreatePossession), 1);
}

#[tokio::test]
async fn first_start_yields_to_concurrent_possession_change() {
    let backend = Backend::new(600);
    let (session, _events) = backend
        .connect(Arc::new(AlwaysConfirm), backend.config())
        .await;
    let session = Arc::new(session);

    let release_create = backend.api.hold_next(ApiOp::CreatePossession);
    let s = Arc::clone(&session);
    let change = tokio::spawn(async move { s.change_possession(AWAY).await });
    while backend.api.count(ApiOp::CreatePossession) < 1 {
        tokio::task::yield_now().await;
    }

    let s = Arc::clone(&session);
    let start = tokio::spawn(async move { s.start().await });
    while backend.api.count(ApiOp::TransitionClock) < 1 {
        tokio::task::yield_now().await;
    }
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    release_create.send(Release::Forward).unwrap();
    let away = change.await.unwrap().unwrap();
    assert!(start.await.unwrap().unwrap());

    assert_eq!(session.timer_state().await, TimerState::Running);
    assert_eq!(backend.api.count(ApiOp::CreatePossession), 1);
    assert_eq!(session.active_possession().await.unwrap().id, away.id);
    let active: Vec<_> = backend
        .server
        .possessions(backend.game)
        .into_iter()
        .filter(|p| p.is_active())
        .collect();
    assert_eq!(active.len(), 1);
}

#[tokio::test]
async fn no_first_possession_when_match_is_underway() {
    let backend = Backend::new(600);
    backend.seed_clock(TimerState::Stopped, 480, 600);
    let (session, _events) = backend
        .connect(Arc::new(AlwaysConfirm), backend.config())
        .await;

    assert!(session.start().await.unwrap());
    assert!(session.active_possession().await.is_none());
    assert_eq!(backend.api.count(ApiOp::CreatePossession), 0);
}

#[tokio::test]
async fn change_possession_keeps_one_active_record() {
    let backend = Backend::new(600);
    let (session, _events) = backend
        .connect(Arc::new(AlwaysConfirm), backend.config())
        .await;
    session.start().await.unwrap();

    let away = session.change_possession(AWAY).await.unwrap();
    assert_eq!(away.team_id, AWAY);
    let again = session.change_possession(AWAY).await.unwrap();
    assert_eq!(again.id, away.id);
    session.change_possession(HOME).await.unwrap();

    let records = backend.server.possessions(backend.game);
    assert_eq!(records.len(), 3);
    assert_eq!(records.iter().filter(|p| p.is_active()).count(), 1);
    assert_eq!(
        session.active_possession().await.unwrap().id,
        records[2].id
    );
}

#[tokio::test]
async fn failed_end_creates_nothing() {
    let backend = Backend::new(600);
    let (session, _events) = backend
        .connect(Arc::new(AlwaysConfirm), backend.config())
        .await;
    session.start().await.unwrap();
    let home = session.active_possession().await.unwrap();

    backend.api.fail_next(ApiOp::EndPossession, transport_error());
    assert!(session.change_possession(AWAY).await.is_err());

    assert_eq!(backend.api.count(ApiOp::CreatePossession), 1);
    assert_eq!(session.active_possession().await.unwrap().id, home.id);
}

#[tokio::test(start_paused = true)]
async fn possession_duration_across_pause_and_handover() {
    let backend = Backend::new(600);
    let (session, _events) = backend
        .connect(Arc::new(AlwaysConfirm), backend.config())
        .await;

    // t=0: start opens possession A for the home team.
    session.start().await.unwrap();
    assert_eq!(session.possession_duration().await, 0);

    // t=10: a tick while running shows 10.
    backend.clock.advance_secs(10);
    sleep_ms(1500).await;
    assert_eq!(session.possession_duration().await, 10);

    // Pause at t=10, then 5 seconds pass with no ticks.
    session.pause().await.unwrap();
    assert_eq!(session.possession_duration().await, 10);
    backend.clock.advance_secs(5);
    sleep_ms(2000).await;
    assert_eq!(session.possession_duration().await, 10);

    // Resume at t=15 recomputes immediately.
    session.resume().await.unwrap();
    assert_eq!(session.possession_duration().await, 15);

    // t=22: ticking again.
    backend.clock.advance_secs(7);
    sleep_ms(1500).await;
    assert_eq!(session.possession_duration().await, 22);

    // Change to B at t=22 resets to 0; t=27 shows 5.
    session.change_possession(AWAY).await.unwrap();
    assert_eq!(session.possession_duration().await, 0);
    backend.clock.advance_secs(5);
    sleep_ms(1500).await;
    assert_eq!(session.possession_duration().await, 5);
}

#[tokio::test]
async fn shots_count_against_active_possession() {
    let backend = Backend::new(600);
    let (session, mut events) = backend
        .connect(Arc::new(AlwaysConfirm), backend.config())
        .await;
    session.start().await.unwrap();

    assert!(session.record_event(shot()).await.unwrap());
    assert!(session
        .record_event(MatchEvent::Timeout { team_id: HOME })
        .await
        .unwrap());

    assert_eq!(session.active_possession().await.unwrap().shots_taken, 1);
    assert_eq!(backend.server.possessions(backend.game)[0].shots_taken, 1);
    assert_eq!(backend.server.events(backend.game).len(), 2);
    assert!(drain(&mut events).contains(&SessionEvent::EventRecorded { event: shot() }));
}

// ── Tickers ─────────────────────────────────────────────────────────

#[tokio::test]
async fn tickers_run_only_while_clock_runs() {
    let backend = Backend::new(600);
    let (session, _events) = backend
        .connect(Arc::new(AlwaysConfirm), backend.config())
        .await;
    assert!(session.active_tickers().await.is_empty());

    session.start().await.unwrap();
    assert_eq!(
        session.active_tickers().await,
        vec!["countdown", "possession", "reconcile"]
    );

    session.pause().await.unwrap();
    assert!(session.active_tickers().await.is_empty());

    session.resume().await.unwrap();
    assert_eq!(session.active_tickers().await.len(), 3);

    session.stop().await.unwrap();
    assert!(session.active_tickers().await.is_empty());
}

#[tokio::test]
async fn possession_ticker_needs_an_active_possession() {
    let backend = Backend::new(600);
    backend.seed_clock(TimerState::Paused, 300, 600);
    let (session, _events) = backend
        .connect(Arc::new(AlwaysConfirm), backend.config())
        .await;

    session.resume().await.unwrap();
    assert_eq!(
        session.active_tickers().await,
        vec!["countdown", "reconcile"]
    );
    session.change_possession(AWAY).await.unwrap();
    assert_eq!(session.active_tickers().await.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn countdown_ticks_once_per_second() {
    let backend = Backend::new(600);
    let config = backend
        .config()
        .with_reconcile_interval(Duration::from_secs(60));
    let (session, _events) = backend.connect(Arc::new(AlwaysConfirm), config).await;

    session.start().await.unwrap();
    sleep_ms(3500).await;
    assert_eq!(session.time_remaining().await, 597);

    session.pause().await.unwrap();
    sleep_ms(3000).await;
    assert_eq!(session.time_remaining().await, 597);
}

// ── Reconciliation ──────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn reconcile_snaps_to_server() {
    let backend = Backend::new(600);
    let (session, mut events) = backend
        .connect(Arc::new(AlwaysConfirm), backend.config())
        .await;

    session.start().await.unwrap();
    backend
        .server
        .set_time_remaining(backend.game, 500)
        .unwrap();
    sleep_ms(5500).await;

    let remaining = session.time_remaining().await;
    assert!((499..=500).contains(&remaining), "remaining {remaining}");
    let drift = session.last_drift().await.unwrap();
    assert!(drift <= -95, "drift {drift}");
    assert!(drain(&mut events)
        .iter()
        .any(|e| matches!(e, SessionEvent::ClockReconciled { .. })));
}

#[tokio::test(start_paused = true)]
async fn reconcile_never_runs_while_paused() {
    let backend = Backend::new(600);
    backend.seed_clock(TimerState::Paused, 300, 600);
    let (session, _events) = backend
        .connect(Arc::new(AlwaysConfirm), backend.config())
        .await;

    sleep_ms(20_000).await;
    assert_eq!(backend.api.count(ApiOp::GetClock), 1);
    assert!(session.last_drift().await.is_none());
}

// ── Period end ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn period_end_freezes_clock_and_gates_events() {
    let backend = Backend::new(600);
    backend.seed_clock(TimerState::Running, 1, 600);
    let prompt = Arc::new(ScriptedConfirm::new([false, true], false));
    let (session, mut events) = backend
        .connect(Arc::clone(&prompt), backend.config())
        .await;

    sleep_ms(1500).await;
    assert_eq!(session.time_remaining().await, 0);
    assert_eq!(session.timer_state().await, TimerState::Paused);
    assert!(session.period_ended().await);
    assert!(session.active_tickers().await.is_empty());
    assert_eq!(
        backend.server.clock_of(backend.game).unwrap().timer_state,
        TimerState::Paused
    );
    assert!(drain(&mut events).contains(&SessionEvent::PeriodEnded { period: 1 }));

    assert!(!session.record_event(shot()).await.unwrap());
    assert_eq!(backend.api.count(ApiOp::RecordEvent), 0);
    assert!(backend.server.events(backend.game).is_empty());
    assert!(prompt.prompts()[0].contains("Period 1 has ended"));

    assert!(session.record_event(shot()).await.unwrap());
    assert_eq!(backend.server.events(backend.game).len(), 1);

    // The clock cannot run past 0:00.
    assert!(!session.resume().await.unwrap());
    assert_eq!(backend.api.transitions().len(), 1);
}

#[tokio::test]
async fn gate_asks_on_every_call() {
    let backend = Backend::new(600);
    backend.seed_clock(TimerState::Paused, 0, 600);
    let prompt = Arc::new(ScriptedConfirm::new(Vec::<bool>::new(), true));
    let (session, _events) = backend
        .connect(Arc::clone(&prompt), backend.config())
        .await;

    assert!(session.period_ended().await);
    assert!(session.can_add_events().await);
    assert!(session.can_add_events().await);
    assert_eq!(prompt.prompts().len(), 2);
}

#[tokio::test]
async fn stop_reopens_an_ended_period() {
    let backend = Backend::new(600);
    backend.seed_clock(TimerState::Paused, 0, 600);
    let prompt = Arc::new(ScriptedConfirm::new(Vec::<bool>::new(), false));
    let (session, _events) = backend
        .connect(Arc::clone(&prompt), backend.config())
        .await;

    assert!(session.stop().await.unwrap());
    assert!(!session.period_ended().await);
    assert_eq!(session.time_remaining().await, 600);
    assert!(session.can_add_events().await);
    assert!(prompt.prompts().is_empty());
}

// ── Periods and lifecycle ───────────────────────────────────────────

#[tokio::test]
async fn advance_period_resets_clock_and_possession() {
    let backend = Backend::with_max_periods(300, 2);
    let config = backend
        .config()
        .with_max_periods(2)
        .with_period_opening(PeriodOpening::Alternate);
    let (session, mut events) = backend.connect(Arc::new(AlwaysConfirm), config).await;
    session.start().await.unwrap();

    assert!(session.advance_period().await.unwrap());
    assert_eq!(session.current_period().await, 2);
    assert_eq!(session.timer_state().await, TimerState::Stopped);
    assert_eq!(session.time_remaining().await, 300);
    let active = session.active_possession().await.unwrap();
    assert_eq!(active.team_id, AWAY);
    assert_eq!(active.period, 2);
    assert_eq!(session.possession_duration().await, 0);

    let records = backend.server.possessions(backend.game);
    assert_eq!(records.len(), 2);
    assert!(!records[0].is_active());
    assert!(drain(&mut events).contains(&SessionEvent::PeriodAdvanced {
        period: 2,
        period_duration: 300,
    }));

    assert!(!session.advance_period().await.unwrap());
    assert_eq!(backend.api.count(ApiOp::AdvancePeriod), 1);
}

#[tokio::test(start_paused = true)]
async fn period_duration_change_survives_reconcile() {
    let backend = Backend::new(600);
    let (session, _events) = backend
        .connect(Arc::new(AlwaysConfirm), backend.config())
        .await;

    session.set_period_duration(120).await.unwrap();
    assert_eq!(
        backend
            .server
            .clock_of(backend.game)
            .unwrap()
            .period_duration_seconds,
        120
    );
    session.start().await.unwrap();
    session.stop().await.unwrap();
    assert_eq!(session.time_remaining().await, 120);
    assert_eq!(session.period_duration().await, 120);

    session.start().await.unwrap();
    backend.clock.advance_secs(5);
    sleep_ms(5500).await;
    let remaining = session.time_remaining().await;
    assert!((114..=115).contains(&remaining), "remaining {remaining}");
    let drift = session.last_drift().await.unwrap();
    assert!(drift.abs() <= 1, "drift {drift}");
    assert_eq!(session.period_duration().await, 120);
}

#[tokio::test]
async fn rejected_period_duration_leaves_projection_alone() {
    let backend = Backend::new(600);
    let (session, _events) = backend
        .connect(Arc::new(AlwaysConfirm), backend.config())
        .await;

    assert!(session.set_period_duration(0).await.is_err());
    assert_eq!(session.period_duration().await, 600);
    session.start().await.unwrap();
    session.stop().await.unwrap();
    assert_eq!(session.time_remaining().await, 600);
}

#[tokio::test]
async fn end_match_closes_the_session() {
    let backend = Backend::new(600);
    let (session, _events) = backend
        .connect(Arc::new(AlwaysConfirm), backend.config())
        .await;
    session.start().await.unwrap();

    session.end_match().await.unwrap();
    assert!(session.is_closed());
    assert!(session.active_tickers().await.is_empty());
    assert!(session.active_possession().await.is_none());
    assert!(backend
        .server
        .possessions(backend.game)
        .iter()
        .all(|p| !p.is_active()));
    assert!(matches!(
        session.start().await,
        Err(MatchClockError::SessionClosed)
    ));
}

#[tokio::test]
async fn snapshot_reflects_projection() {
    let backend = Backend::new(600);
    let (session, _events) = backend
        .connect(Arc::new(AlwaysConfirm), backend.config())
        .await;
    session.start().await.unwrap();

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.game_id, backend.game);
    assert_eq!(snapshot.timer_state, TimerState::Running);
    assert_eq!(snapshot.time_remaining_seconds, 600);
    assert!(!snapshot.period_ended);
    assert_eq!(snapshot.active_possession.unwrap().team_id, HOME);
}
