//! Match clock state machine with optimistic transitions.
//!
//! [`TimerController`] is the only writer of the projected `timer_state` and
//! `time_remaining`. Every transition is applied locally first and logged as a
//! [`PendingTransition`]; when the server answers, the entry is either
//! acknowledged or rolled back to the state captured when *that* call was made.
//! Overlapping calls are not merged: the newest optimistic value is what the
//! user sees, and an older call failing afterwards still restores its own
//! previous state.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::protocol::{ClockAction, MatchClock, TimerState};

/// Identifier of one optimistic transition, unique within a session.
pub type RequestId = u64;

/// Log entry for an optimistic transition awaiting the server's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTransition {
    pub request_id: RequestId,
    pub action: ClockAction,
    pub previous: TimerState,
    pub attempted: TimerState,
    /// Countdown value before the transition; only `stop` changes it.
    pub previous_remaining: u32,
}

/// Local projection of the server's [`MatchClock`].
#[derive(Debug, Clone)]
pub struct TimerController {
    timer_state: TimerState,
    current_period: u32,
    time_remaining: u32,
    period_duration: u32,
    started_at: Option<DateTime<Utc>>,
    next_request_id: RequestId,
    in_flight: Vec<PendingTransition>,
}

/// Clamp a server-reported countdown into the projection's range.
pub fn clamp_remaining(seconds: i64) -> u32 {
    u32::try_from(seconds.max(0)).unwrap_or(u32::MAX)
}

impl TimerController {
    /// A stopped clock at the start of period 1.
    pub fn new(period_duration: u32) -> Self {
        Self {
            timer_state: TimerState::Stopped,
            current_period: 1,
            time_remaining: period_duration,
            period_duration,
            started_at: None,
            next_request_id: 1,
            in_flight: Vec::new(),
        }
    }

    /// Hydrate from the server's clock.
    pub fn from_clock(clock: &MatchClock) -> Self {
        let mut timer = Self::new(clock.period_duration_seconds);
        timer.timer_state = clock.timer_state;
        timer.current_period = clock.current_period.max(1);
        timer.time_remaining = clamp_remaining(clock.time_remaining_seconds);
        timer.started_at = clock.started_at;
        timer
    }

    pub fn timer_state(&self) -> TimerState {
        self.timer_state
    }

    pub fn current_period(&self) -> u32 {
        self.current_period
    }

    pub fn time_remaining(&self) -> u32 {
        self.time_remaining
    }

    pub fn period_duration(&self) -> u32 {
        self.period_duration
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Transitions still waiting for the server, oldest first.
    pub fn in_flight(&self) -> &[PendingTransition] {
        &self.in_flight
    }

    /// Apply `action` optimistically and log it.
    ///
    /// Returns `None` when the action is a no-op from the current state:
    /// `start` unless stopped, `pause` unless running, `resume` unless paused.
    pub fn begin(&mut self, action: ClockAction) -> Option<PendingTransition> {
        let allowed = match action {
            ClockAction::Start => self.timer_state == TimerState::Stopped,
            ClockAction::Pause => self.timer_state == TimerState::Running,
            ClockAction::Resume => self.timer_state == TimerState::Paused,
            ClockAction::Stop => true,
        };
        if !allowed {
            debug!(
                "timer: {} ignored while {:?}",
                action.as_str(),
                self.timer_state
            );
            return None;
        }

        let pending = PendingTransition {
            request_id: self.next_request_id,
            action,
            previous: self.timer_state,
            attempted: action.target_state(),
            previous_remaining: self.time_remaining,
        };
        self.next_request_id += 1;

        self.timer_state = pending.attempted;
        if action == ClockAction::Stop {
            self.time_remaining = self.period_duration;
            self.started_at = None;
        }
        self.in_flight.push(pending);
        debug!(
            "timer: optimistic {} ({:?} -> {:?}), request {}",
            action.as_str(),
            pending.previous,
            pending.attempted,
            pending.request_id
        );
        Some(pending)
    }

    /// The server accepted `request_id`. Unless a newer transition has been
    /// begun since, adopts the server's `started_at` (for a start or resume)
    /// or its reset countdown and period duration (for a stop).
    pub fn acknowledge(&mut self, request_id: RequestId, clock: &MatchClock) -> bool {
        let Some(index) = self
            .in_flight
            .iter()
            .position(|p| p.request_id == request_id)
        else {
            return false;
        };
        let pending = self.in_flight.remove(index);
        // Any transition begun after this one owns the projection.
        let superseded = request_id + 1 < self.next_request_id;
        if !superseded && pending.attempted == TimerState::Running {
            self.started_at = clock.started_at.or(self.started_at);
        }
        if !superseded && pending.action == ClockAction::Stop {
            self.period_duration = clock.period_duration_seconds;
            self.time_remaining = clamp_remaining(clock.time_remaining_seconds);
        }
        debug!("timer: request {request_id} acknowledged");
        true
    }

    /// The server rejected `request_id`. Restores the state captured when that
    /// call was made, even if a newer call has changed the clock since.
    pub fn rollback(&mut self, request_id: RequestId) -> Option<PendingTransition> {
        let index = self
            .in_flight
            .iter()
            .position(|p| p.request_id == request_id)?;
        let pending = self.in_flight.remove(index);
        warn!(
            "timer: rolling back {} (request {}), {:?} -> {:?}",
            pending.action.as_str(),
            request_id,
            self.timer_state,
            pending.previous
        );
        self.timer_state = pending.previous;
        if pending.action == ClockAction::Stop {
            self.time_remaining = pending.previous_remaining;
        }
        Some(pending)
    }

    /// Freeze a running clock without going through the transition log.
    /// Used at the period boundary; returns `true` if the state changed.
    pub fn force_pause(&mut self) -> bool {
        if self.timer_state == TimerState::Running {
            self.timer_state = TimerState::Paused;
            true
        } else {
            false
        }
    }

    /// Count down by `seconds`, saturating at zero. Returns the new value.
    pub fn count_down(&mut self, seconds: u32) -> u32 {
        self.time_remaining = self.time_remaining.saturating_sub(seconds);
        self.time_remaining
    }

    /// Overwrite the countdown with a server value. Returns the clamped value.
    pub fn snap_remaining(&mut self, server_seconds: i64) -> u32 {
        self.time_remaining = clamp_remaining(server_seconds);
        self.time_remaining
    }

    /// Duration used by the next `stop` or period change.
    pub fn set_period_duration(&mut self, seconds: u32) {
        self.period_duration = seconds;
    }

    /// Enter `period` with a stopped clock and a full countdown.
    pub fn begin_period(&mut self, period: u32, period_duration: u32) {
        self.current_period = period.max(1);
        self.period_duration = period_duration;
        self.time_remaining = period_duration;
        self.timer_state = TimerState::Stopped;
        self.started_at = None;
    }
}
