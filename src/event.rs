//! Events emitted by a [`MatchSession`](crate::MatchSession).
//!
//! Events are informational: the session's accessors always hold the current
//! projection. They exist so a UI can redraw without polling.

use crate::protocol::{ClockAction, MatchEvent, Possession, TimerState};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The projected timer state changed (optimistically, by rollback, or by
    /// the period-end freeze).
    TimerStateChanged {
        previous: TimerState,
        current: TimerState,
    },
    /// The server rejected a clock transition and the projection was restored.
    TransitionRolledBack {
        action: ClockAction,
        restored: TimerState,
        /// One-line message for the user.
        message: String,
    },
    /// The countdown moved on a local tick.
    CountdownTick { time_remaining: u32 },
    /// A new possession became active, or the active one ended (`None`).
    PossessionChanged { possession: Option<Possession> },
    /// The displayed possession duration changed on a tick.
    PossessionDurationTick { seconds: u64 },
    /// The countdown reached 0:00; the clock has been frozen.
    PeriodEnded { period: u32 },
    /// The match moved to a new period.
    PeriodAdvanced { period: u32, period_duration: u32 },
    /// The countdown was snapped to the server's value.
    ClockReconciled { drift_seconds: i64, time_remaining: u32 },
    /// A gated event was accepted by the server.
    EventRecorded { event: MatchEvent },
    /// A gated event was refused at the period-end prompt.
    EventBlocked { event: MatchEvent },
}
