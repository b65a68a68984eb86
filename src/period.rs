//! Period lifecycle and the period-end gate.
//!
//! The gate moves `BeforePeriodEnd -> PeriodEnded` the instant the countdown
//! hits zero, at which point the running clock is frozen. From then on every
//! gated action asks the user; a confirmation lets that single action through
//! ("overridden"), a refusal blocks it. Nothing is remembered between asks.

use tracing::{debug, info};

use crate::confirm::ConfirmPrompt;
use crate::timer::TimerController;

/// Where the current period stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodPhase {
    BeforePeriodEnd,
    PeriodEnded,
}

/// Result of consulting the gate for one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Time remains in the period; no prompt shown.
    Open,
    /// The period has ended and the user confirmed this action.
    Overridden,
    /// The period has ended and the user declined.
    Blocked,
}

impl GateDecision {
    pub fn allows(self) -> bool {
        !matches!(self, Self::Blocked)
    }
}

/// What [`PeriodLifecycleManager::enforce_boundary`] found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoundaryOutcome {
    /// The period is (now) at 0:00.
    pub period_ended: bool,
    /// This check is the one that crossed the boundary.
    pub newly_ended: bool,
    /// A running clock was forced to `paused`; the server must be told.
    pub froze_clock: bool,
}

#[derive(Debug, Clone)]
pub struct PeriodLifecycleManager {
    max_periods: u32,
    ended: bool,
}

impl PeriodLifecycleManager {
    pub fn new(max_periods: u32) -> Self {
        Self {
            max_periods: max_periods.max(1),
            ended: false,
        }
    }

    pub fn max_periods(&self) -> u32 {
        self.max_periods
    }

    pub fn phase(&self) -> PeriodPhase {
        if self.ended {
            PeriodPhase::PeriodEnded
        } else {
            PeriodPhase::BeforePeriodEnd
        }
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// One countdown tick of `seconds` on a running clock, followed by a
    /// boundary check. A clock that is not running is left alone.
    pub fn on_countdown_tick(
        &mut self,
        timer: &mut TimerController,
        seconds: u32,
    ) -> BoundaryOutcome {
        if !timer.timer_state().is_running() {
            return BoundaryOutcome {
                period_ended: self.ended,
                ..BoundaryOutcome::default()
            };
        }
        timer.count_down(seconds);
        self.enforce_boundary(timer)
    }

    /// Re-evaluate the boundary after anything that may have changed the
    /// countdown or the run state (tick, server snap, rollback).
    ///
    /// At zero the period is marked ended and a running clock is paused. A
    /// countdown that is back above zero (the server corrected it, or the
    /// clock was stopped and reset) reopens the gate.
    pub fn enforce_boundary(&mut self, timer: &mut TimerController) -> BoundaryOutcome {
        if timer.time_remaining() > 0 {
            if self.ended {
                debug!(
                    "period {}: countdown back at {}s, gate reopened",
                    timer.current_period(),
                    timer.time_remaining()
                );
                self.ended = false;
            }
            return BoundaryOutcome::default();
        }

        let newly_ended = !self.ended;
        self.ended = true;
        let froze_clock = timer.force_pause();
        if newly_ended {
            info!("period {} ended", timer.current_period());
        }
        BoundaryOutcome {
            period_ended: true,
            newly_ended,
            froze_clock,
        }
    }

    /// Consult the gate for one action described by `what`.
    pub fn gate(
        &self,
        timer: &TimerController,
        prompt: &dyn ConfirmPrompt,
        what: &str,
    ) -> GateDecision {
        if !self.ended && timer.time_remaining() > 0 {
            return GateDecision::Open;
        }
        let message = format!(
            "Period {} has ended. Record this {what} anyway?",
            timer.current_period()
        );
        if prompt.confirm(&message) {
            debug!("gate: {what} confirmed after period end");
            GateDecision::Overridden
        } else {
            debug!("gate: {what} blocked after period end");
            GateDecision::Blocked
        }
    }

    /// `true` if a match-mutating action may proceed right now.
    pub fn can_add_events(&self, timer: &TimerController, prompt: &dyn ConfirmPrompt) -> bool {
        self.gate(timer, prompt, "event").allows()
    }

    /// The period after `current`, or `None` at the last period.
    pub fn next_period(&self, current: u32) -> Option<u32> {
        (current < self.max_periods).then_some(current + 1)
    }

    /// Enter `period`: stopped clock, full countdown, gate open.
    pub fn enter_period(&mut self, timer: &mut TimerController, period: u32, duration: u32) {
        timer.begin_period(period, duration);
        self.ended = false;
        info!("period {period} begins ({duration}s)");
    }
}
