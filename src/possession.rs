//! Live possession duration.
//!
//! [`PossessionTracker`] is the only writer of the displayed possession
//! duration. While the clock runs, the value is `now - started_at` of the
//! active possession; otherwise it stays frozen at the last computed value.
//! Elapsed time is always measured from the possession's original
//! `started_at`, so a possession that resumes after a pause also counts the
//! paused interval.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::protocol::{Possession, TeamId, TimerState};

#[derive(Debug, Clone, Default)]
pub struct PossessionTracker {
    active: Option<Possession>,
    duration: u64,
    first_start_claimed: bool,
}

fn elapsed_seconds(started_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    u64::try_from((now - started_at).num_seconds()).unwrap_or(0)
}

impl PossessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Active possession, if any.
    pub fn active(&self) -> Option<&Possession> {
        self.active.as_ref()
    }

    /// Displayed possession duration in seconds.
    pub fn duration(&self) -> u64 {
        self.duration
    }

    /// The 1-second tick runs iff the clock is running and a possession is active.
    pub fn should_tick(&self, timer_state: TimerState) -> bool {
        timer_state.is_running() && self.active.is_some()
    }

    /// Recompute on a tick. Does nothing unless the tick should be running.
    /// Returns `true` if the displayed value changed.
    pub fn refresh(&mut self, timer_state: TimerState, now: DateTime<Utc>) -> bool {
        if !self.should_tick(timer_state) {
            return false;
        }
        self.recompute(now)
    }

    /// React to a timer state change. Entering or leaving `running` computes
    /// one value; after leaving, it is frozen until the next run.
    pub fn on_timer_state_changed(
        &mut self,
        previous: TimerState,
        next: TimerState,
        now: DateTime<Utc>,
    ) {
        if previous == next {
            return;
        }
        if previous.is_running() || next.is_running() {
            self.recompute(now);
        }
    }

    /// Replace the active possession. The duration resets to zero and, if the
    /// clock is running, starts counting from the new record's `started_at`.
    pub fn set_active(
        &mut self,
        possession: Option<Possession>,
        timer_state: TimerState,
        now: DateTime<Utc>,
    ) {
        let possession = possession.filter(Possession::is_active);
        match &possession {
            Some(p) => debug!("possession: team {} active since {}", p.team_id, p.started_at),
            None => debug!("possession: none active"),
        }
        self.active = possession;
        self.duration = 0;
        if timer_state.is_running() {
            self.recompute(now);
        }
    }

    /// Decide whether leaving `stopped` should open the first possession.
    ///
    /// Only the very first departure from `stopped` counts; it yields `true`
    /// when that happens in period 1 with no possession already active.
    pub fn claim_first_start(&mut self, period: u32) -> bool {
        if self.first_start_claimed {
            return false;
        }
        self.first_start_claimed = true;
        period == 1 && self.active.is_none()
    }

    /// Mark the first start as already consumed (a match joined mid-way).
    pub fn mark_first_start_claimed(&mut self) {
        self.first_start_claimed = true;
    }

    pub fn first_start_claimed(&self) -> bool {
        self.first_start_claimed
    }

    /// Count a shot attempt against the active possession if it belongs to `team_id`.
    pub fn record_shot(&mut self, team_id: TeamId) -> bool {
        match self.active.as_mut() {
            Some(p) if p.team_id == team_id => {
                p.shots_taken += 1;
                true
            }
            _ => false,
        }
    }

    fn recompute(&mut self, now: DateTime<Utc>) -> bool {
        let next = self
            .active
            .as_ref()
            .map_or(0, |p| elapsed_seconds(p.started_at, now));
        let changed = next != self.duration;
        self.duration = next;
        changed
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(secs)
    }

    fn possession(team: u128, started: i64) -> Possession {
        Possession {
            id: Uuid::from_u128(1000 + team),
            game_id: Uuid::nil(),
            team_id: Uuid::from_u128(team),
            period: 1,
            started_at: at(started),
            ended_at: None,
            shots_taken: 0,
        }
    }

    #[test]
    fn pause_resume_and_swap_timeline() {
        let mut tracker = PossessionTracker::new();
        tracker.set_active(Some(possession(1, 0)), TimerState::Running, at(0));
        assert_eq!(tracker.duration(), 0);

        tracker.refresh(TimerState::Running, at(10));
        assert_eq!(tracker.duration(), 10);

        tracker.on_timer_state_changed(TimerState::Running, TimerState::Paused, at(10));
        tracker.refresh(TimerState::Paused, at(15));
        assert_eq!(tracker.duration(), 10);

        tracker.on_timer_state_changed(TimerState::Paused, TimerState::Running, at(15));
        tracker.refresh(TimerState::Running, at(22));
        assert_eq!(tracker.duration(), 22);

        tracker.set_active(Some(possession(2, 22)), TimerState::Running, at(22));
        assert_eq!(tracker.duration(), 0);
        tracker.refresh(TimerState::Running, at(27));
        assert_eq!(tracker.duration(), 5);
    }

    #[test]
    fn frozen_while_not_running() {
        let mut tracker = PossessionTracker::new();
        tracker.set_active(Some(possession(1, 0)), TimerState::Running, at(0));
        tracker.on_timer_state_changed(TimerState::Running, TimerState::Stopped, at(7));
        assert_eq!(tracker.duration(), 7);
        for t in [8, 100, 10_000] {
            assert!(!tracker.refresh(TimerState::Stopped, at(t)));
            assert_eq!(tracker.duration(), 7);
        }
    }

    #[test]
    fn clearing_resets_to_zero() {
        let mut tracker = PossessionTracker::new();
        tracker.set_active(Some(possession(1, 0)), TimerState::Running, at(30));
        assert_eq!(tracker.duration(), 30);
        tracker.set_active(None, TimerState::Running, at(31));
        assert_eq!(tracker.duration(), 0);
        assert!(!tracker.should_tick(TimerState::Running));
    }

    #[test]
    fn ended_records_are_not_tracked() {
        let mut ended = possession(1, 0);
        ended.ended_at = Some(at(5));
        let mut tracker = PossessionTracker::new();
        tracker.set_active(Some(ended), TimerState::Running, at(10));
        assert!(tracker.active().is_none());
        assert_eq!(tracker.duration(), 0);
    }

    #[test]
    fn start_time_in_the_future_reads_zero() {
        let mut tracker = PossessionTracker::new();
        tracker.set_active(Some(possession(1, 50)), TimerState::Running, at(40));
        assert_eq!(tracker.duration(), 0);
        tracker.refresh(TimerState::Running, at(45));
        assert_eq!(tracker.duration(), 0);
    }

    #[test]
    fn first_start_is_claimed_once() {
        let mut tracker = PossessionTracker::new();
        assert!(tracker.claim_first_start(1));
        assert!(!tracker.claim_first_start(1));
        assert!(tracker.first_start_claimed());
    }

    #[test]
    fn first_start_skipped_outside_period_one_or_with_possession() {
        let mut later = PossessionTracker::new();
        assert!(!later.claim_first_start(2));

        let mut held = PossessionTracker::new();
        held.set_active(Some(possession(1, 0)), TimerState::Stopped, at(0));
        assert!(!held.claim_first_start(1));
    }

    #[test]
    fn shots_count_only_for_team_in_possession() {
        let mut tracker = PossessionTracker::new();
        tracker.set_active(Some(possession(1, 0)), TimerState::Running, at(0));
        assert!(tracker.record_shot(Uuid::from_u128(1)));
        assert!(!tracker.record_shot(Uuid::from_u128(2)));
        assert_eq!(tracker.active().unwrap().shots_taken, 1);
    }
}
