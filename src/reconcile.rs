//! Drift correction against the server's countdown.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::protocol::{MatchClock, TimerState};
use crate::timer::TimerController;

/// Drift (in seconds, either direction) above which a correction is logged
/// as a warning instead of at debug level.
const NOTABLE_DRIFT_SECONDS: i64 = 2;

/// Periodically overwrites the projected countdown with the server's value.
///
/// The server always wins: there is no smoothing, the projection snaps.
#[derive(Debug, Clone, Default)]
pub struct ClockReconciler {
    last_drift: Option<i64>,
    last_synced_at: Option<DateTime<Utc>>,
}

impl ClockReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconciliation only happens while the clock runs.
    pub fn should_run(&self, timer_state: TimerState) -> bool {
        timer_state.is_running()
    }

    /// Apply a freshly fetched server clock.
    ///
    /// Returns the drift (`server - projected`) when applied, or `None` if the
    /// local clock is not running (it may have been paused while the fetch was
    /// in flight) or the server is reporting a different period.
    pub fn reconcile(
        &mut self,
        timer: &mut TimerController,
        server: &MatchClock,
        now: DateTime<Utc>,
    ) -> Option<i64> {
        if !self.should_run(timer.timer_state()) {
            debug!("reconcile: clock no longer running, discarding server value");
            return None;
        }
        if server.current_period != timer.current_period() {
            debug!(
                "reconcile: server reports period {}, projection is in {}; skipping",
                server.current_period,
                timer.current_period()
            );
            return None;
        }

        let projected = i64::from(timer.time_remaining());
        let drift = server.time_remaining_seconds - projected;
        timer.snap_remaining(server.time_remaining_seconds);

        if drift.abs() >= NOTABLE_DRIFT_SECONDS {
            warn!("reconcile: corrected {drift:+}s of drift (now {}s)", timer.time_remaining());
        } else {
            debug!("reconcile: drift {drift:+}s");
        }
        self.last_drift = Some(drift);
        self.last_synced_at = Some(now);
        Some(drift)
    }

    /// Drift measured by the last successful reconciliation.
    pub fn last_drift(&self) -> Option<i64> {
        self.last_drift
    }

    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.last_synced_at
    }
}
