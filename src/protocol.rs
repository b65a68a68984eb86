//! Data model shared between the engine and its [`MatchApi`](crate::MatchApi)
//! collaborator.
//!
//! The server owns [`MatchClock`] and the active [`Possession`]; the engine only
//! ever holds a projection of them. Types here are plain serde structs so any
//! transport can carry them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Type aliases ────────────────────────────────────────────────────

/// Unique identifier for a match.
pub type GameId = Uuid;

/// Unique identifier for a team.
pub type TeamId = Uuid;

/// Unique identifier for a player.
pub type PlayerId = Uuid;

/// Unique identifier for a possession record.
pub type PossessionId = Uuid;

// ── Enums ───────────────────────────────────────────────────────────

/// Run state of the match clock.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimerState {
    #[default]
    Stopped,
    Running,
    Paused,
}

impl TimerState {
    /// Returns `true` for [`TimerState::Running`].
    pub fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }
}

/// A clock transition requested from the server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ClockAction {
    Start,
    Pause,
    Resume,
    Stop,
}

impl ClockAction {
    /// The timer state this action moves the clock into.
    pub fn target_state(self) -> TimerState {
        match self {
            Self::Start | Self::Resume => TimerState::Running,
            Self::Pause => TimerState::Paused,
            Self::Stop => TimerState::Stopped,
        }
    }

    /// Lowercase name, as used in log lines and confirmation prompts.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Stop => "stop",
        }
    }
}

// ── Structs ─────────────────────────────────────────────────────────

/// Authoritative clock state of one match, as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchClock {
    pub game_id: GameId,
    pub current_period: u32,
    pub timer_state: TimerState,
    /// Seconds left in the current period. Servers occasionally overshoot
    /// below zero; the projection clamps on ingest.
    pub time_remaining_seconds: i64,
    pub period_duration_seconds: u32,
    /// Server timestamp of the last transition into `running`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

/// One team holding the ball for a continuous interval within a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Possession {
    pub id: PossessionId,
    pub game_id: GameId,
    pub team_id: TeamId,
    pub period: u32,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub shots_taken: u32,
}

impl Possession {
    /// A possession is active until it has an `ended_at`.
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// A match-mutating action that has to pass the period-end gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchEvent {
    Fault {
        team_id: TeamId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_id: Option<PlayerId>,
    },
    Shot {
        team_id: TeamId,
        player_id: PlayerId,
        scored: bool,
    },
    /// Free shot or penalty.
    FreeShot {
        team_id: TeamId,
        player_id: PlayerId,
        scored: bool,
    },
    Timeout {
        team_id: TeamId,
    },
    Substitution {
        team_id: TeamId,
        player_out: PlayerId,
        player_in: PlayerId,
    },
}

impl MatchEvent {
    /// Team the event is recorded against.
    pub fn team_id(&self) -> TeamId {
        match self {
            Self::Fault { team_id, .. }
            | Self::Shot { team_id, .. }
            | Self::FreeShot { team_id, .. }
            | Self::Timeout { team_id }
            | Self::Substitution { team_id, .. } => *team_id,
        }
    }

    /// Short label used in confirmation prompts and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Fault { .. } => "fault",
            Self::Shot { .. } => "shot",
            Self::FreeShot { .. } => "free shot",
            Self::Timeout { .. } => "timeout",
            Self::Substitution { .. } => "substitution",
        }
    }

    /// Returns `true` if the event counts as a shot attempt for possession stats.
    pub fn is_shot_attempt(&self) -> bool {
        matches!(self, Self::Shot { .. } | Self::FreeShot { .. })
    }
}

/// Serializable view of a session's projection, for UIs and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub game_id: GameId,
    pub current_period: u32,
    pub timer_state: TimerState,
    pub time_remaining_seconds: u32,
    pub period_duration_seconds: u32,
    pub period_ended: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_possession: Option<Possession>,
    pub possession_duration_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_drift_seconds: Option<i64>,
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn timer_state_uses_lowercase_wire_names() {
        assert_eq!(
            serde_json::to_string(&TimerState::Running).unwrap(),
            "\"running\""
        );
        let state: TimerState = serde_json::from_str("\"paused\"").unwrap();
        assert_eq!(state, TimerState::Paused);
    }

    #[test]
    fn clock_action_targets() {
        assert_eq!(ClockAction::Start.target_state(), TimerState::Running);
        assert_eq!(ClockAction::Resume.target_state(), TimerState::Running);
        assert_eq!(ClockAction::Pause.target_state(), TimerState::Paused);
        assert_eq!(ClockAction::Stop.target_state(), TimerState::Stopped);
    }

    #[test]
    fn match_clock_accepts_missing_started_at() {
        let json = serde_json::json!({
            "game_id": Uuid::nil(),
            "current_period": 2,
            "timer_state": "stopped",
            "time_remaining_seconds": -3,
            "period_duration_seconds": 600
        });
        let clock: MatchClock = serde_json::from_value(json).unwrap();
        assert_eq!(clock.current_period, 2);
        assert_eq!(clock.time_remaining_seconds, -3);
        assert!(clock.started_at.is_none());
    }

    #[test]
    fn match_event_is_internally_tagged() {
        let event = MatchEvent::Timeout {
            team_id: Uuid::from_u128(7),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "timeout");
        assert_eq!(event.team_id(), Uuid::from_u128(7));
        assert!(!event.is_shot_attempt());
    }

    #[test]
    fn possession_activity_follows_ended_at() {
        let mut possession = Possession {
            id: Uuid::from_u128(1),
            game_id: Uuid::nil(),
            team_id: Uuid::from_u128(2),
            period: 1,
            started_at: Utc::now(),
            ended_at: None,
            shots_taken: 0,
        };
        assert!(possession.is_active());
        possession.ended_at = Some(possession.started_at);
        assert!(!possession.is_active());
    }
}
