//! Error codes the match server attaches to rejected requests.
//!
//! Codes serialize as `SCREAMING_SNAKE_CASE` strings (e.g. `"CLOCK_ALREADY_RUNNING"`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured error codes returned by the match server.
///
/// Use [`description()`](ErrorCode::description) for a human-readable explanation
/// suitable for a one-line user message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Authentication errors
    Unauthorized,
    Forbidden,

    // Validation errors
    InvalidInput,

    // Clock errors
    InvalidTransition,
    ClockAlreadyRunning,
    ClockNotRunning,
    PeriodLimitReached,

    // Lookup errors
    GameNotFound,
    PossessionNotFound,

    // Possession errors
    PossessionAlreadyActive,
    PossessionAlreadyEnded,

    // Rate limiting
    RateLimitExceeded,

    // Server errors
    InternalError,
    ServiceUnavailable,
}

impl ErrorCode {
    /// Returns a human-readable description of this error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Unauthorized => "Your session has expired. Please sign in again.",
            Self::Forbidden => "You do not have permission to change this match.",
            Self::InvalidInput => "The request was rejected as invalid.",
            Self::InvalidTransition => {
                "The match clock cannot make that change from its current state."
            }
            Self::ClockAlreadyRunning => "The match clock is already running.",
            Self::ClockNotRunning => "The match clock is not running.",
            Self::PeriodLimitReached => "The match is already in its final period.",
            Self::GameNotFound => "The match could not be found.",
            Self::PossessionNotFound => "The possession could not be found.",
            Self::PossessionAlreadyActive => "Another possession is already active.",
            Self::PossessionAlreadyEnded => "That possession has already ended.",
            Self::RateLimitExceeded => "Too many requests. Please wait a moment and try again.",
            Self::InternalError => "The server hit an internal error. Please try again.",
            Self::ServiceUnavailable => {
                "The server is temporarily unavailable. Please try again in a few moments."
            }
        }
    }

    /// Returns `true` for codes where the server rejected the request because
    /// of the match's current state rather than a transport problem.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::InvalidTransition
                | Self::ClockAlreadyRunning
                | Self::ClockNotRunning
                | Self::PeriodLimitReached
                | Self::PossessionAlreadyActive
                | Self::PossessionAlreadyEnded
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}
