//! Error types for the match clock engine.

use serde::Deserialize;
use thiserror::Error;

use crate::error_codes::ErrorCode;

/// Message shown when a failure carries no detail of its own.
pub const GENERIC_FAILURE_MESSAGE: &str = "Could not update the match. Please try again.";

/// Errors surfaced by the engine and its [`MatchApi`](crate::MatchApi) collaborator.
#[derive(Debug, Error)]
pub enum MatchClockError {
    /// The request never got a usable response (network error, dropped connection).
    #[error("transport error: {0}")]
    Transport(String),

    /// The server rejected the request.
    #[error("server error: {message}")]
    ServerError {
        /// Human-readable error message from the server. May be empty.
        message: String,
        /// Structured error code, if provided by the server.
        error_code: Option<ErrorCode>,
    },

    /// The requested record does not exist.
    #[error("not found")]
    NotFound,

    /// The transport gave up waiting for a response.
    #[error("operation timed out")]
    Timeout,

    /// Failed to serialize or deserialize a payload.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The session has been shut down.
    #[error("match session closed")]
    SessionClosed,
}

/// Error body shapes accepted by [`MatchClockError::from_response`].
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default, alias = "detail", alias = "error")]
    message: Option<String>,
    #[serde(default)]
    error_code: Option<ErrorCode>,
}

impl MatchClockError {
    /// Build an error from a failed HTTP-style response.
    ///
    /// The body may be JSON with a `message`, `detail` or `error` field and an
    /// optional `error_code`; anything else is treated as an opaque message.
    pub fn from_response(status: u16, body: &str) -> Self {
        let parsed = serde_json::from_str::<ErrorBody>(body).ok();
        let (message, error_code) = match parsed {
            Some(body) => (body.message.unwrap_or_default(), body.error_code),
            None => (body.trim().to_string(), None),
        };

        match status {
            404 if error_code.is_none() => Self::NotFound,
            408 | 504 => Self::Timeout,
            409 => Self::ServerError {
                message,
                error_code: error_code.or(Some(ErrorCode::InvalidTransition)),
            },
            500..=599 => Self::ServerError {
                message,
                error_code: error_code.or(Some(ErrorCode::ServiceUnavailable)),
            },
            _ => Self::ServerError {
                message,
                error_code,
            },
        }
    }

    /// One-line message suitable for showing to the user.
    ///
    /// The server's own message wins when it supplied one; otherwise the error
    /// code's description, otherwise a generic fallback.
    pub fn user_message(&self) -> String {
        match self {
            Self::ServerError {
                message,
                error_code,
            } => {
                let line = message.lines().next().unwrap_or_default().trim();
                if !line.is_empty() {
                    line.to_string()
                } else if let Some(code) = error_code {
                    code.description().to_string()
                } else {
                    GENERIC_FAILURE_MESSAGE.to_string()
                }
            }
            Self::NotFound => ErrorCode::GameNotFound.description().to_string(),
            Self::SessionClosed => "This match is no longer open.".to_string(),
            Self::Transport(_) | Self::Timeout | Self::Serialization(_) => {
                GENERIC_FAILURE_MESSAGE.to_string()
            }
        }
    }

    /// Returns `true` if the server rejected the request because of match state.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::ServerError {
                error_code: Some(code),
                ..
            } if code.is_conflict()
        )
    }
}

/// A specialized [`Result`] type for match clock operations.
pub type Result<T> = std::result::Result<T, MatchClockError>;
