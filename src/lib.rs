//! # Match Clock Sync
//!
//! Client-side engine that keeps a sports match's running clock, ball
//! possession and period lifecycle consistent with an authoritative server.
//!
//! The server owns the truth; a [`MatchSession`] holds the client's projection
//! of it and:
//!
//! - **applies clock transitions optimistically** and rolls each one back to
//!   its own prior state if the server rejects it ([`timer`])
//! - **derives a live possession duration** that ticks only while the clock
//!   runs and a possession is active ([`possession`])
//! - **freezes the clock at 0:00** and gates every later event behind a user
//!   confirmation ([`period`])
//! - **snaps the countdown to the server** every few seconds to remove drift
//!   ([`reconcile`])
//!
//! The server is reached through the [`MatchApi`] trait; the user is asked
//! through [`ConfirmPrompt`]. Both are injected, so tests swap them for
//! deterministic doubles.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! let server = Arc::new(InMemoryMatchServer::new(Arc::new(SystemClock)));
//! let game = server.create_game(600);
//! let config = SessionConfig::new(game, home, away);
//! let (session, mut events) =
//!     MatchSession::connect(server, Arc::new(SystemClock), Arc::new(AlwaysConfirm), config)
//!         .await?;
//! session.start().await?;
//! ```

pub mod api;
pub mod backends;
pub mod clock;
pub mod confirm;
pub mod error;
pub mod error_codes;
pub mod event;
pub mod period;
pub mod possession;
pub mod protocol;
pub mod reconcile;
pub mod session;
pub mod ticker;
pub mod timer;

// Re-export primary types for ergonomic imports.
pub use api::MatchApi;
pub use clock::{Clock, ManualClock, SystemClock};
pub use confirm::{AlwaysConfirm, ConfirmPrompt, NeverConfirm, ScriptedConfirm};
pub use error::{MatchClockError, Result};
pub use error_codes::ErrorCode;
pub use event::SessionEvent;
pub use protocol::{ClockAction, MatchClock, MatchEvent, Possession, TimerState};
pub use session::{MatchSession, PeriodOpening, SessionConfig};

#[cfg(feature = "memory-server")]
pub use backends::InMemoryMatchServer;
