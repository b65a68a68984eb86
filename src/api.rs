//! Collaborator abstraction for the authoritative match server.
//!
//! The [`MatchApi`] trait is the only way the engine talks to the server. The
//! wire format, authentication and retry policy all live behind it: the engine
//! observes a single final success or failure per call and never retries.
//!
//! # Implementing a Custom Backend
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use match_clock_sync::api::MatchApi;
//! use match_clock_sync::error::Result;
//! use match_clock_sync::protocol::{
//!     ClockAction, GameId, MatchClock, MatchEvent, Possession, PossessionId, TeamId,
//! };
//!
//! struct RestApi { /* http client, base url, ... */ }
//!
//! #[async_trait]
//! impl MatchApi for RestApi {
//!     async fn get_clock(&self, game_id: GameId) -> Result<MatchClock> {
//!         // GET /games/{id}/clock
//!         todo!()
//!     }
//!     async fn transition_clock(&self, game_id: GameId, action: ClockAction) -> Result<MatchClock> {
//!         // POST /games/{id}/clock/{action}
//!         todo!()
//!     }
//!     async fn advance_period(&self, game_id: GameId) -> Result<MatchClock> { todo!() }
//!     async fn set_period_duration(&self, game_id: GameId, seconds: u32) -> Result<MatchClock> { todo!() }
//!     async fn get_active_possession(&self, game_id: GameId) -> Result<Option<Possession>> { todo!() }
//!     async fn create_possession(&self, game_id: GameId, team_id: TeamId, period: u32) -> Result<Possession> { todo!() }
//!     async fn end_possession(&self, possession_id: PossessionId) -> Result<Possession> { todo!() }
//!     async fn record_event(&self, game_id: GameId, event: MatchEvent) -> Result<()> { todo!() }
//! }
//! ```

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::{
    ClockAction, GameId, MatchClock, MatchEvent, Possession, PossessionId, TeamId,
};

/// Remote operations the engine depends on.
///
/// Every method is a suspension point: the engine applies its optimistic
/// update first, then awaits the call. Calls are never cancelled once issued.
///
/// # Object Safety
///
/// This trait is object-safe; the session stores it as `Arc<dyn MatchApi>`.
#[async_trait]
pub trait MatchApi: Send + Sync + 'static {
    /// Fetch the authoritative clock for a match.
    async fn get_clock(&self, game_id: GameId) -> Result<MatchClock>;

    /// Ask the server to apply a clock transition.
    ///
    /// # Errors
    ///
    /// Returns [`MatchClockError::ServerError`](crate::MatchClockError::ServerError)
    /// when the server considers the transition invalid, or a transport error.
    async fn transition_clock(&self, game_id: GameId, action: ClockAction) -> Result<MatchClock>;

    /// Move the match to its next period. The server stops the clock and
    /// resets the countdown to the period duration.
    async fn advance_period(&self, game_id: GameId) -> Result<MatchClock>;

    /// Change the duration every later `stop` and period change resets to.
    /// The countdown already in progress is not touched.
    async fn set_period_duration(&self, game_id: GameId, seconds: u32) -> Result<MatchClock>;

    /// Fetch the active possession, if any.
    ///
    /// "No active possession" is `Ok(None)`. Implementations that can only
    /// report it as [`MatchClockError::NotFound`](crate::MatchClockError::NotFound)
    /// may do so; the engine treats both the same.
    async fn get_active_possession(&self, game_id: GameId) -> Result<Option<Possession>>;

    /// Open a new possession for `team_id` in `period`.
    async fn create_possession(
        &self,
        game_id: GameId,
        team_id: TeamId,
        period: u32,
    ) -> Result<Possession>;

    /// Close a possession; returns the record with `ended_at` set.
    async fn end_possession(&self, possession_id: PossessionId) -> Result<Possession>;

    /// Record a fault, shot, free shot, timeout or substitution.
    async fn record_event(&self, game_id: GameId, event: MatchEvent) -> Result<()>;
}
