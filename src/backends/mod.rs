//! [`MatchApi`](crate::MatchApi) implementations shipped with the crate.
//!
//! Enable the corresponding Cargo feature to pull in a backend:
//!
//! | Feature         | Backend                 |
//! |-----------------|-------------------------|
//! | `memory-server` | [`InMemoryMatchServer`] |
//!
//! Real deployments implement [`MatchApi`](crate::MatchApi) over their own
//! HTTP client and map failed responses with
//! [`MatchClockError::from_response`](crate::MatchClockError::from_response).

#[cfg(feature = "memory-server")]
pub mod memory;

#[cfg(feature = "memory-server")]
pub use memory::InMemoryMatchServer;
