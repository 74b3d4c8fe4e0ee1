//! Arena Rating - Glicko-2 rating service for competitive matches
//!
//! This crate maintains per-(subject, category) skill ratings, settles
//! concluded matches through a Glicko-2 engine, and gates matchmaking pool
//! admission with a queue-time-relaxed rating tolerance.

pub mod config;
pub mod error;
pub mod matchmaking;
pub mod metrics;
pub mod persistence;
pub mod rating;
pub mod service;
pub mod settlement;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{RatingError, Result};
pub use types::*;

// Re-export key components
pub use matchmaking::MatchmakingGate;
pub use rating::{Glicko2Engine, RatingAggregator, RatingStore};
pub use service::RatingService;
pub use settlement::MatchSettlement;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
