//! Glicko-2 rating engine and storage
//!
//! This module provides the rating calculation core, the concurrent
//! per-category rating store, and group aggregation over it.

pub mod aggregate;
pub mod glicko2;
pub mod store;

// Re-export commonly used types
pub use aggregate::RatingAggregator;
pub use glicko2::{Glicko2Engine, Observation};
pub use store::{RatingRecord, RatingStore, SaveSweep};
