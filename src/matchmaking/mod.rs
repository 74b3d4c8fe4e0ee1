//! Matchmaking pool admission
//!
//! Tracks accumulating selection pools per (queue, category) and gates
//! candidate groups on rating distance with a queue-time-relaxed tolerance.

pub mod gate;

pub use gate::MatchmakingGate;
