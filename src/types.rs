//! Common types used throughout the rating service

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for rated subjects (player characters, team members)
pub type SubjectId = u64;

/// Unique identifier for matchmaking queues
pub type QueueId = Uuid;

/// Rating namespace a subject is rated in
///
/// Every category keeps an independent rating per subject; arena brackets
/// are keyed by team size, the battleground rating is bracket-free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Battleground,
    TwoVTwo,
    ThreeVThree,
    FiveVFive,
}

impl Category {
    /// All categories, in persistence sweep order
    pub const ALL: [Category; 4] = [
        Category::Battleground,
        Category::TwoVTwo,
        Category::ThreeVThree,
        Category::FiveVFive,
    ];

    /// Team size for arena brackets; battleground teams are host-defined
    pub fn team_size(&self) -> Option<u32> {
        match self {
            Category::Battleground => None,
            Category::TwoVTwo => Some(2),
            Category::ThreeVThree => Some(3),
            Category::FiveVFive => Some(5),
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Battleground => write!(f, "battleground"),
            Category::TwoVTwo => write!(f, "2v2"),
            Category::ThreeVThree => write!(f, "3v3"),
            Category::FiveVFive => write!(f, "5v5"),
        }
    }
}

/// Composite cache key: one rating exists per (subject, category)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RatingKey {
    pub subject: SubjectId,
    pub category: Category,
}

impl RatingKey {
    pub fn new(subject: SubjectId, category: Category) -> Self {
        Self { subject, category }
    }
}

/// Glicko-2 skill estimate for one subject in one category
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlickoRating {
    pub rating: f64,
    pub deviation: f64,
    pub volatility: f64,
}

impl Default for GlickoRating {
    fn default() -> Self {
        Self {
            rating: 1500.0,
            deviation: 350.0,
            volatility: 0.06,
        }
    }
}

/// Match conclusion, delivered exactly once per concluded match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchEndSignal {
    pub category: Category,
    pub winners: Vec<SubjectId>,
    pub losers: Vec<SubjectId>,
}

/// Candidate-group evaluation against an accumulating matchmaking pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolAdmissionRequest {
    pub queue_id: QueueId,
    pub category: Category,
    pub candidates: Vec<SubjectId>,
    /// Pool size as reported by the host queue; zero signals a pool restart
    pub current_pool_size: u32,
    /// Whole seconds the candidate group has waited in the queue
    pub queue_time_seconds: u64,
}

/// Union type for all inbound signals
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RatingSignal {
    MatchEnd(MatchEndSignal),
    PoolAdmission(PoolAdmissionRequest),
}
