//! Matchmaking gate configuration

use crate::error::{RatingError, Result};
use crate::types::Category;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Admission tolerance profile for one category
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToleranceProfile {
    /// Accepted rating distance at zero queue time
    pub initial_range: f64,
    /// Hard cap on the relaxed tolerance
    pub max_range: f64,
    /// Tolerance widening per whole second of queue wait
    pub relaxation_rate: f64,
}

impl ToleranceProfile {
    /// Relaxed tolerance after `queue_time_seconds` in the queue
    ///
    /// Linear in elapsed wait, monotone non-decreasing, capped at `max_range`.
    pub fn relaxed(&self, queue_time_seconds: u64) -> f64 {
        (self.initial_range + self.relaxation_rate * queue_time_seconds as f64).min(self.max_range)
    }

    fn validate(&self, category: Category) -> Result<()> {
        if self.initial_range <= 0.0
            || self.max_range < self.initial_range
            || self.relaxation_rate < 0.0
        {
            return Err(RatingError::ConfigurationError {
                message: format!(
                    "tolerance profile for {} must satisfy 0 < initial_range <= max_range and relaxation_rate >= 0",
                    category
                ),
            }
            .into());
        }
        Ok(())
    }
}

/// Matchmaking gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Seconds without updates after which a tracked pool is abandoned
    pub pool_stale_seconds: u64,
    /// Per-category admission tolerance profiles
    pub profiles: HashMap<Category, ToleranceProfile>,
}

impl Default for GateConfig {
    fn default() -> Self {
        let mut profiles = HashMap::new();
        for category in Category::ALL {
            profiles.insert(category, Self::default_profile(category));
        }
        Self {
            pool_stale_seconds: 300,
            profiles,
        }
    }
}

impl GateConfig {
    /// Documented fallback profile per category, used when a deployment's
    /// configuration omits an entry
    pub fn default_profile(category: Category) -> ToleranceProfile {
        match category {
            Category::TwoVTwo => ToleranceProfile {
                initial_range: 150.0,
                max_range: 800.0,
                relaxation_rate: 15.0,
            },
            Category::ThreeVThree => ToleranceProfile {
                initial_range: 200.0,
                max_range: 1000.0,
                relaxation_rate: 12.0,
            },
            Category::FiveVFive => ToleranceProfile {
                initial_range: 250.0,
                max_range: 1200.0,
                relaxation_rate: 10.0,
            },
            Category::Battleground => ToleranceProfile {
                initial_range: 200.0,
                max_range: 1000.0,
                relaxation_rate: 12.0,
            },
        }
    }

    /// Profile for a category, falling back to the documented default
    pub fn profile_for(&self, category: Category) -> ToleranceProfile {
        self.profiles
            .get(&category)
            .copied()
            .unwrap_or_else(|| Self::default_profile(category))
    }

    /// Staleness window as a Duration
    pub fn pool_stale_window(&self) -> Duration {
        Duration::from_secs(self.pool_stale_seconds)
    }

    /// Validate all configured profiles
    pub fn validate(&self) -> Result<()> {
        if self.pool_stale_seconds == 0 {
            return Err(RatingError::ConfigurationError {
                message: "pool_stale_seconds must be greater than 0".to_string(),
            }
            .into());
        }
        for (category, profile) in &self.profiles {
            profile.validate(*category)?;
        }
        Ok(())
    }
}
