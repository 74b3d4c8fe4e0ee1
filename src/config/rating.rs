//! Glicko-2 system configuration

use crate::error::{RatingError, Result};
use crate::types::{Category, GlickoRating};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Rating system configuration
///
/// Defaults for never-rated subjects plus the numeric guards applied by the
/// engine. The initial deviation can be overridden per category; everything
/// else is global.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingConfig {
    /// Rating assigned on first sight of a subject
    pub initial_rating: f64,
    /// Rating deviation assigned on first sight, unless overridden per category
    pub initial_deviation: f64,
    /// Volatility assigned on first sight
    pub initial_volatility: f64,
    /// System constant bounding how fast volatility itself can change
    pub system_tau: f64,
    /// Lower bound applied to every post-update deviation
    pub deviation_floor: f64,
    /// Upper bound applied to inactivity-inflated deviations
    pub deviation_cap: f64,
    /// Per-category initial-deviation overrides
    pub deviation_overrides: HashMap<Category, f64>,
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            initial_rating: 1500.0,
            initial_deviation: 350.0,
            initial_volatility: 0.06,
            system_tau: 0.5,
            deviation_floor: 30.0,
            deviation_cap: 350.0,
            deviation_overrides: HashMap::new(),
        }
    }
}

impl RatingConfig {
    /// Initial deviation for a category, honoring configured overrides
    pub fn initial_deviation_for(&self, category: Category) -> f64 {
        self.deviation_overrides
            .get(&category)
            .copied()
            .unwrap_or(self.initial_deviation)
    }

    /// Default Glicko-2 triple for a never-rated subject in `category`
    pub fn default_glicko(&self, category: Category) -> GlickoRating {
        GlickoRating {
            rating: self.initial_rating,
            deviation: self.initial_deviation_for(category),
            volatility: self.initial_volatility,
        }
    }

    /// Validate numeric bounds
    pub fn validate(&self) -> Result<()> {
        if self.initial_rating <= 0.0 {
            return Err(RatingError::ConfigurationError {
                message: format!("initial_rating must be positive: {}", self.initial_rating),
            }
            .into());
        }
        if self.initial_deviation <= 0.0 {
            return Err(RatingError::ConfigurationError {
                message: format!(
                    "initial_deviation must be positive: {}",
                    self.initial_deviation
                ),
            }
            .into());
        }
        if self.initial_volatility <= 0.0 {
            return Err(RatingError::ConfigurationError {
                message: format!(
                    "initial_volatility must be positive: {}",
                    self.initial_volatility
                ),
            }
            .into());
        }
        if self.system_tau <= 0.0 {
            return Err(RatingError::ConfigurationError {
                message: format!("system_tau must be positive: {}", self.system_tau),
            }
            .into());
        }
        if self.deviation_floor <= 0.0 || self.deviation_floor >= self.deviation_cap {
            return Err(RatingError::ConfigurationError {
                message: format!(
                    "deviation bounds must satisfy 0 < floor < cap, got {} and {}",
                    self.deviation_floor, self.deviation_cap
                ),
            }
            .into());
        }
        for (category, deviation) in &self.deviation_overrides {
            if *deviation <= 0.0 || *deviation > self.deviation_cap {
                return Err(RatingError::ConfigurationError {
                    message: format!(
                        "deviation override for {} out of range: {}",
                        category, deviation
                    ),
                }
                .into());
            }
        }
        Ok(())
    }
}
