//! Test fixtures and mock implementations for integration testing

use arena_rating::config::AppConfig;
use arena_rating::error::{RatingError, Result};
use arena_rating::persistence::{PersistedRating, RatingPersistence};
use arena_rating::types::{Category, GlickoRating, RatingKey, SubjectId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Mock persistence backend that captures every upsert for testing
///
/// Starts empty; rows can be seeded to simulate state from an earlier run,
/// and an upsert budget can be armed to make writes start failing partway
/// through a sweep.
#[derive(Debug, Default)]
pub struct MockPersistence {
    rows: Arc<Mutex<HashMap<RatingKey, PersistedRating>>>,
    upserted_keys: Arc<Mutex<Vec<RatingKey>>>,
    /// `Some(n)` allows n more successful upserts, then every upsert fails
    upsert_budget: Arc<Mutex<Option<usize>>>,
}

impl MockPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a persisted row, as if written by a previous service run
    pub fn seed(&self, subject: SubjectId, category: Category, rating: f64, deviation: f64) {
        let row = PersistedRating {
            rating,
            deviation,
            volatility: 0.06,
            matches_played: 10,
            wins: 5,
            losses: 5,
            last_update: 0,
        };
        if let Ok(mut rows) = self.rows.lock() {
            rows.insert(RatingKey::new(subject, category), row);
        }
    }

    /// Get all upserted keys in call order (for testing)
    pub fn upserted_keys(&self) -> Vec<RatingKey> {
        self.upserted_keys
            .lock()
            .map(|keys| keys.clone())
            .unwrap_or_default()
    }

    /// Count upserts that landed in a specific category
    pub fn count_upserts_in(&self, category: Category) -> usize {
        self.upserted_keys()
            .iter()
            .filter(|key| key.category == category)
            .count()
    }

    /// Row currently persisted for a subject in a category
    pub fn row(&self, subject: SubjectId, category: Category) -> Option<PersistedRating> {
        self.rows
            .lock()
            .ok()
            .and_then(|rows| rows.get(&RatingKey::new(subject, category)).cloned())
    }

    /// Number of distinct persisted rows
    pub fn persisted_count(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or(0)
    }

    /// Allow `n` more successful upserts, then fail every one after that
    pub fn fail_upserts_after(&self, n: usize) {
        if let Ok(mut budget) = self.upsert_budget.lock() {
            *budget = Some(n);
        }
    }
}

impl RatingPersistence for MockPersistence {
    fn load(&self, key: RatingKey) -> Result<Option<PersistedRating>> {
        let rows = self.rows.lock().map_err(|_| RatingError::InternalError {
            message: "Failed to acquire rows lock".to_string(),
        })?;

        Ok(rows.get(&key).cloned())
    }

    fn upsert(&self, key: RatingKey, row: PersistedRating) -> Result<()> {
        {
            let mut budget = self
                .upsert_budget
                .lock()
                .map_err(|_| RatingError::InternalError {
                    message: "Failed to acquire budget lock".to_string(),
                })?;

            if let Some(remaining) = budget.as_mut() {
                if *remaining == 0 {
                    return Err(RatingError::PersistenceUnavailable {
                        message: format!("Upsert budget exhausted at subject {}", key.subject),
                    }
                    .into());
                }
                *remaining -= 1;
            }
        }

        if let Ok(mut keys) = self.upserted_keys.lock() {
            keys.push(key);
        }

        let mut rows = self.rows.lock().map_err(|_| RatingError::InternalError {
            message: "Failed to acquire rows lock".to_string(),
        })?;

        rows.insert(key, row);
        Ok(())
    }
}

/// Configuration for integration tests: periodic background work pushed far
/// enough out that only explicit calls touch persistence
pub fn quiet_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.service.name = "arena-rating-test".to_string();
    config.service.flush_interval_seconds = 3_600;
    config
}

/// Glicko triple with default volatility, for seeding cache records
pub fn rated(rating: f64, deviation: f64) -> GlickoRating {
    GlickoRating {
        rating,
        deviation,
        volatility: 0.06,
    }
}
