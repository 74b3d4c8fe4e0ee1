//! Concurrent rating store
//!
//! System of record for ratings between matches: one record per
//! (subject, category), many concurrent readers, mutually exclusive writers.
//! Reads materialize configured defaults for unseen keys without touching
//! durable storage; save sweeps snapshot under the lock and release it before
//! crossing the persistence boundary.

use crate::config::RatingConfig;
use crate::error::RatingError;
use crate::persistence::{PersistedRating, RatingPersistence};
use crate::types::{Category, GlickoRating, RatingKey, SubjectId};
use crate::utils;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Cached rating state for one (subject, category)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingRecord {
    pub rating: f64,
    pub deviation: f64,
    pub volatility: f64,
    pub matches_played: u32,
    pub wins: u32,
    pub losses: u32,
    /// True once the value is confirmed present in durable storage
    pub loaded: bool,
    pub last_updated: DateTime<Utc>,
}

impl RatingRecord {
    /// Fresh non-loaded record from a default triple
    pub fn from_default(glicko: GlickoRating) -> Self {
        Self {
            rating: glicko.rating,
            deviation: glicko.deviation,
            volatility: glicko.volatility,
            matches_played: 0,
            wins: 0,
            losses: 0,
            loaded: false,
            last_updated: utils::current_timestamp(),
        }
    }

    /// View as the Glicko-2 triple
    pub fn glicko(&self) -> GlickoRating {
        GlickoRating {
            rating: self.rating,
            deviation: self.deviation,
            volatility: self.volatility,
        }
    }

    /// Apply a settled result: new triple plus win/loss accounting
    pub fn record_result(&mut self, updated: GlickoRating, won: bool) {
        self.rating = updated.rating;
        self.deviation = updated.deviation;
        self.volatility = updated.volatility;
        self.matches_played += 1;
        if won {
            self.wins += 1;
        } else {
            self.losses += 1;
        }
        self.last_updated = utils::current_timestamp();
    }

    fn to_row(&self) -> PersistedRating {
        PersistedRating {
            rating: self.rating,
            deviation: self.deviation,
            volatility: self.volatility,
            matches_played: self.matches_played,
            wins: self.wins,
            losses: self.losses,
            last_update: utils::to_epoch_seconds(self.last_updated),
        }
    }

    fn from_row(row: PersistedRating) -> Self {
        Self {
            rating: row.rating,
            deviation: row.deviation,
            volatility: row.volatility,
            matches_played: row.matches_played,
            wins: row.wins,
            losses: row.losses,
            loaded: true,
            last_updated: utils::from_epoch_seconds(row.last_update),
        }
    }
}

/// Result of a bulk save sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSweep {
    pub saved: usize,
    pub failed: usize,
}

/// Thread-safe rating cache with persistence hooks
///
/// The in-memory value is authoritative for the process lifetime; durable
/// storage is written opportunistically and its failures never invalidate
/// the cache.
pub struct RatingStore {
    ratings: RwLock<HashMap<RatingKey, RatingRecord>>,
    persistence: Arc<dyn RatingPersistence>,
    config: RatingConfig,
}

impl RatingStore {
    /// Create an empty store over a persistence port
    pub fn new(config: RatingConfig, persistence: Arc<dyn RatingPersistence>) -> Self {
        Self {
            ratings: RwLock::new(HashMap::new()),
            persistence,
            config,
        }
    }

    /// Configured default triple for a category
    pub fn default_rating(&self, category: Category) -> GlickoRating {
        self.config.default_glicko(category)
    }

    /// Resolve the record for a key
    ///
    /// Unseen keys materialize the configured default for the key's category
    /// into the cache (non-loaded) without any durable-storage traffic.
    pub fn get(&self, key: RatingKey) -> crate::error::Result<RatingRecord> {
        {
            let ratings = self.ratings.read().map_err(|_| RatingError::InternalError {
                message: "Failed to acquire ratings read lock".to_string(),
            })?;

            if let Some(record) = ratings.get(&key) {
                return Ok(record.clone());
            }
        }

        let mut ratings = self.ratings.write().map_err(|_| RatingError::InternalError {
            message: "Failed to acquire ratings write lock".to_string(),
        })?;

        let record = ratings.entry(key).or_insert_with(|| {
            debug!(
                "Materializing default rating for subject {} in {}",
                key.subject, key.category
            );
            RatingRecord::from_default(self.config.default_glicko(key.category))
        });

        Ok(record.clone())
    }

    /// Store a record, marking it eligible for save sweeps
    pub fn set(&self, key: RatingKey, mut record: RatingRecord) -> crate::error::Result<()> {
        let mut ratings = self.ratings.write().map_err(|_| RatingError::InternalError {
            message: "Failed to acquire ratings write lock".to_string(),
        })?;

        record.loaded = true;
        ratings.insert(key, record);
        Ok(())
    }

    /// Whether a record is cached for the key
    pub fn has(&self, key: RatingKey) -> crate::error::Result<bool> {
        let ratings = self.ratings.read().map_err(|_| RatingError::InternalError {
            message: "Failed to acquire ratings read lock".to_string(),
        })?;

        Ok(ratings.contains_key(&key))
    }

    /// Drop one key from the cache
    pub fn remove(&self, key: RatingKey) -> crate::error::Result<bool> {
        let mut ratings = self.ratings.write().map_err(|_| RatingError::InternalError {
            message: "Failed to acquire ratings write lock".to_string(),
        })?;

        Ok(ratings.remove(&key).is_some())
    }

    /// Drop every category's record for a subject (subject deletion hook)
    pub fn remove_subject(&self, subject: SubjectId) -> crate::error::Result<usize> {
        let mut ratings = self.ratings.write().map_err(|_| RatingError::InternalError {
            message: "Failed to acquire ratings write lock".to_string(),
        })?;

        let mut removed = 0;
        for category in Category::ALL {
            if ratings.remove(&RatingKey::new(subject, category)).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Number of cached records (observability)
    pub fn cache_size(&self) -> crate::error::Result<usize> {
        let ratings = self.ratings.read().map_err(|_| RatingError::InternalError {
            message: "Failed to acquire ratings read lock".to_string(),
        })?;

        Ok(ratings.len())
    }

    /// Insert the configured default marked as loaded, so the next sweep
    /// persists it; no-op when the key already exists
    pub fn initialize(
        &self,
        subject: SubjectId,
        category: Category,
    ) -> crate::error::Result<RatingRecord> {
        let mut ratings = self.ratings.write().map_err(|_| RatingError::InternalError {
            message: "Failed to acquire ratings write lock".to_string(),
        })?;

        let key = RatingKey::new(subject, category);
        let record = ratings.entry(key).or_insert_with(|| {
            let mut record = RatingRecord::from_default(self.config.default_glicko(category));
            record.loaded = true;
            record
        });

        Ok(record.clone())
    }

    /// Populate the cache from durable storage
    ///
    /// Returns true when a row existed; otherwise the cache is left as-is
    /// and defaults materialize on the next read.
    pub fn load(&self, key: RatingKey) -> crate::error::Result<bool> {
        match self.persistence.load(key)? {
            Some(row) => {
                let mut ratings = self.ratings.write().map_err(|_| RatingError::InternalError {
                    message: "Failed to acquire ratings write lock".to_string(),
                })?;

                debug!(
                    "Loaded rating for subject {} in {} ({:.1})",
                    key.subject, key.category, row.rating
                );
                ratings.insert(key, RatingRecord::from_row(row));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Write one loaded record back to durable storage
    ///
    /// Returns false when the key is absent or was never loaded. The write
    /// happens after the cache lock is released.
    pub fn save(&self, key: RatingKey) -> crate::error::Result<bool> {
        let row = {
            let ratings = self.ratings.read().map_err(|_| RatingError::InternalError {
                message: "Failed to acquire ratings read lock".to_string(),
            })?;

            match ratings.get(&key) {
                Some(record) if record.loaded => record.to_row(),
                _ => return Ok(false),
            }
        };

        self.persistence.upsert(key, row)?;
        Ok(true)
    }

    /// Write every loaded record for a subject back to durable storage
    pub fn save_subject(&self, subject: SubjectId) -> crate::error::Result<SaveSweep> {
        let snapshot = self.snapshot_loaded(|key| key.subject == subject)?;
        Ok(self.write_rows(snapshot))
    }

    /// Write every loaded record back to durable storage (flush hook)
    pub fn save_all_cached(&self) -> crate::error::Result<SaveSweep> {
        let snapshot = self.snapshot_loaded(|_| true)?;
        let sweep = self.write_rows(snapshot);
        debug!(
            "Flushed rating cache: {} saved, {} failed",
            sweep.saved, sweep.failed
        );
        Ok(sweep)
    }

    /// Snapshot loaded entries matching the filter while holding the read lock
    fn snapshot_loaded<F>(&self, filter: F) -> crate::error::Result<Vec<(RatingKey, PersistedRating)>>
    where
        F: Fn(&RatingKey) -> bool,
    {
        let ratings = self.ratings.read().map_err(|_| RatingError::InternalError {
            message: "Failed to acquire ratings read lock".to_string(),
        })?;

        Ok(ratings
            .iter()
            .filter(|(key, record)| record.loaded && filter(key))
            .map(|(key, record)| (*key, record.to_row()))
            .collect())
    }

    /// Push snapshot rows through the port, no cache lock held
    fn write_rows(&self, rows: Vec<(RatingKey, PersistedRating)>) -> SaveSweep {
        let mut sweep = SaveSweep::default();
        for (key, row) in rows {
            match self.persistence.upsert(key, row) {
                Ok(()) => sweep.saved += 1,
                Err(e) => {
                    sweep.failed += 1;
                    warn!(
                        "Failed to persist rating for subject {} in {}: {}",
                        key.subject, key.category, e
                    );
                }
            }
        }
        sweep
    }
}

impl std::fmt::Debug for RatingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RatingStore")
            .field("entries", &self.ratings.read().map(|r| r.len()).unwrap_or(0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{InMemoryPersistence, RecordingPersistence};

    fn create_test_store() -> (RatingStore, Arc<RecordingPersistence>) {
        let persistence = Arc::new(RecordingPersistence::new());
        let store = RatingStore::new(RatingConfig::default(), persistence.clone());
        (store, persistence)
    }

    fn arena_key(subject: SubjectId) -> RatingKey {
        RatingKey::new(subject, Category::TwoVTwo)
    }

    #[test]
    fn test_get_materializes_default_without_persistence_traffic() {
        let (store, persistence) = create_test_store();
        let key = arena_key(42);

        let record = store.get(key).unwrap();

        assert_eq!(record.rating, 1500.0);
        assert_eq!(record.deviation, 350.0);
        assert_eq!(record.volatility, 0.06);
        assert_eq!(record.matches_played, 0);
        assert!(!record.loaded);

        // Cached, but never written through
        assert_eq!(store.cache_size().unwrap(), 1);
        assert!(persistence.row(key).is_none());
        assert!(persistence.upsert_calls().is_empty());
    }

    #[test]
    fn test_default_honors_category_override() {
        let mut config = RatingConfig::default();
        config
            .deviation_overrides
            .insert(Category::Battleground, 200.0);
        let store = RatingStore::new(config, Arc::new(InMemoryPersistence::new()));

        let battleground = store
            .get(RatingKey::new(1, Category::Battleground))
            .unwrap();
        let arena = store.get(RatingKey::new(1, Category::TwoVTwo)).unwrap();

        assert_eq!(battleground.deviation, 200.0);
        assert_eq!(arena.deviation, 350.0);
    }

    #[test]
    fn test_set_then_get_round_trip() {
        let (store, _persistence) = create_test_store();
        let key = arena_key(7);

        let mut record = store.get(key).unwrap();
        record.rating = 1621.5;
        record.wins = 3;
        record.losses = 1;
        record.matches_played = 4;
        store.set(key, record.clone()).unwrap();

        let fetched = store.get(key).unwrap();
        assert_eq!(fetched.rating, 1621.5);
        assert_eq!(fetched.wins, 3);
        // set marks the record eligible for save sweeps
        assert!(fetched.loaded);
    }

    #[test]
    fn test_has_remove_and_remove_subject() {
        let (store, _persistence) = create_test_store();

        store.get(RatingKey::new(9, Category::TwoVTwo)).unwrap();
        store.get(RatingKey::new(9, Category::FiveVFive)).unwrap();
        store.get(RatingKey::new(9, Category::Battleground)).unwrap();
        store.get(RatingKey::new(10, Category::TwoVTwo)).unwrap();

        assert!(store.has(RatingKey::new(9, Category::TwoVTwo)).unwrap());
        assert!(store.remove(RatingKey::new(9, Category::TwoVTwo)).unwrap());
        assert!(!store.has(RatingKey::new(9, Category::TwoVTwo)).unwrap());
        assert!(!store.remove(RatingKey::new(9, Category::TwoVTwo)).unwrap());

        let removed = store.remove_subject(9).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.cache_size().unwrap(), 1);
    }

    #[test]
    fn test_initialize_marks_loaded_and_is_idempotent() {
        let (store, persistence) = create_test_store();

        let record = store.initialize(5, Category::ThreeVThree).unwrap();
        assert!(record.loaded);
        assert_eq!(record.rating, 1500.0);

        // A second initialize keeps the existing record
        let mut mutated = record.clone();
        mutated.rating = 1700.0;
        store
            .set(RatingKey::new(5, Category::ThreeVThree), mutated)
            .unwrap();
        let again = store.initialize(5, Category::ThreeVThree).unwrap();
        assert_eq!(again.rating, 1700.0);

        // Initialized records are picked up by the flush sweep
        let sweep = store.save_all_cached().unwrap();
        assert_eq!(sweep.saved, 1);
        assert_eq!(sweep.failed, 0);
        assert!(persistence
            .row(RatingKey::new(5, Category::ThreeVThree))
            .is_some());
    }

    #[test]
    fn test_load_hydrates_cache_from_port() {
        let (store, persistence) = create_test_store();
        let key = arena_key(77);

        let mut rows = HashMap::new();
        rows.insert(
            key,
            PersistedRating {
                rating: 1688.0,
                deviation: 120.0,
                volatility: 0.055,
                matches_played: 40,
                wins: 25,
                losses: 15,
                last_update: 1_700_000_000,
            },
        );
        persistence.preset_rows(rows);

        assert!(store.load(key).unwrap());

        let record = store.get(key).unwrap();
        assert_eq!(record.rating, 1688.0);
        assert_eq!(record.matches_played, 40);
        assert!(record.loaded);
        assert_eq!(utils::to_epoch_seconds(record.last_updated), 1_700_000_000);
    }

    #[test]
    fn test_load_miss_leaves_default_path_intact() {
        let (store, _persistence) = create_test_store();
        let key = arena_key(78);

        assert!(!store.load(key).unwrap());
        assert_eq!(store.cache_size().unwrap(), 0);

        let record = store.get(key).unwrap();
        assert!(!record.loaded);
    }

    #[test]
    fn test_load_failure_surfaces_and_cache_survives() {
        let (store, persistence) = create_test_store();
        let key = arena_key(79);

        store.get(key).unwrap();
        persistence.set_fail_loads(true);

        assert!(store.load(key).is_err());
        // The cached default is still served
        assert_eq!(store.get(key).unwrap().rating, 1500.0);
    }

    #[test]
    fn test_save_skips_non_loaded_records() {
        let (store, persistence) = create_test_store();
        let key = arena_key(80);

        store.get(key).unwrap();
        assert!(!store.save(key).unwrap());
        assert!(persistence.upsert_calls().is_empty());

        // Absent keys are also a no-op
        assert!(!store.save(arena_key(81)).unwrap());
    }

    #[test]
    fn test_save_writes_loaded_record() {
        let (store, persistence) = create_test_store();
        let key = arena_key(82);

        let mut record = store.get(key).unwrap();
        record.record_result(
            GlickoRating {
                rating: 1540.0,
                deviation: 300.0,
                volatility: 0.06,
            },
            true,
        );
        store.set(key, record).unwrap();

        assert!(store.save(key).unwrap());

        let row = persistence.row(key).unwrap();
        assert_eq!(row.rating, 1540.0);
        assert_eq!(row.matches_played, 1);
        assert_eq!(row.wins, 1);
        assert_eq!(row.losses, 0);
        assert!(row.last_update > 0);
    }

    #[test]
    fn test_save_failure_surfaces_to_caller() {
        let (store, persistence) = create_test_store();
        let key = arena_key(83);

        let record = store.get(key).unwrap();
        store.set(key, record).unwrap();
        persistence.set_fail_upserts(true);

        assert!(store.save(key).is_err());
        // Cache remains authoritative after the failure
        assert_eq!(store.get(key).unwrap().rating, 1500.0);
    }

    #[test]
    fn test_save_subject_sweeps_only_that_subject() {
        let (store, persistence) = create_test_store();

        store.initialize(1, Category::TwoVTwo).unwrap();
        store.initialize(1, Category::Battleground).unwrap();
        store.initialize(2, Category::TwoVTwo).unwrap();

        let sweep = store.save_subject(1).unwrap();
        assert_eq!(sweep.saved, 2);

        let saved_keys = persistence.upsert_calls();
        assert_eq!(saved_keys.len(), 2);
        assert!(saved_keys.iter().all(|key| key.subject == 1));
    }

    #[test]
    fn test_save_all_cached_counts_failures() {
        let (store, persistence) = create_test_store();

        store.initialize(1, Category::TwoVTwo).unwrap();
        store.initialize(2, Category::TwoVTwo).unwrap();
        store.get(arena_key(3)).unwrap(); // never loaded, must be skipped

        persistence.set_fail_upserts(true);
        let sweep = store.save_all_cached().unwrap();
        assert_eq!(sweep.saved, 0);
        assert_eq!(sweep.failed, 2);

        persistence.set_fail_upserts(false);
        let sweep = store.save_all_cached().unwrap();
        assert_eq!(sweep.saved, 2);
        assert_eq!(sweep.failed, 0);
    }

    #[test]
    fn test_record_result_accounting() {
        let mut record = RatingRecord::from_default(GlickoRating::default());

        record.record_result(
            GlickoRating {
                rating: 1550.0,
                deviation: 280.0,
                volatility: 0.0601,
            },
            true,
        );
        record.record_result(
            GlickoRating {
                rating: 1510.0,
                deviation: 240.0,
                volatility: 0.0602,
            },
            false,
        );

        assert_eq!(record.matches_played, 2);
        assert_eq!(record.wins, 1);
        assert_eq!(record.losses, 1);
        assert_eq!(record.rating, 1510.0);
        assert_eq!(record.matches_played, record.wins + record.losses);
    }
}
