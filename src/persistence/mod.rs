//! Durable-storage port for ratings
//!
//! This module defines the interface the rating store uses to reach durable
//! storage, with an in-memory implementation and a recording implementation
//! for tests. Calls are synchronous and bounded; retries belong to the
//! implementor, never to the callers in this crate.

use crate::error::RatingError;
use crate::types::RatingKey;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

/// Minimal persisted row for one (subject, category) rating
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRating {
    pub rating: f64,
    pub deviation: f64,
    pub volatility: f64,
    pub matches_played: u32,
    pub wins: u32,
    pub losses: u32,
    /// Last update as whole epoch seconds
    pub last_update: u64,
}

/// Trait for durable rating storage operations
///
/// A failed call surfaces to the caller of the explicit load/save operation
/// only; the in-memory cache stays authoritative either way.
pub trait RatingPersistence: Send + Sync {
    /// Load the row for a key; `None` when the key was never persisted
    fn load(&self, key: RatingKey) -> crate::error::Result<Option<PersistedRating>>;

    /// Insert or update the row for a key
    fn upsert(&self, key: RatingKey, row: PersistedRating) -> crate::error::Result<()>;
}

/// In-memory persistence implementation
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    rows: RwLock<HashMap<RatingKey, PersistedRating>>,
}

impl InMemoryPersistence {
    /// Create an empty in-memory persistence backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every persisted row
    pub fn rows(&self) -> Vec<(RatingKey, PersistedRating)> {
        self.rows
            .read()
            .map(|rows| rows.iter().map(|(k, v)| (*k, v.clone())).collect())
            .unwrap_or_default()
    }

    /// Number of persisted rows
    pub fn len(&self) -> usize {
        self.rows.read().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RatingPersistence for InMemoryPersistence {
    fn load(&self, key: RatingKey) -> crate::error::Result<Option<PersistedRating>> {
        let rows = self.rows.read().map_err(|_| RatingError::InternalError {
            message: "Failed to acquire persistence read lock".to_string(),
        })?;

        Ok(rows.get(&key).cloned())
    }

    fn upsert(&self, key: RatingKey, row: PersistedRating) -> crate::error::Result<()> {
        let mut rows = self.rows.write().map_err(|_| RatingError::InternalError {
            message: "Failed to acquire persistence write lock".to_string(),
        })?;

        rows.insert(key, row);
        Ok(())
    }
}

/// Recording persistence for testing
///
/// Logs every upsert and can be switched into failure mode to exercise the
/// persistence-unavailable paths.
#[derive(Debug, Default)]
pub struct RecordingPersistence {
    rows: RwLock<HashMap<RatingKey, PersistedRating>>,
    upsert_calls: RwLock<Vec<RatingKey>>,
    fail_loads: AtomicBool,
    fail_upserts: AtomicBool,
}

impl RecordingPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset rows the next loads will observe
    pub fn preset_rows(&self, preset: HashMap<RatingKey, PersistedRating>) {
        if let Ok(mut rows) = self.rows.write() {
            *rows = preset;
        }
    }

    /// Keys of all upserts made, in call order
    pub fn upsert_calls(&self) -> Vec<RatingKey> {
        self.upsert_calls
            .read()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Clear the recorded upsert log
    pub fn clear_upsert_calls(&self) {
        if let Ok(mut calls) = self.upsert_calls.write() {
            calls.clear();
        }
    }

    /// Row currently persisted for a key
    pub fn row(&self, key: RatingKey) -> Option<PersistedRating> {
        self.rows
            .read()
            .ok()
            .and_then(|rows| rows.get(&key).cloned())
    }

    /// Make subsequent loads fail
    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent upserts fail
    pub fn set_fail_upserts(&self, fail: bool) {
        self.fail_upserts.store(fail, Ordering::SeqCst);
    }
}

impl RatingPersistence for RecordingPersistence {
    fn load(&self, key: RatingKey) -> crate::error::Result<Option<PersistedRating>> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(RatingError::PersistenceUnavailable {
                message: format!("Injected load failure for subject {}", key.subject),
            }
            .into());
        }

        let rows = self.rows.read().map_err(|_| RatingError::InternalError {
            message: "Failed to acquire persistence read lock".to_string(),
        })?;

        Ok(rows.get(&key).cloned())
    }

    fn upsert(&self, key: RatingKey, row: PersistedRating) -> crate::error::Result<()> {
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(RatingError::PersistenceUnavailable {
                message: format!("Injected upsert failure for subject {}", key.subject),
            }
            .into());
        }

        if let Ok(mut calls) = self.upsert_calls.write() {
            calls.push(key);
        }

        let mut rows = self.rows.write().map_err(|_| RatingError::InternalError {
            message: "Failed to acquire persistence write lock".to_string(),
        })?;

        rows.insert(key, row);
        Ok(())
    }
}
