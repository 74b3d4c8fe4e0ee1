//! Utility functions for the rating service

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

/// Generate a new unique queue ID
pub fn generate_queue_id() -> Uuid {
    Uuid::new_v4()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Convert a UTC timestamp to whole epoch seconds for persistence
pub fn to_epoch_seconds(ts: DateTime<Utc>) -> u64 {
    ts.timestamp().max(0) as u64
}

/// Convert persisted epoch seconds back to a UTC timestamp
pub fn from_epoch_seconds(secs: u64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs as i64, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Calculate the absolute difference between two ratings
pub fn rating_difference(rating1: f64, rating2: f64) -> f64 {
    (rating1 - rating2).abs()
}

/// Unweighted arithmetic mean; `None` for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
