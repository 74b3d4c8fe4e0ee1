//! Error types for the rating service
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the crate.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific rating-system scenarios
#[derive(Debug, thiserror::Error)]
pub enum RatingError {
    #[error("Persistence unavailable: {message}")]
    PersistenceUnavailable { message: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Invalid rating input: {reason}")]
    InvalidInput { reason: String },

    #[error("Settlement failed for {subject}: {reason}")]
    SettlementFailed { subject: String, reason: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}
