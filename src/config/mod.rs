//! Configuration management for the arena-rating service
//!
//! This module handles all configuration loading from TOML files and
//! environment variables, validation, and default values for the rating
//! system and the matchmaking gate.

pub mod app;
pub mod gate;
pub mod rating;

// Re-export commonly used types
pub use app::{validate_config, AppConfig, ServiceSettings};
pub use gate::{GateConfig, ToleranceProfile};
pub use rating::RatingConfig;
