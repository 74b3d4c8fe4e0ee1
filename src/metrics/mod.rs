//! Metrics and monitoring for the rating service
//!
//! This module provides Prometheus metrics collection covering admission
//! decisions, settlements, and the rating store.

pub mod collector;

pub use collector::{
    GateMetrics, MetricsCollector, MetricsTimer, ServiceMetrics, SettlementMetrics, StoreMetrics,
};
