//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the rating service: admission
//! gate decisions, match settlements, and rating store health.

use crate::rating::SaveSweep;
use crate::types::Category;
use anyhow::Result;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the rating service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Admission gate metrics
    gate_metrics: GateMetrics,

    /// Settlement metrics
    settlement_metrics: SettlementMetrics,

    /// Rating store metrics
    store_metrics: StoreMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Total inbound signals processed
    pub signals_total: IntCounterVec,

    /// Signal processing errors
    pub signal_errors_total: IntCounterVec,
}

/// Admission gate metrics
#[derive(Clone)]
pub struct GateMetrics {
    /// Admission checks by category and decision
    pub admission_checks_total: IntCounterVec,

    /// Pool restarts observed (external zero-size signal)
    pub pool_restarts_total: IntCounterVec,

    /// Pools currently tracked
    pub tracked_pools: IntGauge,

    /// Relaxed tolerance in effect at each check
    pub admission_tolerance: HistogramVec,
}

/// Settlement metrics
#[derive(Clone)]
pub struct SettlementMetrics {
    /// Settled matches by category
    pub settlements_total: IntCounterVec,

    /// Participants written by category
    pub players_updated_total: IntCounterVec,

    /// Settlements where only some writes landed
    pub partial_settlements_total: IntCounter,

    /// Individual participant writes that failed
    pub failed_writes_total: IntCounter,

    /// Settlement wall time
    pub settlement_duration_seconds: Histogram,
}

/// Rating store metrics
#[derive(Clone)]
pub struct StoreMetrics {
    /// Records currently cached
    pub cached_ratings: IntGauge,

    /// Records written to durable storage
    pub ratings_saved_total: IntCounter,

    /// Durable writes that failed
    pub save_failures_total: IntCounter,

    /// Bulk flush wall time
    pub flush_duration_seconds: Histogram,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let gate_metrics = GateMetrics::new(&registry)?;
        let settlement_metrics = SettlementMetrics::new(&registry)?;
        let store_metrics = StoreMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            gate_metrics,
            settlement_metrics,
            store_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Get service metrics
    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    /// Get gate metrics
    pub fn gate(&self) -> &GateMetrics {
        &self.gate_metrics
    }

    /// Get settlement metrics
    pub fn settlement(&self) -> &SettlementMetrics {
        &self.settlement_metrics
    }

    /// Get store metrics
    pub fn store(&self) -> &StoreMetrics {
        &self.store_metrics
    }

    /// Record an admission check and the tolerance it was judged against
    pub fn record_admission(&self, category: Category, admitted: bool, tolerance: f64) {
        let decision = if admitted { "admitted" } else { "rejected" };
        let category = category.to_string();

        self.gate_metrics
            .admission_checks_total
            .with_label_values(&[&category, decision])
            .inc();

        self.gate_metrics
            .admission_tolerance
            .with_label_values(&[&category])
            .observe(tolerance);
    }

    /// Record a pool restart triggered by the external zero-size signal
    pub fn record_pool_restart(&self, category: Category) {
        self.gate_metrics
            .pool_restarts_total
            .with_label_values(&[&category.to_string()])
            .inc();
    }

    /// Update the tracked-pool gauge
    pub fn set_tracked_pools(&self, count: usize) {
        self.gate_metrics.tracked_pools.set(count as i64);
    }

    /// Record one settlement pass
    pub fn record_settlement(
        &self,
        category: Category,
        players_updated: usize,
        failed_writes: usize,
        partial: bool,
        duration: Duration,
    ) {
        let category = category.to_string();

        self.settlement_metrics
            .settlements_total
            .with_label_values(&[&category])
            .inc();

        self.settlement_metrics
            .players_updated_total
            .with_label_values(&[&category])
            .inc_by(players_updated as u64);

        if failed_writes > 0 {
            self.settlement_metrics
                .failed_writes_total
                .inc_by(failed_writes as u64);
        }
        if partial {
            self.settlement_metrics.partial_settlements_total.inc();
        }

        self.settlement_metrics
            .settlement_duration_seconds
            .observe(duration.as_secs_f64());
    }

    /// Record one save sweep against durable storage
    pub fn record_flush(&self, sweep: SaveSweep, duration: Duration) {
        self.store_metrics
            .ratings_saved_total
            .inc_by(sweep.saved as u64);
        self.store_metrics
            .save_failures_total
            .inc_by(sweep.failed as u64);
        self.store_metrics
            .flush_duration_seconds
            .observe(duration.as_secs_f64());
    }

    /// Update the cached-record gauge
    pub fn set_cached_ratings(&self, count: usize) {
        self.store_metrics.cached_ratings.set(count as i64);
    }

    /// Record an inbound signal
    pub fn record_signal(&self, signal_type: &str, success: bool) {
        self.service_metrics
            .signals_total
            .with_label_values(&[signal_type])
            .inc();

        if !success {
            self.service_metrics
                .signal_errors_total
                .with_label_values(&[signal_type])
                .inc();
        }
    }

    /// Update service uptime
    pub fn set_uptime(&self, seconds: u64) {
        self.service_metrics.uptime_seconds.set(seconds as i64);
    }

    /// Render the registry in the Prometheus text exposition format
    pub fn gather_text(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("arena_rating_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let signals_total = IntCounterVec::new(
            Opts::new("arena_rating_signals_total", "Total inbound signals"),
            &["type"],
        )?;
        registry.register(Box::new(signals_total.clone()))?;

        let signal_errors_total = IntCounterVec::new(
            Opts::new("arena_rating_signal_errors_total", "Signal handling errors"),
            &["type"],
        )?;
        registry.register(Box::new(signal_errors_total.clone()))?;

        Ok(Self {
            uptime_seconds,
            signals_total,
            signal_errors_total,
        })
    }
}

impl GateMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let admission_checks_total = IntCounterVec::new(
            Opts::new(
                "arena_rating_admission_checks_total",
                "Pool admission checks",
            ),
            &["category", "decision"],
        )?;
        registry.register(Box::new(admission_checks_total.clone()))?;

        let pool_restarts_total = IntCounterVec::new(
            Opts::new("arena_rating_pool_restarts_total", "Pool restart signals"),
            &["category"],
        )?;
        registry.register(Box::new(pool_restarts_total.clone()))?;

        let tracked_pools =
            IntGauge::new("arena_rating_tracked_pools", "Pools currently tracked")?;
        registry.register(Box::new(tracked_pools.clone()))?;

        let admission_tolerance = HistogramVec::new(
            HistogramOpts::new(
                "arena_rating_admission_tolerance",
                "Relaxed tolerance at check time",
            )
            .buckets(vec![
                100.0, 200.0, 300.0, 400.0, 600.0, 800.0, 1000.0, 1200.0,
            ]),
            &["category"],
        )?;
        registry.register(Box::new(admission_tolerance.clone()))?;

        Ok(Self {
            admission_checks_total,
            pool_restarts_total,
            tracked_pools,
            admission_tolerance,
        })
    }
}

impl SettlementMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let settlements_total = IntCounterVec::new(
            Opts::new("arena_rating_settlements_total", "Settled matches"),
            &["category"],
        )?;
        registry.register(Box::new(settlements_total.clone()))?;

        let players_updated_total = IntCounterVec::new(
            Opts::new(
                "arena_rating_players_updated_total",
                "Participants written by settlement",
            ),
            &["category"],
        )?;
        registry.register(Box::new(players_updated_total.clone()))?;

        let partial_settlements_total = IntCounter::new(
            "arena_rating_partial_settlements_total",
            "Settlements with only some writes applied",
        )?;
        registry.register(Box::new(partial_settlements_total.clone()))?;

        let failed_writes_total = IntCounter::new(
            "arena_rating_failed_writes_total",
            "Participant writes that failed",
        )?;
        registry.register(Box::new(failed_writes_total.clone()))?;

        let settlement_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "arena_rating_settlement_duration_seconds",
                "Settlement wall time",
            )
            .buckets(vec![0.0001, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        )?;
        registry.register(Box::new(settlement_duration_seconds.clone()))?;

        Ok(Self {
            settlements_total,
            players_updated_total,
            partial_settlements_total,
            failed_writes_total,
            settlement_duration_seconds,
        })
    }
}

impl StoreMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let cached_ratings =
            IntGauge::new("arena_rating_cached_ratings", "Records currently cached")?;
        registry.register(Box::new(cached_ratings.clone()))?;

        let ratings_saved_total = IntCounter::new(
            "arena_rating_ratings_saved_total",
            "Records written to durable storage",
        )?;
        registry.register(Box::new(ratings_saved_total.clone()))?;

        let save_failures_total = IntCounter::new(
            "arena_rating_save_failures_total",
            "Durable writes that failed",
        )?;
        registry.register(Box::new(save_failures_total.clone()))?;

        let flush_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "arena_rating_flush_duration_seconds",
                "Bulk flush wall time",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(flush_duration_seconds.clone()))?;

        Ok(Self {
            cached_ratings,
            ratings_saved_total,
            save_failures_total,
            flush_duration_seconds,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create default metrics collector")
    }
}
