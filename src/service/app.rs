//! Main application state and service coordination
//!
//! This module contains the production RatingService that wires the rating
//! store, engine, aggregator, admission gate, and settlement together, runs
//! the periodic flush task, and records metrics around every operation.

use crate::config::{validate_config, AppConfig};
use crate::matchmaking::MatchmakingGate;
use crate::metrics::MetricsCollector;
use crate::persistence::RatingPersistence;
use crate::rating::{Glicko2Engine, RatingAggregator, RatingRecord, RatingStore, SaveSweep};
use crate::settlement::{MatchSettlement, SettlementOutcome};
use crate::types::{
    Category, GlickoRating, MatchEndSignal, PoolAdmissionRequest, RatingSignal, SubjectId,
};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Outcome of one dispatched [`RatingSignal`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalOutcome {
    Settled(SettlementOutcome),
    Admission(bool),
}

/// Rating service facade over all core components
///
/// Constructed once at process startup and shared by handle; every public
/// operation is safe to call from concurrent tasks.
pub struct RatingService {
    /// Application configuration
    config: AppConfig,

    /// Shared rating cache
    store: Arc<RatingStore>,

    /// Read-side aggregation over the store
    aggregator: RatingAggregator,

    /// Pool admission gate
    gate: Arc<MatchmakingGate>,

    /// Match settlement orchestrator
    settlement: Arc<MatchSettlement>,

    /// Prometheus metrics
    metrics: Arc<MetricsCollector>,

    /// Background task handles
    background_tasks: Mutex<Vec<JoinHandle<()>>>,

    /// Service status
    is_running: Arc<RwLock<bool>>,
}

impl RatingService {
    /// Initialize the service with all dependencies
    pub fn new(
        config: AppConfig,
        persistence: Arc<dyn RatingPersistence>,
    ) -> Result<Self, ServiceError> {
        info!("Initializing arena rating service");
        info!(
            "Configuration: service={}, tau={}, flush every {}s",
            config.service.name, config.rating.system_tau, config.service.flush_interval_seconds
        );

        validate_config(&config).map_err(|e| ServiceError::Configuration {
            message: e.to_string(),
        })?;

        let engine =
            Glicko2Engine::new(config.rating.clone()).map_err(|e| ServiceError::Initialization {
                message: format!("Failed to initialize rating engine: {}", e),
            })?;
        let store = Arc::new(RatingStore::new(config.rating.clone(), persistence));
        let aggregator = RatingAggregator::new(store.clone());
        let gate = Arc::new(MatchmakingGate::new(
            config.gate.clone(),
            aggregator.clone(),
        ));
        let settlement = Arc::new(MatchSettlement::new(
            store.clone(),
            engine,
            aggregator.clone(),
        ));
        let metrics =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        Ok(Self {
            config,
            store,
            aggregator,
            gate,
            settlement,
            metrics,
            background_tasks: Mutex::new(Vec::new()),
            is_running: Arc::new(RwLock::new(false)),
        })
    }

    /// Start background maintenance tasks
    pub async fn start(&self) {
        info!("Starting arena rating service");

        *self.is_running.write().await = true;

        self.start_flush_task();
        self.start_health_metrics_task();

        info!("✅ Arena rating service started successfully");
    }

    /// Perform graceful shutdown: stop tasks, then flush the cache
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of arena rating service");

        *self.is_running.write().await = false;
        self.stop_background_tasks().await;

        let sweep = self
            .save_all_cached()
            .map_err(|e| ServiceError::BackgroundTask {
                message: format!("Final rating flush failed: {}", e),
            })?;
        info!(
            "Final flush: {} rating(s) saved, {} failed",
            sweep.saved, sweep.failed
        );

        let cached = self.store.cache_size().unwrap_or(0);
        let pools = self.gate.tracked_pools().unwrap_or(0);
        info!(
            "Final statistics: {} cached rating(s), {} tracked pool(s)",
            cached, pools
        );
        info!("✅ Arena rating service shutdown completed");

        Ok(())
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// Get the shared rating store
    pub fn store(&self) -> Arc<RatingStore> {
        self.store.clone()
    }

    /// Get the metrics collector
    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    /// Current rating triple for a subject, materializing the default
    pub fn get_rating(
        &self,
        subject: SubjectId,
        category: Category,
    ) -> crate::error::Result<GlickoRating> {
        Ok(self
            .store
            .get(crate::types::RatingKey::new(subject, category))?
            .glicko())
    }

    /// Mean rating over a set of subjects
    pub fn average_rating(
        &self,
        subjects: &[SubjectId],
        category: Category,
    ) -> crate::error::Result<f64> {
        self.aggregator.average_rating(subjects, category)
    }

    /// Admission tolerance for a category after the given queue wait
    pub fn relaxed_tolerance(&self, category: Category, queue_time_seconds: u64) -> f64 {
        self.gate.relaxed_tolerance(category, queue_time_seconds)
    }

    /// Number of cached rating records
    pub fn cache_size(&self) -> crate::error::Result<usize> {
        self.store.cache_size()
    }

    /// Number of matchmaking pools currently tracked
    pub fn tracked_pools(&self) -> crate::error::Result<usize> {
        self.gate.tracked_pools()
    }

    /// Seed a subject's rating with the configured default, marked for
    /// persistence; idempotent
    pub fn initialize(
        &self,
        subject: SubjectId,
        category: Category,
    ) -> crate::error::Result<RatingRecord> {
        self.store.initialize(subject, category)
    }

    /// Drop every category's rating for a deleted subject
    pub fn remove_all_ratings(&self, subject: SubjectId) -> crate::error::Result<usize> {
        let removed = self.store.remove_subject(subject)?;
        if let Ok(size) = self.store.cache_size() {
            self.metrics.set_cached_ratings(size);
        }
        Ok(removed)
    }

    /// Settle a concluded match and record metrics for it
    pub fn settle(
        &self,
        category: Category,
        winners: &[SubjectId],
        losers: &[SubjectId],
    ) -> crate::error::Result<SettlementOutcome> {
        let timer = self.metrics.start_timer();
        let result = self.settlement.settle(category, winners, losers);
        self.metrics.record_signal("match_end", result.is_ok());

        match &result {
            Ok(outcome) => {
                self.metrics.record_settlement(
                    category,
                    outcome.players_updated,
                    outcome.failed_subjects.len(),
                    outcome.partial,
                    timer.stop(),
                );
                if let Ok(size) = self.store.cache_size() {
                    self.metrics.set_cached_ratings(size);
                }
            }
            Err(e) => error!("Settlement failed in {}: {}", category, e),
        }

        result
    }

    /// Settle from a host match-end signal
    pub fn settle_signal(
        &self,
        signal: &MatchEndSignal,
    ) -> crate::error::Result<SettlementOutcome> {
        self.settle(signal.category, &signal.winners, &signal.losers)
    }

    /// Evaluate a pool admission request and record metrics for it
    pub fn can_admit(&self, request: &PoolAdmissionRequest) -> crate::error::Result<bool> {
        let restart = request.current_pool_size == 0;
        let result = self.gate.can_admit(request);
        self.metrics.record_signal("pool_admission", result.is_ok());

        match &result {
            Ok(admitted) => {
                if restart {
                    self.metrics.record_pool_restart(request.category);
                }
                let tolerance = self
                    .gate
                    .relaxed_tolerance(request.category, request.queue_time_seconds);
                self.metrics
                    .record_admission(request.category, *admitted, tolerance);
                if let Ok(count) = self.gate.tracked_pools() {
                    self.metrics.set_tracked_pools(count);
                }
            }
            Err(e) => error!(
                "Admission check failed for queue {}: {}",
                request.queue_id, e
            ),
        }

        result
    }

    /// Dispatch one inbound signal to the matching operation
    ///
    /// Hosts that deliver signals as a tagged stream can funnel every
    /// message through this single entry point.
    pub fn handle_signal(&self, signal: &RatingSignal) -> crate::error::Result<SignalOutcome> {
        match signal {
            RatingSignal::MatchEnd(signal) => {
                self.settle_signal(signal).map(SignalOutcome::Settled)
            }
            RatingSignal::PoolAdmission(request) => {
                self.can_admit(request).map(SignalOutcome::Admission)
            }
        }
    }

    /// Flush every loaded rating to durable storage and record metrics
    pub fn save_all_cached(&self) -> crate::error::Result<SaveSweep> {
        let timer = self.metrics.start_timer();
        let sweep = self.store.save_all_cached()?;
        self.metrics.record_flush(sweep, timer.stop());
        if let Ok(size) = self.store.cache_size() {
            self.metrics.set_cached_ratings(size);
        }
        Ok(sweep)
    }

    /// Periodic rating flush task
    fn start_flush_task(&self) {
        let store = self.store.clone();
        let metrics = self.metrics.clone();
        let is_running = self.is_running.clone();
        let flush_interval = self.config.flush_interval();

        info!(
            "Starting rating flush task ({}s interval)...",
            flush_interval.as_secs()
        );
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(flush_interval);
            info!("Rating flush task started");

            while *is_running.read().await {
                interval.tick().await;

                let timer = metrics.start_timer();
                match store.save_all_cached() {
                    Ok(sweep) => {
                        metrics.record_flush(sweep, timer.stop());
                        if sweep.failed > 0 {
                            warn!(
                                "Rating flush completed with {} failure(s), {} saved",
                                sweep.failed, sweep.saved
                            );
                        } else if sweep.saved > 0 {
                            debug!("Flushed {} rating(s) to durable storage", sweep.saved);
                        }
                    }
                    Err(e) => {
                        warn!("Rating flush failed: {}", e);
                    }
                }

                if let Ok(size) = store.cache_size() {
                    metrics.set_cached_ratings(size);
                }
            }

            info!("Rating flush task stopped");
        });

        self.push_task(handle);
    }

    /// Service health metrics task
    fn start_health_metrics_task(&self) {
        let metrics = self.metrics.clone();
        let store = self.store.clone();
        let gate = self.gate.clone();
        let is_running = self.is_running.clone();

        info!("Starting health metrics task (60s interval)...");
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            let start_time = tokio::time::Instant::now();
            info!("Health metrics task started");

            while *is_running.read().await {
                interval.tick().await;

                let uptime_seconds = start_time.elapsed().as_secs();
                metrics.set_uptime(uptime_seconds);
                if let Ok(size) = store.cache_size() {
                    metrics.set_cached_ratings(size);
                }
                if let Ok(pools) = gate.tracked_pools() {
                    metrics.set_tracked_pools(pools);
                }

                debug!("Updated service health metrics - uptime: {}s", uptime_seconds);
            }

            info!("Health metrics task stopped");
        });

        self.push_task(handle);
    }

    fn push_task(&self, handle: JoinHandle<()>) {
        if let Ok(mut tasks) = self.background_tasks.lock() {
            tasks.push(handle);
        }
    }

    /// Stop all background tasks
    async fn stop_background_tasks(&self) {
        let tasks: Vec<JoinHandle<()>> = match self.background_tasks.lock() {
            Ok(mut tasks) => tasks.drain(..).collect(),
            Err(_) => Vec::new(),
        };

        let task_count = tasks.len();
        if task_count == 0 {
            info!("No background tasks to stop");
            return;
        }

        info!("Stopping {} background tasks...", task_count);
        for task in tasks {
            task.abort();
        }

        // Give tasks time to observe the abort
        tokio::time::sleep(Duration::from_millis(100)).await;
        info!("✅ All {} background tasks stopped", task_count);
    }
}

impl std::fmt::Debug for RatingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RatingService")
            .field("service", &self.config.service.name)
            .finish()
    }
}
