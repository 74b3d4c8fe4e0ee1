//! Rating-distance admission gate
//!
//! One pool accumulates per (queue, category). Admission compares the
//! candidate group's average rating to the pool's average and accepts when
//! the distance fits inside a tolerance that widens with queue wait time.
//! Pools with no activity inside the staleness window are purged lazily on
//! the next admission check rather than by a timer task.

use crate::config::GateConfig;
use crate::error::RatingError;
use crate::rating::RatingAggregator;
use crate::types::{Category, PoolAdmissionRequest, QueueId, SubjectId};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// Pool identity within the gate's tracking map
type PoolKey = (QueueId, Category);

/// Membership of one accumulating pool
#[derive(Debug)]
struct PoolTracker {
    members: HashSet<SubjectId>,
    last_update: Instant,
}

impl PoolTracker {
    fn seeded(members: &[SubjectId]) -> Self {
        Self {
            members: members.iter().copied().collect(),
            last_update: Instant::now(),
        }
    }

    fn merge(&mut self, members: &[SubjectId]) {
        self.members.extend(members.iter().copied());
        self.last_update = Instant::now();
    }
}

/// Admission gate over accumulating matchmaking pools
///
/// The pool map has its own lock, independent of the rating store; it is
/// never held across aggregator calls. Between the membership snapshot and
/// the admission merge another group may win the race, which only makes the
/// pool it merged into slightly larger and is accepted.
pub struct MatchmakingGate {
    config: GateConfig,
    aggregator: RatingAggregator,
    pools: Mutex<HashMap<PoolKey, PoolTracker>>,
}

impl MatchmakingGate {
    pub fn new(config: GateConfig, aggregator: RatingAggregator) -> Self {
        Self {
            config,
            aggregator,
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Decide whether a candidate group may join its queue's pool
    ///
    /// A reported pool size of zero is the host's restart signal: previous
    /// tracking for the key is dropped and the group seeds a fresh pool
    /// unconditionally. Otherwise the group is admitted when its average
    /// rating sits within the relaxed tolerance of the pool average, and
    /// admission merges the group into the tracked membership.
    pub fn can_admit(&self, request: &PoolAdmissionRequest) -> crate::error::Result<bool> {
        let key = (request.queue_id, request.category);

        let pool_members: Vec<SubjectId> = {
            let mut pools = self.pools.lock().map_err(|_| RatingError::InternalError {
                message: "Failed to acquire pool tracking lock".to_string(),
            })?;

            Self::purge_stale(&mut pools, self.config.pool_stale_window());

            if request.current_pool_size == 0 {
                debug!(
                    "Pool restart for queue {} ({}): seeding with {} candidate(s)",
                    request.queue_id,
                    request.category,
                    request.candidates.len()
                );
                pools.insert(key, PoolTracker::seeded(&request.candidates));
                return Ok(true);
            }

            pools
                .get(&key)
                .map(|tracker| tracker.members.iter().copied().collect())
                .unwrap_or_default()
        };

        // Degenerate group: nothing to compare, nothing to merge
        if request.candidates.is_empty() {
            return Ok(true);
        }

        // Averages run against the rating store with the pool lock released
        let group_avg = self
            .aggregator
            .average_rating(&request.candidates, request.category)?;
        let pool_avg = self
            .aggregator
            .average_rating(&pool_members, request.category)?;
        let diff = (group_avg - pool_avg).abs();
        let tolerance = self.relaxed_tolerance(request.category, request.queue_time_seconds);
        let admitted = diff <= tolerance;

        debug!(
            "Admission check for queue {} ({}): group {:.1} vs pool {:.1}, tolerance {:.1} after {}s -> {}",
            request.queue_id,
            request.category,
            group_avg,
            pool_avg,
            tolerance,
            request.queue_time_seconds,
            if admitted { "admitted" } else { "rejected" }
        );

        if admitted {
            let mut pools = self.pools.lock().map_err(|_| RatingError::InternalError {
                message: "Failed to acquire pool tracking lock".to_string(),
            })?;

            pools
                .entry(key)
                .or_insert_with(|| PoolTracker::seeded(&[]))
                .merge(&request.candidates);
        }

        Ok(admitted)
    }

    /// Tolerance for a category after the given queue wait
    pub fn relaxed_tolerance(&self, category: Category, queue_time_seconds: u64) -> f64 {
        self.config
            .profile_for(category)
            .relaxed(queue_time_seconds)
    }

    /// Number of pools currently tracked (observability)
    pub fn tracked_pools(&self) -> crate::error::Result<usize> {
        let pools = self.pools.lock().map_err(|_| RatingError::InternalError {
            message: "Failed to acquire pool tracking lock".to_string(),
        })?;

        Ok(pools.len())
    }

    /// Tracked member count for one pool; zero when untracked
    pub fn pool_member_count(
        &self,
        queue_id: QueueId,
        category: Category,
    ) -> crate::error::Result<usize> {
        let pools = self.pools.lock().map_err(|_| RatingError::InternalError {
            message: "Failed to acquire pool tracking lock".to_string(),
        })?;

        Ok(pools
            .get(&(queue_id, category))
            .map(|tracker| tracker.members.len())
            .unwrap_or(0))
    }

    fn purge_stale(pools: &mut HashMap<PoolKey, PoolTracker>, window: Duration) {
        let before = pools.len();
        pools.retain(|_, tracker| tracker.last_update.elapsed() <= window);
        let purged = before - pools.len();
        if purged > 0 {
            debug!("Purged {} stale matchmaking pool(s)", purged);
        }
    }
}

impl std::fmt::Debug for MatchmakingGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchmakingGate")
            .field("pools", &self.pools.lock().map(|p| p.len()).unwrap_or(0))
            .finish()
    }
}
