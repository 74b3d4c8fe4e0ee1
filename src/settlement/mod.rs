//! Match settlement
//!
//! Turns a concluded match into rating updates: each participant is rated
//! against the opposing side's aggregate as a single synthetic opponent,
//! winners with score 1.0 and losers with 0.0. Updates are N independent
//! per-key writes with no cross-key transaction; callers must deliver each
//! match-end signal exactly once, double settlement is not detectable here.

use crate::error::RatingError;
use crate::rating::{Glicko2Engine, Observation, RatingAggregator, RatingStore};
use crate::types::{Category, MatchEndSignal, RatingKey, SubjectId};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of one settlement pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementOutcome {
    pub category: Category,
    pub players_updated: usize,
    pub failed_subjects: Vec<SubjectId>,
    /// True when some writes landed and others did not; such a match is
    /// half-applied and only the failed subjects are safe to retry
    pub partial: bool,
}

impl SettlementOutcome {
    fn noop(category: Category) -> Self {
        Self {
            category,
            players_updated: 0,
            failed_subjects: Vec::new(),
            partial: false,
        }
    }

    /// Every intended participant was written
    pub fn is_complete(&self) -> bool {
        self.failed_subjects.is_empty()
    }
}

/// Settles concluded matches into the rating store
pub struct MatchSettlement {
    store: Arc<RatingStore>,
    engine: Glicko2Engine,
    aggregator: RatingAggregator,
}

impl MatchSettlement {
    pub fn new(store: Arc<RatingStore>, engine: Glicko2Engine, aggregator: RatingAggregator) -> Self {
        Self {
            store,
            engine,
            aggregator,
        }
    }

    /// Convenience wrapper over [`settle`](Self::settle) for signal plumbing
    pub fn settle_signal(&self, signal: &MatchEndSignal) -> crate::error::Result<SettlementOutcome> {
        self.settle(signal.category, &signal.winners, &signal.losers)
    }

    /// Apply one concluded match
    ///
    /// A match with an empty side settles as a no-op. Both side aggregates
    /// are resolved before any write so every participant is rated against
    /// pre-match opposition strength.
    pub fn settle(
        &self,
        category: Category,
        winners: &[SubjectId],
        losers: &[SubjectId],
    ) -> crate::error::Result<SettlementOutcome> {
        if winners.is_empty() || losers.is_empty() {
            debug!(
                "Skipping settlement in {}: empty side ({} winners, {} losers)",
                category,
                winners.len(),
                losers.len()
            );
            return Ok(SettlementOutcome::noop(category));
        }

        if let Some(&subject) = winners.iter().find(|s| losers.contains(s)) {
            return Err(RatingError::InvalidInput {
                reason: format!("subject {} appears on both sides of a {} match", subject, category),
            }
            .into());
        }

        let winners_aggregate = self.aggregator.side_aggregate(winners, category)?;
        let losers_aggregate = self.aggregator.side_aggregate(losers, category)?;

        let mut outcome = SettlementOutcome::noop(category);
        let beat_losers = Observation::win(losers_aggregate.rating, losers_aggregate.deviation);
        let lost_to_winners =
            Observation::loss(winners_aggregate.rating, winners_aggregate.deviation);

        for &subject in winners {
            self.apply(category, subject, beat_losers, true, &mut outcome);
        }
        for &subject in losers {
            self.apply(category, subject, lost_to_winners, false, &mut outcome);
        }

        outcome.partial = outcome.players_updated > 0 && !outcome.failed_subjects.is_empty();

        info!(
            "Settled {} match: {} winner(s) vs {} loser(s), aggregates {:.1}/{:.1}, {} updated",
            category,
            winners.len(),
            losers.len(),
            winners_aggregate.rating,
            losers_aggregate.rating,
            outcome.players_updated
        );

        Ok(outcome)
    }

    fn apply(
        &self,
        category: Category,
        subject: SubjectId,
        opponent: Observation,
        won: bool,
        outcome: &mut SettlementOutcome,
    ) {
        match self.update_participant(category, subject, opponent, won) {
            Ok(()) => outcome.players_updated += 1,
            Err(e) => {
                warn!("{}", e);
                outcome.failed_subjects.push(subject);
            }
        }
    }

    fn update_participant(
        &self,
        category: Category,
        subject: SubjectId,
        opponent: Observation,
        won: bool,
    ) -> crate::error::Result<()> {
        let key = RatingKey::new(subject, category);
        let mut record = self.store.get(key)?;
        let updated = self.engine.rate(record.glicko(), &[opponent]);

        debug!(
            "Subject {} in {}: {:.1} -> {:.1} ({})",
            subject,
            category,
            record.rating,
            updated.rating,
            if won { "win" } else { "loss" }
        );

        record.record_result(updated, won);
        self.store
            .set(key, record)
            .map_err(|e| RatingError::SettlementFailed {
                subject: subject.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }
}

impl std::fmt::Debug for MatchSettlement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchSettlement").finish()
    }
}
