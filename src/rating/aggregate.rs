//! Group rating aggregation
//!
//! Collapses a set of subjects into side-level figures: the admission gate
//! compares pool and candidate averages, and settlement builds its synthetic
//! opponent from the opposing side's aggregate.

use crate::rating::store::RatingStore;
use crate::types::{Category, GlickoRating, RatingKey, SubjectId};
use crate::utils;
use std::sync::Arc;

/// Read-side aggregation over the rating store
///
/// Unseen subjects contribute the configured default, so aggregates are
/// always defined and never fail on missing data.
#[derive(Debug, Clone)]
pub struct RatingAggregator {
    store: Arc<RatingStore>,
}

impl RatingAggregator {
    pub fn new(store: Arc<RatingStore>) -> Self {
        Self { store }
    }

    /// Mean rating across subjects; configured default when empty
    pub fn average_rating(
        &self,
        subjects: &[SubjectId],
        category: Category,
    ) -> crate::error::Result<f64> {
        let ratings = self.collect(subjects, category, |g| g.rating)?;
        Ok(utils::mean(&ratings).unwrap_or_else(|| self.store.default_rating(category).rating))
    }

    /// Mean deviation across subjects; configured default when empty
    pub fn average_deviation(
        &self,
        subjects: &[SubjectId],
        category: Category,
    ) -> crate::error::Result<f64> {
        let deviations = self.collect(subjects, category, |g| g.deviation)?;
        Ok(utils::mean(&deviations)
            .unwrap_or_else(|| self.store.default_rating(category).deviation))
    }

    /// Collapse a side into one synthetic triple for rating updates
    pub fn side_aggregate(
        &self,
        subjects: &[SubjectId],
        category: Category,
    ) -> crate::error::Result<GlickoRating> {
        if subjects.is_empty() {
            return Ok(self.store.default_rating(category));
        }

        let mut aggregate = GlickoRating {
            rating: 0.0,
            deviation: 0.0,
            volatility: 0.0,
        };
        for &subject in subjects {
            let glicko = self.store.get(RatingKey::new(subject, category))?.glicko();
            aggregate.rating += glicko.rating;
            aggregate.deviation += glicko.deviation;
            aggregate.volatility += glicko.volatility;
        }

        let count = subjects.len() as f64;
        aggregate.rating /= count;
        aggregate.deviation /= count;
        aggregate.volatility /= count;
        Ok(aggregate)
    }

    fn collect<F>(
        &self,
        subjects: &[SubjectId],
        category: Category,
        field: F,
    ) -> crate::error::Result<Vec<f64>>
    where
        F: Fn(GlickoRating) -> f64,
    {
        subjects
            .iter()
            .map(|&subject| {
                self.store
                    .get(RatingKey::new(subject, category))
                    .map(|record| field(record.glicko()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RatingConfig;
    use crate::persistence::InMemoryPersistence;
    use crate::rating::store::RatingRecord;

    fn create_test_aggregator() -> (RatingAggregator, Arc<RatingStore>) {
        let store = Arc::new(RatingStore::new(
            RatingConfig::default(),
            Arc::new(InMemoryPersistence::new()),
        ));
        (RatingAggregator::new(store.clone()), store)
    }

    fn seed(store: &RatingStore, subject: SubjectId, category: Category, rating: f64, deviation: f64) {
        let key = RatingKey::new(subject, category);
        let mut record = store.get(key).unwrap();
        record.rating = rating;
        record.deviation = deviation;
        store.set(key, record).unwrap();
    }

    #[test]
    fn test_empty_group_yields_configured_defaults() {
        let (aggregator, _store) = create_test_aggregator();

        let rating = aggregator.average_rating(&[], Category::TwoVTwo).unwrap();
        let deviation = aggregator
            .average_deviation(&[], Category::TwoVTwo)
            .unwrap();

        assert_eq!(rating, 1500.0);
        assert_eq!(deviation, 350.0);
    }

    #[test]
    fn test_empty_group_honors_category_override() {
        let mut config = RatingConfig::default();
        config
            .deviation_overrides
            .insert(Category::Battleground, 200.0);
        let store = Arc::new(RatingStore::new(config, Arc::new(InMemoryPersistence::new())));
        let aggregator = RatingAggregator::new(store);

        let deviation = aggregator
            .average_deviation(&[], Category::Battleground)
            .unwrap();
        assert_eq!(deviation, 200.0);
    }

    #[test]
    fn test_average_rating_over_seeded_subjects() {
        let (aggregator, store) = create_test_aggregator();
        seed(&store, 1, Category::ThreeVThree, 1400.0, 80.0);
        seed(&store, 2, Category::ThreeVThree, 1600.0, 120.0);

        let rating = aggregator
            .average_rating(&[1, 2], Category::ThreeVThree)
            .unwrap();
        let deviation = aggregator
            .average_deviation(&[1, 2], Category::ThreeVThree)
            .unwrap();

        assert_eq!(rating, 1500.0);
        assert_eq!(deviation, 100.0);
    }

    #[test]
    fn test_unseen_subjects_count_as_defaults() {
        let (aggregator, store) = create_test_aggregator();
        seed(&store, 1, Category::TwoVTwo, 1800.0, 50.0);

        // Subject 2 has never played: contributes 1500
        let rating = aggregator.average_rating(&[1, 2], Category::TwoVTwo).unwrap();
        assert_eq!(rating, 1650.0);

        // The read materialized the default into the cache
        assert!(store.has(RatingKey::new(2, Category::TwoVTwo)).unwrap());
    }

    #[test]
    fn test_side_aggregate_collapses_to_single_triple() {
        let (aggregator, store) = create_test_aggregator();
        seed(&store, 10, Category::FiveVFive, 1550.0, 90.0);
        seed(&store, 11, Category::FiveVFive, 1650.0, 110.0);

        let side = aggregator
            .side_aggregate(&[10, 11], Category::FiveVFive)
            .unwrap();

        assert_eq!(side.rating, 1600.0);
        assert_eq!(side.deviation, 100.0);
        assert!((side.volatility - 0.06).abs() < 1e-12);
    }

    #[test]
    fn test_side_aggregate_empty_side_is_default() {
        let (aggregator, _store) = create_test_aggregator();

        let side = aggregator.side_aggregate(&[], Category::TwoVTwo).unwrap();
        assert_eq!(side.rating, 1500.0);
        assert_eq!(side.deviation, 350.0);
    }

    #[test]
    fn test_ratings_are_per_category() {
        let (aggregator, store) = create_test_aggregator();
        seed(&store, 1, Category::TwoVTwo, 2000.0, 60.0);

        // Same subject, different category: still at the default
        let rating = aggregator
            .average_rating(&[1], Category::FiveVFive)
            .unwrap();
        assert_eq!(rating, 1500.0);

        let original = aggregator.average_rating(&[1], Category::TwoVTwo).unwrap();
        assert_eq!(original, 2000.0);
    }

    #[test]
    fn test_record_glicko_view_matches_fields() {
        let record = RatingRecord::from_default(GlickoRating {
            rating: 1234.0,
            deviation: 222.0,
            volatility: 0.05,
        });
        let glicko = record.glicko();
        assert_eq!(glicko.rating, 1234.0);
        assert_eq!(glicko.deviation, 222.0);
        assert_eq!(glicko.volatility, 0.05);
    }
}
