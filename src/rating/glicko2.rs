//! Glicko-2 rating engine
//!
//! Pure implementation of the Glicko-2 update: volatility-adjusted rating and
//! deviation changes from a set of opponent observations, plus the
//! no-opponents inactivity path. Scores are taken verbatim, so partial
//! outcomes between loss (0.0) and win (1.0) are supported.

use crate::config::RatingConfig;
use crate::types::{Category, GlickoRating};
use tracing::warn;

/// Conversion factor between the public 1500-centered scale and the internal scale
const SCALE: f64 = 173.7178;

/// Center of the public rating scale
const CENTER: f64 = 1500.0;

/// Convergence tolerance for the volatility solve
const CONVERGENCE_TOLERANCE: f64 = 1e-6;

/// Iteration bound for the volatility solve
const MAX_ITERATIONS: u32 = 100;

/// One opponent observation: opponent strength plus the outcome score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub rating: f64,
    pub deviation: f64,
    /// Outcome in [0.0, 1.0]: 1.0 win, 0.5 draw, 0.0 loss; used as given
    pub score: f64,
}

impl Observation {
    pub fn new(rating: f64, deviation: f64, score: f64) -> Self {
        Self {
            rating,
            deviation,
            score,
        }
    }

    pub fn win(rating: f64, deviation: f64) -> Self {
        Self::new(rating, deviation, 1.0)
    }

    pub fn draw(rating: f64, deviation: f64) -> Self {
        Self::new(rating, deviation, 0.5)
    }

    pub fn loss(rating: f64, deviation: f64) -> Self {
        Self::new(rating, deviation, 0.0)
    }
}

/// Glicko-2 rating calculator
///
/// Side-effect free: callers resolve current ratings, the engine computes the
/// post-period triple, callers write it back. Identical inputs produce
/// bit-identical outputs.
#[derive(Debug, Clone)]
pub struct Glicko2Engine {
    config: RatingConfig,
}

impl Glicko2Engine {
    /// Create a new engine; rejects invalid numeric bounds
    pub fn new(config: RatingConfig) -> crate::error::Result<Self> {
        config.validate()?;

        Ok(Self { config })
    }

    /// Default rating triple for new subjects in `category`
    pub fn default_rating(&self, category: Category) -> GlickoRating {
        self.config.default_glicko(category)
    }

    /// System tau in effect
    pub fn system_tau(&self) -> f64 {
        self.config.system_tau
    }

    /// Apply one rating period to `current`
    ///
    /// With no observations the rating and volatility are unchanged and the
    /// deviation inflates toward the configured cap. With observations the
    /// full Glicko-2 update runs and the resulting deviation is clamped to
    /// the configured floor and cap.
    pub fn rate(&self, current: GlickoRating, observations: &[Observation]) -> GlickoRating {
        if observations.is_empty() {
            return self.decay(current);
        }

        let mu = to_mu(current.rating);
        let phi = to_phi(current.deviation);

        // Estimated variance and improvement sum over all observations
        let mut v_inv = 0.0;
        let mut improvement_sum = 0.0;
        for obs in observations {
            let mu_j = to_mu(obs.rating);
            let phi_j = to_phi(obs.deviation);
            let g_j = g(phi_j);
            let e_j = expectation(mu, mu_j, phi_j);
            v_inv += g_j * g_j * e_j * (1.0 - e_j);
            improvement_sum += g_j * (obs.score - e_j);
        }
        if v_inv <= 0.0 {
            // Opponents carried no information (degenerate mismatch)
            return current;
        }
        let v = 1.0 / v_inv;
        let delta = v * improvement_sum;

        let sigma_prime = self.solve_volatility(delta, phi, v, current.volatility);
        let phi_star = (phi * phi + sigma_prime * sigma_prime).sqrt();
        let phi_prime = 1.0 / (1.0 / (phi_star * phi_star) + 1.0 / v).sqrt();
        let mu_prime = mu + phi_prime * phi_prime * improvement_sum;

        GlickoRating {
            rating: from_mu(mu_prime),
            deviation: from_phi(phi_prime)
                .clamp(self.config.deviation_floor, self.config.deviation_cap),
            volatility: sigma_prime,
        }
    }

    /// Inactivity path: deviation inflates, rating and volatility stay put
    fn decay(&self, current: GlickoRating) -> GlickoRating {
        let phi = to_phi(current.deviation);
        let phi_star = (phi * phi + current.volatility * current.volatility).sqrt();

        GlickoRating {
            rating: current.rating,
            deviation: from_phi(phi_star).min(self.config.deviation_cap),
            volatility: current.volatility,
        }
    }

    /// Solve for the new volatility (Illinois-style convergence)
    ///
    /// Bounded iteration count; on divergence the previous volatility is
    /// returned rather than an unconverged value.
    fn solve_volatility(&self, delta: f64, phi: f64, v: f64, sigma: f64) -> f64 {
        let a = (sigma * sigma).ln();
        let tau = self.config.system_tau;
        let delta_sq = delta * delta;
        let phi_sq = phi * phi;

        let f = |x: f64| {
            let ex = x.exp();
            let num = ex * (delta_sq - phi_sq - v - ex);
            let den = 2.0 * (phi_sq + v + ex) * (phi_sq + v + ex);
            num / den - (x - a) / (tau * tau)
        };

        // Initial bracket
        let mut lower = a;
        let mut upper = if delta_sq > phi_sq + v {
            (delta_sq - phi_sq - v).ln()
        } else {
            let mut k = 1.0;
            let mut guard = 0;
            while f(a - k * tau) < 0.0 {
                k += 1.0;
                guard += 1;
                if guard >= MAX_ITERATIONS {
                    warn!("Volatility bracketing exhausted, keeping sigma {}", sigma);
                    return sigma;
                }
            }
            a - k * tau
        };

        let mut f_lower = f(lower);
        let mut f_upper = f(upper);
        let mut iterations = 0;

        while (upper - lower).abs() > CONVERGENCE_TOLERANCE {
            iterations += 1;
            if iterations > MAX_ITERATIONS {
                warn!("Volatility solve exceeded {} iterations, keeping sigma {}", MAX_ITERATIONS, sigma);
                return sigma;
            }

            let mid = lower + (lower - upper) * f_lower / (f_upper - f_lower);
            if !mid.is_finite() {
                warn!("Volatility solve diverged, keeping sigma {}", sigma);
                return sigma;
            }
            let f_mid = f(mid);

            if f_mid * f_upper <= 0.0 {
                lower = upper;
                f_lower = f_upper;
            } else {
                f_lower /= 2.0;
            }
            upper = mid;
            f_upper = f_mid;
        }

        (lower / 2.0).exp()
    }
}

/// Glicko-2 g function: dampens an opponent's weight by their uncertainty
fn g(phi: f64) -> f64 {
    1.0 / (1.0 + 3.0 * phi * phi / (std::f64::consts::PI * std::f64::consts::PI)).sqrt()
}

/// Expected score against one opponent on the internal scale
fn expectation(mu: f64, mu_j: f64, phi_j: f64) -> f64 {
    1.0 / (1.0 + (-g(phi_j) * (mu - mu_j)).exp())
}

fn to_mu(rating: f64) -> f64 {
    (rating - CENTER) / SCALE
}

fn to_phi(deviation: f64) -> f64 {
    deviation / SCALE
}

fn from_mu(mu: f64) -> f64 {
    mu * SCALE + CENTER
}

fn from_phi(phi: f64) -> f64 {
    phi * SCALE
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use skillratings::glicko2::{glicko2_rating_period, Glicko2Config, Glicko2Rating};
    use skillratings::Outcomes;

    fn create_test_engine() -> Glicko2Engine {
        Glicko2Engine::new(RatingConfig::default()).unwrap()
    }

    fn rating(rating: f64, deviation: f64, volatility: f64) -> GlickoRating {
        GlickoRating {
            rating,
            deviation,
            volatility,
        }
    }

    #[test]
    fn test_engine_rejects_invalid_config() {
        let mut config = RatingConfig::default();
        config.system_tau = 0.0;
        assert!(Glicko2Engine::new(config).is_err());

        let mut config = RatingConfig::default();
        config.deviation_floor = 400.0; // above the cap
        assert!(Glicko2Engine::new(config).is_err());
    }

    // Worked example from Glickman's Glicko-2 paper: 1500/200/0.06 player
    // beats 1400/30 and loses to 1550/100 and 1700/300 in one period.
    #[test]
    fn test_published_reference_vector() {
        let engine = create_test_engine();
        let current = rating(1500.0, 200.0, 0.06);
        let observations = [
            Observation::win(1400.0, 30.0),
            Observation::loss(1550.0, 100.0),
            Observation::loss(1700.0, 300.0),
        ];

        let updated = engine.rate(current, &observations);

        assert!((updated.rating - 1464.06).abs() < 0.05, "rating {}", updated.rating);
        assert!((updated.deviation - 151.52).abs() < 0.05, "deviation {}", updated.deviation);
        assert!((updated.volatility - 0.05999).abs() < 1e-4, "volatility {}", updated.volatility);
    }

    #[test]
    fn test_matches_independent_implementation() {
        let engine = create_test_engine();
        let current = rating(1500.0, 200.0, 0.06);
        let observations = [
            Observation::win(1400.0, 30.0),
            Observation::loss(1550.0, 100.0),
            Observation::loss(1700.0, 300.0),
        ];

        let mine = engine.rate(current, &observations);

        let player = Glicko2Rating {
            rating: 1500.0,
            deviation: 200.0,
            volatility: 0.06,
        };
        let results = vec![
            (
                Glicko2Rating {
                    rating: 1400.0,
                    deviation: 30.0,
                    volatility: 0.06,
                },
                Outcomes::WIN,
            ),
            (
                Glicko2Rating {
                    rating: 1550.0,
                    deviation: 100.0,
                    volatility: 0.06,
                },
                Outcomes::LOSS,
            ),
            (
                Glicko2Rating {
                    rating: 1700.0,
                    deviation: 300.0,
                    volatility: 0.06,
                },
                Outcomes::LOSS,
            ),
        ];
        let theirs = glicko2_rating_period(&player, &results, &Glicko2Config::new());

        assert!((mine.rating - theirs.rating).abs() < 0.01);
        assert!((mine.deviation - theirs.deviation).abs() < 0.01);
        assert!((mine.volatility - theirs.volatility).abs() < 1e-4);
    }

    #[test]
    fn test_win_raises_rating_and_shrinks_deviation() {
        let engine = create_test_engine();
        let current = rating(1500.0, 350.0, 0.06);

        let updated = engine.rate(current, &[Observation::win(1500.0, 350.0)]);

        assert!(updated.rating > 1500.0);
        assert!(updated.deviation < 350.0);
        assert!(updated.deviation >= 30.0);
    }

    #[test]
    fn test_loss_lowers_rating() {
        let engine = create_test_engine();
        let current = rating(1500.0, 350.0, 0.06);

        let updated = engine.rate(current, &[Observation::loss(1500.0, 350.0)]);

        assert!(updated.rating < 1500.0);
        assert!(updated.deviation < 350.0);
    }

    #[test]
    fn test_upset_win_gains_more_than_expected_win() {
        let engine = create_test_engine();
        let current = rating(1500.0, 200.0, 0.06);

        let upset = engine.rate(current, &[Observation::win(1700.0, 200.0)]);
        let expected = engine.rate(current, &[Observation::win(1300.0, 200.0)]);

        assert!(upset.rating - 1500.0 > expected.rating - 1500.0);
    }

    #[test]
    fn test_higher_deviation_swings_harder() {
        let engine = create_test_engine();
        let uncertain = rating(1500.0, 350.0, 0.06);
        let confident = rating(1500.0, 100.0, 0.06);
        let opponent = Observation::win(1500.0, 200.0);

        let uncertain_gain = engine.rate(uncertain, &[opponent]).rating - 1500.0;
        let confident_gain = engine.rate(confident, &[opponent]).rating - 1500.0;

        assert!(uncertain_gain > confident_gain);
        assert!(confident_gain > 0.0);
    }

    #[test]
    fn test_draw_between_equals_barely_moves_rating() {
        let engine = create_test_engine();
        let current = rating(1500.0, 200.0, 0.06);

        let updated = engine.rate(current, &[Observation::draw(1500.0, 200.0)]);

        assert!((updated.rating - 1500.0).abs() < 5.0);
    }

    #[test]
    fn test_fractional_scores_interpolate_between_outcomes() {
        let engine = create_test_engine();
        let current = rating(1500.0, 200.0, 0.06);
        let against = |score: f64| {
            engine
                .rate(current, &[Observation::new(1500.0, 200.0, score)])
                .rating
        };

        let loss = against(0.0);
        let partial = against(0.25);
        let draw = against(0.5);
        let strong = against(0.75);
        let win = against(1.0);

        assert!(loss < partial);
        assert!(partial < draw);
        assert!(draw < strong);
        assert!(strong < win);
    }

    #[test]
    fn test_multiple_opponents_accumulate() {
        let engine = create_test_engine();
        let current = rating(1500.0, 200.0, 0.06);
        let observations = [
            Observation::win(1450.0, 150.0),
            Observation::win(1550.0, 180.0),
            Observation::loss(1480.0, 220.0),
        ];

        let updated = engine.rate(current, &observations);

        // Two wins and one loss against comparable opposition is a net gain
        assert!(updated.rating > 1500.0);
        assert!(updated.deviation < 200.0);
    }

    #[test]
    fn test_inactivity_keeps_rating_and_volatility() {
        let engine = create_test_engine();
        let current = rating(1623.0, 200.0, 0.06);

        let updated = engine.rate(current, &[]);

        assert_eq!(updated.rating, current.rating);
        assert_eq!(updated.volatility, current.volatility);
        assert!(updated.deviation > current.deviation);
    }

    #[test]
    fn test_inactivity_respects_deviation_cap() {
        let engine = create_test_engine();
        let current = rating(1500.0, 350.0, 0.06);

        let updated = engine.rate(current, &[]);

        assert_eq!(updated.deviation, 350.0);
    }

    #[test]
    fn test_unreachable_opponent_carries_no_information() {
        let engine = create_test_engine();
        let current = rating(1500.0, 200.0, 0.06);

        // Expected score saturates to exactly zero, leaving no variance to
        // update from; the input comes back unchanged
        let updated = engine.rate(current, &[Observation::win(1.0e9, 350.0)]);

        assert_eq!(updated, current);
    }

    #[test]
    fn test_volatility_stays_in_practical_band() {
        let engine = create_test_engine();
        let mut current = rating(1500.0, 350.0, 0.06);

        // Ten straight wins against a stable stronger opponent
        for _ in 0..10 {
            current = engine.rate(current, &[Observation::win(1600.0, 150.0)]);
        }

        assert!(current.rating > 1600.0);
        assert!(current.deviation < 200.0);
        assert!(current.volatility > 0.03 && current.volatility < 0.10);
    }

    #[test]
    fn test_deviation_floor_holds_under_grinding() {
        let mut config = RatingConfig::default();
        config.deviation_floor = 60.0;
        let engine = Glicko2Engine::new(config).unwrap();
        let mut current = rating(1500.0, 120.0, 0.06);

        for _ in 0..200 {
            current = engine.rate(current, &[Observation::draw(1500.0, 60.0)]);
        }

        assert!(current.deviation >= 60.0);
    }

    #[test]
    fn test_default_rating_honors_category_override() {
        let mut config = RatingConfig::default();
        config
            .deviation_overrides
            .insert(Category::Battleground, 200.0);
        let engine = Glicko2Engine::new(config).unwrap();

        assert_eq!(engine.default_rating(Category::Battleground).deviation, 200.0);
        assert_eq!(engine.default_rating(Category::TwoVTwo).deviation, 350.0);
    }

    proptest! {
        #[test]
        fn prop_any_result_shrinks_deviation(
            subject_rating in 1200.0..1800.0f64,
            subject_deviation in 150.0..350.0f64,
            opponent_rating in 1200.0..1800.0f64,
            opponent_deviation in 150.0..350.0f64,
            score in 0.0..=1.0f64,
        ) {
            let engine = create_test_engine();
            let current = rating(subject_rating, subject_deviation, 0.06);
            let updated = engine.rate(
                current,
                &[Observation::new(opponent_rating, opponent_deviation, score)],
            );

            prop_assert!(updated.deviation < subject_deviation);
            prop_assert!(updated.deviation >= 30.0);
        }

        #[test]
        fn prop_stronger_victim_means_bigger_gain(
            subject_rating in 1200.0..1800.0f64,
            weaker in 1200.0..1700.0f64,
            edge in 25.0..100.0f64,
            opponent_deviation in 150.0..350.0f64,
        ) {
            let engine = create_test_engine();
            let current = rating(subject_rating, 200.0, 0.06);
            let stronger = weaker + edge;

            let vs_stronger = engine
                .rate(current, &[Observation::win(stronger, opponent_deviation)])
                .rating;
            let vs_weaker = engine
                .rate(current, &[Observation::win(weaker, opponent_deviation)])
                .rating;

            prop_assert!(vs_stronger > vs_weaker);
        }

        #[test]
        fn prop_identical_inputs_are_deterministic(
            subject_rating in 1000.0..2000.0f64,
            subject_deviation in 50.0..350.0f64,
            score in 0.0..=1.0f64,
        ) {
            let engine = create_test_engine();
            let current = rating(subject_rating, subject_deviation, 0.06);
            let observations = [Observation::new(1500.0, 200.0, score)];

            let first = engine.rate(current, &observations);
            let second = engine.rate(current, &observations);

            prop_assert_eq!(first.rating.to_bits(), second.rating.to_bits());
            prop_assert_eq!(first.deviation.to_bits(), second.deviation.to_bits());
            prop_assert_eq!(first.volatility.to_bits(), second.volatility.to_bits());
        }
    }
}
