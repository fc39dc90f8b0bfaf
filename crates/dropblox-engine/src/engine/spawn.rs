use std::sync::Arc;

use rand::{
    Rng, SeedableRng as _,
    distr::{Distribution, StandardUniform},
};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::core::{Block, BlockCatalog};

/// Score distance between successive tier thresholds.
pub const LEVEL_INTERVAL: f64 = 60.0;
/// Lower bound of the tier-mixing ratio.
pub const MIN_R: f64 = 0.1;
/// Upper bound of the tier-mixing ratio.
pub const MAX_R: f64 = 0.9;
/// Score scale of the tier-mixing ratio curve.
pub const R_INTERVAL: f64 = 480.0;

/// Seed for deterministic block generation.
///
/// Two boards built from the same seed and fed the same commands produce the same
/// blocks, which makes trials reproducible.
///
/// # Example
///
/// ```
/// use dropblox_engine::BoardSeed;
///
/// let seed: BoardSeed = "42".parse().unwrap();
/// assert_eq!(seed, BoardSeed::new(42));
/// assert_eq!(seed.to_string(), "42");
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::FromStr,
)]
#[serde(transparent)]
pub struct BoardSeed(u64);

impl BoardSeed {
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self(seed)
    }

    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl Distribution<BoardSeed> for StandardUniform {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> BoardSeed {
        BoardSeed(rng.random())
    }
}

/// S-shaped curve rising from 0 to 1, centered at `x = 0`.
fn sigmoid(x: f64) -> f64 {
    (x / (x * x + 1.0).sqrt() + 1.0) / 2.0
}

/// Ratio between the probabilities of successive tiers at the given score.
///
/// Rises smoothly from about [`MIN_R`] to about [`MAX_R`] as the score passes
/// [`R_INTERVAL`].
#[expect(clippy::cast_precision_loss)]
#[must_use]
pub fn tier_ratio(score: u64) -> f64 {
    let x = 2.0 * (score as f64 - R_INTERVAL) / R_INTERVAL;
    (MAX_R - MIN_R) * sigmoid(x) + MIN_R
}

/// Picks the difficulty tier for a uniform draw `p ∈ [0, 1)` at the given score.
///
/// Tier thresholds are `r^i · sigmoid(2(score − i·LEVEL_INTERVAL)/LEVEL_INTERVAL)`
/// for `i = 1, 2, …`; the first `i` whose threshold is below `p` selects tier `i − 1`.
/// When no threshold triggers, the hardest tier is used. For a fixed `p` the result
/// never decreases as the score grows.
#[expect(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap
)]
#[must_use]
pub fn select_tier(score: u64, p: f64, tier_count: usize) -> usize {
    let r = tier_ratio(score);
    let score = score as f64;
    for i in 1..tier_count {
        let x = 2.0 * (score - i as f64 * LEVEL_INTERVAL) / LEVEL_INTERVAL;
        let threshold = r.powi(i as i32) * sigmoid(x);
        if p > threshold {
            return i - 1;
        }
    }
    tier_count.saturating_sub(1)
}

/// Score-dependent random block source.
///
/// Each spawn draws a tier with [`select_tier`], then a shape uniformly among all
/// shapes of that tier and the easier ones.
#[derive(Debug, Clone)]
pub struct BlockSpawner {
    rng: Pcg32,
    catalog: Arc<BlockCatalog>,
}

impl BlockSpawner {
    #[must_use]
    pub fn new(seed: BoardSeed, catalog: Arc<BlockCatalog>) -> Self {
        Self {
            rng: Pcg32::seed_from_u64(seed.0),
            catalog,
        }
    }

    #[must_use]
    pub fn catalog(&self) -> &Arc<BlockCatalog> {
        &self.catalog
    }

    pub fn spawn(&mut self, score: u64) -> Block {
        let p = self.rng.random::<f64>();
        let tier = select_tier(score, p, self.catalog.tier_count());
        let index = self.rng.random_range(0..self.catalog.cumulative_count(tier));
        self.catalog.shapes()[index].spawn()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ratio_bounds() {
        for score in [0, 1, 100, 480, 1000, 100_000] {
            let r = tier_ratio(score);
            assert!((MIN_R..=MAX_R).contains(&r), "r({score}) = {r}");
        }
        assert!((tier_ratio(480) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_low_score_picks_easiest_tier() {
        assert_eq!(select_tier(0, 0.5, 3), 0);
        assert_eq!(select_tier(0, 0.01, 3), 0);
    }

    #[test]
    fn test_zero_draw_picks_hardest_tier() {
        assert_eq!(select_tier(0, 0.0, 3), 2);
        assert_eq!(select_tier(0, 0.0, 1), 0);
    }

    #[test]
    fn test_single_tier_catalog() {
        for p in [0.0, 0.3, 0.99] {
            assert_eq!(select_tier(10_000, p, 1), 0);
        }
    }

    #[test]
    fn test_tier_is_monotonic_in_score() {
        for step in 0..100 {
            let p = f64::from(step) / 100.0;
            let mut prev = 0;
            for score in (0..2000).step_by(5) {
                let tier = select_tier(score, p, 3);
                assert!(tier >= prev, "p={p} score={score}: {tier} < {prev}");
                prev = tier;
            }
        }
    }

    #[test]
    fn test_high_scores_reach_harder_tiers() {
        assert!(select_tier(1000, 0.3, 3) > 0);
    }

    #[test]
    fn test_spawner_is_deterministic() {
        let mut a = BlockSpawner::new(BoardSeed::new(99), BlockCatalog::standard());
        let mut b = BlockSpawner::new(BoardSeed::new(99), BlockCatalog::standard());
        for score in 0..50 {
            assert_eq!(a.spawn(score * 20), b.spawn(score * 20));
        }
    }

    #[test]
    fn test_spawner_stays_in_easy_tier_at_start() {
        let catalog = BlockCatalog::standard();
        let mut spawner = BlockSpawner::new(BoardSeed::new(3), catalog.clone());
        let easy = catalog.cumulative_count(0);
        let hard = (0..500)
            .filter(|_| spawner.spawn(0).kind().index() >= easy)
            .count();
        // At score 0 the first threshold is below 1%.
        assert!(hard < 25, "{hard} hard blocks at score 0");
    }
}
