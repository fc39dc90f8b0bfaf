//! Generation loop of the weight search.
//!
//! Every generation the [`Harness`]:
//!
//! 1. draws `trials_per_chromosome` board seeds, shared by the whole population
//! 2. plays every (chromosome, seed) pair on a bounded thread pool
//! 3. sums the scores of equal chromosomes
//! 4. reports the generation, then breeds the next population with
//!    [`genetic::select_survivors`] and [`genetic::reproduce`]
//!
//! The loop ends once the best chromosome averages more than
//! `target_average_score` points per trial, or after `max_generations`.

use std::{collections::HashMap, time::Duration};

use chrono::{DateTime, Utc};
use dropblox_agent::{CancellationToken, Chromosome, TrialRunner};
use dropblox_engine::BoardSeed;
use rand::{Rng, SeedableRng as _};
use rand_distr::Normal;
use rand_pcg::Pcg32;
use rayon::{ThreadPool, ThreadPoolBuilder, prelude::*};
use serde::{Deserialize, Serialize};

use crate::{HarnessError, genetic, stats::FitnessStats};

/// Search parameters.
///
/// Missing fields take their defaults when deserialized, so a configuration file
/// only needs to list what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessParams {
    /// Must be a positive multiple of 4.
    pub population_size: usize,
    /// Games played by each chromosome per generation.
    pub trials_per_chromosome: usize,
    /// Board seeds are drawn from `0..=max_seed`.
    pub max_seed: u64,
    /// Spread of fresh chromosomes around the seed chromosome.
    pub initial_sigma: f64,
    /// Spread of the noise added to jittered copies.
    pub jitter_sigma: f64,
    pub target_average_score: f64,
    pub max_generations: Option<usize>,
    /// Worker threads; defaults to the available parallelism.
    pub workers: Option<usize>,
    /// Hard wall-clock limit of a single trial.
    pub trial_timeout_secs: Option<f64>,
    /// Seed of the harness RNG; random when unset.
    pub rng_seed: Option<u64>,
}

impl Default for HarnessParams {
    fn default() -> Self {
        Self {
            population_size: 16,
            trials_per_chromosome: 4,
            max_seed: 1024,
            initial_sigma: 1.0,
            jitter_sigma: 0.01,
            target_average_score: 100.0,
            max_generations: None,
            workers: None,
            trial_timeout_secs: None,
            rng_seed: None,
        }
    }
}

impl HarnessParams {
    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.population_size == 0 || self.population_size % 4 != 0 {
            return Err(HarnessError::InvalidPopulationSize(self.population_size));
        }
        if self.trials_per_chromosome == 0 {
            return Err(HarnessError::ZeroTrials);
        }
        self.initial_noise()?;
        self.jitter_noise()?;
        let timeout = self.trial_timeout_secs.unwrap_or_default();
        if !timeout.is_finite() || timeout < 0.0 {
            return Err(HarnessError::InvalidParam {
                field: "trial_timeout_secs",
                reason: NON_NEGATIVE,
            });
        }
        if self.target_average_score.is_nan() {
            return Err(HarnessError::InvalidParam {
                field: "target_average_score",
                reason: "must be a number",
            });
        }
        if self.workers == Some(0) {
            return Err(HarnessError::InvalidParam {
                field: "workers",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }

    /// `N(0, initial_sigma)`, the spread of chromosomes drawn around a center.
    pub fn initial_noise(&self) -> Result<Normal<f64>, HarnessError> {
        noise("initial_sigma", self.initial_sigma)
    }

    /// `N(0, jitter_sigma)`, the noise of jittered copies.
    pub fn jitter_noise(&self) -> Result<Normal<f64>, HarnessError> {
        noise("jitter_sigma", self.jitter_sigma)
    }
}

const NON_NEGATIVE: &str = "must be a finite, non-negative number";

fn noise(field: &'static str, sigma: f64) -> Result<Normal<f64>, HarnessError> {
    Normal::new(0.0, sigma).map_err(|_| HarnessError::InvalidParam {
        field,
        reason: NON_NEGATIVE,
    })
}

/// A chromosome with its summed score over a generation's trials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChromosome {
    pub chromosome: Chromosome,
    pub score: u64,
    /// `score` divided by the number of trials per chromosome.
    pub average: f64,
}

/// Result of evaluating one generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub generation: usize,
    pub timestamp: DateTime<Utc>,
    pub seeds: Vec<BoardSeed>,
    /// Scored chromosomes, best first.
    pub table: Vec<ScoredChromosome>,
    /// Summary of `table[..].average`.
    pub stats: Option<FitnessStats>,
}

impl GenerationReport {
    #[must_use]
    pub fn best(&self) -> Option<&ScoredChromosome> {
        self.table.first()
    }
}

/// Evolutionary search over chromosomes, scored by a [`TrialRunner`].
#[derive(Debug)]
pub struct Harness<R> {
    runner: R,
    params: HarnessParams,
    pool: ThreadPool,
    rng: Pcg32,
    initial_noise: Normal<f64>,
    jitter_noise: Normal<f64>,
    population: Vec<Chromosome>,
    generation: usize,
}

impl<R> Harness<R>
where
    R: TrialRunner,
{
    /// Creates a harness whose first population is drawn around
    /// [`Chromosome::default_seed`].
    pub fn new(runner: R, params: HarnessParams) -> Result<Self, HarnessError> {
        Self::with_center(runner, params, &Chromosome::default_seed())
    }

    /// Creates a harness whose first population is drawn around `center`.
    pub fn with_center(
        runner: R,
        params: HarnessParams,
        center: &Chromosome,
    ) -> Result<Self, HarnessError> {
        params.validate()?;
        let mut rng = match params.rng_seed {
            Some(seed) => Pcg32::seed_from_u64(seed),
            None => Pcg32::from_rng(&mut rand::rng()),
        };
        let noise = params.initial_noise()?;
        let population = (0..params.population_size)
            .map(|_| genetic::random_around(center, noise, &mut rng))
            .collect();
        Self::build(runner, params, rng, population)
    }

    /// Creates a harness starting from an explicit population.
    pub fn with_population(
        runner: R,
        params: HarnessParams,
        population: Vec<Chromosome>,
    ) -> Result<Self, HarnessError> {
        params.validate()?;
        if population.len() != params.population_size {
            return Err(HarnessError::PopulationMismatch {
                expected: params.population_size,
                actual: population.len(),
            });
        }
        let rng = match params.rng_seed {
            Some(seed) => Pcg32::seed_from_u64(seed),
            None => Pcg32::from_rng(&mut rand::rng()),
        };
        Self::build(runner, params, rng, population)
    }

    fn build(
        runner: R,
        params: HarnessParams,
        rng: Pcg32,
        population: Vec<Chromosome>,
    ) -> Result<Self, HarnessError> {
        let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("trial-{i}"));
        if let Some(workers) = params.workers {
            builder = builder.num_threads(workers);
        }
        let pool = builder.build()?;
        Ok(Self {
            initial_noise: params.initial_noise()?,
            jitter_noise: params.jitter_noise()?,
            runner,
            params,
            pool,
            rng,
            population,
            generation: 0,
        })
    }

    #[must_use]
    pub fn params(&self) -> &HarnessParams {
        &self.params
    }

    #[must_use]
    pub fn population(&self) -> &[Chromosome] {
        &self.population
    }

    /// Index of the generation evaluated by the next [`Harness::step`].
    #[must_use]
    pub fn generation(&self) -> usize {
        self.generation
    }

    fn draw_seeds(&mut self) -> Vec<BoardSeed> {
        (0..self.params.trials_per_chromosome)
            .map(|_| BoardSeed::new(self.rng.random_range(0..=self.params.max_seed)))
            .collect()
    }

    /// Plays every chromosome on every seed and sums the scores of equal chromosomes.
    ///
    /// Entries keep the order in which chromosomes first appear in the population.
    #[must_use]
    pub fn evaluate(&self, seeds: &[BoardSeed]) -> Vec<(Chromosome, u64)> {
        let jobs = self
            .population
            .iter()
            .flat_map(|chromosome| seeds.iter().map(move |&seed| (chromosome, seed)))
            .collect::<Vec<_>>();

        let runner = &self.runner;
        let trial_timeout = self
            .params
            .trial_timeout_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok());
        let scores = self.pool.install(|| {
            jobs.par_iter()
                .map(|&(chromosome, seed)| {
                    let cancel = trial_timeout
                        .map_or_else(CancellationToken::new, CancellationToken::with_timeout);
                    let outcome = runner.run_trial(chromosome, seed, &cancel);
                    tracing::debug!(
                        %seed,
                        score = outcome.score,
                        end = ?outcome.end,
                        "trial finished"
                    );
                    outcome.score
                })
                .collect::<Vec<_>>()
        });

        let mut index = HashMap::new();
        let mut table: Vec<(Chromosome, u64)> = vec![];
        for (&(chromosome, _), score) in jobs.iter().zip(scores) {
            let i = *index.entry(chromosome).or_insert_with(|| {
                table.push((chromosome.clone(), 0));
                table.len() - 1
            });
            table[i].1 = table[i].1.saturating_add(score);
        }
        table
    }

    /// Evaluates the current population, then replaces it with the next generation.
    pub fn step(&mut self) -> GenerationReport {
        let seeds = self.draw_seeds();
        let table = self.evaluate(&seeds);
        let report = self.report(seeds, &table);

        if let Some(best) = report.best() {
            tracing::info!(
                generation = report.generation,
                best = best.average,
                mean = report.stats.map(|s| s.mean),
                distinct = report.table.len(),
                "generation evaluated"
            );
        }

        let parents = genetic::select_survivors(table, &mut self.rng)
            .into_iter()
            .map(|(chromosome, _)| chromosome)
            .collect();
        let mut next = genetic::reproduce(parents, self.jitter_noise, &mut self.rng);
        if let Some(best) = report.best() {
            let missing = self.params.population_size.saturating_sub(next.len());
            if missing > 0 {
                tracing::debug!(missing, "topping up population around the best chromosome");
            }
            next.extend((0..missing).map(|_| {
                genetic::random_around(&best.chromosome, self.initial_noise, &mut self.rng)
            }));
        }
        next.truncate(self.params.population_size);

        self.population = next;
        self.generation += 1;
        report
    }

    #[must_use]
    pub fn is_finished(&self, report: &GenerationReport) -> bool {
        let reached = report
            .best()
            .is_some_and(|best| best.average > self.params.target_average_score);
        let exhausted = self
            .params
            .max_generations
            .is_some_and(|max| self.generation >= max);
        reached || exhausted
    }

    /// Runs generations until [`Harness::is_finished`], calling `on_generation` after
    /// each one. Returns the last report.
    pub fn run<F>(&mut self, mut on_generation: F) -> Result<GenerationReport, HarnessError>
    where
        F: FnMut(&GenerationReport) -> Result<(), HarnessError>,
    {
        loop {
            let report = self.step();
            on_generation(&report)?;
            if self.is_finished(&report) {
                return Ok(report);
            }
        }
    }

    fn report(&self, seeds: Vec<BoardSeed>, table: &[(Chromosome, u64)]) -> GenerationReport {
        let trials = self.params.trials_per_chromosome;
        let mut table = table
            .iter()
            .map(|(chromosome, score)| ScoredChromosome {
                chromosome: chromosome.clone(),
                score: *score,
                average: average_score(*score, trials),
            })
            .collect::<Vec<_>>();
        table.sort_by(|a, b| b.score.cmp(&a.score));
        let stats = FitnessStats::new(table.iter().map(|s| s.average));
        GenerationReport {
            generation: self.generation,
            timestamp: Utc::now(),
            seeds,
            table,
            stats,
        }
    }
}

#[expect(clippy::cast_precision_loss)]
fn average_score(score: u64, trials: usize) -> f64 {
    score as f64 / trials as f64
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use dropblox_agent::{Feature, TrialEnd, TrialOutcome};

    use super::*;

    /// Scores a chromosome by its `HOLES` weight and records every trial.
    #[derive(Debug, Default)]
    struct HolesRunner {
        calls: AtomicUsize,
        seeds: Mutex<Vec<BoardSeed>>,
    }

    impl TrialRunner for HolesRunner {
        fn run_trial(
            &self,
            chromosome: &Chromosome,
            seed: BoardSeed,
            _cancel: &CancellationToken,
        ) -> TrialOutcome {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.seeds.lock().unwrap().push(seed);
            let holes = chromosome.get(Feature::Holes).unwrap_or_default();
            #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let score = (holes.max(0.0) * 10.0) as u64;
            TrialOutcome {
                score,
                turns: 1,
                end: TrialEnd::GameOver,
            }
        }
    }

    fn params() -> HarnessParams {
        HarnessParams {
            workers: Some(2),
            rng_seed: Some(42),
            ..HarnessParams::default()
        }
    }

    #[test]
    fn test_default_params_are_valid() {
        assert!(HarnessParams::default().validate().is_ok());
    }

    #[test]
    fn test_population_size_must_be_multiple_of_four() {
        for size in [0, 2, 6, 15] {
            let params = HarnessParams {
                population_size: size,
                ..params()
            };
            assert!(matches!(
                Harness::new(HolesRunner::default(), params),
                Err(HarnessError::InvalidPopulationSize(s)) if s == size
            ));
        }
        let zero_trials = HarnessParams {
            trials_per_chromosome: 0,
            ..params()
        };
        assert!(matches!(
            zero_trials.validate(),
            Err(HarnessError::ZeroTrials)
        ));
    }

    #[test]
    fn test_sigma_must_be_non_negative() {
        let negative = HarnessParams {
            jitter_sigma: -0.5,
            ..params()
        };
        assert!(matches!(
            Harness::new(HolesRunner::default(), negative),
            Err(HarnessError::InvalidParam { field: "jitter_sigma", .. })
        ));
        let infinite = HarnessParams {
            initial_sigma: f64::INFINITY,
            ..params()
        };
        assert!(matches!(
            infinite.initial_noise(),
            Err(HarnessError::InvalidParam { field: "initial_sigma", .. })
        ));
        assert!(params().jitter_noise().is_ok());
    }

    #[test]
    fn test_params_json_defaults() {
        let params: HarnessParams = serde_json::from_str(r#"{"population_size": 8}"#).unwrap();
        assert_eq!(params.population_size, 8);
        assert_eq!(params.trials_per_chromosome, 4);
        assert_eq!(params.max_seed, 1024);
    }

    #[test]
    fn test_evaluate_runs_every_pair() {
        let harness = Harness::new(HolesRunner::default(), params()).unwrap();
        let seeds = [BoardSeed::new(1), BoardSeed::new(2), BoardSeed::new(3)];
        let table = harness.evaluate(&seeds);
        assert_eq!(harness.runner.calls.load(Ordering::Relaxed), 16 * 3);
        assert_eq!(table.len(), 16);
        for (chromosome, score) in &table {
            let holes = chromosome.get(Feature::Holes).unwrap();
            #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let expected = 3 * (holes.max(0.0) * 10.0) as u64;
            assert_eq!(*score, expected);
        }
    }

    #[test]
    fn test_evaluate_merges_duplicates() {
        let a: Chromosome = [(Feature::Holes, 2.0)].into_iter().collect();
        let b: Chromosome = [(Feature::Holes, 5.0)].into_iter().collect();
        let population = vec![a.clone(), b.clone(), a.clone(), a.clone()];
        let params = HarnessParams {
            population_size: 4,
            ..params()
        };
        let harness = Harness::with_population(HolesRunner::default(), params, population).unwrap();
        let table = harness.evaluate(&[BoardSeed::new(9)]);
        assert_eq!(table, vec![(a, 60), (b, 50)]);
    }

    #[test]
    fn test_step_preserves_population_size() {
        let mut harness = Harness::new(HolesRunner::default(), params()).unwrap();
        for generation in 0..5 {
            let report = harness.step();
            assert_eq!(report.generation, generation);
            assert_eq!(report.seeds.len(), 4);
            assert!(report.seeds.iter().all(|s| s.value() <= 1024));
            assert!(report.table.windows(2).all(|w| w[0].score >= w[1].score));
            assert_eq!(harness.population().len(), 16);
        }
    }

    #[test]
    fn test_step_tops_up_after_merging() {
        let same: Chromosome = [(Feature::Holes, 1.0)].into_iter().collect();
        let params = HarnessParams {
            population_size: 8,
            ..params()
        };
        let mut harness =
            Harness::with_population(HolesRunner::default(), params, vec![same; 8]).unwrap();
        let report = harness.step();
        assert_eq!(report.table.len(), 1);
        assert_eq!(harness.population().len(), 8);
    }

    #[test]
    fn test_run_stops_at_target() {
        let params = HarnessParams {
            target_average_score: 20.0,
            max_generations: Some(50),
            ..params()
        };
        let center: Chromosome = [(Feature::Holes, 1.0)].into_iter().collect();
        let mut harness = Harness::with_center(HolesRunner::default(), params, &center).unwrap();
        let mut generations = 0;
        let last = harness
            .run(|_| {
                generations += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(generations, last.generation + 1);
        let best = last.best().unwrap();
        assert!(best.average > 20.0 || harness.generation() == 50);
    }

    #[test]
    fn test_run_stops_at_max_generations() {
        let params = HarnessParams {
            target_average_score: f64::INFINITY,
            max_generations: Some(3),
            ..params()
        };
        let mut harness = Harness::new(HolesRunner::default(), params).unwrap();
        let last = harness.run(|_| Ok(())).unwrap();
        assert_eq!(last.generation, 2);
        assert_eq!(harness.generation(), 3);
    }

    #[test]
    fn test_seeds_are_shared_by_generation() {
        let mut harness = Harness::new(HolesRunner::default(), params()).unwrap();
        let report = harness.step();
        let mut seen = harness.runner.seeds.lock().unwrap().clone();
        seen.sort_by_key(|s| s.value());
        seen.dedup();
        let mut drawn = report.seeds.clone();
        drawn.sort_by_key(|s| s.value());
        drawn.dedup();
        assert_eq!(seen, drawn);
    }

    #[test]
    fn test_same_rng_seed_same_search() {
        let mut a = Harness::new(HolesRunner::default(), params()).unwrap();
        let mut b = Harness::new(HolesRunner::default(), params()).unwrap();
        for _ in 0..3 {
            let ra = a.step();
            let rb = b.step();
            assert_eq!(ra.seeds, rb.seeds);
            assert_eq!(ra.table, rb.table);
        }
    }
}
