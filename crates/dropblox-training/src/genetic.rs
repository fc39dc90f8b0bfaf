//! Genetic operators over [`Chromosome`]s.
//!
//! One generation step works on a table of scored chromosomes:
//!
//! 1. **Selection** - [`select_survivors`] shuffles the table, pairs neighbours and
//!    keeps the better chromosome of each pair
//! 2. **Reproduction** - [`reproduce`] shuffles the survivors, pairs them again and
//!    turns every pair into four children: two [`crossover`]s and a [`jitter`]ed copy
//!    of each parent
//!
//! Both steps halve or double the population size, so a population whose size is a
//! multiple of 4 keeps its size. Odd chromosomes left over after pairing are dropped.
//!
//! # Crossover
//!
//! Each weight of a crossover child is taken from parent A with probability 0.4, from
//! parent B with probability 0.4, and drawn fresh from `N(0, 1)` otherwise. The fresh
//! draws are the only large mutation in the system; jitter adds small Gaussian noise.

use dropblox_agent::{Chromosome, Feature};
use rand::{Rng, seq::SliceRandom as _};
use rand_distr::{Normal, StandardNormal};

/// Cumulative probability of inheriting a weight from the first parent.
pub const CROSSOVER_FROM_A: f64 = 0.4;
/// Cumulative probability of inheriting a weight from either parent.
pub const CROSSOVER_FROM_B: f64 = 0.8;

/// Draws a chromosome around `center` by adding a sample of `noise` to every weight.
///
/// `noise` is centered on zero, e.g. `Normal::new(0.0, sigma)`.
pub fn random_around<R>(center: &Chromosome, noise: Normal<f64>, rng: &mut R) -> Chromosome
where
    R: Rng + ?Sized,
{
    center.map(|_, w| w + rng.sample(noise))
}

/// Adds small `noise` to every weight.
pub fn jitter<R>(chromosome: &Chromosome, noise: Normal<f64>, rng: &mut R) -> Chromosome
where
    R: Rng + ?Sized,
{
    random_around(chromosome, noise, rng)
}

/// Mixes two parents weight by weight.
///
/// The child has the union of the parents' features. A weight missing from the parent
/// that was picked is taken from the other one.
pub fn crossover<R>(a: &Chromosome, b: &Chromosome, rng: &mut R) -> Chromosome
where
    R: Rng + ?Sized,
{
    let mut features = a.features().chain(b.features()).collect::<Vec<Feature>>();
    features.sort_unstable();
    features.dedup();

    features
        .into_iter()
        .map(|feature| {
            let (wa, wb) = (a.get(feature), b.get(feature));
            let r = rng.random::<f64>();
            let weight = if r <= CROSSOVER_FROM_A {
                wa.or(wb)
            } else if r <= CROSSOVER_FROM_B {
                wb.or(wa)
            } else {
                None
            };
            (feature, weight.unwrap_or_else(|| rng.sample(StandardNormal)))
        })
        .collect()
}

/// Shuffles `items` and pairs neighbours. An odd last item is dropped.
pub fn random_pairs<T, R>(mut items: Vec<T>, rng: &mut R) -> Vec<(T, T)>
where
    R: Rng + ?Sized,
{
    items.shuffle(rng);
    let mut pairs = Vec::with_capacity(items.len() / 2);
    let mut iter = items.into_iter();
    while let (Some(first), Some(second)) = (iter.next(), iter.next()) {
        pairs.push((first, second));
    }
    pairs
}

/// Keeps one chromosome of each random pair: the first if it scored strictly higher,
/// otherwise the second.
pub fn select_survivors<R>(table: Vec<(Chromosome, u64)>, rng: &mut R) -> Vec<(Chromosome, u64)>
where
    R: Rng + ?Sized,
{
    random_pairs(table, rng)
        .into_iter()
        .map(|(first, second)| if first.1 > second.1 { first } else { second })
        .collect()
}

/// Produces four children per random pair of parents.
pub fn reproduce<R>(
    parents: Vec<Chromosome>,
    jitter_noise: Normal<f64>,
    rng: &mut R,
) -> Vec<Chromosome>
where
    R: Rng + ?Sized,
{
    let pairs = random_pairs(parents, rng);
    let mut children = Vec::with_capacity(pairs.len() * 4);
    for (a, b) in pairs {
        children.push(crossover(&a, &b, rng));
        children.push(crossover(&a, &b, rng));
        children.push(jitter(&a, jitter_noise, rng));
        children.push(jitter(&b, jitter_noise, rng));
    }
    children
}
