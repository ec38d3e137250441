// src/search/selector.rs

//! Parent selection for transformation sources.

use rand::Rng;
use rand::seq::SliceRandom;

use crate::errors::{EvoqueueError, Result};
use crate::search::candidate::Candidate;
use crate::store::CandidateStore;

/// Truncated selection: parents are drawn uniformly at random from the best
/// fraction of the evaluated population.
///
/// - When the truncated pool holds fewer than `k` distinct candidates, the
///   draw falls back to the full population.
/// - Only when the whole population holds fewer than `k` candidates are
///   repeats allowed.
/// - An empty population is an error; the scheduler must not request parents
///   before the first creation-source candidates have finished evaluating.
#[derive(Debug, Clone, Copy)]
pub struct Selector {
    truncation_fraction: f64,
}

impl Selector {
    /// `truncation_fraction` must lie in `(0, 1]`; the config layer validates
    /// this before the selector is constructed.
    pub fn new(truncation_fraction: f64) -> Self {
        Self {
            truncation_fraction,
        }
    }

    /// Select `k` parents from the store's evaluated population.
    pub fn select<S>(&self, store: &S, k: usize) -> Result<Vec<Candidate>>
    where
        S: CandidateStore + ?Sized,
    {
        let population = store.evaluated_population()?;
        if population.is_empty() {
            return Err(EvoqueueError::InsufficientPopulation);
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut rng = rand::thread_rng();
        let pool_len = self.pool_len(population.len());
        let pool = &population[..pool_len];

        if pool.len() >= k {
            return Ok(pool.choose_multiple(&mut rng, k).cloned().collect());
        }
        if population.len() >= k {
            return Ok(population.choose_multiple(&mut rng, k).cloned().collect());
        }

        // Entire population is smaller than k: sample with replacement.
        let picked = (0..k)
            .map(|_| population[rng.gen_range(0..population.len())].clone())
            .collect();
        Ok(picked)
    }

    /// Size of the truncated pool for a population of `population_len`,
    /// always at least one.
    fn pool_len(&self, population_len: usize) -> usize {
        let len = (population_len as f64 * self.truncation_fraction).ceil() as usize;
        len.clamp(1, population_len)
    }
}
