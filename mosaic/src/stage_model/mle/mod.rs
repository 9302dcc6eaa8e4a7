//! Maximum-likelihood estimate of the stage overlap.
//!
//! Primary-axis translations, normalized to percent of the tile range, are
//! modelled as a mixture: with probability `pi/100` a sample is uniform over
//! `[0, 100]`, otherwise it is drawn from `Normal(mu, sigma)`. The parameters
//! are integer percents in `0..=99` and the likelihood surface is searched by
//! discrete hill climbs from random starts:
//!
//! 1. Draw a random `(pi, mu, sigma)` start
//! 2. Move to the best strictly improving of the 6 axis neighbors until none improves
//! 3. Offer the local optimum to the shared [`BestPoint`]
//! 4. Stop after [`STABLE_ITERATIONS`] consecutive starts that did not improve it
//!
//! Likelihoods are memoized in a [`LikelihoodCache`] shared by all starts and
//! workers. The overlap estimate is `100 - mu` of the best point.

#[cfg(test)]
mod tests;

#[cfg(feature = "bench")]
pub mod bench;

use std::f64::consts::PI;

use common::CancelToken;
use parking_lot::{Mutex, RwLock};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::error::Result;
use crate::outcome::Outcome;
use crate::worker::{join_guarded, spawn_guarded};

/// Number of integer values each parameter can take (`0..=99`).
pub const PARAM_DOMAIN: usize = 100;

/// Consecutive non-improving starts after which the search stops.
pub const STABLE_ITERATIONS: usize = 20;

/// Density of the uniform component over the normalized `[0, 100]` range.
const UNIFORM_DENSITY: f64 = 1.0 / 100.0;

const NEIGHBOR_STEPS: [(i8, i8, i8); 6] = [
    (1, 0, 0),
    (-1, 0, 0),
    (0, 1, 0),
    (0, -1, 0),
    (0, 0, 1),
    (0, 0, -1),
];

/// A point of the `(pi, mu, sigma)` parameter lattice with its log-likelihood.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MlePoint {
    /// Percent probability that a sample is uniform noise.
    pub pi_uniform: u8,
    /// Mean of the normal component, percent of the tile range.
    pub mu: u8,
    pub sigma: u8,
    pub likelihood: f64,
}

impl MlePoint {
    /// Point that any evaluated point beats.
    pub const WORST: MlePoint = MlePoint {
        pi_uniform: 0,
        mu: 0,
        sigma: 0,
        likelihood: f64::NEG_INFINITY,
    };

    /// Estimated overlap in percent.
    #[inline]
    pub fn overlap(&self) -> f64 {
        100.0 - self.mu as f64
    }

    #[inline]
    fn key(&self) -> (u8, u8, u8) {
        (self.pi_uniform, self.mu, self.sigma)
    }
}

/// Log-likelihood of `samples` (percent values) under the mixture model.
///
/// `sigma == 0` and non-finite sums yield negative infinity.
pub fn log_likelihood(samples: &[f64], pi_uniform: u8, mu: u8, sigma: u8) -> f64 {
    if sigma == 0 {
        return f64::NEG_INFINITY;
    }
    let p = pi_uniform as f64 / 100.0;
    let uniform = p * UNIFORM_DENSITY;
    let mu = mu as f64;
    let sigma = sigma as f64;
    let norm = (1.0 - p) / (sigma * (2.0 * PI).sqrt());
    let inv_two_var = 1.0 / (2.0 * sigma * sigma);

    let sum: f64 = samples
        .iter()
        .map(|&t| {
            let d = t - mu;
            (uniform + norm * (-d * d * inv_two_var).exp()).ln()
        })
        .sum();

    if sum.is_nan() || sum == f64::INFINITY {
        f64::NEG_INFINITY
    } else {
        sum
    }
}

/// Concurrent memo of likelihoods keyed by `(pi, mu, sigma)`.
///
/// One lock per `pi` value; a shard's table is allocated on first insert.
/// NaN marks a miss, so lookups outside the domain simply miss.
pub struct LikelihoodCache {
    shards: Vec<RwLock<Vec<f64>>>,
}

impl LikelihoodCache {
    const SHARD_LEN: usize = PARAM_DOMAIN * PARAM_DOMAIN;

    pub fn new() -> Self {
        Self {
            shards: (0..PARAM_DOMAIN).map(|_| RwLock::new(Vec::new())).collect(),
        }
    }

    #[inline]
    fn slot(mu: u8, sigma: u8) -> Option<usize> {
        let (mu, sigma) = (mu as usize, sigma as usize);
        (mu < PARAM_DOMAIN && sigma < PARAM_DOMAIN).then_some(mu * PARAM_DOMAIN + sigma)
    }

    pub fn get(&self, pi_uniform: u8, mu: u8, sigma: u8) -> f64 {
        let (Some(shard), Some(slot)) = (
            self.shards.get(pi_uniform as usize),
            Self::slot(mu, sigma),
        ) else {
            return f64::NAN;
        };
        shard.read().get(slot).copied().unwrap_or(f64::NAN)
    }

    /// Stores `likelihood`. Out-of-domain keys are ignored.
    pub fn insert(&self, pi_uniform: u8, mu: u8, sigma: u8, likelihood: f64) {
        let (Some(shard), Some(slot)) = (
            self.shards.get(pi_uniform as usize),
            Self::slot(mu, sigma),
        ) else {
            return;
        };
        let mut table = shard.write();
        if table.is_empty() {
            table.resize(Self::SHARD_LEN, f64::NAN);
        }
        table[slot] = likelihood;
    }

    /// Cached likelihood, computed and stored on a miss.
    pub fn evaluate(&self, samples: &[f64], pi_uniform: u8, mu: u8, sigma: u8) -> MlePoint {
        let mut likelihood = self.get(pi_uniform, mu, sigma);
        if likelihood.is_nan() {
            likelihood = log_likelihood(samples, pi_uniform, mu, sigma);
            self.insert(pi_uniform, mu, sigma, likelihood);
        }
        MlePoint {
            pi_uniform,
            mu,
            sigma,
            likelihood,
        }
    }
}

impl Default for LikelihoodCache {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct BestState {
    point: MlePoint,
    stable_iterations: usize,
}

/// Best point found so far, shared by all MLE workers.
#[derive(Debug)]
pub struct BestPoint {
    state: Mutex<BestState>,
}

impl BestPoint {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BestState {
                point: MlePoint::WORST,
                stable_iterations: 0,
            }),
        }
    }

    /// Replaces the best point if `candidate` is strictly more likely and
    /// resets the stable counter; otherwise counts one more stable iteration.
    pub fn set_if_better(&self, candidate: MlePoint) -> bool {
        let mut state = self.state.lock();
        if candidate.likelihood > state.point.likelihood {
            state.point = candidate;
            state.stable_iterations = 0;
            true
        } else {
            state.stable_iterations += 1;
            false
        }
    }

    pub fn point(&self) -> MlePoint {
        self.state.lock().point
    }

    pub fn stable_iterations(&self) -> usize {
        self.state.lock().stable_iterations
    }

    #[inline]
    pub fn is_settled(&self) -> bool {
        self.stable_iterations() >= STABLE_ITERATIONS
    }
}

impl Default for BestPoint {
    fn default() -> Self {
        Self::new()
    }
}

/// Climbs from `start` to a local maximum of the likelihood lattice.
pub fn hill_climb(samples: &[f64], cache: &LikelihoodCache, start: (u8, u8, u8)) -> MlePoint {
    let mut current = cache.evaluate(samples, start.0, start.1, start.2);
    loop {
        let mut best = current;
        for (dp, dm, ds) in NEIGHBOR_STEPS {
            let (Some(p), Some(m), Some(s)) = (
                step(current.pi_uniform, dp),
                step(current.mu, dm),
                step(current.sigma, ds),
            ) else {
                continue;
            };
            let candidate = cache.evaluate(samples, p, m, s);
            if candidate.likelihood > best.likelihood {
                best = candidate;
            }
        }
        if best.key() == current.key() {
            return current;
        }
        current = best;
    }
}

#[inline]
fn step(value: u8, delta: i8) -> Option<u8> {
    let next = value.checked_add_signed(delta)?;
    ((next as usize) < PARAM_DOMAIN).then_some(next)
}

fn random_start(rng: &mut ChaCha8Rng) -> (u8, u8, u8) {
    let domain = PARAM_DOMAIN as u8;
    (
        rng.random_range(0..domain),
        rng.random_range(0..domain),
        rng.random_range(0..domain),
    )
}

/// Draws starts and climbs until the shared best point settles or `stop` fires.
fn search_loop(
    samples: &[f64],
    cache: &LikelihoodCache,
    best: &BestPoint,
    rng: &mut ChaCha8Rng,
    stop: &CancelToken,
) -> usize {
    let mut starts = 0;
    while !stop.is_cancelled() && !best.is_settled() {
        let local = hill_climb(samples, cache, random_start(rng));
        best.set_if_better(local);
        starts += 1;
    }
    starts
}

/// Execution strategy of the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MleStrategy {
    Sequential,
    /// Fixed pool of workers sharing the cache and the best point.
    Parallel { workers: usize },
}

/// Cancellable MLE search over a fixed sample.
#[derive(Debug)]
pub struct MleSearch {
    strategy: MleStrategy,
    seed: u64,
    cancel: CancelToken,
}

impl MleSearch {
    /// The search stops when `cancel` or [`MleSearch::cancel`] fires.
    pub fn new(strategy: MleStrategy, seed: u64, cancel: &CancelToken) -> Self {
        Self {
            strategy,
            seed,
            cancel: cancel.child(),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Runs the search over `samples` (percent values).
    pub fn execute(&self, samples: &[f64]) -> Result<Outcome<MlePoint>> {
        debug_assert!(!samples.is_empty());
        let cache = LikelihoodCache::new();
        let best = BestPoint::new();

        let starts = match self.strategy {
            MleStrategy::Sequential => {
                let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
                search_loop(samples, &cache, &best, &mut rng, &self.cancel)
            }
            MleStrategy::Parallel { workers } => {
                self.execute_parallel(samples, &cache, &best, workers.max(1))?
            }
        };

        if self.cancel.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }
        let point = best.point();
        tracing::trace!(
            starts,
            pi = point.pi_uniform,
            mu = point.mu,
            sigma = point.sigma,
            likelihood = point.likelihood,
            "MLE search finished"
        );
        Ok(Outcome::Completed(point))
    }

    fn execute_parallel(
        &self,
        samples: &[f64],
        cache: &LikelihoodCache,
        best: &BestPoint,
        workers: usize,
    ) -> Result<usize> {
        std::thread::scope(|s| {
            let handles: Vec<_> = (0..workers)
                .map(|i| {
                    let name = format!("mle-worker-{i}");
                    let seed = self.seed.wrapping_add(i as u64);
                    let stop = &self.cancel;
                    let handle = spawn_guarded(s, name.clone(), stop, move || {
                        let mut rng = ChaCha8Rng::seed_from_u64(seed);
                        Ok(search_loop(samples, cache, best, &mut rng, stop))
                    });
                    (name, handle)
                })
                .collect();

            let mut starts = 0;
            let mut fault = None;
            for (name, handle) in handles {
                match join_guarded(&name, handle) {
                    Ok(n) => starts += n,
                    Err(err) => {
                        fault.get_or_insert(err);
                    }
                }
            }
            match fault {
                Some(err) => Err(err),
                None => Ok(starts),
            }
        })
    }
}
