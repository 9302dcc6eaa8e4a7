//! Stage model: per-direction overlap, repeatability and trusted translations.
//!
//! Built once per optimize pass from the raw pairwise translations:
//!
//! 1. Overlap per direction from the MLE over primary-axis values (or the override)
//! 2. Valid set: translations passing the overlap/correlation gate and IQR outlier removal
//! 3. Repeatability from the spread of the valid set (or the override)

pub mod gate;
pub mod mle;
mod repeatability;


pub use gate::{Gate, MIN_GATE_CORRELATION};
pub use mle::{MlePoint, MleSearch, MleStrategy};
pub use repeatability::{compute_repeatability, REPEATABILITY_WARN_PX};

use std::collections::BTreeSet;

use common::CancelToken;

use crate::config::{ExecutionMode, OptimizationConfig};
use crate::error::{Error, EstimationFailure, Result};
use crate::grid::{Direction, GridPos, PerDirection, TileGrid};
use crate::outcome::Outcome;

/// Immutable result of the stage model build.
#[derive(Debug, Clone, PartialEq)]
pub struct StageModel {
    overlap: PerDirection<f64>,
    repeatability: PerDirection<u32>,
    valid: PerDirection<BTreeSet<GridPos>>,
}

impl StageModel {
    /// Builds the model for both directions.
    ///
    /// Fails with [`Error::Estimation`] when a direction has nothing to
    /// estimate from and no override, or when its overlap ends up NaN.
    pub fn build(
        grid: &TileGrid,
        config: &OptimizationConfig,
        seed: u64,
        cancel: &CancelToken,
    ) -> Result<Outcome<StageModel>> {
        let mut overlap = PerDirection::<f64>::default();
        let mut repeatability = PerDirection::<u32>::default();
        let mut valid = PerDirection::<BTreeSet<GridPos>>::default();

        for dir in Direction::ALL {
            let dir_seed = seed.wrapping_add(dir as u64);
            let Outcome::Completed(percent) =
                estimate_overlap(grid, dir, config, dir_seed, cancel)?
            else {
                return Ok(Outcome::Cancelled);
            };
            if percent.is_nan() {
                return Err(Error::Estimation {
                    direction: dir,
                    reason: EstimationFailure::NanOverlap,
                });
            }
            tracing::info!("{dir} overlap: {percent:.2}%");

            let dir_valid = gate::valid_translations(
                grid,
                dir,
                percent,
                config.percent_overlap_uncertainty,
            );
            if dir_valid.is_empty() {
                tracing::warn!("No valid {dir} translations after filtering");
            }

            let dir_repeatability = match config.repeatability {
                Some(r) => r,
                None => {
                    let r = compute_repeatability(grid, dir, &dir_valid);
                    if r > REPEATABILITY_WARN_PX {
                        tracing::warn!(
                            "{dir} repeatability of {r} px exceeds {REPEATABILITY_WARN_PX} px; \
                             the stage may be imprecise or the translations noisy"
                        );
                    }
                    r
                }
            };
            tracing::info!(
                "{dir}: {} valid translations, repeatability {dir_repeatability} px",
                dir_valid.len()
            );

            *overlap.get_mut(dir) = percent;
            *repeatability.get_mut(dir) = dir_repeatability;
            *valid.get_mut(dir) = dir_valid;

            if cancel.is_cancelled() {
                return Ok(Outcome::Cancelled);
            }
        }

        Ok(Outcome::Completed(StageModel {
            overlap,
            repeatability,
            valid,
        }))
    }

    /// Model with fixed values, for callers that already know the stage.
    pub fn from_parts(
        overlap: PerDirection<f64>,
        repeatability: PerDirection<u32>,
        valid: PerDirection<BTreeSet<GridPos>>,
    ) -> Self {
        Self {
            overlap,
            repeatability,
            valid,
        }
    }

    /// Percent overlap along `dir`.
    #[inline]
    pub fn overlap(&self, dir: Direction) -> f64 {
        *self.overlap.get(dir)
    }

    #[inline]
    pub fn repeatability_of(&self, dir: Direction) -> u32 {
        *self.repeatability.get(dir)
    }

    /// Refinement radius: the larger repeatability of the two directions.
    #[inline]
    pub fn repeatability(&self) -> u32 {
        self.repeatability.north.max(self.repeatability.west)
    }

    pub fn valid_tiles(&self, dir: Direction) -> &BTreeSet<GridPos> {
        self.valid.get(dir)
    }

    #[inline]
    pub fn is_valid(&self, pos: GridPos, dir: Direction) -> bool {
        self.valid.get(dir).contains(&pos)
    }
}

/// Primary-axis values strictly inside `(0, range)`, in percent of the range.
///
/// Translations with NaN or negative correlation are left out.
pub fn mle_samples(grid: &TileGrid, dir: Direction) -> Vec<f64> {
    let range = grid.range(dir) as f64;
    let axis = dir.primary_axis();
    grid.translations(dir)
        .filter(|(_, t)| t.correlation >= 0.0)
        .map(|(_, t)| t.component(axis) as f64)
        .filter(|&v| v > 0.0 && v < range)
        .map(|v| 100.0 * v / range)
        .collect()
}

fn estimate_overlap(
    grid: &TileGrid,
    dir: Direction,
    config: &OptimizationConfig,
    seed: u64,
    cancel: &CancelToken,
) -> Result<Outcome<f64>> {
    if let Some(percent) = config.overlap_override(dir) {
        tracing::info!("{dir} overlap set by user: {percent}%");
        return Ok(Outcome::Completed(percent));
    }

    let samples = mle_samples(grid, dir);
    if samples.is_empty() {
        return Err(Error::Estimation {
            direction: dir,
            reason: EstimationFailure::NoTranslations,
        });
    }
    tracing::debug!("{dir}: estimating overlap from {} translations", samples.len());

    let strategy = match config.execution {
        ExecutionMode::Sequential => MleStrategy::Sequential,
        ExecutionMode::Parallel => MleStrategy::Parallel {
            workers: config.num_threads,
        },
    };
    let search = MleSearch::new(strategy, seed, cancel);
    Ok(search.execute(&samples)?.map(|point| point.overlap()))
}
