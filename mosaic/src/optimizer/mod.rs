//! One translation optimization pass over a tile grid.
//!
//! # Stages
//!
//! 1. **Stage model** - overlap, repeatability and trusted translations per direction
//! 2. **Filter** - replace untrusted translations and fill gaps
//! 3. **Refinement** - bounded NCC search around every translation
//! 4. **Global positions** - maximum spanning tree walk
//!
//! Every stage is timed into the [`StatisticsSink`]. Cancellation is checked
//! between stages; data computed before it is kept.

#[cfg(test)]
mod tests;

use std::time::{Duration, Instant};

use common::CancelToken;
use serde::Serialize;

use crate::config::OptimizationConfig;
use crate::error::Result;
use crate::filter::{filter_translations, FilterReport};
use crate::grid::{Direction, PerDirection, TileGrid, TileReader};
use crate::outcome::Outcome;
use crate::position::{assemble_positions, PlacementReport};
use crate::progress::Progress;
use crate::refine::{RefineExecutor, RefineStats};
use crate::sinks::{DisplacementSink, Stage, StatisticsSink};
use crate::stage_model::StageModel;

/// Summary of a completed optimize pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationReport {
    /// Seed the pass ran with; reuse it to reproduce a sequential run.
    pub seed: u64,
    pub overlap: PerDirection<f64>,
    pub repeatability: PerDirection<u32>,
    /// Search radius used by the refinement.
    pub radius: u32,
    pub valid_tiles: PerDirection<usize>,
    pub filter: FilterReport,
    pub refine: RefineStats,
    pub placement: PlacementReport,
}

/// Runs optimize passes with a fixed configuration.
#[derive(Debug)]
pub struct Optimizer {
    config: OptimizationConfig,
    progress: Progress,
    cancel: CancelToken,
}

impl Optimizer {
    /// Fails with [`crate::Error::InvalidConfig`] when the configuration does
    /// not validate.
    pub fn new(
        config: OptimizationConfig,
        progress: Progress,
        cancel: &CancelToken,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            progress,
            cancel: cancel.child(),
        })
    }

    pub fn config(&self) -> &OptimizationConfig {
        &self.config
    }

    /// Stops the running pass at the next check. The caller's token is left alone.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Progress units a pass over `grid` reports: one per adjacent pair.
    pub fn progress_steps(grid: &TileGrid) -> usize {
        Direction::ALL
            .into_iter()
            .map(|dir| grid.positions_with_neighbor(dir).count())
            .sum()
    }

    /// Optimizes the translations of `grid` in place and assigns positions.
    ///
    /// The translations as they were on entry go to `displacements` first.
    pub fn optimize(
        &self,
        grid: &mut TileGrid,
        reader: &dyn TileReader,
        displacements: &mut dyn DisplacementSink,
        statistics: &mut dyn StatisticsSink,
    ) -> Result<Outcome<OptimizationReport>> {
        let start = Instant::now();
        let seed = self.config.resolve_seed();
        tracing::info!(
            "Optimizing translations of a {}x{} grid ({:?} execution, seed {seed})",
            grid.rows(),
            grid.cols(),
            self.config.execution
        );

        record_displacements(grid, displacements);
        let outcome = self.run_stages(grid, reader, seed, statistics);

        let elapsed = start.elapsed();
        statistics.record_timer(Stage::Total, elapsed);
        match &outcome {
            Ok(Outcome::Completed(_)) => {
                tracing::info!("Optimization finished in {:.1} ms", millis(elapsed))
            }
            Ok(Outcome::Cancelled) => {
                tracing::info!("Optimization cancelled after {:.1} ms", millis(elapsed))
            }
            Err(err) => tracing::error!("Optimization failed: {err}"),
        }
        outcome
    }

    fn run_stages(
        &self,
        grid: &mut TileGrid,
        reader: &dyn TileReader,
        seed: u64,
        statistics: &mut dyn StatisticsSink,
    ) -> Result<Outcome<OptimizationReport>> {
        let built = timed(statistics, Stage::StageModel, || {
            StageModel::build(grid, &self.config, seed, &self.cancel)
        })?;
        let Outcome::Completed(model) = built else {
            return Ok(Outcome::Cancelled);
        };
        for dir in Direction::ALL {
            statistics.set_overlap(dir, model.overlap(dir));
            statistics.set_repeatability(dir, model.repeatability_of(dir));
            statistics.set_valid_tiles(dir, model.valid_tiles(dir).len());
        }
        if self.cancel.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }

        let filter = timed(statistics, Stage::Filter, || filter_translations(grid, &model));
        if self.cancel.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }

        let radius = model.repeatability();
        tracing::debug!("Refinement radius {radius} px");
        let executor = RefineExecutor::from_config(
            &self.config,
            radius,
            seed,
            self.progress.clone(),
            &self.cancel,
        );
        let refined = timed(statistics, Stage::Refinement, || executor.execute(grid, reader))?;
        let Outcome::Completed(refine) = refined else {
            return Ok(Outcome::Cancelled);
        };

        let placement = timed(statistics, Stage::GlobalPositions, || assemble_positions(grid));

        Ok(Outcome::Completed(OptimizationReport {
            seed,
            overlap: PerDirection::from_fn(|dir| model.overlap(dir)),
            repeatability: PerDirection::from_fn(|dir| model.repeatability_of(dir)),
            radius,
            valid_tiles: PerDirection::from_fn(|dir| model.valid_tiles(dir).len()),
            filter,
            refine,
            placement,
        }))
    }
}

/// Dumps every translation present in `grid`, row-major, North before West.
pub fn record_displacements(grid: &TileGrid, sink: &mut dyn DisplacementSink) {
    for tile in grid.tiles() {
        for dir in Direction::ALL {
            if let Some(translation) = tile.translation(dir) {
                sink.record(tile.pos, dir, translation);
            }
        }
    }
}

fn timed<T>(statistics: &mut dyn StatisticsSink, stage: Stage, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let value = f();
    let elapsed = start.elapsed();
    tracing::debug!("{stage} took {:.1} ms", millis(elapsed));
    statistics.record_timer(stage, elapsed);
    value
}

#[inline]
fn millis(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}
