//! Translation refinement: bounded NCC peak search around every translation.
//!
//! Each adjacent pair `(tile, neighbor)` with a translation is searched inside
//! `[x0 - r, x0 + r] x [y0 - r, y0 + r]`, `r` being the stage model's
//! repeatability. Pairs touching a tile that is missing on disk get
//! correlation `-1` and no search. A refined translation whose previous
//! correlation was a measurement (not NaN) gets [`TRUST_BOOST`] added, so the
//! position assembler prefers edges that were already trusted.
//!
//! Two executors share the per-pair logic: [`SequentialRefiner`] walks the
//! grid row by row on the calling thread, [`PipelinedRefiner`] runs a
//! producer/bookkeeper/worker pipeline with bounded pixel memory.

mod pipeline;
pub mod search;
mod semaphore;


pub use pipeline::PipelinedRefiner;
pub use search::SearchWindow;

use std::sync::Arc;

use common::{Buffer2, CancelToken};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use crate::config::{ExecutionMode, OptimizationConfig, RefinementMethod};
use crate::error::Result;
use crate::grid::{CorrelationTriple, Direction, GridPos, TileGrid, TileReader};
use crate::outcome::Outcome;
use crate::progress::Progress;
use search::PairScorer;

/// Added to a refined correlation when the translation was trusted before.
pub const TRUST_BOOST: f64 = 3.0;

/// Correlation of pairs that touch a tile missing on disk.
pub const MISSING_TILE_CORRELATION: f64 = -1.0;

/// Counts of one refinement run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefineStats {
    /// Pairs searched.
    pub refined: usize,
    /// Pairs skipped because a tile is missing.
    pub missing: usize,
}

/// Search settings shared by all pairs of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefineParams {
    pub method: RefinementMethod,
    pub radius: u32,
    pub seed: u64,
}

/// One translation to refine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PairTask {
    pub pos: GridPos,
    pub dir: Direction,
    pub neighbor: GridPos,
    pub initial: CorrelationTriple,
    pub seed: u64,
}

/// Seed of the random restarts for one pair; independent of scheduling.
#[inline]
pub fn pair_seed(seed: u64, index: usize, dir: Direction) -> u64 {
    let key = ((index as u64) << 1) | dir as u64;
    seed ^ key.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Searches around `initial` and returns the refined, possibly boosted, translation.
pub fn refine_pair(
    neighbor: &Buffer2<f32>,
    tile: &Buffer2<f32>,
    initial: &CorrelationTriple,
    radius: u32,
    method: RefinementMethod,
    seed: u64,
) -> CorrelationTriple {
    // Offsets farther than a tile side from the start cannot reach a better overlap.
    let side = u32::try_from(tile.width().max(tile.height())).unwrap_or(u32::MAX);
    let window = SearchWindow::new(initial.x, initial.y, radius.min(side));
    let mut scorer = PairScorer::new(neighbor, tile);
    let best = match method {
        RefinementMethod::HillClimb => {
            search::hill_climb(&mut scorer, &window, (initial.x, initial.y))
        }
        RefinementMethod::MultiPointHillClimb { start_points } => {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            search::multi_point_hill_climb(&mut scorer, &window, start_points, &mut rng)
        }
        RefinementMethod::Exhaustive => search::exhaustive(&mut scorer, &window),
    };
    tracing::trace!(
        "refined ({}, {}) -> ({}, {}) with {} evaluations",
        initial.x,
        initial.y,
        best.x,
        best.y,
        scorer.evaluations()
    );

    let boost = if initial.is_estimate() { 0.0 } else { TRUST_BOOST };
    CorrelationTriple::new(best.x, best.y, best.correlation + boost)
}

/// Splits the grid's translations into searchable tasks and pairs that
/// touch a missing tile. Slots without a translation are skipped.
pub(crate) fn plan(grid: &TileGrid, seed: u64) -> (Vec<PairTask>, Vec<(GridPos, Direction)>) {
    let mut tasks = Vec::new();
    let mut missing = Vec::new();
    for tile in grid.tiles() {
        for dir in Direction::ALL {
            let (Some(neighbor), Some(initial)) = (dir.neighbor(tile.pos), tile.translation(dir))
            else {
                continue;
            };
            if grid.pair_touches_missing(tile.pos, dir) {
                missing.push((tile.pos, dir));
            } else {
                tasks.push(PairTask {
                    pos: tile.pos,
                    dir,
                    neighbor,
                    initial: *initial,
                    seed: pair_seed(seed, grid.index(tile.pos), dir),
                });
            }
        }
    }
    (tasks, missing)
}

/// Stores a refined translation and raises the tile's correlation.
pub(crate) fn apply(
    grid: &mut TileGrid,
    pos: GridPos,
    dir: Direction,
    translation: CorrelationTriple,
) {
    let tile = grid.tile_mut(pos);
    *tile.translation_slot(dir) = Some(translation);
    tile.update_tile_correlation(translation.correlation);
}

/// Marks pairs touching missing tiles. Offsets are kept.
pub(crate) fn mark_missing(grid: &mut TileGrid, missing: &[(GridPos, Direction)]) {
    for &(pos, dir) in missing {
        if let Some(t) = grid.tile(pos).translation(dir).copied() {
            let marked = CorrelationTriple::new(t.x, t.y, MISSING_TILE_CORRELATION);
            apply(grid, pos, dir, marked);
        }
    }
}

/// Refines on the calling thread, row by row, keeping two rows of pixels.
#[derive(Debug)]
pub struct SequentialRefiner {
    params: RefineParams,
    progress: Progress,
    cancel: CancelToken,
}

impl SequentialRefiner {
    pub fn new(params: RefineParams, progress: Progress, cancel: &CancelToken) -> Self {
        Self {
            params,
            progress,
            cancel: cancel.child(),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn execute(
        &self,
        grid: &mut TileGrid,
        reader: &dyn TileReader,
    ) -> Result<Outcome<RefineStats>> {
        let (tasks, missing) = plan(grid, self.params.seed);
        mark_missing(grid, &missing);
        self.progress.advance(missing.len());
        let mut stats = RefineStats {
            refined: 0,
            missing: missing.len(),
        };

        // Tasks are in row-major order of their tile.
        let mut previous_row: Vec<Option<Arc<Buffer2<f32>>>> = vec![None; grid.cols()];
        let mut current_row: Vec<Option<Arc<Buffer2<f32>>>> = vec![None; grid.cols()];
        let mut loaded_row = None;

        for task in tasks {
            if self.cancel.is_cancelled() {
                return Ok(Outcome::Cancelled);
            }
            if loaded_row != Some(task.pos.row) {
                if loaded_row.is_some_and(|r| r + 1 == task.pos.row) {
                    std::mem::swap(&mut previous_row, &mut current_row);
                } else {
                    previous_row.fill(None);
                }
                current_row.fill(None);
                loaded_row = Some(task.pos.row);
            }

            let tile = load(&mut current_row, task.pos.col, task.pos, reader)?;
            let neighbor = match task.dir {
                Direction::West => {
                    load(&mut current_row, task.neighbor.col, task.neighbor, reader)?
                }
                Direction::North => {
                    load(&mut previous_row, task.neighbor.col, task.neighbor, reader)?
                }
            };

            let refined = refine_pair(
                &neighbor,
                &tile,
                &task.initial,
                self.params.radius,
                self.params.method,
                task.seed,
            );
            apply(grid, task.pos, task.dir, refined);
            stats.refined += 1;
            self.progress.advance(1);
        }

        Ok(Outcome::Completed(stats))
    }
}

fn load(
    row: &mut [Option<Arc<Buffer2<f32>>>],
    col: usize,
    pos: GridPos,
    reader: &dyn TileReader,
) -> Result<Arc<Buffer2<f32>>> {
    if let Some(pixels) = &row[col] {
        return Ok(pixels.clone());
    }
    let pixels = reader.read(pos)?;
    row[col] = Some(pixels.clone());
    Ok(pixels)
}

/// Refinement strategy selected by configuration.
#[derive(Debug)]
pub enum RefineExecutor {
    Sequential(SequentialRefiner),
    Pipelined(PipelinedRefiner),
}

impl RefineExecutor {
    pub fn from_config(
        config: &OptimizationConfig,
        radius: u32,
        seed: u64,
        progress: Progress,
        cancel: &CancelToken,
    ) -> Self {
        let params = RefineParams {
            method: config.refinement,
            radius,
            seed,
        };
        match config.execution {
            ExecutionMode::Sequential => {
                RefineExecutor::Sequential(SequentialRefiner::new(params, progress, cancel))
            }
            ExecutionMode::Parallel => RefineExecutor::Pipelined(PipelinedRefiner::new(
                params,
                config.num_threads,
                config.manage_pixel_memory,
                progress,
                cancel,
            )),
        }
    }

    pub fn execute(
        &self,
        grid: &mut TileGrid,
        reader: &dyn TileReader,
    ) -> Result<Outcome<RefineStats>> {
        match self {
            RefineExecutor::Sequential(r) => r.execute(grid, reader),
            RefineExecutor::Pipelined(r) => r.execute(grid, reader),
        }
    }

    pub fn cancel(&self) {
        match self {
            RefineExecutor::Sequential(r) => r.cancel(),
            RefineExecutor::Pipelined(r) => r.cancel(),
        }
    }
}
