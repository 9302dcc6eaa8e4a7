//! Applies the stage model to the grid and repairs untrusted translations.
//!
//! Every translation outside the stage model's valid set is marked as an
//! estimate (NaN correlation) and replaced, in order of preference, by:
//!
//! 1. the median of the valid translations in its row (North) or column (West)
//! 2. the median of all valid translations of the direction
//! 3. the offset implied by the stage overlap alone
//!
//! Empty translation slots that have a neighbor are filled the same way, so
//! afterwards every adjacent pair carries an offset.


use serde::Serialize;

use crate::grid::{CorrelationTriple, Direction, PerDirection, TileGrid};
use crate::math::statistics::median_i32;
use crate::stage_model::StageModel;

/// What the filter did to one direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DirectionFilterStats {
    /// Translations kept as measured.
    pub valid: usize,
    /// Replaced by their row/column median.
    pub repaired: usize,
    /// Replaced by the direction-wide median because their line had no valid translation.
    pub from_global_median: usize,
    /// Replaced by the overlap estimate because the direction had no valid translation.
    pub from_overlap: usize,
    /// Of the replaced ones, slots that were empty before filtering.
    pub gap_filled: usize,
}

impl DirectionFilterStats {
    /// Translations whose offset is an estimate after filtering.
    pub fn estimated(&self) -> usize {
        self.repaired + self.from_global_median + self.from_overlap
    }
}

pub type FilterReport = PerDirection<DirectionFilterStats>;

/// Marks, repairs and gap-fills the translations of both directions.
pub fn filter_translations(grid: &mut TileGrid, model: &StageModel) -> FilterReport {
    let report = PerDirection::from_fn(|dir| filter_direction(grid, model, dir));
    for dir in Direction::ALL {
        let stats = report.get(dir);
        tracing::info!(
            "{dir}: {} valid, {} repaired from line medians, {} from the global median, \
             {} from the overlap estimate",
            stats.valid,
            stats.repaired,
            stats.from_global_median,
            stats.from_overlap
        );
    }
    report
}

/// Median offset of a set of translations, rounded to whole pixels.
fn median_offset(translations: &[CorrelationTriple]) -> Option<(i32, i32)> {
    let xs: Vec<i32> = translations.iter().map(|t| t.x).collect();
    let ys: Vec<i32> = translations.iter().map(|t| t.y).collect();
    Some((
        median_i32(&xs)?.round() as i32,
        median_i32(&ys)?.round() as i32,
    ))
}

/// Offset of a neighbor pair when only the overlap is known.
pub fn overlap_estimate(grid: &TileGrid, dir: Direction, overlap: f64) -> (i32, i32) {
    let shift = ((1.0 - overlap / 100.0) * grid.range(dir) as f64).round() as i32;
    match dir {
        Direction::North => (0, shift),
        Direction::West => (shift, 0),
    }
}

fn filter_direction(
    grid: &mut TileGrid,
    model: &StageModel,
    dir: Direction,
) -> DirectionFilterStats {
    let mut stats = DirectionFilterStats::default();

    let mut per_line: Vec<Vec<CorrelationTriple>> = vec![Vec::new(); grid.line_count(dir)];
    let mut all_valid = Vec::new();
    for (pos, t) in grid.translations(dir) {
        if model.is_valid(pos, dir) {
            per_line[grid.line_of(pos, dir)].push(*t);
            all_valid.push(*t);
        }
    }
    stats.valid = all_valid.len();

    let line_medians: Vec<Option<(i32, i32)>> =
        per_line.iter().map(|line| median_offset(line)).collect();
    let fallback = match median_offset(&all_valid) {
        Some(offset) => Fallback::GlobalMedian(offset),
        None => {
            tracing::warn!("{dir}: no valid translations, using the overlap estimate");
            Fallback::Overlap(overlap_estimate(grid, dir, model.overlap(dir)))
        }
    };

    let positions: Vec<_> = grid.positions_with_neighbor(dir).collect();
    for pos in positions {
        if model.is_valid(pos, dir) && grid.tile(pos).translation(dir).is_some() {
            continue;
        }
        let line = grid.line_of(pos, dir);
        let slot = grid.tile_mut(pos).translation_slot(dir);
        if slot.is_none() {
            stats.gap_filled += 1;
        }

        let (x, y) = match (line_medians[line], fallback) {
            (Some(offset), _) => {
                stats.repaired += 1;
                offset
            }
            (None, Fallback::GlobalMedian(offset)) => {
                stats.from_global_median += 1;
                offset
            }
            (None, Fallback::Overlap(offset)) => {
                stats.from_overlap += 1;
                offset
            }
        };
        *slot = Some(CorrelationTriple::estimate(x, y));
    }

    // Line 0 never has a neighbor in `dir`.
    let empty_lines = line_medians.iter().skip(1).filter(|m| m.is_none()).count();
    if empty_lines > 0 {
        tracing::debug!("{dir}: {empty_lines} lines without valid translations");
    }
    stats
}

#[derive(Debug, Clone, Copy)]
enum Fallback {
    GlobalMedian((i32, i32)),
    Overlap((i32, i32)),
}
