//! Overlap/correlation gate and IQR outlier removal.

use std::collections::BTreeSet;

use crate::grid::{Axis, CorrelationTriple, Direction, GridPos, TileGrid};
use crate::math::statistics::Quartiles;

/// Translations below this correlation never count as valid.
pub const MIN_GATE_CORRELATION: f64 = 0.5;

/// Outlier removal only runs when more translations than this pass the gate.
const MIN_OUTLIER_SAMPLE: usize = 3;

/// Acceptance band for one direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gate {
    pub dir: Direction,
    /// Inclusive primary-axis band in pixels.
    pub primary: (f64, f64),
    /// Inclusive orthogonal-axis band in pixels.
    pub orthogonal: (f64, f64),
}

impl Gate {
    /// Band around `overlap` percent, widened by `uncertainty` percent.
    pub fn new(dir: Direction, range: usize, overlap: f64, uncertainty: f64) -> Self {
        let range = range as f64;
        Self {
            dir,
            primary: (
                range * (1.0 - (overlap + uncertainty) / 100.0),
                range * (1.0 - (overlap - uncertainty) / 100.0),
            ),
            orthogonal: (-uncertainty, uncertainty),
        }
    }

    pub fn for_grid(grid: &TileGrid, dir: Direction, overlap: f64, uncertainty: f64) -> Self {
        Self::new(dir, grid.range(dir), overlap, uncertainty)
    }

    /// NaN correlations fail.
    pub fn passes(&self, t: &CorrelationTriple) -> bool {
        let primary = t.component(self.dir.primary_axis()) as f64;
        let orthogonal = t.component(self.dir.orthogonal_axis()) as f64;
        t.correlation >= MIN_GATE_CORRELATION
            && (self.primary.0..=self.primary.1).contains(&primary)
            && (self.orthogonal.0..=self.orthogonal.1).contains(&orthogonal)
    }
}

/// Drops entries whose x or y falls outside the Tukey fences of its axis.
///
/// Fences are computed once per axis over the whole input; fewer than four
/// entries are returned unchanged.
pub fn remove_outliers(
    candidates: Vec<(GridPos, CorrelationTriple)>,
) -> Vec<(GridPos, CorrelationTriple)> {
    if candidates.len() <= MIN_OUTLIER_SAMPLE {
        return candidates;
    }
    let fences = |axis: Axis| {
        let values: Vec<f64> = candidates
            .iter()
            .map(|(_, t)| t.component(axis) as f64)
            .collect();
        Quartiles::of(&values).map(|q| q.fences())
    };
    let (Some(fx), Some(fy)) = (fences(Axis::X), fences(Axis::Y)) else {
        return candidates;
    };
    let inside = |v: i32, (lo, hi): (f64, f64)| (lo..=hi).contains(&(v as f64));

    candidates
        .into_iter()
        .filter(|(_, t)| inside(t.x, fx) && inside(t.y, fy))
        .collect()
}

/// Positions whose `dir` translation passes the gate and survives outlier removal.
pub fn valid_translations(
    grid: &TileGrid,
    dir: Direction,
    overlap: f64,
    uncertainty: f64,
) -> BTreeSet<GridPos> {
    let gate = Gate::for_grid(grid, dir, overlap, uncertainty);
    let candidates: Vec<_> = grid
        .translations(dir)
        .filter(|(_, t)| gate.passes(t))
        .map(|(pos, t)| (pos, *t))
        .collect();
    let gated = candidates.len();
    let survivors = remove_outliers(candidates);

    tracing::debug!(
        "{dir}: {gated} translations passed the gate, {} after outlier removal",
        survivors.len()
    );
    survivors.into_iter().map(|(pos, _)| pos).collect()
}
