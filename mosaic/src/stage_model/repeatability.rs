use std::collections::{BTreeMap, BTreeSet};

use crate::grid::{Direction, GridPos, TileGrid};

/// Computed repeatability above this many pixels is logged as a warning.
pub const REPEATABILITY_WARN_PX: u32 = 10;

/// Search radius implied by the spread of the valid translations.
///
/// Larger of the half range over all valid translations and the largest
/// half range within one row (North) or column (West), rounded up. No valid
/// translations give 0.
pub fn compute_repeatability(
    grid: &TileGrid,
    dir: Direction,
    valid: &BTreeSet<GridPos>,
) -> u32 {
    let axis = dir.primary_axis();
    let mut global: Option<(i32, i32)> = None;
    let mut per_line: BTreeMap<usize, (i32, i32)> = BTreeMap::new();

    for &pos in valid {
        let Some(t) = grid.tile(pos).translation(dir) else {
            continue;
        };
        let v = t.component(axis);
        widen(&mut global, v);
        per_line
            .entry(grid.line_of(pos, dir))
            .and_modify(|(lo, hi)| {
                *lo = (*lo).min(v);
                *hi = (*hi).max(v);
            })
            .or_insert((v, v));
    }

    let half_range = |(lo, hi): (i32, i32)| (hi - lo).unsigned_abs().div_ceil(2);
    let global = global.map(half_range).unwrap_or(0);
    let line_max = per_line.into_values().map(half_range).max().unwrap_or(0);
    global.max(line_max)
}

fn widen(bounds: &mut Option<(i32, i32)>, v: i32) {
    *bounds = Some(match *bounds {
        Some((lo, hi)) => (lo.min(v), hi.max(v)),
        None => (v, v),
    });
}
