//! Absolute tile positions from a maximum spanning tree over the translations.
//!
//! Tiles are nodes and every North/West translation between two existing
//! tiles is an edge weighted by its correlation. Starting from the tile with
//! the highest `tile_correlation` at (0, 0), the walk repeatedly takes the
//! heaviest edge leaving the placed set and places the tile at its other end
//! through the edge's translation (Prim's algorithm on a max-heap).
//!
//! Equal weights are taken in discovery order; NaN weights rank below every
//! number. Afterwards positions are shifted so that the smallest x and y are 0.


use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use serde::Serialize;

use crate::grid::{CorrelationTriple, Direction, GridPos, TileGrid};

/// Existing tiles the walk could not reach.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ConnectivityFailure {
    pub unreachable: Vec<GridPos>,
}

/// Result of one placement walk.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PlacementReport {
    /// Tile the walk started from; `None` when no tile exists.
    pub seed: Option<GridPos>,
    pub placed: usize,
    pub connectivity: Option<ConnectivityFailure>,
}

/// Edge weight ordered with NaN below everything.
#[derive(Debug, Clone, Copy)]
struct Weight(f64);

impl Weight {
    #[inline]
    fn key(self) -> f64 {
        if self.0.is_nan() {
            f64::NEG_INFINITY
        } else {
            self.0
        }
    }
}

impl PartialEq for Weight {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Weight {}

impl PartialOrd for Weight {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Weight {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().total_cmp(&other.key())
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Frontier {
    weight: Weight,
    /// Earlier discoveries win ties.
    order: Reverse<u64>,
    to: GridPos,
    /// Position `to` gets when this edge is taken.
    position: (i64, i64),
}

/// Places every tile reachable from the seed and reports the rest.
pub fn assemble_positions(grid: &mut TileGrid) -> PlacementReport {
    grid.clear_positions();

    let Some(seed) = pick_seed(grid) else {
        tracing::warn!("No existing tiles to place");
        return PlacementReport::default();
    };
    tracing::debug!(
        "Placement starts at {seed} (tile correlation {:.4})",
        grid.tile(seed).tile_correlation
    );

    let mut placed = vec![false; grid.len()];
    let mut heap = BinaryHeap::new();
    let mut discovered = 0u64;
    let mut count = 0usize;

    place(grid, seed, (0, 0), &mut placed, &mut count);
    push_edges(grid, seed, &placed, &mut heap, &mut discovered);

    while let Some(edge) = heap.pop() {
        if placed[grid.index(edge.to)] {
            continue;
        }
        place(grid, edge.to, edge.position, &mut placed, &mut count);
        push_edges(grid, edge.to, &placed, &mut heap, &mut discovered);
    }

    normalize(grid);

    let unreachable: Vec<GridPos> = grid
        .tiles()
        .iter()
        .filter(|t| t.exists && t.position.is_none())
        .map(|t| t.pos)
        .collect();
    let connectivity = if unreachable.is_empty() {
        None
    } else {
        tracing::warn!(
            "{} tiles are not connected to the mosaic: {:?}",
            unreachable.len(),
            unreachable
        );
        Some(ConnectivityFailure { unreachable })
    };

    tracing::info!("Placed {count} of {} tiles", grid.len());
    PlacementReport {
        seed: Some(seed),
        placed: count,
        connectivity,
    }
}

/// Existing tile with the highest correlation, first in row-major order on ties.
fn pick_seed(grid: &TileGrid) -> Option<GridPos> {
    let mut best: Option<(Weight, GridPos)> = None;
    for tile in grid.tiles().iter().filter(|t| t.exists) {
        let weight = Weight(tile.tile_correlation);
        if best.map_or(true, |(w, _)| weight > w) {
            best = Some((weight, tile.pos));
        }
    }
    best.map(|(_, pos)| pos)
}

fn place(
    grid: &mut TileGrid,
    pos: GridPos,
    position: (i64, i64),
    placed: &mut [bool],
    count: &mut usize,
) {
    placed[grid.index(pos)] = true;
    grid.tile_mut(pos).position = Some(position);
    *count += 1;
}

/// The four neighbors of `pos` with the offset from `pos` to each, when an
/// existing tile and a translation connect them.
fn neighbors(grid: &TileGrid, pos: GridPos) -> [Option<(GridPos, (i64, i64))>; 4] {
    let mut out = [None; 4];
    if !grid.tile(pos).exists {
        return out;
    }
    let offset = |t: &CorrelationTriple| (t.x as i64, t.y as i64);

    // Own edges: pos = neighbor + t, so neighbor - pos = -t.
    for (slot, dir) in Direction::ALL.into_iter().enumerate() {
        if let (Some(n), Some(t)) = (dir.neighbor(pos), grid.tile(pos).translation(dir)) {
            if grid.tile(n).exists {
                let (x, y) = offset(t);
                out[slot] = Some((n, (-x, -y)));
            }
        }
    }
    // Edges owned by the South and East tiles: other = pos + t.
    let south = GridPos::new(pos.row + 1, pos.col);
    let east = GridPos::new(pos.row, pos.col + 1);
    for (slot, (other, dir)) in [(south, Direction::North), (east, Direction::West)]
        .into_iter()
        .enumerate()
    {
        if !grid.contains(other) || !grid.tile(other).exists {
            continue;
        }
        if let Some(t) = grid.tile(other).translation(dir) {
            out[2 + slot] = Some((other, offset(t)));
        }
    }
    out
}

fn edge_weight(grid: &TileGrid, a: GridPos, b: GridPos) -> Weight {
    // The edge is stored on whichever tile is South/East of the other.
    let (owner, dir) = if a.row != b.row {
        (if a.row > b.row { a } else { b }, Direction::North)
    } else {
        (if a.col > b.col { a } else { b }, Direction::West)
    };
    Weight(
        grid.tile(owner)
            .translation(dir)
            .map_or(f64::NAN, |t| t.correlation),
    )
}

fn push_edges(
    grid: &TileGrid,
    pos: GridPos,
    placed: &[bool],
    heap: &mut BinaryHeap<Frontier>,
    discovered: &mut u64,
) {
    let Some((x, y)) = grid.tile(pos).position else {
        return;
    };
    for (to, (dx, dy)) in neighbors(grid, pos).into_iter().flatten() {
        if placed[grid.index(to)] {
            continue;
        }
        heap.push(Frontier {
            weight: edge_weight(grid, pos, to),
            order: Reverse(*discovered),
            to,
            position: (x + dx, y + dy),
        });
        *discovered += 1;
    }
}

/// Shifts placed tiles so the smallest coordinates are 0.
fn normalize(grid: &mut TileGrid) {
    let positions = grid.tiles().iter().filter_map(|t| t.position);
    let (Some(min_x), Some(min_y)) = (
        positions.clone().map(|p| p.0).min(),
        positions.map(|p| p.1).min(),
    ) else {
        return;
    };
    for tile in grid.tiles_mut() {
        if let Some((x, y)) = tile.position.as_mut() {
            *x -= min_x;
            *y -= min_y;
        }
    }
}
