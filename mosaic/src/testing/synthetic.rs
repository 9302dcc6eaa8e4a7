//! Synthetic mosaics: a smooth random scene cut into overlapping tiles.

use common::Buffer2;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::grid::{CorrelationTriple, Direction, GridPos, InMemoryTiles, TileGrid};

fn lattice(ix: i64, iy: i64, seed: u64) -> f32 {
    let mut h = (ix as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (iy as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
        ^ seed.wrapping_mul(0x1656_67B1_9E37_79F9);
    h ^= h >> 33;
    h = h.wrapping_mul(0xFF51_AFD7_ED55_8CCD);
    h ^= h >> 33;
    (h >> 40) as f32 / (1u64 << 24) as f32
}

fn value_noise(x: i64, y: i64, spacing: i64, seed: u64) -> f32 {
    let ix = x.div_euclid(spacing);
    let iy = y.div_euclid(spacing);
    let smooth = |t: f32| t * t * (3.0 - 2.0 * t);
    let fx = smooth(x.rem_euclid(spacing) as f32 / spacing as f32);
    let fy = smooth(y.rem_euclid(spacing) as f32 / spacing as f32);

    let v00 = lattice(ix, iy, seed);
    let v10 = lattice(ix + 1, iy, seed);
    let v01 = lattice(ix, iy + 1, seed);
    let v11 = lattice(ix + 1, iy + 1, seed);
    let top = v00 + (v10 - v00) * fx;
    let bottom = v01 + (v11 - v01) * fx;
    top + (bottom - top) * fy
}

/// Deterministic smooth texture; NCC falls off over a few pixels of shift.
pub fn scene_value(x: i64, y: i64, seed: u64) -> f32 {
    1000.0 * value_noise(x, y, 9, seed) + 350.0 * value_noise(x, y, 4, seed ^ 0xABCD)
}

/// Grid of tiles with known ground-truth stage positions.
#[derive(Debug, Clone)]
pub struct SyntheticMosaic {
    pub rows: usize,
    pub cols: usize,
    pub tile_width: usize,
    pub tile_height: usize,
    positions: Vec<(i64, i64)>,
    seed: u64,
}

impl SyntheticMosaic {
    /// Regular stage grid with the given percent overlap on both axes.
    pub fn new(
        rows: usize,
        cols: usize,
        tile_width: usize,
        tile_height: usize,
        overlap_pct: f64,
    ) -> Self {
        let step_x = (tile_width as f64 * (1.0 - overlap_pct / 100.0)).round() as i64;
        let step_y = (tile_height as f64 * (1.0 - overlap_pct / 100.0)).round() as i64;
        let positions = (0..rows)
            .flat_map(|r| (0..cols).map(move |c| (c as i64 * step_x, r as i64 * step_y)))
            .collect();
        Self {
            rows,
            cols,
            tile_width,
            tile_height,
            positions,
            seed: 7,
        }
    }

    /// Perturbs every stage position by up to `max_jitter` pixels per axis.
    pub fn with_jitter(mut self, max_jitter: i64, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        for p in &mut self.positions {
            p.0 += rng.random_range(-max_jitter..=max_jitter);
            p.1 += rng.random_range(-max_jitter..=max_jitter);
        }
        self.seed = seed;
        self
    }

    pub fn position(&self, pos: GridPos) -> (i64, i64) {
        self.positions[pos.row * self.cols + pos.col]
    }

    /// Ground-truth "tile minus neighbor" offset.
    pub fn true_translation(&self, pos: GridPos, dir: Direction) -> Option<(i32, i32)> {
        let neighbor = dir.neighbor(pos)?;
        let (tx, ty) = self.position(pos);
        let (nx, ny) = self.position(neighbor);
        Some(((tx - nx) as i32, (ty - ny) as i32))
    }

    /// Grid whose every translation is the ground truth with `correlation`.
    pub fn grid(&self, correlation: f64) -> TileGrid {
        let mut grid = TileGrid::new(self.rows, self.cols, self.tile_width, self.tile_height);
        for row in 0..self.rows {
            for col in 0..self.cols {
                let pos = GridPos::new(row, col);
                for dir in Direction::ALL {
                    if let Some((x, y)) = self.true_translation(pos, dir) {
                        *grid.tile_mut(pos).translation_slot(dir) =
                            Some(CorrelationTriple::new(x, y, correlation));
                    }
                }
            }
        }
        grid
    }

    pub fn tile_pixels(&self, pos: GridPos) -> Buffer2<f32> {
        let (ox, oy) = self.position(pos);
        let seed = self.seed;
        Buffer2::from_fn(self.tile_width, self.tile_height, |x, y| {
            scene_value(ox + x as i64, oy + y as i64, seed)
        })
    }

    pub fn tiles(&self) -> InMemoryTiles {
        let mut tiles = InMemoryTiles::new();
        for row in 0..self.rows {
            for col in 0..self.cols {
                let pos = GridPos::new(row, col);
                tiles.insert(pos, self.tile_pixels(pos));
            }
        }
        tiles
    }
}
