//! Normalized cross-correlation (NCC) scoring of tile pairs.
//!
//! The refiner scores candidate translations by correlating the part of a
//! tile that overlaps its neighbor. A translation `(x, y)` places the tile at
//! `(x, y)` in the neighbor's frame, so the overlap window in neighbor
//! coordinates is `[max(0, x), min(w, x + w)) x [max(0, y), min(h, y + h))`.


#[cfg(feature = "bench")]
pub mod bench;

use common::Buffer2;

/// Score returned for degenerate input: size mismatch, empty overlap, zero variance.
pub const DEGENERATE_SCORE: f64 = -1.0;

const VARIANCE_EPSILON: f64 = 1e-12;

/// NCC of two equally sized pixel windows.
///
/// Returns a value in `[-1, 1]`, or [`DEGENERATE_SCORE`] when the windows
/// differ in length, are empty, or either has zero variance.
pub fn ncc(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return DEGENERATE_SCORE;
    }

    let mut sums = Sums::default();
    for (&va, &vb) in a.iter().zip(b) {
        sums.add(va as f64, vb as f64);
    }
    sums.finish()
}

/// NCC between `neighbor` and `tile` when the tile sits at `(x, y)` relative to the neighbor.
///
/// Both tiles must have the same dimensions.
pub fn score_offset(neighbor: &Buffer2<f32>, tile: &Buffer2<f32>, x: i32, y: i32) -> f64 {
    if neighbor.width() != tile.width() || neighbor.height() != tile.height() {
        return DEGENERATE_SCORE;
    }
    let Some(window) = OverlapWindow::new(neighbor.width(), neighbor.height(), x, y) else {
        return DEGENERATE_SCORE;
    };

    let mut sums = Sums::default();
    for ny in window.y0..window.y1 {
        let ty = (ny as i64 - y as i64) as usize;
        let tx0 = (window.x0 as i64 - x as i64) as usize;
        let tx1 = tx0 + (window.x1 - window.x0);
        let a = neighbor.row_span(ny, window.x0, window.x1);
        let b = tile.row_span(ty, tx0, tx1);
        for (&va, &vb) in a.iter().zip(b) {
            sums.add(va as f64, vb as f64);
        }
    }
    sums.finish()
}

/// Overlap of the neighbor rectangle with the tile rectangle, in neighbor coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlapWindow {
    pub x0: usize,
    pub y0: usize,
    pub x1: usize,
    pub y1: usize,
}

impl OverlapWindow {
    /// `None` when the shifted tile does not overlap the neighbor.
    pub fn new(width: usize, height: usize, x: i32, y: i32) -> Option<Self> {
        let (w, h) = (width as i64, height as i64);
        let (x, y) = (x as i64, y as i64);
        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = (x + w).min(w);
        let y1 = (y + h).min(h);
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        Some(Self {
            x0: x0 as usize,
            y0: y0 as usize,
            x1: x1 as usize,
            y1: y1 as usize,
        })
    }

    #[inline]
    pub fn area(&self) -> usize {
        (self.x1 - self.x0) * (self.y1 - self.y0)
    }
}

#[derive(Debug, Default)]
struct Sums {
    n: f64,
    a: f64,
    b: f64,
    aa: f64,
    bb: f64,
    ab: f64,
}

impl Sums {
    #[inline]
    fn add(&mut self, a: f64, b: f64) {
        self.n += 1.0;
        self.a += a;
        self.b += b;
        self.aa += a * a;
        self.bb += b * b;
        self.ab += a * b;
    }

    fn finish(&self) -> f64 {
        if self.n == 0.0 {
            return DEGENERATE_SCORE;
        }
        let cov = self.ab - self.a * self.b / self.n;
        let var_a = self.aa - self.a * self.a / self.n;
        let var_b = self.bb - self.b * self.b / self.n;
        // Variances below the rounding noise of the sums count as zero.
        if var_a <= self.aa * VARIANCE_EPSILON || var_b <= self.bb * VARIANCE_EPSILON {
            return DEGENERATE_SCORE;
        }
        let score = cov / (var_a * var_b).sqrt();
        if !score.is_finite() {
            return DEGENERATE_SCORE;
        }
        // Rounding can push perfectly correlated windows a hair past 1.
        score.clamp(-1.0, 1.0)
    }
}
