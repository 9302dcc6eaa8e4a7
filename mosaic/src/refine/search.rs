//! Local searches for the NCC peak around a translation.

use std::collections::HashMap;
use std::ops::RangeInclusive;

use common::Buffer2;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::correlation::score_offset;
use crate::grid::CorrelationTriple;

const STEPS: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

/// Square search window `[x0 - r, x0 + r] x [y0 - r, y0 + r]`, clipped to
/// the `i32` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchWindow {
    pub x0: i32,
    pub y0: i32,
    pub radius: i32,
}

impl SearchWindow {
    pub fn new(x0: i32, y0: i32, radius: u32) -> Self {
        Self {
            x0,
            y0,
            radius: radius.min(i32::MAX as u32) as i32,
        }
    }

    #[inline]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        let r = self.radius as i64;
        (x as i64 - self.x0 as i64).abs() <= r && (y as i64 - self.y0 as i64).abs() <= r
    }

    #[inline]
    pub fn x_range(&self) -> RangeInclusive<i32> {
        self.x0.saturating_sub(self.radius)..=self.x0.saturating_add(self.radius)
    }

    #[inline]
    pub fn y_range(&self) -> RangeInclusive<i32> {
        self.y0.saturating_sub(self.radius)..=self.y0.saturating_add(self.radius)
    }

    fn random_point(&self, rng: &mut ChaCha8Rng) -> (i32, i32) {
        (rng.random_range(self.x_range()), rng.random_range(self.y_range()))
    }
}

/// NCC of one tile pair, memoized per offset.
pub struct PairScorer<'a> {
    neighbor: &'a Buffer2<f32>,
    tile: &'a Buffer2<f32>,
    memo: HashMap<(i32, i32), f64>,
}

impl<'a> PairScorer<'a> {
    pub fn new(neighbor: &'a Buffer2<f32>, tile: &'a Buffer2<f32>) -> Self {
        Self {
            neighbor,
            tile,
            memo: HashMap::new(),
        }
    }

    pub fn score(&mut self, x: i32, y: i32) -> f64 {
        let (neighbor, tile) = (self.neighbor, self.tile);
        *self
            .memo
            .entry((x, y))
            .or_insert_with(|| score_offset(neighbor, tile, x, y))
    }

    /// Distinct offsets scored so far.
    pub fn evaluations(&self) -> usize {
        self.memo.len()
    }
}

/// Climbs the 4-neighborhood from `start` while a move strictly improves the score.
pub fn hill_climb(
    scorer: &mut PairScorer<'_>,
    window: &SearchWindow,
    start: (i32, i32),
) -> CorrelationTriple {
    let (mut x, mut y) = start;
    let mut best = scorer.score(x, y);
    loop {
        let mut next = None;
        for (dx, dy) in STEPS {
            let (nx, ny) = (x.saturating_add(dx), y.saturating_add(dy));
            if !window.contains(nx, ny) {
                continue;
            }
            let score = scorer.score(nx, ny);
            if score > next.map_or(best, |(_, _, s)| s) {
                next = Some((nx, ny, score));
            }
        }
        match next {
            Some((nx, ny, score)) => {
                (x, y, best) = (nx, ny, score);
            }
            None => return CorrelationTriple::new(x, y, best),
        }
    }
}

/// Hill climbs from the window center plus `start_points` random starts.
///
/// Ties keep the earlier result, so the center climb wins over equal restarts.
pub fn multi_point_hill_climb(
    scorer: &mut PairScorer<'_>,
    window: &SearchWindow,
    start_points: usize,
    rng: &mut ChaCha8Rng,
) -> CorrelationTriple {
    let mut best = hill_climb(scorer, window, (window.x0, window.y0));
    for _ in 0..start_points {
        let candidate = hill_climb(scorer, window, window.random_point(rng));
        if candidate.correlation > best.correlation {
            best = candidate;
        }
    }
    best
}

/// Scores every offset in the window, row by row; the first maximum wins.
pub fn exhaustive(scorer: &mut PairScorer<'_>, window: &SearchWindow) -> CorrelationTriple {
    let mut best = CorrelationTriple::new(window.x0, window.y0, scorer.score(window.x0, window.y0));
    for y in window.y_range() {
        for x in window.x_range() {
            let score = scorer.score(x, y);
            if score > best.correlation {
                best = CorrelationTriple::new(x, y, score);
            }
        }
    }
    best
}
