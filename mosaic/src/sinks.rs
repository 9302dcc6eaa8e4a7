//! Output sinks owned by the orchestrator.
//!
//! The optimizer only calls record/set methods on them; formatting and
//! persistence are up to the implementation. [`DisplacementLog`] and
//! [`RunStatistics`] are in-memory implementations that serialize with serde.

use std::time::Duration;

use serde::Serialize;
use strum_macros::Display;

use crate::grid::{CorrelationTriple, Direction, GridPos, PerDirection};

/// Timed pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    StageModel,
    Filter,
    Refinement,
    GlobalPositions,
    Total,
}

/// Receives the relative displacements as they were before optimization.
pub trait DisplacementSink {
    fn record(&mut self, pos: GridPos, dir: Direction, translation: &CorrelationTriple);
}

/// Receives run statistics.
pub trait StatisticsSink {
    fn set_overlap(&mut self, dir: Direction, percent: f64);
    fn set_repeatability(&mut self, dir: Direction, pixels: u32);
    fn set_valid_tiles(&mut self, dir: Direction, count: usize);
    fn record_timer(&mut self, stage: Stage, elapsed: Duration);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplacementEntry {
    pub pos: GridPos,
    pub direction: Direction,
    pub translation: CorrelationTriple,
}

/// In-memory displacement dump.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DisplacementLog {
    pub entries: Vec<DisplacementEntry>,
}

impl DisplacementSink for DisplacementLog {
    fn record(&mut self, pos: GridPos, dir: Direction, translation: &CorrelationTriple) {
        self.entries.push(DisplacementEntry {
            pos,
            direction: dir,
            translation: *translation,
        });
    }
}

/// In-memory statistics record.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStatistics {
    pub overlap: PerDirection<Option<f64>>,
    pub repeatability: PerDirection<Option<u32>>,
    pub valid_tiles: PerDirection<usize>,
    /// Elapsed milliseconds per stage, in completion order.
    pub timers: Vec<(Stage, f64)>,
}

impl RunStatistics {
    pub fn timer(&self, stage: Stage) -> Option<f64> {
        self.timers
            .iter()
            .rev()
            .find(|(s, _)| *s == stage)
            .map(|&(_, ms)| ms)
    }
}

impl StatisticsSink for RunStatistics {
    fn set_overlap(&mut self, dir: Direction, percent: f64) {
        *self.overlap.get_mut(dir) = Some(percent);
    }

    fn set_repeatability(&mut self, dir: Direction, pixels: u32) {
        *self.repeatability.get_mut(dir) = Some(pixels);
    }

    fn set_valid_tiles(&mut self, dir: Direction, count: usize) {
        *self.valid_tiles.get_mut(dir) = count;
    }

    fn record_timer(&mut self, stage: Stage, elapsed: Duration) {
        self.timers.push((stage, elapsed.as_secs_f64() * 1000.0));
    }
}
