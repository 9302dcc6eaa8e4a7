//! Mosaic - translation optimization for microscopy tile-grid stitching.
//!
//! Given a grid of overlapping tiles and a candidate translation between each
//! pair of neighbors, an optimize pass:
//! - Estimates the stage overlap and repeatability per direction (MLE)
//! - Replaces untrusted translations and fills gaps from row/column medians
//! - Refines every translation with a bounded NCC peak search
//! - Assigns absolute positions with a maximum spanning tree walk
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use mosaic::prelude::*;
//!
//! let optimizer = Optimizer::new(OptimizationConfig::default(), Progress::none(), &cancel)?;
//! let mut displacements = DisplacementLog::default();
//! let mut statistics = RunStatistics::default();
//! let report = optimizer.optimize(&mut grid, &reader, &mut displacements, &mut statistics)?;
//! ```

pub mod config;
pub mod correlation;
mod error;
pub mod filter;
pub mod grid;
mod logging;
pub mod math;
mod optimizer;
mod outcome;
pub mod position;
pub mod prelude;
mod progress;
pub mod refine;
pub mod sinks;
pub mod stage_model;
pub(crate) mod worker;

#[cfg(test)]
pub mod testing;

#[cfg(feature = "bench")]
pub mod bench {
    pub use crate::correlation::bench as correlation;
    pub use crate::stage_model::mle::bench as mle;
}

// ============================================================================
// Orchestration
// ============================================================================

pub use common::CancelToken;
pub use config::{ExecutionMode, OptimizationConfig, RefinementMethod};
pub use error::{Error, EstimationFailure, Result};
pub use logging::LogSeverity;
pub use optimizer::{record_displacements, OptimizationReport, Optimizer};
pub use outcome::Outcome;
pub use progress::Progress;
pub use sinks::{
    DisplacementEntry, DisplacementLog, DisplacementSink, RunStatistics, Stage, StatisticsSink,
};

// ============================================================================
// Grid
// ============================================================================

pub use grid::{
    diagonal_order, CorrelationTriple, Direction, GridPos, InMemoryTiles, PerDirection, Tile,
    TileGrid, TileReader,
};

// ============================================================================
// Stages
// ============================================================================

pub use filter::{filter_translations, DirectionFilterStats, FilterReport};
pub use position::{assemble_positions, ConnectivityFailure, PlacementReport};
pub use refine::{PipelinedRefiner, RefineExecutor, RefineStats, SequentialRefiner};
pub use stage_model::{MlePoint, StageModel};
