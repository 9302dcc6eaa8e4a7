//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use mosaic::prelude::*;
//! ```

// Orchestration
pub use crate::{
    CancelToken, Error, ExecutionMode, OptimizationConfig, OptimizationReport, Optimizer, Outcome,
    Progress, RefinementMethod, Result,
};

// Grid model
pub use crate::{CorrelationTriple, Direction, GridPos, InMemoryTiles, TileGrid, TileReader};

// Sinks
pub use crate::{DisplacementLog, DisplacementSink, RunStatistics, Stage, StatisticsSink};
