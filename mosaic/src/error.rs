//! Error types for translation optimization.

use thiserror::Error;

use crate::grid::{Direction, GridPos};

/// Errors that stop an optimize pass.
///
/// Local, recoverable conditions (missing tiles, unreachable tiles, large
/// repeatability) are not errors; they are logged and reported in
/// [`crate::OptimizationReport`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("Overlap estimation failed for {direction} translations: {reason}")]
    Estimation {
        direction: Direction,
        reason: EstimationFailure,
    },

    #[error("Worker '{worker}' failed: {message}")]
    WorkerFault { worker: String, message: String },

    #[error("Failed to read tile {pos}: {message}")]
    TileRead { pos: GridPos, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Grid mismatch: {0}")]
    GridMismatch(String),
}

/// Why the overlap of one direction could not be estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EstimationFailure {
    #[error("no translations inside the tile range")]
    NoTranslations,
    #[error("overlap is NaN after applying overrides")]
    NanOverlap,
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<common::SerdeFormatError> for Error {
    fn from(err: common::SerdeFormatError) -> Self {
        Error::InvalidConfig(err.to_string())
    }
}
