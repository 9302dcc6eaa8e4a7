//! Configuration for a translation optimization pass.
//!
//! All knobs the orchestrator supplies live in [`OptimizationConfig`]. It can
//! be built in code or loaded from a YAML/JSON file; missing fields take their
//! defaults.

use std::path::Path;

use common::FileFormat;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::grid::Direction;

/// Largest accepted `repeatability` override, in pixels.
pub const MAX_REPEATABILITY: u32 = 1 << 16;

/// Local search used to refine each translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum RefinementMethod {
    /// One hill climb from the current translation.
    HillClimb,
    /// Hill climbs from the current translation plus `start_points` random
    /// starts inside the search window; best result wins.
    MultiPointHillClimb { start_points: usize },
    /// Scores every offset in the search window.
    Exhaustive,
}

impl Default for RefinementMethod {
    fn default() -> Self {
        Self::MultiPointHillClimb { start_points: 16 }
    }
}

/// Whether MLE search and refinement run on worker threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Single threaded. Reproducible for a fixed seed.
    Sequential,
    #[default]
    Parallel,
}

/// Translation optimization configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
    /// Tolerance band, in percent of the tile dimension, around the estimated
    /// overlap when gating translations.
    pub percent_overlap_uncertainty: f64,
    /// Search radius in pixels. `None` uses the repeatability computed by the
    /// stage model.
    pub repeatability: Option<u32>,
    /// Vertical (North) overlap in percent. `None` estimates it.
    pub vertical_overlap: Option<f64>,
    /// Horizontal (West) overlap in percent. `None` estimates it.
    pub horizontal_overlap: Option<f64>,
    pub refinement: RefinementMethod,
    pub execution: ExecutionMode,
    /// Worker threads for parallel execution.
    pub num_threads: usize,
    /// Bound the number of tiles held in memory during parallel refinement.
    pub manage_pixel_memory: bool,
    /// Seed for MLE starts and refinement restarts. `None` draws from the OS.
    pub seed: Option<u64>,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            percent_overlap_uncertainty: 3.0,
            repeatability: None,
            vertical_overlap: None,
            horizontal_overlap: None,
            refinement: RefinementMethod::default(),
            execution: ExecutionMode::default(),
            num_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            manage_pixel_memory: true,
            seed: None,
        }
    }
}

impl OptimizationConfig {
    /// Sequential, seeded configuration for reproducible runs.
    pub fn deterministic(seed: u64) -> Self {
        Self {
            execution: ExecutionMode::Sequential,
            seed: Some(seed),
            ..Self::default()
        }
    }

    /// Configured seed, or a fresh one from the OS when unset.
    pub fn resolve_seed(&self) -> u64 {
        self.seed.unwrap_or_else(rand::random)
    }

    /// Overlap override for `dir`.
    pub fn overlap_override(&self, dir: Direction) -> Option<f64> {
        match dir {
            Direction::North => self.vertical_overlap,
            Direction::West => self.horizontal_overlap,
        }
    }

    /// Parse configuration text in the given format and validate it.
    pub fn from_str_with_format(text: &str, format: FileFormat) -> Result<Self> {
        let config: Self = common::deserialize(text, format)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a `.yaml`/`.yml`/`.json` file.
    pub fn load(path: &Path) -> Result<Self> {
        let format = FileFormat::from_file_name(&path.to_string_lossy())?;
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfig(format!("cannot read '{}': {e}", path.display()))
        })?;
        Self::from_str_with_format(&text, format)
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<()> {
        let pou = self.percent_overlap_uncertainty;
        if !(0.0..100.0).contains(&pou) {
            return Err(Error::InvalidConfig(format!(
                "percent_overlap_uncertainty must be in [0, 100), got {pou}"
            )));
        }
        for (name, overlap) in [
            ("vertical_overlap", self.vertical_overlap),
            ("horizontal_overlap", self.horizontal_overlap),
        ] {
            if let Some(v) = overlap {
                if !(0.0..=100.0).contains(&v) {
                    return Err(Error::InvalidConfig(format!(
                        "{name} must be in [0, 100], got {v}"
                    )));
                }
            }
        }
        if let Some(r) = self.repeatability {
            if r > MAX_REPEATABILITY {
                return Err(Error::InvalidConfig(format!(
                    "repeatability must be at most {MAX_REPEATABILITY} px, got {r}"
                )));
            }
        }
        if self.num_threads == 0 {
            return Err(Error::InvalidConfig(
                "num_threads must be at least 1".to_string(),
            ));
        }
        if let RefinementMethod::MultiPointHillClimb { start_points: 0 } = self.refinement {
            return Err(Error::InvalidConfig(
                "start_points must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
