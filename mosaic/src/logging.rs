//! Log severities used by stitching front ends, mapped onto `tracing` levels.

use serde::{Deserialize, Serialize};
use strum_macros::Display;
use tracing::Level;

/// User-facing verbosity. Ordered from least to most chatty.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Display, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    /// Messages that are always shown; warnings of this class use `warn!`.
    Mandatory,
    #[default]
    Info,
    Verbose,
    Helpful,
}

impl LogSeverity {
    pub fn level(self) -> Level {
        match self {
            LogSeverity::Mandatory | LogSeverity::Info => Level::INFO,
            LogSeverity::Verbose => Level::DEBUG,
            LogSeverity::Helpful => Level::TRACE,
        }
    }

    /// Filter directive for [`common::log_setup::setup_logging`].
    pub fn filter_directive(self) -> &'static str {
        match self {
            LogSeverity::Mandatory | LogSeverity::Info => "info",
            LogSeverity::Verbose => "debug",
            LogSeverity::Helpful => "trace",
        }
    }
}
