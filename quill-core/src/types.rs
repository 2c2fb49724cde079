//! Shared domain types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Policy governing how a directory render reacts to per-file errors.
///
/// A render runs under exactly one mode for its whole duration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureMode {
    /// Abort on the first error and return it.
    #[default]
    FailFast,
    /// Record every error, keep going, and return them all at the end.
    FailAtEnd,
    /// Record every error, keep going, and never return one.
    BestEffort,
}

impl FailureMode {
    /// All modes in a stable order.
    pub fn all() -> &'static [FailureMode] {
        &[
            FailureMode::FailFast,
            FailureMode::FailAtEnd,
            FailureMode::BestEffort,
        ]
    }
}

impl fmt::Display for FailureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureMode::FailFast => "fail-fast",
            FailureMode::FailAtEnd => "fail-at-end",
            FailureMode::BestEffort => "best-effort",
        };
        write!(f, "{s}")
    }
}

impl FromStr for FailureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "fail-fast" => Ok(FailureMode::FailFast),
            "fail-at-end" => Ok(FailureMode::FailAtEnd),
            "best-effort" => Ok(FailureMode::BestEffort),
            other => Err(format!(
                "unknown failure mode '{other}'; expected: fail-fast, fail-at-end, best-effort"
            )),
        }
    }
}
