//! Scan engine module
//!
//! This module handles:
//! - `ScanOrchestrator`: parent scans, the article pipeline and the sweeps
//! - `SweepScheduler`: one timer task per sweep until shutdown

mod orchestrator;
mod scheduler;

pub use orchestrator::{ArticleOutcome, ScanOrchestrator, ScanSummary, SweepSummary};
pub use scheduler::SweepScheduler;

use std::fmt;
use std::str::FromStr;

/// The recurring sweeps over persisted state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sweep {
    /// Scan parents whose next scan time has passed
    DueParents,
    /// Re-attempt FAILED articles below the failure ceiling
    Retry,
    /// Process PENDING articles
    Pending,
    /// Release articles left IN_PROGRESS by an interrupted run
    StuckReset,
}

impl Sweep {
    pub fn all() -> [Self; 4] {
        [Self::DueParents, Self::Retry, Self::Pending, Self::StuckReset]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::DueParents => "parents",
            Self::Retry => "retry",
            Self::Pending => "pending",
            Self::StuckReset => "stuck",
        }
    }
}

impl fmt::Display for Sweep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Sweep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|sweep| sweep.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!(
                    "unknown sweep '{}', expected one of: parents, retry, pending, stuck",
                    s
                )
            })
    }
}
