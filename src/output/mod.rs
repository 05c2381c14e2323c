//! Output module for operator-facing summaries
//!
//! This module handles:
//! - Loading parent, article and report counts from storage
//! - Printing them for the `--stats` mode

pub mod stats;

pub use stats::{load_statistics, print_statistics, SentinelStatistics};
