//! Configuration module for Blog-Sentinel
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use blog_sentinel::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("sentinel.toml")).unwrap();
//! println!("Parent sweep every {}s", config.scheduler.parent_scan_interval_secs);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    ArticleConfig, Config, DiscoveryConfig, EnrichmentConfig, ExtractionConfig, ProviderConfig,
    SchedulerConfig, StorageConfig,
};

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
