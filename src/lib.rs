//! Blog-Sentinel: a scan orchestration engine for threat-intel blogs
//!
//! This crate periodically discovers new articles under registered parent
//! blogs, classifies candidate links with an LLM, and drives every article
//! through an extraction and enrichment pipeline while tracking its
//! lifecycle in persistent storage.

pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod enrichment;
pub mod extraction;
pub mod output;
pub mod scan;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Blog-Sentinel operations
#[derive(Debug, Error)]
pub enum SentinelError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] dispatch::DispatchError),

    #[error("Fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("Malformed response: {0}")]
    Parse(String),

    /// The article yielded nothing worth storing
    #[error("{0}")]
    Enrichment(String),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: state::ArticleStatus,
        to: state::ArticleStatus,
    },

    #[error("Parent blog not found: {0}")]
    ParentNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for Blog-Sentinel operations
pub type Result<T> = std::result::Result<T, SentinelError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use dispatch::Dispatcher;
pub use scan::{ScanOrchestrator, SweepScheduler};
pub use state::{ArticleRecord, ArticleStatus, ParentSchedule};
pub use storage::{SqliteStorage, Storage};
