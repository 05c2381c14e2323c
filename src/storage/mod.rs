//! Storage module for persisting scan state
//!
//! This module handles all database operations for the scan engine, including:
//! - SQLite database initialization and schema management
//! - Parent schedule persistence
//! - Article lifecycle records
//! - Stored enrichment reports

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::SentinelError;
use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
pub fn open_storage(path: &Path) -> Result<SqliteStorage, SentinelError> {
    SqliteStorage::new(path)
}
