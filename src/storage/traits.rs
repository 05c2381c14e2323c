//! Storage traits and error types
//!
//! This module defines the keyed document store the scan engine persists
//! parents, articles and enrichment reports through.

use crate::state::{ArticleRecord, ArticleStatus, ParentSchedule};
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Implementations are shared between concurrently running sweeps, so every
/// method takes `&self` and the backend handles its own synchronization.
/// Writes are upserts: the last writer wins.
pub trait Storage: Send + Sync {
    // ===== Parent Blogs =====

    /// Inserts or replaces a parent, keyed by uid
    fn save_parent(&self, parent: &ParentSchedule) -> StorageResult<()>;

    fn get_parent(&self, uid: &str) -> StorageResult<Option<ParentSchedule>>;

    fn get_parent_by_url(&self, url: &str) -> StorageResult<Option<ParentSchedule>>;

    /// All parents, newest registration first
    fn list_parents(&self) -> StorageResult<Vec<ParentSchedule>>;

    /// Parents whose next scan time is at or before `now`
    fn find_due_parents(&self, now: DateTime<Utc>) -> StorageResult<Vec<ParentSchedule>>;

    fn count_parents(&self) -> StorageResult<u64>;

    // ===== Articles =====

    /// Inserts or updates an article, keyed by url
    ///
    /// The uid, owning parent and discovery/creation stamps of an existing
    /// row are kept; everything else is overwritten.
    fn save_article(&self, article: &ArticleRecord) -> StorageResult<()>;

    fn get_article(&self, uid: &str) -> StorageResult<Option<ArticleRecord>>;

    fn get_article_by_url(&self, url: &str) -> StorageResult<Option<ArticleRecord>>;

    /// All articles, oldest discovery first
    fn list_articles(&self) -> StorageResult<Vec<ArticleRecord>>;

    fn find_articles_by_status(&self, status: ArticleStatus) -> StorageResult<Vec<ArticleRecord>>;

    /// FAILED articles whose failure count is still below `max_failures`
    fn find_retryable_articles(&self, max_failures: u32) -> StorageResult<Vec<ArticleRecord>>;

    fn find_articles_by_parent(&self, parent_uid: &str) -> StorageResult<Vec<ArticleRecord>>;

    fn count_articles_by_status(&self, status: ArticleStatus) -> StorageResult<u64>;

    /// Articles satisfying an arbitrary predicate
    fn find_articles_matching(
        &self,
        predicate: &dyn Fn(&ArticleRecord) -> bool,
    ) -> StorageResult<Vec<ArticleRecord>> {
        Ok(self
            .list_articles()?
            .into_iter()
            .filter(|article| predicate(article))
            .collect())
    }

    // ===== Enrichment Reports =====

    /// Stores a report for an article URL
    ///
    /// # Returns
    ///
    /// The identifier of the stored document
    fn save_intel_report(&self, report_url: &str, report: &Value) -> StorageResult<String>;

    /// Reports stored for an article URL, oldest first
    fn find_intel_reports(&self, report_url: &str) -> StorageResult<Vec<Value>>;

    fn count_intel_reports(&self) -> StorageResult<u64>;
}
