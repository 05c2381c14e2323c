//! Statistics over persisted scan state
//!
//! This module provides functionality for extracting and displaying
//! parent, article and report counts from the storage layer.

use crate::state::ArticleStatus;
use crate::storage::Storage;
use crate::SentinelError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Scan state summary
#[derive(Debug, Clone)]
pub struct SentinelStatistics {
    /// Number of registered parent blogs
    pub total_parents: u64,

    /// Parents whose next scan time has passed
    pub due_parents: u64,

    /// Total number of articles discovered
    pub total_articles: u64,

    /// Count of articles by status (statuses with no articles are omitted)
    pub articles_by_status: HashMap<ArticleStatus, u64>,

    /// Number of stored enrichment reports
    pub stored_reports: u64,

    /// Articles parked at the failure ceiling
    pub parked_articles: Vec<String>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
/// * `now` - Reference time for counting due parents
///
/// # Returns
///
/// * `Ok(SentinelStatistics)` - Successfully loaded statistics
/// * `Err(SentinelError)` - Failed to query statistics
pub fn load_statistics(
    storage: &dyn Storage,
    now: DateTime<Utc>,
) -> Result<SentinelStatistics, SentinelError> {
    let total_parents = storage.count_parents()?;
    let due_parents = storage.find_due_parents(now)?.len() as u64;

    let mut articles_by_status = HashMap::new();
    let mut total_articles = 0;
    for status in ArticleStatus::all_statuses() {
        let count = storage.count_articles_by_status(status)?;
        total_articles += count;
        if count > 0 {
            articles_by_status.insert(status, count);
        }
    }

    let parked_articles = storage
        .find_articles_by_status(ArticleStatus::MaxFailures)?
        .into_iter()
        .map(|article| article.url)
        .collect();

    Ok(SentinelStatistics {
        total_parents,
        due_parents,
        total_articles,
        articles_by_status,
        stored_reports: storage.count_intel_reports()?,
        parked_articles,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &SentinelStatistics) {
    println!("=== Blog-Sentinel Statistics ===\n");

    println!("Parents:");
    println!("  Registered: {}", stats.total_parents);
    println!("  Due for scanning: {}", stats.due_parents);
    println!();

    println!("Articles by Status:");
    for status in ArticleStatus::all_statuses() {
        let count = stats.articles_by_status.get(&status).copied().unwrap_or(0);
        let percentage = if stats.total_articles > 0 {
            (count as f64 / stats.total_articles as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", status, count, percentage);
    }
    println!("  Total: {}", stats.total_articles);
    println!();

    if !stats.parked_articles.is_empty() {
        println!("At Failure Ceiling ({}):", stats.parked_articles.len());
        for url in &stats.parked_articles {
            println!("  - {}", url);
        }
        println!();
    }

    println!("Stored reports: {}", stats.stored_reports);
}
