//! Content extraction collaborator
//!
//! This module handles:
//! - The `ContentExtractor` seam the scan engine pulls article text through
//! - `PreprocessClient`, the HTTP client for the document preprocessing service
//! - Flattening the service's page/element layout into prompt-ready text

mod preprocess;

pub use preprocess::PreprocessClient;

use crate::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Text extracted from one article, ready for enrichment
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedContent {
    /// Full document text, used for indicator extraction
    pub raw_content: String,
    /// Document text with boilerplate removed, used for technique extraction
    pub filtered_content: String,
    /// Independent text chunks, each enriched by its own call
    pub auxiliary_chunks: Vec<String>,
    /// Whatever document metadata the service reported (title, author, ...)
    pub metadata: Map<String, Value>,
}

impl ExtractedContent {
    /// True when there is nothing to send to a provider
    pub fn is_empty(&self) -> bool {
        self.raw_content.trim().is_empty()
            && self.filtered_content.trim().is_empty()
            && self.auxiliary_chunks.is_empty()
    }

    /// Non-blank `title` from the metadata, if reported
    pub fn title(&self) -> Option<&str> {
        self.metadata
            .get("title")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|title| !title.is_empty())
    }
}

/// Source of article content
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    /// Extracts the content behind an article URL
    async fn extract(&self, url: &str) -> Result<ExtractedContent>;

    /// Whether the extraction backend currently answers
    async fn is_healthy(&self) -> bool;
}
