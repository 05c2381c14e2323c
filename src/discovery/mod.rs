//! Discovery module: crawl-then-classify article discovery
//!
//! This module contains:
//! - HTTP fetching of parent blog pages
//! - HTML link extraction
//! - Breadth-first candidate collection under a parent base URL
//! - LLM classification of candidates into article URLs

mod classifier;
mod collector;
mod fetcher;
mod parser;

pub use classifier::{parse_classifier_response, ArticleClassifier};
pub use collector::UrlCollector;
pub use fetcher::{build_http_client, fetch_page, FetchResult};
pub use parser::extract_links;
