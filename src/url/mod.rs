//! URL handling module for Blog-Sentinel
//!
//! This module provides parent base-URL normalization and the candidate
//! filters applied while crawling a parent blog.

mod filter;
mod normalize;

pub use filter::{contains_excluded_keyword, is_content_url, is_under_base};
pub use normalize::{normalize_base_url, strip_fragment};
