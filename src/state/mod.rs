//! State module for tracking scan progress
//!
//! # Components
//!
//! - `ArticleStatus` / `ArticleRecord`: per-article lifecycle and its transitions
//! - `ParentSchedule`: per-parent scan schedule

mod article_state;
mod parent_state;

pub use article_state::{needs_processing, ArticleRecord, ArticleStatus};
pub use parent_state::ParentSchedule;
