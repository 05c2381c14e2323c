//! Completion dispatch module
//!
//! This module routes chat-completion calls to named providers:
//! - `CompletionClient`: the seam to a single provider endpoint
//! - `HttpCompletionClient`: OpenAI- and Azure-style chat completions over reqwest
//! - `Dispatcher`: per-provider concurrency permits and call timeouts
//! - `response`: lenient decoding of the JSON that models send back

mod client;
mod dispatcher;
pub mod response;

pub use client::{CompletionClient, HttpCompletionClient};
pub use dispatcher::Dispatcher;

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the dispatcher
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Invalid client name: {0}")]
    InvalidProvider(String),

    #[error("Call to provider {provider} timed out after {after:?}")]
    Timeout { provider: String, after: Duration },

    #[error("Call to provider {provider} failed: {message}")]
    CallFailed { provider: String, message: String },
}

/// Result type for dispatch operations
pub type DispatchResult<T> = Result<T, DispatchError>;
