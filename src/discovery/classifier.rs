//! LLM classification of candidate URLs into article URLs

use crate::config::DiscoveryConfig;
use crate::dispatch::response::parse_lenient_json;
use crate::dispatch::Dispatcher;
use crate::{Result, SentinelError};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

const CLASSIFIER_SYSTEM_PROMPT: &str = "\
You review links collected from a security blog. Decide which of them point to \
individual blog posts or research articles, as opposed to listing pages, author \
pages, product pages, navigation or other site furniture.

Reply with JSON only, in exactly this shape:
{\"blog_article_urls\": [\"https://...\", \"https://...\"]}

Copy URLs verbatim from the candidate list. Return an empty array when none qualify.";

/// Builds the user prompt for one chunk of candidates
fn build_user_prompt(parent_url: &str, chunk: &[String]) -> String {
    let mut prompt = format!("Base URL: {}\n\nCandidate URLs:\n", parent_url);
    for url in chunk {
        prompt.push_str("- ");
        prompt.push_str(url);
        prompt.push('\n');
    }
    prompt
}

/// Extracts article URLs from a classifier reply
///
/// Accepts an object with a `blog_article_urls` array or a bare array,
/// optionally fenced or surrounded by prose. Entries that are not strings
/// starting with `http` are dropped.
pub fn parse_classifier_response(text: &str) -> Result<Vec<String>> {
    let value = parse_lenient_json(text)
        .ok_or_else(|| SentinelError::Parse("classifier reply contains no JSON".to_string()))?;

    let entries = match &value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("blog_article_urls") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(SentinelError::Parse(
                    "classifier reply has no blog_article_urls array".to_string(),
                ))
            }
        },
        _ => {
            return Err(SentinelError::Parse(
                "classifier reply is neither an object nor an array".to_string(),
            ))
        }
    };

    Ok(entries
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|url| url.starts_with("http"))
        .map(str::to_string)
        .collect())
}

/// Asks a completion provider which candidates are articles
pub struct ArticleClassifier {
    dispatcher: Arc<Dispatcher>,
    provider: String,
    chunk_size: usize,
    chunk_delay: Duration,
}

impl ArticleClassifier {
    pub fn new(dispatcher: Arc<Dispatcher>, config: &DiscoveryConfig) -> Self {
        Self {
            dispatcher,
            provider: config.classifier_provider.clone(),
            chunk_size: config.max_urls_per_llm_call.max(1),
            chunk_delay: Duration::from_millis(config.chunk_delay_ms),
        }
    }

    /// Classifies candidates in fixed-size chunks, one call per chunk
    ///
    /// A chunk whose call or reply fails is logged and contributes nothing.
    /// The result is the de-duplicated union of every chunk's article URLs.
    pub async fn classify_as_articles(&self, candidates: &[String], parent_url: &str) -> Vec<String> {
        let mut articles = Vec::new();
        let mut seen = HashSet::new();

        for (index, chunk) in candidates.chunks(self.chunk_size).enumerate() {
            if index > 0 && !self.chunk_delay.is_zero() {
                tokio::time::sleep(self.chunk_delay).await;
            }

            let prompt = build_user_prompt(parent_url, chunk);
            let reply = match self
                .dispatcher
                .complete(&self.provider, CLASSIFIER_SYSTEM_PROMPT, &prompt)
                .await
            {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::warn!(
                        "Classification chunk {} for {} failed: {}",
                        index + 1,
                        parent_url,
                        e
                    );
                    continue;
                }
            };

            match parse_classifier_response(&reply) {
                Ok(urls) => {
                    tracing::debug!(
                        "Chunk {} for {}: {} of {} candidates are articles",
                        index + 1,
                        parent_url,
                        urls.len(),
                        chunk.len()
                    );
                    for url in urls {
                        if seen.insert(url.clone()) {
                            articles.push(url);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        "Ignoring classification chunk {} for {}: {}",
                        index + 1,
                        parent_url,
                        e
                    );
                }
            }
        }

        tracing::info!(
            "Classified {} of {} candidates under {} as articles",
            articles.len(),
            candidates.len(),
            parent_url
        );

        articles
    }
}
