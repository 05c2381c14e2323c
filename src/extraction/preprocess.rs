//! Client for the document preprocessing service
//!
//! The service accepts an article URL and answers with three views of the
//! document:
//! - `raw_data`: pages of `elements`, each element carrying `content`
//! - `filtered_data`: the same layout with boilerplate removed
//! - `dfir_data`: chunks, each a list of pages carrying `content`

use crate::config::ExtractionConfig;
use crate::extraction::{ContentExtractor, ExtractedContent};
use crate::{Result, SentinelError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;

const PREPROCESS_PATH: &str = "/pdf-parser/preprocess";
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
const CHUNK_PAGE_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Default, Deserialize)]
struct PreprocessResponse {
    #[serde(default)]
    raw_data: Option<Vec<Value>>,
    #[serde(default)]
    filtered_data: Option<Vec<Value>>,
    #[serde(default)]
    dfir_data: Option<Vec<Value>>,
    #[serde(default)]
    metadata: Option<Value>,
}

impl From<PreprocessResponse> for ExtractedContent {
    fn from(response: PreprocessResponse) -> Self {
        let metadata = match response.metadata {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };

        ExtractedContent {
            raw_content: pages_to_text(response.raw_data.as_deref().unwrap_or_default()),
            filtered_content: pages_to_text(response.filtered_data.as_deref().unwrap_or_default()),
            auxiliary_chunks: response
                .dfir_data
                .unwrap_or_default()
                .iter()
                .filter_map(chunk_to_text)
                .collect(),
            metadata,
        }
    }
}

/// Renders an element's `content`; structured content (tables) becomes JSON
fn content_text(content: &Value) -> Option<String> {
    match content {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Joins every element's content across all pages with blank lines
fn pages_to_text(pages: &[Value]) -> String {
    pages
        .iter()
        .filter_map(|page| page.get("elements").and_then(Value::as_array))
        .flatten()
        .filter_map(|element| element.get("content").and_then(content_text))
        .filter(|text| !text.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Joins one chunk's page contents; chunks that are not lists or carry no
/// text are dropped
fn chunk_to_text(chunk: &Value) -> Option<String> {
    let Some(pages) = chunk.as_array() else {
        tracing::warn!("Skipping auxiliary chunk that is not a list of pages");
        return None;
    };

    let text = pages
        .iter()
        .filter_map(|page| page.get("content").and_then(content_text))
        .filter(|text| !text.trim().is_empty())
        .collect::<Vec<_>>()
        .join(CHUNK_PAGE_SEPARATOR);

    (!text.is_empty()).then_some(text)
}

/// HTTP client for the preprocessing service
pub struct PreprocessClient {
    http: Client,
    base_url: String,
}

impl PreprocessClient {
    pub fn new(config: &ExtractionConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn fetch_error(url: &str, message: impl Into<String>) -> SentinelError {
        SentinelError::Fetch {
            url: url.to_string(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl ContentExtractor for PreprocessClient {
    async fn extract(&self, url: &str) -> Result<ExtractedContent> {
        tracing::info!("Requesting preprocessed content for {}", url);

        let response = self
            .http
            .post(format!("{}{}", self.base_url, PREPROCESS_PATH))
            .json(&json!({ "pdf_path": url }))
            .send()
            .await
            .map_err(|e| Self::fetch_error(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::fetch_error(
                url,
                format!("preprocessing service returned HTTP {}", status.as_u16()),
            ));
        }

        let body: PreprocessResponse = response.json().await.map_err(|e| {
            SentinelError::Parse(format!("preprocessing response for {}: {}", url, e))
        })?;

        let content = ExtractedContent::from(body);
        tracing::debug!(
            "Preprocessed {}: {} raw chars, {} filtered chars, {} chunks",
            url,
            content.raw_content.len(),
            content.filtered_content.len(),
            content.auxiliary_chunks.len()
        );

        Ok(content)
    }

    async fn is_healthy(&self) -> bool {
        let result = self
            .http
            .get(format!("{}/", self.base_url))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!(
                    "Extraction service health check returned HTTP {}",
                    response.status().as_u16()
                );
                false
            }
            Err(e) => {
                tracing::warn!("Extraction service health check failed: {}", e);
                false
            }
        }
    }
}
