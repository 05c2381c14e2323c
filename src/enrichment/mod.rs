//! Enrichment of extracted article content
//!
//! This module handles:
//! - The indicators and techniques calls over the whole document
//! - Fan-out of one call per auxiliary chunk and the merge of their findings
//! - Assembly of the intelligence report that gets stored
//!
//! Every provider call goes through the [`Dispatcher`], so chunk fan-out is
//! bounded by the chunk provider's permit count.

mod merge;
mod prompts;
mod report;

pub use merge::{
    parse_chunk_reply, parse_indicator_reply, parse_technique_reply, ChunkFinding, Indicator,
    IndicatorFindings, Technique, TechniqueSet,
};
pub use report::{IntelReport, ReportReference, ReportTechnique, TechniqueUsage};

use crate::config::EnrichmentConfig;
use crate::dispatch::Dispatcher;
use crate::extraction::ExtractedContent;
use crate::Result;
use chrono::Utc;
use futures::future::join_all;
use prompts::{CHUNK_TECHNIQUES_PROMPT, INDICATORS_PROMPT, TECHNIQUES_PROMPT};
use std::sync::Arc;

/// Runs the enrichment calls for one article
pub struct Enricher {
    dispatcher: Arc<Dispatcher>,
    indicator_provider: String,
    technique_provider: String,
    chunk_provider: String,
}

impl Enricher {
    pub fn new(dispatcher: Arc<Dispatcher>, config: &EnrichmentConfig) -> Self {
        Self {
            dispatcher,
            indicator_provider: config.indicator_provider.clone(),
            technique_provider: config.technique_provider.clone(),
            chunk_provider: config.chunk_provider.clone(),
        }
    }

    /// Calls a provider and parses the reply
    ///
    /// Call and parse failures are logged and yield `None`.
    async fn ask<T>(
        &self,
        provider: &str,
        system_prompt: &str,
        content: &str,
        what: &str,
        url: &str,
        parse: fn(&str) -> Result<T>,
    ) -> Option<T> {
        if content.trim().is_empty() {
            return None;
        }

        let reply = match self.dispatcher.complete(provider, system_prompt, content).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!("{} call for {} failed: {}", what, url, e);
                return None;
            }
        };

        match parse(&reply) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!("Ignoring {} reply for {}: {}", what, url, e);
                None
            }
        }
    }

    /// Enriches extracted content into a report
    ///
    /// The indicators call, the techniques call and every chunk call run
    /// concurrently. Chunk findings are folded into the primary techniques
    /// in chunk order. The returned report may be empty; see
    /// [`IntelReport::is_empty`].
    pub async fn enrich(&self, url: &str, content: &ExtractedContent) -> IntelReport {
        let indicators = self.ask(
            &self.indicator_provider,
            INDICATORS_PROMPT,
            &content.raw_content,
            "Indicators",
            url,
            parse_indicator_reply,
        );
        let techniques = self.ask(
            &self.technique_provider,
            TECHNIQUES_PROMPT,
            &content.filtered_content,
            "Techniques",
            url,
            parse_technique_reply,
        );
        let chunks = join_all(content.auxiliary_chunks.iter().map(|chunk| {
            self.ask(
                &self.chunk_provider,
                CHUNK_TECHNIQUES_PROMPT,
                chunk,
                "Chunk",
                url,
                parse_chunk_reply,
            )
        }));

        let (findings, primary, chunk_findings) = tokio::join!(indicators, techniques, chunks);

        let mut merged = TechniqueSet::new();
        for technique in primary.unwrap_or_default() {
            merged.add_primary(technique);
        }

        let answered = chunk_findings.iter().filter(|f| f.is_some()).count();
        for finding in chunk_findings.into_iter().flatten().flatten() {
            merged.add_chunk_finding(finding);
        }

        let findings = findings.unwrap_or_default();
        tracing::info!(
            "Enriched {}: {} indicators, {} techniques ({} of {} chunks answered)",
            url,
            findings.indicators.len(),
            merged.len(),
            answered,
            content.auxiliary_chunks.len()
        );

        IntelReport::assemble(
            url,
            findings,
            merged.into_techniques(),
            content.title(),
            Utc::now(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{CompletionClient, DispatchError, DispatchResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Answers by prompt kind; chunk replies depend on the chunk text
    struct PromptRouter {
        chunk_calls: AtomicUsize,
    }

    #[async_trait]
    impl CompletionClient for PromptRouter {
        async fn complete(&self, system: &str, user: &str) -> DispatchResult<String> {
            if system == INDICATORS_PROMPT {
                return Ok(r#"{"name": "", "description": "Loader campaign", "created": "01-02-2025",
                    "indicators": [{"type": "domain", "value": "bad.example"}]}"#
                    .to_string());
            }
            if system == TECHNIQUES_PROMPT {
                return Ok(r#"```json
{"techniques": [{"technique_id": "T1059", "technique_name": "Command and Scripting Interpreter",
  "technique_usage": {"from_table": "PowerShell loader"}}]}
```"#
                    .to_string());
            }

            self.chunk_calls.fetch_add(1, Ordering::SeqCst);
            if user.contains("broken") {
                return Err(DispatchError::CallFailed {
                    provider: "azure-2".to_string(),
                    message: "HTTP 429".to_string(),
                });
            }
            if user.contains("lsass") {
                return Ok(r#"[{"technique_id": "T1003", "technique_name": "OS Credential Dumping",
                    "technique_procedure": "dumped lsass"}]"#
                    .to_string());
            }
            Ok(r#"[{"technique_id": "T1059", "technique_procedure": "encoded PowerShell"}]"#
                .to_string())
        }
    }

    fn enricher(client: Arc<PromptRouter>) -> Enricher {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register("azure-1", "m", client.clone(), 2, Duration::from_secs(5));
        dispatcher.register("azure-2", "m", client, 1, Duration::from_secs(5));
        Enricher::new(Arc::new(dispatcher), &EnrichmentConfig::default())
    }

    #[tokio::test]
    async fn test_enrich_merges_chunks_into_techniques() {
        let client = Arc::new(PromptRouter {
            chunk_calls: AtomicUsize::new(0),
        });
        let content = ExtractedContent {
            raw_content: "raw text".to_string(),
            filtered_content: "filtered text".to_string(),
            auxiliary_chunks: vec![
                "ran encoded PowerShell".to_string(),
                "broken chunk".to_string(),
                "dumped lsass".to_string(),
            ],
            ..Default::default()
        };

        let report = enricher(client.clone())
            .enrich("https://x.com/a/b", &content)
            .await;

        assert_eq!(client.chunk_calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.name, "https://x.com/a/b");
        assert_eq!(report.created, "2025-02-01T00:00:00Z");
        assert_eq!(report.indicators.len(), 1);

        let ids: Vec<&str> = report.techniques.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["T1059", "T1003"]);
        assert_eq!(
            report.techniques[0].usage[0].usage,
            "PowerShell loader\n* encoded PowerShell"
        );
        assert_eq!(report.techniques[1].usage[0].usage, "* dumped lsass");
    }

    #[tokio::test]
    async fn test_blank_sections_make_no_calls() {
        let client = Arc::new(PromptRouter {
            chunk_calls: AtomicUsize::new(0),
        });
        let content = ExtractedContent {
            raw_content: "   ".to_string(),
            ..Default::default()
        };

        let report = enricher(client.clone())
            .enrich("https://x.com/a/b", &content)
            .await;

        assert!(report.is_empty());
        assert_eq!(client.chunk_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_provider_contributes_nothing() {
        let dispatcher = Arc::new(Dispatcher::new());
        let enricher = Enricher::new(dispatcher, &EnrichmentConfig::default());
        let content = ExtractedContent {
            raw_content: "raw".to_string(),
            filtered_content: "filtered".to_string(),
            auxiliary_chunks: vec!["chunk".to_string()],
            ..Default::default()
        };

        let report = enricher.enrich("https://x.com/a/b", &content).await;
        assert!(report.is_empty());
    }
}
