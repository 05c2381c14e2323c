//! Breadth-first candidate URL collection under a parent blog

use crate::config::DiscoveryConfig;
use crate::discovery::fetcher::{build_http_client, fetch_page, FetchResult};
use crate::discovery::parser::extract_links;
use crate::url::{contains_excluded_keyword, is_content_url, is_under_base, normalize_base_url};
use crate::Result;
use reqwest::Client;
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use url::Url;

/// Crawls a parent blog and returns content-like links under it
pub struct UrlCollector {
    client: Client,
    page_delay: Duration,
    excluded_keywords: Vec<String>,
}

impl UrlCollector {
    pub fn new(config: &DiscoveryConfig) -> Result<Self> {
        Ok(Self {
            client: build_http_client(config)?,
            page_delay: Duration::from_millis(config.page_delay_ms),
            excluded_keywords: config.excluded_keywords.clone(),
        })
    }

    /// Collects up to `max_urls` candidate article URLs
    ///
    /// Pages are visited breadth-first starting at the normalized base,
    /// with a fixed pause before every fetch, until `max_pages` pages have
    /// been fetched or the queue runs dry. A page that fails to load is
    /// logged and skipped. Accepted links (under the base, not yet seen, no
    /// excluded keyword) are queued for visiting as well as collected. The
    /// collected set is then narrowed to content-like paths.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The parent blog URL
    /// * `max_pages` - Upper bound on fetched pages
    /// * `max_urls` - Upper bound on collected and returned URLs
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<String>)` - Candidates in discovery order
    /// * `Err(SentinelError)` - The base URL is not a usable http(s) URL
    pub async fn collect_candidate_urls(
        &self,
        base_url: &str,
        max_pages: usize,
        max_urls: usize,
    ) -> Result<Vec<String>> {
        let base = normalize_base_url(base_url)?;
        let base_str = base.as_str().to_string();

        let mut queue: VecDeque<String> = VecDeque::from([base_str.clone()]);
        let mut visited: HashSet<String> = HashSet::new();
        let mut collected: Vec<String> = Vec::new();
        let mut collected_set: HashSet<String> = HashSet::new();

        while visited.len() < max_pages && collected.len() < max_urls {
            let Some(current) = queue.pop_front() else {
                break;
            };
            if visited.contains(&current) {
                continue;
            }

            if !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }

            let (final_url, body) = match fetch_page(&self.client, &current).await {
                FetchResult::Success {
                    final_url, body, ..
                } => (final_url, body),
                FetchResult::HttpError { status_code } => {
                    tracing::warn!("Skipping {}: HTTP {}", current, status_code);
                    continue;
                }
                FetchResult::NetworkError { error } => {
                    tracing::warn!("Skipping {}: {}", current, error);
                    continue;
                }
            };

            visited.insert(current.clone());
            let page_url = Url::parse(&final_url).unwrap_or_else(|_| base.clone());

            for link in extract_links(&body, &page_url) {
                if !is_under_base(&link, &base_str)
                    || visited.contains(&link)
                    || collected_set.contains(&link)
                    || contains_excluded_keyword(&link, &self.excluded_keywords)
                {
                    continue;
                }

                collected_set.insert(link.clone());
                collected.push(link.clone());
                queue.push_back(link);
            }

            tracing::debug!(
                "Visited {} ({} pages, {} links collected)",
                current,
                visited.len(),
                collected.len()
            );
        }

        let candidates: Vec<String> = collected
            .into_iter()
            .filter(|url| is_content_url(url, &base_str))
            .take(max_urls)
            .collect();

        tracing::info!(
            "Collected {} candidate URLs under {} from {} pages",
            candidates.len(),
            base_str,
            visited.len()
        );

        Ok(candidates)
    }
}
