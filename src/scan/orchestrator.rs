//! Scan orchestration - drives parents and articles through their lifecycles
//!
//! This module contains the operations the scheduler and the CLI trigger:
//! - Registering parent blogs
//! - Scanning one parent (discover, classify, process every article)
//! - Processing one article (extract, enrich, store, transition)
//! - The due-parent, retry, pending and stuck-reset sweeps
//!
//! Articles under one parent are processed strictly one after another.
//! Parents in the due-parent sweep run concurrently up to the configured
//! limit. All provider traffic goes through the shared [`Dispatcher`].

use crate::config::{ArticleConfig, Config};
use crate::discovery::{ArticleClassifier, UrlCollector};
use crate::dispatch::Dispatcher;
use crate::enrichment::Enricher;
use crate::extraction::ContentExtractor;
use crate::scan::Sweep;
use crate::state::{needs_processing, ArticleRecord, ArticleStatus, ParentSchedule};
use crate::storage::{Storage, StorageError};
use crate::url::normalize_base_url;
use crate::{Result, SentinelError};
use chrono::{Duration, Utc};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

const NO_CONTENT: &str = "No textual content extracted";
const EMPTY_REPORT: &str = "Empty response from intelligence extraction";

/// What happened to one article
#[derive(Debug, Clone, PartialEq)]
pub enum ArticleOutcome {
    /// The article was already done, parked or in progress elsewhere
    NotNeeded,

    /// Another task in this process is processing the same URL
    AlreadyRunning,

    /// A report was stored and the article is SUCCESS
    Succeeded,

    /// The attempt failed; the article is FAILED or MAX_FAILURES
    Failed {
        status: ArticleStatus,
        reason: String,
    },

    /// The stored record left IN_PROGRESS while the attempt ran, so the
    /// result was not applied
    Superseded,
}

/// Counts from one parent scan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanSummary {
    pub candidates: usize,
    pub articles: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Counts from one sweep
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepSummary {
    /// Parents or articles the sweep picked up
    pub examined: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Marks a URL as being processed for as long as it lives
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<String>>,
    url: String,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(set: &'a Mutex<HashSet<String>>, url: &str) -> Option<Self> {
        let mut urls = set.lock().unwrap_or_else(PoisonError::into_inner);
        if !urls.insert(url.to_string()) {
            return None;
        }
        Some(Self {
            set,
            url: url.to_string(),
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.url);
    }
}

/// Drives the scan engine over a storage backend
pub struct ScanOrchestrator {
    storage: Arc<dyn Storage>,
    collector: UrlCollector,
    classifier: ArticleClassifier,
    extractor: Arc<dyn ContentExtractor>,
    enricher: Enricher,
    articles: ArticleConfig,
    max_pages: usize,
    max_urls: usize,
    parent_concurrency: usize,
    in_flight: Mutex<HashSet<String>>,
}

impl ScanOrchestrator {
    /// Creates an orchestrator
    ///
    /// # Arguments
    ///
    /// * `storage` - Where parents, articles and reports are kept
    /// * `dispatcher` - The provider registry every LLM call goes through
    /// * `extractor` - Source of article content
    /// * `config` - Validated configuration
    ///
    /// # Returns
    ///
    /// * `Ok(ScanOrchestrator)` - Ready to scan
    /// * `Err(SentinelError)` - The discovery HTTP client could not be built
    pub fn new(
        storage: Arc<dyn Storage>,
        dispatcher: Arc<Dispatcher>,
        extractor: Arc<dyn ContentExtractor>,
        config: &Config,
    ) -> Result<Self> {
        Ok(Self {
            storage,
            collector: UrlCollector::new(&config.discovery)?,
            classifier: ArticleClassifier::new(Arc::clone(&dispatcher), &config.discovery),
            extractor,
            enricher: Enricher::new(dispatcher, &config.enrichment),
            articles: config.articles.clone(),
            max_pages: config.discovery.max_pages,
            max_urls: config.discovery.max_urls,
            parent_concurrency: config.scheduler.parent_concurrency.max(1),
            in_flight: Mutex::new(HashSet::new()),
        })
    }

    fn max_failures(&self) -> u32 {
        self.articles.max_failure_count
    }

    // ===== Parents =====

    /// Registers a parent blog, or returns the existing registration
    ///
    /// The URL is normalized first, so `https://x.com` and `https://x.com/`
    /// are the same parent. Passing an interval for an existing parent
    /// updates its interval without touching `next_scan_at`.
    pub fn register_parent(&self, url: &str, interval_hours: Option<u32>) -> Result<ParentSchedule> {
        let normalized = normalize_base_url(url)?;
        let now = Utc::now();

        if let Some(mut existing) = self.storage.get_parent_by_url(normalized.as_str())? {
            match interval_hours {
                Some(hours) if hours != existing.scan_interval_hours => {
                    existing.set_interval(hours, now);
                    self.storage.save_parent(&existing)?;
                    tracing::info!(
                        "Parent {} now scans every {} hours",
                        existing.url,
                        hours
                    );
                }
                _ => tracing::info!("Parent {} is already registered", existing.url),
            }
            return Ok(existing);
        }

        let hours = interval_hours.unwrap_or(self.articles.default_scan_interval_hours);
        let parent = ParentSchedule::new(normalized.as_str(), hours, now);
        self.storage.save_parent(&parent)?;
        tracing::info!(
            "Registered parent {} ({}), scanning every {} hours",
            parent.url,
            parent.uid,
            hours
        );

        Ok(parent)
    }

    /// Uids of every registered parent, newest first
    pub fn list_parent_uids(&self) -> Result<Vec<String>> {
        Ok(self
            .storage
            .list_parents()?
            .into_iter()
            .map(|parent| parent.uid)
            .collect())
    }

    /// `(uid, url)` of every article discovered under a parent
    pub fn child_articles(&self, parent_uid: &str) -> Result<Vec<(String, String)>> {
        if self.storage.get_parent(parent_uid)?.is_none() {
            return Err(SentinelError::ParentNotFound(parent_uid.to_string()));
        }

        Ok(self
            .storage
            .find_articles_by_parent(parent_uid)?
            .into_iter()
            .map(|article| (article.uid, article.url))
            .collect())
    }

    /// Scans one parent: discover, classify, then process each article
    ///
    /// The attempt is stamped first. Only when discovery and the article
    /// loop finish is the success stamped and `next_scan_at` advanced, so
    /// an error here leaves the parent due for the next sweep. Individual
    /// article failures are logged and do not count as a parent error.
    ///
    /// # Returns
    ///
    /// * `Ok(ScanSummary)` - The scan completed
    /// * `Err(SentinelError)` - Unknown parent, unusable parent URL or a
    ///   storage failure on the parent record
    pub async fn scan_parent(&self, parent_uid: &str) -> Result<ScanSummary> {
        let mut parent = self
            .storage
            .get_parent(parent_uid)?
            .ok_or_else(|| SentinelError::ParentNotFound(parent_uid.to_string()))?;

        let started = Utc::now();
        parent.record_attempt(started);
        self.storage.save_parent(&parent)?;
        tracing::info!("Scanning parent {} ({})", parent.url, parent.uid);

        let candidates = self
            .collector
            .collect_candidate_urls(&parent.url, self.max_pages, self.max_urls)
            .await?;
        let articles = self
            .classifier
            .classify_as_articles(&candidates, &parent.url)
            .await;

        let mut summary = ScanSummary {
            candidates: candidates.len(),
            articles: articles.len(),
            ..ScanSummary::default()
        };

        for url in &articles {
            match self.handle_discovered(url, &parent.uid).await {
                Ok(ArticleOutcome::Succeeded) => summary.succeeded += 1,
                Ok(ArticleOutcome::Failed { .. }) => summary.failed += 1,
                Ok(_) => summary.skipped += 1,
                Err(e) => {
                    tracing::warn!("Article {} under {} errored: {}", url, parent.url, e);
                    summary.failed += 1;
                }
            }
        }

        // Re-read so an interval change made during the scan is kept.
        let mut parent = self.storage.get_parent(parent_uid)?.unwrap_or(parent);
        parent.record_success(started, Utc::now());
        self.storage.save_parent(&parent)?;

        tracing::info!(
            "Finished parent {}: {} candidates, {} articles, {} succeeded, {} failed, {} skipped; next scan at {}",
            parent.url,
            summary.candidates,
            summary.articles,
            summary.succeeded,
            summary.failed,
            summary.skipped,
            parent.next_scan_at
        );

        Ok(summary)
    }

    /// Records a discovery, reviving failed articles, then processes it
    async fn handle_discovered(&self, url: &str, parent_uid: &str) -> Result<ArticleOutcome> {
        let now = Utc::now();
        match self.storage.get_article_by_url(url)? {
            None => {
                let article = ArticleRecord::discover(url, parent_uid, now);
                self.storage.save_article(&article)?;
                tracing::debug!("Discovered article {}", url);
            }
            Some(mut article) => {
                let previous = article.status;
                let failures = article.failure_count;
                if article.rediscover(now) {
                    self.storage.save_article(&article)?;
                    tracing::info!(
                        "Rediscovered {} article {} ({} failures), reset to PENDING",
                        previous,
                        url,
                        failures
                    );
                }
            }
        }

        self.process_article(url, parent_uid).await
    }

    // ===== Articles =====

    /// Runs the article pipeline for one URL
    ///
    /// Skips articles that do not need processing and URLs already being
    /// processed in this process. Otherwise the article moves to
    /// IN_PROGRESS, content is extracted and enriched, and a non-empty
    /// report is stored before the SUCCESS transition. Every pipeline
    /// error becomes a FAILED or MAX_FAILURES transition.
    ///
    /// # Returns
    ///
    /// * `Ok(ArticleOutcome)` - What happened to the article
    /// * `Err(SentinelError)` - The article record itself could not be
    ///   read or written
    pub async fn process_article(&self, url: &str, parent_uid: &str) -> Result<ArticleOutcome> {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, url) else {
            tracing::debug!("Article {} is already being processed", url);
            return Ok(ArticleOutcome::AlreadyRunning);
        };

        let max = self.max_failures();
        let existing = self.storage.get_article_by_url(url)?;
        if !needs_processing(existing.as_ref(), max) {
            tracing::debug!("Article {} does not need processing", url);
            return Ok(ArticleOutcome::NotNeeded);
        }

        let mut article =
            existing.unwrap_or_else(|| ArticleRecord::discover(url, parent_uid, Utc::now()));
        article.begin_attempt(max, Utc::now())?;
        self.storage.save_article(&article)?;
        tracing::info!(
            "Processing article {} (attempt {})",
            url,
            article.failure_count + 1
        );

        let result = self.run_pipeline(url).await;

        // Re-read so a reset made while the attempt ran is noticed.
        let mut article = self.storage.get_article_by_url(url)?.unwrap_or(article);
        if article.status != ArticleStatus::InProgress {
            tracing::warn!(
                "Discarding result for article {}: it is now {}",
                url,
                article.status
            );
            return Ok(ArticleOutcome::Superseded);
        }

        let result = result.and_then(|report| self.store_report(url, report));
        let now = Utc::now();

        let transition = match result {
            Ok(report) => article
                .complete(report, now)
                .map(|()| ArticleOutcome::Succeeded),
            Err(e) => {
                let reason = e.to_string();
                article
                    .fail(&reason, max, now)
                    .map(|status| ArticleOutcome::Failed { status, reason })
            }
        };

        let outcome = match transition {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("Discarding result for article {}: {}", url, e);
                return Ok(ArticleOutcome::Superseded);
            }
        };

        self.storage.save_article(&article)?;
        match &outcome {
            ArticleOutcome::Failed { status, reason } => tracing::warn!(
                "Article {} failed ({}, {} failures): {}",
                url,
                status,
                article.failure_count,
                reason
            ),
            _ => tracing::info!("Article {} processed successfully", url),
        }

        Ok(outcome)
    }

    /// Extract and enrich; the error text becomes the failure reason
    async fn run_pipeline(&self, url: &str) -> Result<Value> {
        let content = self.extractor.extract(url).await?;
        if content.is_empty() {
            return Err(SentinelError::Enrichment(NO_CONTENT.to_string()));
        }

        let report = self.enricher.enrich(url, &content).await;
        if report.is_empty() {
            return Err(SentinelError::Enrichment(EMPTY_REPORT.to_string()));
        }

        Ok(serde_json::to_value(&report)
            .map_err(|e| StorageError::Serialization(e.to_string()))?)
    }

    /// Persists a report for an article that is still IN_PROGRESS
    fn store_report(&self, url: &str, report: Value) -> Result<Value> {
        let report_id = self.storage.save_intel_report(url, &report)?;
        tracing::debug!("Stored report {} for {}", report_id, url);
        Ok(report)
    }

    /// Processes articles one at a time
    async fn process_sequentially(&self, articles: Vec<ArticleRecord>) -> SweepSummary {
        let mut summary = SweepSummary {
            examined: articles.len(),
            ..SweepSummary::default()
        };

        for article in articles {
            match self.process_article(&article.url, &article.parent_uid).await {
                Ok(ArticleOutcome::Succeeded) => summary.succeeded += 1,
                Ok(ArticleOutcome::Failed { .. }) => summary.failed += 1,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Article {} errored: {}", article.url, e);
                    summary.failed += 1;
                }
            }
        }

        summary
    }

    // ===== Sweeps =====

    /// Scans every parent whose `next_scan_at` has passed
    pub async fn run_due_parent_sweep(&self) -> Result<SweepSummary> {
        let due = self.storage.find_due_parents(Utc::now())?;
        if due.is_empty() {
            tracing::debug!("No parents due for scanning");
            return Ok(SweepSummary::default());
        }
        tracing::info!("Due-parent sweep: {} parents due", due.len());

        let results: Vec<(ParentSchedule, Result<ScanSummary>)> = stream::iter(due)
            .map(|parent| async move {
                let result = self.scan_parent(&parent.uid).await;
                (parent, result)
            })
            .buffer_unordered(self.parent_concurrency)
            .collect()
            .await;

        let mut summary = SweepSummary {
            examined: results.len(),
            ..SweepSummary::default()
        };
        for (parent, result) in results {
            match result {
                Ok(_) => summary.succeeded += 1,
                Err(e) => {
                    tracing::error!(
                        "Scan of parent {} ({}) failed, will retry next sweep: {}",
                        parent.url,
                        parent.uid,
                        e
                    );
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Re-attempts FAILED articles below the failure ceiling
    pub async fn run_retry_sweep(&self) -> Result<SweepSummary> {
        let articles = self.storage.find_retryable_articles(self.max_failures())?;
        tracing::info!("Retry sweep: {} failed articles to retry", articles.len());
        Ok(self.process_sequentially(articles).await)
    }

    /// Processes PENDING articles
    pub async fn run_pending_sweep(&self) -> Result<SweepSummary> {
        let articles = self.storage.find_articles_by_status(ArticleStatus::Pending)?;
        tracing::info!("Pending sweep: {} pending articles", articles.len());
        Ok(self.process_sequentially(articles).await)
    }

    /// Moves abandoned IN_PROGRESS articles to FAILED without counting a
    /// failure
    ///
    /// URLs this process is still working on are left alone.
    pub async fn run_stuck_reset_sweep(&self) -> Result<SweepSummary> {
        let now = Utc::now();
        let threshold = now - Duration::minutes(i64::from(self.articles.stuck_timeout_minutes));
        let stuck = self
            .storage
            .find_articles_matching(&|article| article.is_stuck(threshold))?;

        let mut summary = SweepSummary {
            examined: stuck.len(),
            ..SweepSummary::default()
        };

        for mut article in stuck {
            let busy = self
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(&article.url);
            if busy {
                tracing::debug!("Article {} is slow but still running", article.url);
                continue;
            }

            if article.reset_stuck(now) {
                self.storage.save_article(&article)?;
                summary.succeeded += 1;
                tracing::warn!(
                    "Reset stuck article {} (last update {})",
                    article.url,
                    article.last_attempt_at.unwrap_or(article.created_at)
                );
            }
        }

        if summary.succeeded > 0 {
            tracing::info!("Stuck-reset sweep: reset {} articles", summary.succeeded);
        }
        Ok(summary)
    }

    /// Runs one sweep by kind
    pub async fn run_sweep(&self, sweep: Sweep) -> Result<SweepSummary> {
        match sweep {
            Sweep::DueParents => self.run_due_parent_sweep().await,
            Sweep::Retry => self.run_retry_sweep().await,
            Sweep::Pending => self.run_pending_sweep().await,
            Sweep::StuckReset => self.run_stuck_reset_sweep().await,
        }
    }

    /// Whether the content extraction service answers
    pub async fn extraction_healthy(&self) -> bool {
        self.extractor.is_healthy().await
    }
}
