use async_trait::async_trait;
use blog_sentinel::config::Config;
use blog_sentinel::dispatch::{CompletionClient, DispatchResult};
use blog_sentinel::extraction::{ContentExtractor, ExtractedContent};
use blog_sentinel::scan::{ArticleOutcome, Sweep};
use blog_sentinel::storage::{SqliteStorage, Storage};
use blog_sentinel::{
    ArticleRecord, ArticleStatus, Dispatcher, ParentSchedule, Result, ScanOrchestrator,
    SentinelError,
};
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LISTING_PAGE: &str = r#"<html><body>
    <a href="/2024/post-a">Loader analysis</a>
    <a href="/2024/post-b">Ransomware notes</a>
    <a href="/tag/malware">Tag</a>
    <a href="https://elsewhere.example/2024/x">Elsewhere</a>
</body></html>"#;

/// Answers every prompt the engine sends, keyed on the user prompt
struct FakeProvider {
    calls: AtomicUsize,
    empty_findings: bool,
}

impl FakeProvider {
    fn new(empty_findings: bool) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            empty_findings,
        }
    }
}

#[async_trait]
impl CompletionClient for FakeProvider {
    async fn complete(&self, _system: &str, user: &str) -> DispatchResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if user.starts_with("Base URL:") {
            let urls: Vec<&str> = user
                .lines()
                .filter_map(|line| line.strip_prefix("- "))
                .collect();
            return Ok(serde_json::json!({ "blog_article_urls": urls }).to_string());
        }

        if self.empty_findings {
            return Ok(if user.starts_with("CHUNK") { "[]" } else { "{}" }.to_string());
        }

        let reply = if user.starts_with("RAW") {
            r#"{"name": "Loader campaign", "description": "A loader drops a stealer",
                "created": "22-01-2025",
                "indicators": [{"type": "domain", "value": "c2.bad.example"}]}"#
        } else if user.starts_with("FILTERED") {
            r#"{"techniques": [{"technique_id": "T1059", "technique_name": "Command and Scripting Interpreter",
                "technique_usage": {"from_table": "PowerShell stager"}}]}"#
        } else {
            r#"[{"technique_id": "T1059", "technique_procedure": "base64 encoded command"}]"#
        };
        Ok(reply.to_string())
    }
}

/// Serves canned content, failing for selected URLs
struct FakeExtractor {
    calls: AtomicUsize,
    failing: Mutex<HashSet<String>>,
    delay: Duration,
    /// Releases the article as a stuck-reset elsewhere would, mid-attempt
    reset_in: Mutex<Option<Arc<SqliteStorage>>>,
}

impl FakeExtractor {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failing: Mutex::new(HashSet::new()),
            delay: Duration::ZERO,
            reset_in: Mutex::new(None),
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new()
        }
    }

    fn fail_for(&self, url: &str) {
        self.failing.lock().unwrap().insert(url.to_string());
    }

    fn reset_during_extract(&self, storage: Arc<SqliteStorage>) {
        *self.reset_in.lock().unwrap() = Some(storage);
    }
}

#[async_trait]
impl ContentExtractor for FakeExtractor {
    async fn extract(&self, url: &str) -> Result<ExtractedContent> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let reset_in = self.reset_in.lock().unwrap().clone();
        if let Some(storage) = reset_in {
            let mut article = storage.get_article_by_url(url).unwrap().unwrap();
            assert!(article.reset_stuck(Utc::now()));
            storage.save_article(&article).unwrap();
        }

        if self.failing.lock().unwrap().contains(url) {
            return Err(SentinelError::Fetch {
                url: url.to_string(),
                message: "HTTP 502".to_string(),
            });
        }

        Ok(ExtractedContent {
            raw_content: format!("RAW {}", url),
            filtered_content: format!("FILTERED {}", url),
            auxiliary_chunks: vec![format!("CHUNK {}", url)],
            ..Default::default()
        })
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}

/// Creates a test configuration with no pauses between requests
fn create_test_config() -> Config {
    let mut config = Config::default();
    config.discovery.page_delay_ms = 0;
    config.discovery.chunk_delay_ms = 0;
    config.discovery.max_pages = 5;
    config
}

struct Harness {
    storage: Arc<SqliteStorage>,
    extractor: Arc<FakeExtractor>,
    provider: Arc<FakeProvider>,
    orchestrator: ScanOrchestrator,
}

fn harness_with(extractor: FakeExtractor, provider: FakeProvider) -> Harness {
    let config = create_test_config();
    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    let extractor = Arc::new(extractor);
    let provider = Arc::new(provider);

    let mut dispatcher = Dispatcher::new();
    for name in [
        &config.discovery.classifier_provider,
        &config.enrichment.indicator_provider,
        &config.enrichment.technique_provider,
        &config.enrichment.chunk_provider,
    ] {
        dispatcher.register(name, "fake", provider.clone(), 2, Duration::from_secs(5));
    }

    let orchestrator = ScanOrchestrator::new(
        storage.clone(),
        Arc::new(dispatcher),
        extractor.clone(),
        &config,
    )
    .unwrap();

    Harness {
        storage,
        extractor,
        provider,
        orchestrator,
    }
}

fn harness() -> Harness {
    harness_with(FakeExtractor::new(), FakeProvider::new(false))
}

async fn serve_listing(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(LISTING_PAGE.to_string(), "text/html"),
        )
        .mount(server)
        .await;
}

/// Stores an article in the given state
fn seed_article(
    storage: &SqliteStorage,
    url: &str,
    status: ArticleStatus,
    failure_count: u32,
) -> ArticleRecord {
    let mut article = ArticleRecord::discover(url, "parent-1", Utc::now());
    article.status = status;
    article.failure_count = failure_count;
    storage.save_article(&article).unwrap();
    article
}

#[tokio::test]
async fn test_full_parent_scan_stores_reports() {
    let server = MockServer::start().await;
    serve_listing(&server).await;
    let h = harness();

    let parent = h.orchestrator.register_parent(&server.uri(), None).unwrap();
    let before = Utc::now();
    let summary = h.orchestrator.scan_parent(&parent.uid).await.unwrap();

    assert_eq!(summary.candidates, 2);
    assert_eq!(summary.articles, 2);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 0);

    let post_a = format!("{}/2024/post-a", server.uri());
    let article = h.storage.get_article_by_url(&post_a).unwrap().unwrap();
    assert_eq!(article.status, ArticleStatus::Success);
    assert_eq!(article.parent_uid, parent.uid);
    assert_eq!(article.failure_count, 0);
    assert!(article.last_success_at.is_some());

    let reports = h.storage.find_intel_reports(&post_a).unwrap();
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report["name"], "Loader campaign");
    assert_eq!(report["created"], "2025-01-22T00:00:00Z");
    assert_eq!(report["indicators"][0]["value"], "c2.bad.example");
    assert_eq!(report["techniques"][0]["id"], "T1059");
    assert_eq!(
        report["techniques"][0]["usage"][0]["usage"],
        "PowerShell stager\n* base64 encoded command"
    );
    assert_eq!(article.external_result.as_ref(), Some(report));
    assert_eq!(h.storage.count_intel_reports().unwrap(), 2);

    let parent = h.storage.get_parent(&parent.uid).unwrap().unwrap();
    let started = parent.last_scan_success_at.unwrap();
    assert!(started >= before - ChronoDuration::seconds(1));
    assert_eq!(parent.next_scan_at, started + ChronoDuration::hours(168));
    assert!(!parent.is_due(Utc::now()));

    let children = h.orchestrator.child_articles(&parent.uid).unwrap();
    assert_eq!(children.len(), 2);
}

#[tokio::test]
async fn test_second_scan_skips_finished_articles() {
    let server = MockServer::start().await;
    serve_listing(&server).await;
    let h = harness();

    let parent = h.orchestrator.register_parent(&server.uri(), None).unwrap();
    h.orchestrator.scan_parent(&parent.uid).await.unwrap();
    let extractions = h.extractor.calls.load(Ordering::SeqCst);

    let summary = h.orchestrator.scan_parent(&parent.uid).await.unwrap();
    assert_eq!(summary.articles, 2);
    assert_eq!(summary.skipped, 2);
    assert_eq!(h.extractor.calls.load(Ordering::SeqCst), extractions);
    assert_eq!(h.storage.count_intel_reports().unwrap(), 2);
}

#[tokio::test]
async fn test_failing_article_does_not_fail_parent() {
    let server = MockServer::start().await;
    serve_listing(&server).await;
    let h = harness();
    let post_b = format!("{}/2024/post-b", server.uri());
    h.extractor.fail_for(&post_b);

    let parent = h.orchestrator.register_parent(&server.uri(), None).unwrap();
    let summary = h.orchestrator.scan_parent(&parent.uid).await.unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);

    let article = h.storage.get_article_by_url(&post_b).unwrap().unwrap();
    assert_eq!(article.status, ArticleStatus::Failed);
    assert_eq!(article.failure_count, 1);
    let error = article.external_result.unwrap();
    assert!(error["error"].as_str().unwrap().contains("HTTP 502"));
    assert!(error["timestamp"].is_string());

    let parent = h.storage.get_parent(&parent.uid).unwrap().unwrap();
    assert!(parent.last_scan_success_at.is_some());
}

#[tokio::test]
async fn test_parent_error_leaves_parent_due() {
    let h = harness();
    let broken = ParentSchedule::new("not a url", 24, Utc::now());
    h.storage.save_parent(&broken).unwrap();

    assert!(h.orchestrator.scan_parent(&broken.uid).await.is_err());

    let reloaded = h.storage.get_parent(&broken.uid).unwrap().unwrap();
    assert!(reloaded.last_scan_attempt_at.is_some());
    assert!(reloaded.last_scan_success_at.is_none());
    assert!(reloaded.is_due(Utc::now()));

    let summary = h.orchestrator.run_sweep(Sweep::DueParents).await.unwrap();
    assert_eq!(summary.examined, 1);
    assert_eq!(summary.failed, 1);
}

#[tokio::test]
async fn test_scan_of_unknown_parent() {
    let h = harness();
    let err = h.orchestrator.scan_parent("missing").await.unwrap_err();
    assert!(matches!(err, SentinelError::ParentNotFound(uid) if uid == "missing"));
}

#[tokio::test]
async fn test_due_parent_sweep_scans_only_due_parents() {
    let server = MockServer::start().await;
    serve_listing(&server).await;
    let h = harness();

    let due = h.orchestrator.register_parent(&server.uri(), None).unwrap();
    let mut later = ParentSchedule::new("https://later.example/", 24, Utc::now());
    later.next_scan_at = Utc::now() + ChronoDuration::hours(2);
    h.storage.save_parent(&later).unwrap();

    let summary = h.orchestrator.run_due_parent_sweep().await.unwrap();
    assert_eq!(summary.examined, 1);
    assert_eq!(summary.succeeded, 1);

    let due = h.storage.get_parent(&due.uid).unwrap().unwrap();
    assert!(!due.is_due(Utc::now()));
    let later = h.storage.get_parent(&later.uid).unwrap().unwrap();
    assert!(later.last_scan_attempt_at.is_none());

    let again = h.orchestrator.run_due_parent_sweep().await.unwrap();
    assert_eq!(again.examined, 0);
}

#[tokio::test]
async fn test_registration_is_idempotent() {
    let h = harness();

    let first = h
        .orchestrator
        .register_parent("https://blog.example", Some(12))
        .unwrap();
    let second = h
        .orchestrator
        .register_parent("https://blog.example/", None)
        .unwrap();

    assert_eq!(first.uid, second.uid);
    assert_eq!(second.scan_interval_hours, 12);
    assert_eq!(h.orchestrator.list_parent_uids().unwrap(), vec![first.uid]);
}

#[tokio::test]
async fn test_retry_at_ceiling_parks_article() {
    let h = harness();
    let url = "https://blog.example/2024/flaky";
    seed_article(&h.storage, url, ArticleStatus::Failed, 4);
    h.extractor.fail_for(url);

    let summary = h.orchestrator.run_sweep(Sweep::Retry).await.unwrap();
    assert_eq!(summary.examined, 1);
    assert_eq!(summary.failed, 1);

    let article = h.storage.get_article_by_url(url).unwrap().unwrap();
    assert_eq!(article.status, ArticleStatus::MaxFailures);
    assert_eq!(article.failure_count, 5);

    // Parked articles are no longer picked up.
    let summary = h.orchestrator.run_retry_sweep().await.unwrap();
    assert_eq!(summary.examined, 0);
    assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_retry_below_ceiling_stays_failed() {
    let h = harness();
    let url = "https://blog.example/2024/flaky";
    seed_article(&h.storage, url, ArticleStatus::Failed, 3);
    h.extractor.fail_for(url);

    let outcome = h.orchestrator.process_article(url, "parent-1").await.unwrap();
    assert!(matches!(
        outcome,
        ArticleOutcome::Failed {
            status: ArticleStatus::Failed,
            ..
        }
    ));

    let article = h.storage.get_article_by_url(url).unwrap().unwrap();
    assert_eq!(article.status, ArticleStatus::Failed);
    assert_eq!(article.failure_count, 4);
}

#[tokio::test]
async fn test_retry_success_clears_failure_count() {
    let h = harness();
    let url = "https://blog.example/2024/recovered";
    seed_article(&h.storage, url, ArticleStatus::Failed, 2);

    let summary = h.orchestrator.run_retry_sweep().await.unwrap();
    assert_eq!(summary.succeeded, 1);

    let article = h.storage.get_article_by_url(url).unwrap().unwrap();
    assert_eq!(article.status, ArticleStatus::Success);
    assert_eq!(article.failure_count, 0);
}

#[tokio::test]
async fn test_pending_sweep_processes_pending_articles() {
    let h = harness();
    seed_article(&h.storage, "https://blog.example/2024/one", ArticleStatus::Pending, 0);
    seed_article(&h.storage, "https://blog.example/2024/two", ArticleStatus::Pending, 0);
    seed_article(&h.storage, "https://blog.example/2024/done", ArticleStatus::Success, 0);

    let summary = h.orchestrator.run_pending_sweep().await.unwrap();
    assert_eq!(summary.examined, 2);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(
        h.storage
            .count_articles_by_status(ArticleStatus::Success)
            .unwrap(),
        3
    );
    assert_eq!(h.storage.count_intel_reports().unwrap(), 2);
}

#[tokio::test]
async fn test_stuck_article_is_released_without_counting_a_failure() {
    let h = harness();
    let stale_url = "https://blog.example/2024/stale";
    let mut stale = seed_article(&h.storage, stale_url, ArticleStatus::InProgress, 2);
    stale.updated_at = Utc::now() - ChronoDuration::minutes(15);
    h.storage.save_article(&stale).unwrap();

    let fresh_url = "https://blog.example/2024/fresh";
    seed_article(&h.storage, fresh_url, ArticleStatus::InProgress, 0);

    let summary = h.orchestrator.run_sweep(Sweep::StuckReset).await.unwrap();
    assert_eq!(summary.examined, 1);
    assert_eq!(summary.succeeded, 1);

    let stale = h.storage.get_article_by_url(stale_url).unwrap().unwrap();
    assert_eq!(stale.status, ArticleStatus::Failed);
    assert_eq!(stale.failure_count, 2);

    let fresh = h.storage.get_article_by_url(fresh_url).unwrap().unwrap();
    assert_eq!(fresh.status, ArticleStatus::InProgress);

    // The released article is picked up by the retry sweep.
    let retried = h.orchestrator.run_retry_sweep().await.unwrap();
    assert_eq!(retried.succeeded, 1);
}

#[tokio::test]
async fn test_rediscovery_revives_parked_article() {
    let server = MockServer::start().await;
    serve_listing(&server).await;
    let h = harness();

    let parent = h.orchestrator.register_parent(&server.uri(), None).unwrap();
    let post_a = format!("{}/2024/post-a", server.uri());
    let mut parked = ArticleRecord::discover(&post_a, &parent.uid, Utc::now());
    parked.status = ArticleStatus::MaxFailures;
    parked.failure_count = 5;
    h.storage.save_article(&parked).unwrap();

    let summary = h.orchestrator.scan_parent(&parent.uid).await.unwrap();
    assert_eq!(summary.succeeded, 2);

    let revived = h.storage.get_article_by_url(&post_a).unwrap().unwrap();
    assert_eq!(revived.uid, parked.uid);
    assert_eq!(revived.status, ArticleStatus::Success);
    assert_eq!(revived.failure_count, 0);
}

#[tokio::test]
async fn test_empty_findings_fail_the_article() {
    let h = harness_with(FakeExtractor::new(), FakeProvider::new(true));
    let url = "https://blog.example/2024/quiet";
    seed_article(&h.storage, url, ArticleStatus::Pending, 0);

    let outcome = h.orchestrator.process_article(url, "parent-1").await.unwrap();
    assert_eq!(
        outcome,
        ArticleOutcome::Failed {
            status: ArticleStatus::Failed,
            reason: "Empty response from intelligence extraction".to_string(),
        }
    );
    assert_eq!(h.storage.count_intel_reports().unwrap(), 0);
    assert_eq!(h.provider.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_result_for_released_article_is_not_stored() {
    let h = harness();
    let url = "https://blog.example/2024/released";
    seed_article(&h.storage, url, ArticleStatus::Pending, 0);
    h.extractor.reset_during_extract(h.storage.clone());

    let outcome = h.orchestrator.process_article(url, "parent-1").await.unwrap();
    assert_eq!(outcome, ArticleOutcome::Superseded);

    let article = h.storage.get_article_by_url(url).unwrap().unwrap();
    assert_eq!(article.status, ArticleStatus::Failed);
    assert_eq!(article.failure_count, 0);
    assert!(article.external_result.is_none());
    assert_eq!(h.storage.count_intel_reports().unwrap(), 0);
}

#[tokio::test]
async fn test_finished_article_is_not_reprocessed() {
    let h = harness();
    let url = "https://blog.example/2024/done";
    seed_article(&h.storage, url, ArticleStatus::Success, 0);

    let outcome = h.orchestrator.process_article(url, "parent-1").await.unwrap();
    assert_eq!(outcome, ArticleOutcome::NotNeeded);
    assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.provider.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_same_url_is_processed_once_at_a_time() {
    let h = harness_with(
        FakeExtractor::slow(Duration::from_millis(100)),
        FakeProvider::new(false),
    );
    let url = "https://blog.example/2024/contended";
    seed_article(&h.storage, url, ArticleStatus::Pending, 0);

    let (first, second) = tokio::join!(
        h.orchestrator.process_article(url, "parent-1"),
        h.orchestrator.process_article(url, "parent-1"),
    );
    let mut outcomes = vec![first.unwrap(), second.unwrap()];
    outcomes.sort_by_key(|outcome| outcome == &ArticleOutcome::Succeeded);

    assert_eq!(
        outcomes,
        vec![ArticleOutcome::AlreadyRunning, ArticleOutcome::Succeeded]
    );
    assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_state_survives_reopening_the_database() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("sentinel.db");
    let url = "https://blog.example/2024/persisted";

    {
        let storage = SqliteStorage::new(&db_path).unwrap();
        seed_article(&storage, url, ArticleStatus::Failed, 1);
    }

    let storage = SqliteStorage::new(&db_path).unwrap();
    let article = storage.get_article_by_url(url).unwrap().unwrap();
    assert_eq!(article.status, ArticleStatus::Failed);
    assert_eq!(article.failure_count, 1);
    assert_eq!(storage.find_retryable_articles(5).unwrap().len(), 1);
}
