use serde::Deserialize;

/// Main configuration structure for Blog-Sentinel
///
/// Every section falls back to its defaults, so a file only needs the
/// `[[provider]]` entries the enrichment pipeline talks to.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub articles: ArticleConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default, rename = "provider")]
    pub providers: Vec<ProviderConfig>,
}

/// Periods of the recurring sweeps
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Whether the daemon mode starts the sweep timers at all
    pub enabled: bool,

    #[serde(rename = "parent-scan-interval-secs")]
    pub parent_scan_interval_secs: u64,

    #[serde(rename = "retry-failed-interval-secs")]
    pub retry_failed_interval_secs: u64,

    #[serde(rename = "process-pending-interval-secs")]
    pub process_pending_interval_secs: u64,

    #[serde(rename = "reset-stuck-interval-secs")]
    pub reset_stuck_interval_secs: u64,

    #[serde(rename = "health-check-interval-secs")]
    pub health_check_interval_secs: u64,

    /// How many due parents a single sweep scans at once
    #[serde(rename = "parent-concurrency")]
    pub parent_concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            parent_scan_interval_secs: 60,
            retry_failed_interval_secs: 600,
            process_pending_interval_secs: 180,
            reset_stuck_interval_secs: 300,
            health_check_interval_secs: 3600,
            parent_concurrency: 4,
        }
    }
}

/// Article lifecycle policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArticleConfig {
    /// Failure count at which an article is parked in MAX_FAILURES
    #[serde(rename = "max-failure-count")]
    pub max_failure_count: u32,

    /// Age after which an IN_PROGRESS article is considered abandoned
    #[serde(rename = "stuck-timeout-minutes")]
    pub stuck_timeout_minutes: u32,

    /// Scan interval given to parents registered without one
    #[serde(rename = "default-scan-interval-hours")]
    pub default_scan_interval_hours: u32,
}

impl Default for ArticleConfig {
    fn default() -> Self {
        Self {
            max_failure_count: 5,
            stuck_timeout_minutes: 10,
            default_scan_interval_hours: 168,
        }
    }
}

/// Crawl-then-classify discovery bounds
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    #[serde(rename = "max-pages")]
    pub max_pages: usize,

    #[serde(rename = "max-urls")]
    pub max_urls: usize,

    /// Candidate chunk size for a single classification call
    #[serde(rename = "max-urls-per-llm-call")]
    pub max_urls_per_llm_call: usize,

    /// Pause before each page fetch (milliseconds)
    #[serde(rename = "page-delay-ms")]
    pub page_delay_ms: u64,

    /// Pause between classification calls (milliseconds)
    #[serde(rename = "chunk-delay-ms")]
    pub chunk_delay_ms: u64,

    #[serde(rename = "fetch-timeout-secs")]
    pub fetch_timeout_secs: u64,

    #[serde(rename = "user-agent")]
    pub user_agent: String,

    #[serde(rename = "excluded-keywords")]
    pub excluded_keywords: Vec<String>,

    #[serde(rename = "classifier-provider")]
    pub classifier_provider: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_pages: 1,
            max_urls: 10,
            max_urls_per_llm_call: 25,
            page_delay_ms: 1000,
            chunk_delay_ms: 2000,
            fetch_timeout_secs: 30,
            user_agent: "Mozilla/5.0 (compatible; blog-sentinel/0.1)".to_string(),
            excluded_keywords: [
                "login", "signup", "admin", "tag", "category", "about", "contact", "privacy",
                "terms", "search", "archive", "rss", "feed",
            ]
            .iter()
            .map(|k| k.to_string())
            .collect(),
            classifier_provider: "azure-1".to_string(),
        }
    }
}

/// Which provider serves each enrichment call
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    #[serde(rename = "indicator-provider")]
    pub indicator_provider: String,

    #[serde(rename = "technique-provider")]
    pub technique_provider: String,

    #[serde(rename = "chunk-provider")]
    pub chunk_provider: String,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            indicator_provider: "azure-1".to_string(),
            technique_provider: "azure-1".to_string(),
            chunk_provider: "azure-2".to_string(),
        }
    }
}

/// Content extraction service
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    #[serde(rename = "base-url")]
    pub base_url: String,

    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "./blog-sentinel.db".to_string(),
        }
    }
}

/// A named completion provider
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub name: String,

    /// Base endpoint, e.g. `https://myres.openai.azure.com`
    pub endpoint: String,

    #[serde(rename = "api-key")]
    pub api_key: String,

    /// Model name, or the deployment name for Azure-style endpoints
    pub model: String,

    /// Presence selects the Azure deployment URL layout
    #[serde(default, rename = "api-version")]
    pub api_version: Option<String>,

    #[serde(default = "default_max_concurrent", rename = "max-concurrent-requests")]
    pub max_concurrent_requests: usize,

    #[serde(default = "default_call_timeout", rename = "timeout-secs")]
    pub timeout_secs: u64,
}

fn default_max_concurrent() -> usize {
    1
}

fn default_call_timeout() -> u64 {
    120
}
