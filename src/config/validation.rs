use crate::config::types::{
    ArticleConfig, Config, DiscoveryConfig, ExtractionConfig, ProviderConfig, SchedulerConfig,
};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_scheduler_config(&config.scheduler)?;
    validate_article_config(&config.articles)?;
    validate_discovery_config(&config.discovery)?;
    validate_extraction_config(&config.extraction)?;
    validate_storage_path(&config.storage.database_path)?;
    validate_providers(&config.providers)?;
    validate_provider_references(config)?;
    Ok(())
}

fn require_positive(name: &str, value: u64) -> Result<(), ConfigError> {
    if value < 1 {
        return Err(ConfigError::Validation(format!(
            "{} must be >= 1, got {}",
            name, value
        )));
    }
    Ok(())
}

fn validate_scheduler_config(config: &SchedulerConfig) -> Result<(), ConfigError> {
    require_positive("parent-scan-interval-secs", config.parent_scan_interval_secs)?;
    require_positive("retry-failed-interval-secs", config.retry_failed_interval_secs)?;
    require_positive(
        "process-pending-interval-secs",
        config.process_pending_interval_secs,
    )?;
    require_positive("reset-stuck-interval-secs", config.reset_stuck_interval_secs)?;
    require_positive("health-check-interval-secs", config.health_check_interval_secs)?;
    require_positive("parent-concurrency", config.parent_concurrency as u64)?;
    Ok(())
}

fn validate_article_config(config: &ArticleConfig) -> Result<(), ConfigError> {
    require_positive("max-failure-count", config.max_failure_count as u64)?;
    require_positive("stuck-timeout-minutes", config.stuck_timeout_minutes as u64)?;
    require_positive(
        "default-scan-interval-hours",
        config.default_scan_interval_hours as u64,
    )?;
    Ok(())
}

fn validate_discovery_config(config: &DiscoveryConfig) -> Result<(), ConfigError> {
    require_positive("max-pages", config.max_pages as u64)?;
    require_positive("max-urls", config.max_urls as u64)?;
    require_positive("max-urls-per-llm-call", config.max_urls_per_llm_call as u64)?;
    require_positive("fetch-timeout-secs", config.fetch_timeout_secs)?;

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if config.excluded_keywords.iter().any(|k| k.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "excluded-keywords cannot contain empty entries".to_string(),
        ));
    }

    Ok(())
}

fn validate_extraction_config(config: &ExtractionConfig) -> Result<(), ConfigError> {
    validate_http_url("extraction base-url", &config.base_url)?;
    require_positive("extraction timeout-secs", config.timeout_secs)?;
    Ok(())
}

fn validate_storage_path(path: &str) -> Result<(), ConfigError> {
    if path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_http_url(what: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", what, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            what, value
        )));
    }

    Ok(())
}

fn validate_providers(providers: &[ProviderConfig]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for provider in providers {
        if provider.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "provider name cannot be empty".to_string(),
            ));
        }

        if !seen.insert(provider.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "provider '{}' is configured more than once",
                provider.name
            )));
        }

        validate_http_url(&format!("endpoint of provider '{}'", provider.name), &provider.endpoint)?;

        if provider.model.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "provider '{}' must name a model",
                provider.name
            )));
        }

        if provider.max_concurrent_requests < 1 {
            return Err(ConfigError::Validation(format!(
                "max-concurrent-requests of provider '{}' must be >= 1, got {}",
                provider.name, provider.max_concurrent_requests
            )));
        }

        require_positive(
            &format!("timeout-secs of provider '{}'", provider.name),
            provider.timeout_secs,
        )?;
    }

    Ok(())
}

/// Every provider named by discovery or enrichment must exist.
///
/// Skipped when no provider is configured so read-only modes still work.
fn validate_provider_references(config: &Config) -> Result<(), ConfigError> {
    if config.providers.is_empty() {
        return Ok(());
    }

    let known: HashSet<&str> = config.providers.iter().map(|p| p.name.as_str()).collect();
    let references = [
        ("classifier-provider", &config.discovery.classifier_provider),
        ("indicator-provider", &config.enrichment.indicator_provider),
        ("technique-provider", &config.enrichment.technique_provider),
        ("chunk-provider", &config.enrichment.chunk_provider),
    ];

    for (key, name) in references {
        if !known.contains(name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "{} refers to unknown provider '{}'",
                key, name
            )));
        }
    }

    Ok(())
}
