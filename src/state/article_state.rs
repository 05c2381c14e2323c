/// Article lifecycle definitions
///
/// Every change to an article's status goes through one of the transition
/// methods on [`ArticleRecord`], so the state machine lives in one place.
use crate::{Result, SentinelError};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::fmt;

/// Processing status of a discovered article
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArticleStatus {
    /// Discovered (or rediscovered) and waiting for a processing attempt
    Pending,

    /// A processing attempt is running
    InProgress,

    /// Enrichment produced a stored result
    Success,

    /// The last attempt failed; eligible for retry below the failure ceiling
    Failed,

    /// Failure ceiling reached; only a parent rediscovery revives it
    MaxFailures,
}

impl ArticleStatus {
    /// Returns true for statuses no sweep will pick up again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::MaxFailures)
    }

    /// Returns true for failure statuses
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::MaxFailures)
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::MaxFailures => "MAX_FAILURES",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "IN_PROGRESS" => Some(Self::InProgress),
            "SUCCESS" => Some(Self::Success),
            "FAILED" => Some(Self::Failed),
            "MAX_FAILURES" => Some(Self::MaxFailures),
            _ => None,
        }
    }

    /// Returns all possible statuses
    pub fn all_statuses() -> Vec<Self> {
        vec![
            Self::Pending,
            Self::InProgress,
            Self::Success,
            Self::Failed,
            Self::MaxFailures,
        ]
    }
}

impl fmt::Display for ArticleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Persistent record of one article discovered under a parent blog
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleRecord {
    pub uid: String,
    pub url: String,
    pub parent_uid: String,
    pub status: ArticleStatus,
    pub failure_count: u32,
    pub discovered_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    /// Enrichment report on success, `{error, timestamp}` on failure
    pub external_result: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Whether an article (possibly not yet stored) should be processed
///
/// Absent articles are always processed.
pub fn needs_processing(record: Option<&ArticleRecord>, max_failures: u32) -> bool {
    record.map_or(true, |r| r.needs_processing(max_failures))
}

impl ArticleRecord {
    /// Creates a freshly discovered PENDING article
    pub fn discover(url: &str, parent_uid: &str, now: DateTime<Utc>) -> Self {
        Self {
            uid: uuid::Uuid::new_v4().to_string(),
            url: url.to_string(),
            parent_uid: parent_uid.to_string(),
            status: ArticleStatus::Pending,
            failure_count: 0,
            discovered_at: now,
            last_attempt_at: None,
            last_success_at: None,
            external_result: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// PENDING, or FAILED below the failure ceiling
    pub fn needs_processing(&self, max_failures: u32) -> bool {
        match self.status {
            ArticleStatus::Pending => true,
            ArticleStatus::Failed => self.failure_count < max_failures,
            _ => false,
        }
    }

    /// IN_PROGRESS and not updated since `threshold`
    pub fn is_stuck(&self, threshold: DateTime<Utc>) -> bool {
        self.status == ArticleStatus::InProgress && self.updated_at < threshold
    }

    fn invalid(&self, to: ArticleStatus) -> SentinelError {
        SentinelError::InvalidTransition {
            from: self.status,
            to,
        }
    }

    /// PENDING / retryable FAILED → IN_PROGRESS, stamping the attempt time
    pub fn begin_attempt(&mut self, max_failures: u32, now: DateTime<Utc>) -> Result<()> {
        if !self.needs_processing(max_failures) {
            return Err(self.invalid(ArticleStatus::InProgress));
        }

        self.status = ArticleStatus::InProgress;
        self.last_attempt_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// IN_PROGRESS → SUCCESS with the enrichment report attached
    ///
    /// Clears the failure count.
    pub fn complete(&mut self, report: Value, now: DateTime<Utc>) -> Result<()> {
        if self.status != ArticleStatus::InProgress {
            return Err(self.invalid(ArticleStatus::Success));
        }

        self.status = ArticleStatus::Success;
        self.failure_count = 0;
        self.last_success_at = Some(now);
        self.external_result = Some(report);
        self.updated_at = now;
        Ok(())
    }

    /// IN_PROGRESS → FAILED, or MAX_FAILURES once the ceiling is reached
    ///
    /// # Returns
    ///
    /// The status the article ended up in
    pub fn fail(
        &mut self,
        reason: &str,
        max_failures: u32,
        now: DateTime<Utc>,
    ) -> Result<ArticleStatus> {
        if self.status != ArticleStatus::InProgress {
            return Err(self.invalid(ArticleStatus::Failed));
        }

        self.failure_count += 1;
        self.status = if self.failure_count >= max_failures {
            ArticleStatus::MaxFailures
        } else {
            ArticleStatus::Failed
        };
        self.external_result = Some(json!({
            "error": reason,
            "timestamp": now.to_rfc3339(),
        }));
        self.updated_at = now;
        Ok(self.status)
    }

    /// FAILED / MAX_FAILURES → PENDING with the failure count cleared
    ///
    /// Returns false (and changes nothing) for any other status.
    pub fn rediscover(&mut self, now: DateTime<Utc>) -> bool {
        if !self.status.is_failure() {
            return false;
        }

        self.status = ArticleStatus::Pending;
        self.failure_count = 0;
        self.updated_at = now;
        true
    }

    /// Abandoned IN_PROGRESS → FAILED without counting a failure
    pub fn reset_stuck(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != ArticleStatus::InProgress {
            return false;
        }

        self.status = ArticleStatus::Failed;
        self.updated_at = now;
        true
    }
}
