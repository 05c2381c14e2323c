/// Scan schedule of a registered parent blog
use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, PartialEq)]
pub struct ParentSchedule {
    pub uid: String,
    /// Normalized base URL, unique per parent
    pub url: String,
    pub scan_interval_hours: u32,
    pub next_scan_at: DateTime<Utc>,
    pub last_scan_attempt_at: Option<DateTime<Utc>>,
    pub last_scan_success_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ParentSchedule {
    /// Creates a parent that is due immediately
    pub fn new(url: &str, scan_interval_hours: u32, now: DateTime<Utc>) -> Self {
        Self {
            uid: uuid::Uuid::new_v4().to_string(),
            url: url.to_string(),
            scan_interval_hours,
            next_scan_at: now,
            last_scan_attempt_at: None,
            last_scan_success_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_scan_at <= now
    }

    pub fn set_interval(&mut self, hours: u32, now: DateTime<Utc>) {
        self.scan_interval_hours = hours;
        self.updated_at = now;
    }

    pub fn record_attempt(&mut self, now: DateTime<Utc>) {
        self.last_scan_attempt_at = Some(now);
        self.updated_at = now;
    }

    /// Records a completed scan and moves the next scan one interval past
    /// the moment that scan started
    pub fn record_success(&mut self, scan_started_at: DateTime<Utc>, now: DateTime<Utc>) {
        self.last_scan_success_at = Some(scan_started_at);
        self.next_scan_at = scan_started_at + Duration::hours(self.scan_interval_hours as i64);
        self.updated_at = now;
    }
}
