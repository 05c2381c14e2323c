//! Database schema definitions
//!
//! Timestamps are fixed-width RFC 3339 UTC strings, so range predicates on
//! them compare correctly as text.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Registered parent blogs and their scan schedule
CREATE TABLE IF NOT EXISTS parent_blogs (
    uid TEXT PRIMARY KEY,
    url TEXT NOT NULL UNIQUE,
    scan_interval_hours INTEGER NOT NULL,
    next_scan_at TEXT NOT NULL,
    last_scan_attempt_at TEXT,
    last_scan_success_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_parent_blogs_next_scan ON parent_blogs(next_scan_at);

-- Articles discovered under parents
CREATE TABLE IF NOT EXISTS articles (
    uid TEXT PRIMARY KEY,
    url TEXT NOT NULL UNIQUE,
    parent_uid TEXT NOT NULL,
    status TEXT NOT NULL,
    failure_count INTEGER NOT NULL DEFAULT 0,
    discovered_at TEXT NOT NULL,
    last_attempt_at TEXT,
    last_success_at TEXT,
    external_result TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_articles_status ON articles(status);
CREATE INDEX IF NOT EXISTS idx_articles_parent ON articles(parent_uid);

-- Enrichment reports
CREATE TABLE IF NOT EXISTS intel_reports (
    id TEXT PRIMARY KEY,
    report_url TEXT NOT NULL,
    report TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_intel_reports_url ON intel_reports(report_url);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
