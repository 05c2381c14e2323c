//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::state::{ArticleRecord, ArticleStatus, ParentSchedule};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::SentinelError;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const PARENT_COLUMNS: &str = "uid, url, scan_interval_hours, next_scan_at, last_scan_attempt_at, \
     last_scan_success_at, created_at, updated_at";

const ARTICLE_COLUMNS: &str = "uid, url, parent_uid, status, failure_count, discovered_at, \
     last_attempt_at, last_success_at, external_result, created_at, updated_at";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(SentinelError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, SentinelError> {
        let conn = Connection::open(path).map_err(StorageError::from)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )
        .map_err(StorageError::from)?;

        initialize_schema(&conn).map_err(StorageError::from)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database (for tests and dry runs)
    pub fn new_in_memory() -> Result<Self, SentinelError> {
        let conn = Connection::open_in_memory().map_err(StorageError::from)?;
        initialize_schema(&conn).map_err(StorageError::from)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Database("connection lock poisoned".to_string()))
    }

    fn query_parents(
        &self,
        clause: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> StorageResult<Vec<ParentSchedule>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM parent_blogs {}", PARENT_COLUMNS, clause);
        let mut stmt = conn.prepare(&sql)?;
        let parents = stmt
            .query_map(params, row_to_parent)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(parents)
    }

    fn query_articles(
        &self,
        clause: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> StorageResult<Vec<ArticleRecord>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM articles {}", ARTICLE_COLUMNS, clause);
        let mut stmt = conn.prepare(&sql)?;
        let articles = stmt
            .query_map(params, row_to_article)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(articles)
    }
}

// ===== Column Conversions =====

fn to_db_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn to_db_time_opt(t: &Option<DateTime<Utc>>) -> Option<String> {
    t.as_ref().map(to_db_time)
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_db_time(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn get_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    parse_db_time(idx, &s)
}

fn get_time_opt(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| parse_db_time(idx, &s)).transpose()
}

fn row_to_parent(row: &Row<'_>) -> rusqlite::Result<ParentSchedule> {
    Ok(ParentSchedule {
        uid: row.get(0)?,
        url: row.get(1)?,
        scan_interval_hours: row.get(2)?,
        next_scan_at: get_time(row, 3)?,
        last_scan_attempt_at: get_time_opt(row, 4)?,
        last_scan_success_at: get_time_opt(row, 5)?,
        created_at: get_time(row, 6)?,
        updated_at: get_time(row, 7)?,
    })
}

fn row_to_article(row: &Row<'_>) -> rusqlite::Result<ArticleRecord> {
    let status_str: String = row.get(3)?;
    let status = ArticleStatus::from_db_string(&status_str).ok_or_else(|| {
        conversion_error(
            3,
            StorageError::Serialization(format!("unknown article status '{}'", status_str)),
        )
    })?;

    let external_result = row
        .get::<_, Option<String>>(8)?
        .map(|text| serde_json::from_str::<Value>(&text).map_err(|e| conversion_error(8, e)))
        .transpose()?;

    Ok(ArticleRecord {
        uid: row.get(0)?,
        url: row.get(1)?,
        parent_uid: row.get(2)?,
        status,
        failure_count: row.get(4)?,
        discovered_at: get_time(row, 5)?,
        last_attempt_at: get_time_opt(row, 6)?,
        last_success_at: get_time_opt(row, 7)?,
        external_result,
        created_at: get_time(row, 9)?,
        updated_at: get_time(row, 10)?,
    })
}

impl Storage for SqliteStorage {
    // ===== Parent Blogs =====

    fn save_parent(&self, parent: &ParentSchedule) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO parent_blogs (uid, url, scan_interval_hours, next_scan_at,
                 last_scan_attempt_at, last_scan_success_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(uid) DO UPDATE SET
                 url = excluded.url,
                 scan_interval_hours = excluded.scan_interval_hours,
                 next_scan_at = excluded.next_scan_at,
                 last_scan_attempt_at = excluded.last_scan_attempt_at,
                 last_scan_success_at = excluded.last_scan_success_at,
                 updated_at = excluded.updated_at",
            params![
                parent.uid,
                parent.url,
                parent.scan_interval_hours,
                to_db_time(&parent.next_scan_at),
                to_db_time_opt(&parent.last_scan_attempt_at),
                to_db_time_opt(&parent.last_scan_success_at),
                to_db_time(&parent.created_at),
                to_db_time(&parent.updated_at),
            ],
        )?;
        Ok(())
    }

    fn get_parent(&self, uid: &str) -> StorageResult<Option<ParentSchedule>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM parent_blogs WHERE uid = ?1", PARENT_COLUMNS);
        let parent = conn
            .query_row(&sql, params![uid], row_to_parent)
            .optional()?;
        Ok(parent)
    }

    fn get_parent_by_url(&self, url: &str) -> StorageResult<Option<ParentSchedule>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM parent_blogs WHERE url = ?1", PARENT_COLUMNS);
        let parent = conn
            .query_row(&sql, params![url], row_to_parent)
            .optional()?;
        Ok(parent)
    }

    fn list_parents(&self) -> StorageResult<Vec<ParentSchedule>> {
        self.query_parents("ORDER BY created_at DESC", &[])
    }

    fn find_due_parents(&self, now: DateTime<Utc>) -> StorageResult<Vec<ParentSchedule>> {
        let now = to_db_time(&now);
        self.query_parents("WHERE next_scan_at <= ?1 ORDER BY next_scan_at ASC", &[&now])
    }

    fn count_parents(&self) -> StorageResult<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM parent_blogs", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ===== Articles =====

    fn save_article(&self, article: &ArticleRecord) -> StorageResult<()> {
        let external_result = article
            .external_result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO articles (uid, url, parent_uid, status, failure_count, discovered_at,
                 last_attempt_at, last_success_at, external_result, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(url) DO UPDATE SET
                 status = excluded.status,
                 failure_count = excluded.failure_count,
                 last_attempt_at = excluded.last_attempt_at,
                 last_success_at = excluded.last_success_at,
                 external_result = excluded.external_result,
                 updated_at = excluded.updated_at",
            params![
                article.uid,
                article.url,
                article.parent_uid,
                article.status.to_db_string(),
                article.failure_count,
                to_db_time(&article.discovered_at),
                to_db_time_opt(&article.last_attempt_at),
                to_db_time_opt(&article.last_success_at),
                external_result,
                to_db_time(&article.created_at),
                to_db_time(&article.updated_at),
            ],
        )?;
        Ok(())
    }

    fn get_article(&self, uid: &str) -> StorageResult<Option<ArticleRecord>> {
        Ok(self
            .query_articles("WHERE uid = ?1", &[&uid])?
            .into_iter()
            .next())
    }

    fn get_article_by_url(&self, url: &str) -> StorageResult<Option<ArticleRecord>> {
        Ok(self
            .query_articles("WHERE url = ?1", &[&url])?
            .into_iter()
            .next())
    }

    fn list_articles(&self) -> StorageResult<Vec<ArticleRecord>> {
        self.query_articles("ORDER BY discovered_at ASC", &[])
    }

    fn find_articles_by_status(&self, status: ArticleStatus) -> StorageResult<Vec<ArticleRecord>> {
        let status = status.to_db_string();
        self.query_articles("WHERE status = ?1 ORDER BY discovered_at ASC", &[&status])
    }

    fn find_retryable_articles(&self, max_failures: u32) -> StorageResult<Vec<ArticleRecord>> {
        let failed = ArticleStatus::Failed.to_db_string();
        self.query_articles(
            "WHERE status = ?1 AND failure_count < ?2 ORDER BY updated_at ASC",
            &[&failed, &max_failures],
        )
    }

    fn find_articles_by_parent(&self, parent_uid: &str) -> StorageResult<Vec<ArticleRecord>> {
        self.query_articles(
            "WHERE parent_uid = ?1 ORDER BY discovered_at ASC",
            &[&parent_uid],
        )
    }

    fn count_articles_by_status(&self, status: ArticleStatus) -> StorageResult<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM articles WHERE status = ?1",
            params![status.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ===== Enrichment Reports =====

    fn save_intel_report(&self, report_url: &str, report: &Value) -> StorageResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let body =
            serde_json::to_string(report).map_err(|e| StorageError::Serialization(e.to_string()))?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO intel_reports (id, report_url, report, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, report_url, body, to_db_time(&Utc::now())],
        )?;
        Ok(id)
    }

    fn find_intel_reports(&self, report_url: &str) -> StorageResult<Vec<Value>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT report FROM intel_reports WHERE report_url = ?1 ORDER BY created_at ASC",
        )?;
        let reports = stmt
            .query_map(params![report_url], |row| {
                let text: String = row.get(0)?;
                serde_json::from_str::<Value>(&text).map_err(|e| conversion_error(0, e))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(reports)
    }

    fn count_intel_reports(&self) -> StorageResult<u64> {
        let conn = self.conn()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM intel_reports", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
