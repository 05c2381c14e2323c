//! Assembly of the stored intelligence report

use crate::enrichment::merge::{Indicator, IndicatorFindings, Technique};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::Serialize;

const REPORT_TYPE: &str = "malware";
const REFERENCE_TYPE: &str = "External Reference";
const USAGE_SOURCE: &str = "AI Report";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportReference {
    pub title: String,
    pub report_url: String,
    pub report_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TechniqueUsage {
    pub name: String,
    pub usage: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportTechnique {
    pub id: String,
    pub name: Option<String>,
    pub usage: Vec<TechniqueUsage>,
    pub sub_techniques: Vec<String>,
    pub entities: Vec<String>,
}

impl From<Technique> for ReportTechnique {
    fn from(technique: Technique) -> Self {
        let usage = technique.usage_text();
        Self {
            id: technique.id,
            name: technique.name,
            usage: vec![TechniqueUsage {
                name: USAGE_SOURCE.to_string(),
                usage,
            }],
            sub_techniques: Vec::new(),
            entities: Vec::new(),
        }
    }
}

/// Enrichment result for one article
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntelReport {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub created: String,
    pub reports: Vec<ReportReference>,
    pub indicators: Vec<Indicator>,
    pub techniques: Vec<ReportTechnique>,
    pub description: Option<String>,
    pub last_modified: String,
}

fn format_instant(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Midnight UTC of a `DD-MM-YYYY` date
fn parse_published(date: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(date.trim(), "%d-%m-%Y")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

impl IntelReport {
    /// Builds the report for an article
    ///
    /// # Arguments
    ///
    /// * `url` - The article URL, referenced by the report
    /// * `findings` - Result of the indicators call
    /// * `techniques` - Merged techniques
    /// * `title` - Fallback name when the provider gave none
    /// * `now` - Used for `created` when no publication date parses
    pub fn assemble(
        url: &str,
        findings: IndicatorFindings,
        techniques: Vec<Technique>,
        title: Option<&str>,
        now: DateTime<Utc>,
    ) -> Self {
        let name = findings
            .name
            .or_else(|| title.map(str::to_string))
            .unwrap_or_else(|| url.to_string());

        let created = match findings.created.as_deref() {
            Some(date) => parse_published(date).unwrap_or_else(|| {
                tracing::warn!("Could not parse publication date '{}' for {}", date, url);
                now
            }),
            None => now,
        };
        let created = format_instant(created);

        Self {
            id: format!("malware--{}", uuid::Uuid::new_v4()),
            reports: vec![ReportReference {
                title: name.clone(),
                report_url: url.to_string(),
                report_type: REFERENCE_TYPE.to_string(),
            }],
            name,
            kind: REPORT_TYPE.to_string(),
            last_modified: created.clone(),
            created,
            indicators: findings.indicators,
            techniques: techniques.into_iter().map(ReportTechnique::from).collect(),
            description: findings.description,
        }
    }

    /// No indicators, no techniques and no description
    pub fn is_empty(&self) -> bool {
        self.indicators.is_empty()
            && self.techniques.is_empty()
            && self
                .description
                .as_deref()
                .map_or(true, |d| d.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 0).unwrap()
    }

    #[test]
    fn test_assemble_full_report() {
        let findings = IndicatorFindings {
            name: Some("Op Example".to_string()),
            description: Some("Intrusion summary".to_string()),
            created: Some("22-01-2025".to_string()),
            indicators: vec![Indicator {
                kind: "ip".to_string(),
                value: Some("99.88.12.12".to_string()),
                ..Indicator::default()
            }],
        };
        let techniques = vec![Technique {
            id: "T1059".to_string(),
            name: Some("Command and Scripting Interpreter".to_string()),
            procedures: vec!["ran PowerShell".to_string()],
            ..Technique::default()
        }];

        let report = IntelReport::assemble("https://x.com/a/b", findings, techniques, None, now());
        let value = serde_json::to_value(&report).unwrap();

        assert!(report.id.starts_with("malware--"));
        assert_eq!(value["type"], "malware");
        assert_eq!(value["created"], "2025-01-22T00:00:00Z");
        assert_eq!(value["last_modified"], "2025-01-22T00:00:00Z");
        assert_eq!(
            value["reports"],
            json!([{"title": "Op Example", "report_url": "https://x.com/a/b", "report_type": "External Reference"}])
        );
        assert_eq!(value["indicators"], json!([{"type": "ip", "value": "99.88.12.12"}]));
        assert_eq!(
            value["techniques"][0],
            json!({
                "id": "T1059",
                "name": "Command and Scripting Interpreter",
                "usage": [{"name": "AI Report", "usage": "* ran PowerShell"}],
                "sub_techniques": [],
                "entities": []
            })
        );
        assert!(!report.is_empty());
    }

    #[test]
    fn test_name_falls_back_to_title_then_url() {
        let titled = IntelReport::assemble(
            "https://x.com/a/b",
            IndicatorFindings::default(),
            Vec::new(),
            Some("Blog title"),
            now(),
        );
        assert_eq!(titled.name, "Blog title");

        let untitled = IntelReport::assemble(
            "https://x.com/a/b",
            IndicatorFindings::default(),
            Vec::new(),
            None,
            now(),
        );
        assert_eq!(untitled.name, "https://x.com/a/b");
        assert_eq!(untitled.reports[0].title, "https://x.com/a/b");
    }

    #[test]
    fn test_unparseable_date_uses_now() {
        let findings = IndicatorFindings {
            created: Some("2025-01-22 10:00:00".to_string()),
            ..IndicatorFindings::default()
        };
        let report = IntelReport::assemble("https://x.com/a/b", findings, Vec::new(), None, now());
        assert_eq!(report.created, "2025-03-01T12:30:00Z");
    }

    #[test]
    fn test_is_empty() {
        let mut report = IntelReport::assemble(
            "https://x.com/a/b",
            IndicatorFindings::default(),
            Vec::new(),
            None,
            now(),
        );
        assert!(report.is_empty());

        report.description = Some("  ".to_string());
        assert!(report.is_empty());

        report.description = Some("Something happened".to_string());
        assert!(!report.is_empty());
    }
}
