//! All-time report and downloadable exports.
//!
//! Spreadsheet and PDF engines live outside this crate; a [`ReportRenderer`]
//! turns the queried rows into a document, and the crate ships a CSV and a
//! plain-text implementation.

use std::collections::BTreeMap;
use std::io::Write;

use csv::Writer;
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::aggregate::{Aggregator, Dimension, MonthKey, Window};
use crate::db::map_issue;
use crate::error::{Result, TrackerError};
use crate::models::Issue;
use crate::schema::issues;

/// Issue count for one `YYYY-MM`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthCount {
    pub month: String,
    pub count: u64,
}

/// Completed vs. not completed across all time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompletionStats {
    pub completed: u64,
    pub pending: u64,
}

/// Dashboard report over every stored issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyReport {
    pub monthly_issues: Vec<MonthCount>,
    pub issue_type_stats: BTreeMap<String, u64>,
    pub source_stats: BTreeMap<String, u64>,
    pub completion_stats: CompletionStats,
}

impl MonthlyReport {
    pub fn compute(conn: &Connection) -> Result<Self> {
        let aggregator = Aggregator::new(conn);
        let split = aggregator.completion_split(Window::AllTime)?;

        Ok(Self {
            monthly_issues: aggregator
                .monthly_counts()?
                .into_iter()
                .map(|(month, count)| MonthCount { month, count })
                .collect(),
            issue_type_stats: aggregator.group_by(Window::AllTime, Dimension::IssueType)?,
            source_stats: aggregator.group_by(Window::AllTime, Dimension::Source)?,
            completion_stats: CompletionStats {
                completed: split.completed,
                pending: split.uncompleted,
            },
        })
    }
}

/// Issues created in `month`, oldest first
pub fn issues_in_month(conn: &Connection, month: MonthKey) -> Result<Vec<Issue>> {
    let Some((start, end)) = Window::Month(month).bounds() else {
        return Ok(Vec::new());
    };

    let mut stmt = conn.prepare(&format!(
        "SELECT * FROM {table} WHERE {col} >= ?1 AND {col} < ?2 ORDER BY {col} ASC, {id} ASC",
        table = issues::TABLE,
        col = issues::CREATED_AT,
        id = issues::ID
    ))?;
    let rows = stmt.query_map(params![start, end], map_issue)?;

    let mut results = Vec::new();
    for issue in rows {
        results.push(issue?);
    }
    Ok(results)
}

/// A rendered download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub content_type: &'static str,
    pub file_name: String,
    pub body: Vec<u8>,
}

/// Turns report rows into a downloadable document
pub trait ReportRenderer: Send + Sync {
    /// Per-month issue counts
    fn render_monthly_counts(&self, rows: &[MonthCount]) -> Result<RenderedDocument>;

    /// Every issue of one month
    fn render_issue_listing(&self, month: MonthKey, issues: &[Issue]) -> Result<RenderedDocument>;
}

/// Spreadsheet-importable CSV
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvRenderer;

impl CsvRenderer {
    fn finish(writer: Writer<Vec<u8>>) -> Result<Vec<u8>> {
        writer.into_inner().map_err(|e| TrackerError::Io(e.into_error()))
    }
}

impl ReportRenderer for CsvRenderer {
    fn render_monthly_counts(&self, rows: &[MonthCount]) -> Result<RenderedDocument> {
        let mut writer = Writer::from_writer(Vec::new());
        writer.write_record(["Month", "Issue count"])?;
        for row in rows {
            let count = row.count.to_string();
            writer.write_record([row.month.as_str(), count.as_str()])?;
        }

        Ok(RenderedDocument {
            content_type: "text/csv; charset=utf-8",
            file_name: "Issue_Report.csv".to_string(),
            body: Self::finish(writer)?,
        })
    }

    fn render_issue_listing(&self, month: MonthKey, issues: &[Issue]) -> Result<RenderedDocument> {
        let mut writer = Writer::from_writer(Vec::new());
        writer.write_record(["ID", "Title", "Status", "Source", "Type", "Created"])?;
        for issue in issues {
            let id = issue.id.to_string();
            let created = issue.created_at.format("%Y-%m-%d %H:%M:%S").to_string();
            writer.write_record([
                id.as_str(),
                issue.title.as_str(),
                issue.status.as_str(),
                issue.source.as_deref().unwrap_or(""),
                issue.issue_type.as_deref().unwrap_or(""),
                created.as_str(),
            ])?;
        }

        Ok(RenderedDocument {
            content_type: "text/csv; charset=utf-8",
            file_name: format!("Issue_Report_{month}.csv"),
            body: Self::finish(writer)?,
        })
    }
}

/// Plain-text document, one block per issue
#[derive(Debug, Clone, Copy, Default)]
pub struct TextRenderer;

impl ReportRenderer for TextRenderer {
    fn render_monthly_counts(&self, rows: &[MonthCount]) -> Result<RenderedDocument> {
        let mut body = Vec::new();
        writeln!(body, "Issue report")?;
        writeln!(body)?;
        for row in rows {
            writeln!(body, "{}: {}", row.month, row.count)?;
        }

        Ok(RenderedDocument {
            content_type: "text/plain; charset=utf-8",
            file_name: "Issue_Report.txt".to_string(),
            body,
        })
    }

    fn render_issue_listing(&self, month: MonthKey, issues: &[Issue]) -> Result<RenderedDocument> {
        let mut body = Vec::new();
        writeln!(body, "Monthly issue report {month}")?;
        writeln!(body, "Total issues: {}", issues.len())?;

        for issue in issues {
            writeln!(body)?;
            writeln!(body, "#{} {}", issue.id, issue.title)?;
            writeln!(body, "  Status: {}", issue.status)?;
            writeln!(body, "  Source: {}", issue.source.as_deref().unwrap_or("-"))?;
            writeln!(body, "  Type: {}", issue.issue_type.as_deref().unwrap_or("-"))?;
            writeln!(body, "  Created: {}", issue.created_at.format("%Y-%m-%d %H:%M"))?;
            if let Some(assignee) = &issue.assigned_to {
                writeln!(body, "  Assigned to: {assignee}")?;
            }
            if let Some(description) = &issue.description {
                writeln!(body, "  {description}")?;
            }
        }

        Ok(RenderedDocument {
            content_type: "text/plain; charset=utf-8",
            file_name: format!("Monthly_Report_{month}.txt"),
            body,
        })
    }
}
