use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{error, info};

use crate::aggregate::{Aggregator, CompletionSplit, Dimension, MonthKey, Window};
use crate::attachments::{content_type_for, remove_all, save_all, AttachmentStore, PendingUpload};
use crate::db::{now, Database};
use crate::error::{ErrorKind, Result, TrackerError};
use crate::metrics::{MetricsCollector, MetricsTimer};
use crate::models::{Comment, CommentChanges, Issue, IssueChanges, NewComment, NewIssue};
use crate::query::{IssuePage, IssueQuery, ListParams};
use crate::report::{issues_in_month, MonthlyReport, RenderedDocument, ReportRenderer};
use crate::summary::{
    default_rollup_month, AnnualSummaryView, MonthlySummaryView, SummaryPeriod, SummaryRecord,
    SummaryUpserter,
};
use crate::trend::{TrendComposer, YearlyTrend};
use crate::validation::InputValidator;

/// Page size bounds applied to listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 100,
        }
    }
}

/// Status distribution over every stored issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueStats {
    pub total: u64,
    pub by_status: BTreeMap<String, u64>,
    pub completed: u64,
    pub uncompleted: u64,
}

/// Async entry point for every tracker operation
///
/// Store work runs on tokio's blocking pool so request handlers never block
/// the runtime. Each call borrows a pooled connection for its own duration.
#[derive(Clone)]
pub struct TrackerService {
    db: Database,
    attachments: Arc<dyn AttachmentStore>,
    metrics: MetricsCollector,
    limits: PageLimits,
}

impl TrackerService {
    pub fn new(db: Database, attachments: Arc<dyn AttachmentStore>, limits: PageLimits) -> Self {
        let metrics = MetricsCollector::default();
        metrics.update_connection_pool_size(db.max_connections());
        Self {
            db,
            attachments,
            metrics,
            limits,
        }
    }

    async fn run<T, F>(&self, operation: &'static str, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
    {
        let db = self.db.clone();
        let timer = MetricsTimer::new(self.metrics, operation);

        let outcome = match tokio::task::spawn_blocking(move || work(&db)).await {
            Ok(result) => result,
            Err(join_error) => Err(TrackerError::from(join_error)),
        };
        timer.finish(outcome.is_ok());

        if let Err(e) = &outcome {
            let kind = e.kind();
            self.metrics.record_error(kind.as_str(), operation);
            if matches!(kind, ErrorKind::Store | ErrorKind::Internal) {
                error!(operation, error = %e, "Operation failed");
            }
        }
        outcome
    }

    /// Liveness check with a pool round-trip
    pub async fn health(&self) -> Result<()> {
        self.run("health_check", |db| db.health_check()).await
    }

    // Issues

    pub async fn list_issues(&self, params: ListParams) -> Result<IssuePage> {
        let limits = self.limits;
        self.run("list_issues", move |db| {
            let query = IssueQuery::from_params(&params, limits.default_limit, limits.max_limit)?;
            db.list_issues(&query)
        })
        .await
    }

    pub async fn get_issue(&self, issue_id: i64) -> Result<Issue> {
        self.run("get_issue", move |db| {
            db.get_issue(issue_id)?
                .ok_or_else(|| TrackerError::not_found("Issue", issue_id))
        })
        .await
    }

    pub async fn create_issue(&self, new_issue: NewIssue) -> Result<Issue> {
        self.run("create_issue", move |db| {
            let new_issue = InputValidator::validate_new_issue(new_issue)?;
            let issue = db.create_issue(&new_issue)?;
            info!(issue_id = issue.id, "Created issue");
            Ok(issue)
        })
        .await
    }

    pub async fn update_issue(&self, issue_id: i64, changes: IssueChanges) -> Result<Issue> {
        self.run("update_issue", move |db| {
            let changes = InputValidator::validate_issue_changes(changes)?;
            let issue = db.update_issue(issue_id, &changes)?;
            info!(issue_id, status = %issue.status, "Updated issue");
            Ok(issue)
        })
        .await
    }

    /// Delete an issue, its comments, and their stored files
    pub async fn delete_issue(&self, issue_id: i64) -> Result<()> {
        let store = Arc::clone(&self.attachments);
        self.run("delete_issue", move |db| {
            let orphaned = db.delete_issue(issue_id)?;
            let removed = remove_all(store.as_ref(), &orphaned);
            info!(issue_id, files_removed = removed, "Deleted issue");
            Ok(())
        })
        .await
    }

    /// Status distribution over all issues
    pub async fn issue_stats(&self) -> Result<IssueStats> {
        self.run("issue_stats", |db| {
            let conn = db.get_connection()?;
            let aggregator = Aggregator::new(&conn);
            let CompletionSplit {
                completed,
                uncompleted,
            } = aggregator.completion_split(Window::AllTime)?;
            Ok(IssueStats {
                total: aggregator.count_by_period(Window::AllTime)?,
                by_status: aggregator.group_by(Window::AllTime, Dimension::Status)?,
                completed,
                uncompleted,
            })
        })
        .await
    }

    // Comments

    pub async fn list_comments(&self, issue_id: i64) -> Result<Vec<Comment>> {
        self.run("list_comments", move |db| db.list_comments(issue_id)).await
    }

    /// Store the uploads, then insert the comment; files are removed again if
    /// the insert fails
    pub async fn add_comment(
        &self,
        issue_id: i64,
        content: String,
        author: Option<String>,
        uploads: Vec<PendingUpload>,
    ) -> Result<Comment> {
        let store = Arc::clone(&self.attachments);
        self.run("create_comment", move |db| {
            InputValidator::validate_comment_content(&content)?;
            let author = InputValidator::normalize_author(author.as_deref())?;

            let saved = save_all(store.as_ref(), &uploads)?;
            let new_comment = NewComment {
                issue_id,
                content,
                author: Some(author),
                attachments: saved,
            };

            db.create_comment(&new_comment).inspect_err(|_| {
                remove_all(store.as_ref(), &new_comment.attachments);
            })
        })
        .await
    }

    /// Edit content and attachments; dropped files are deleted after the
    /// row is updated
    pub async fn update_comment(
        &self,
        comment_id: i64,
        content: Option<String>,
        uploads: Vec<PendingUpload>,
        removed: Vec<String>,
    ) -> Result<Comment> {
        let store = Arc::clone(&self.attachments);
        self.run("update_comment", move |db| {
            if let Some(content) = &content {
                InputValidator::validate_comment_content(content)?;
            }
            for name in &removed {
                InputValidator::validate_stored_name(name)?;
            }

            let changes = CommentChanges {
                content,
                added: save_all(store.as_ref(), &uploads)?,
                removed,
            };

            match db.update_comment(comment_id, &changes) {
                Ok((comment, dropped)) => {
                    remove_all(store.as_ref(), &dropped);
                    info!(
                        comment_id,
                        added = changes.added.len(),
                        removed = dropped.len(),
                        "Updated comment"
                    );
                    Ok(comment)
                }
                Err(e) => {
                    remove_all(store.as_ref(), &changes.added);
                    Err(e)
                }
            }
        })
        .await
    }

    pub async fn delete_comment(&self, comment_id: i64) -> Result<()> {
        let store = Arc::clone(&self.attachments);
        self.run("delete_comment", move |db| {
            let attachments = db.delete_comment(comment_id)?;
            remove_all(store.as_ref(), &attachments);
            Ok(())
        })
        .await
    }

    /// Stored bytes and content type of an attachment
    pub async fn read_attachment(&self, stored_name: String) -> Result<(Vec<u8>, String)> {
        let store = Arc::clone(&self.attachments);
        self.run("read_attachment", move |db| {
            let bytes = store.read(&stored_name)?;
            let recorded = db.find_attachment(&stored_name)?;
            let content_type =
                content_type_for(&stored_name, recorded.as_ref().map(|a| a.mimetype.as_str()));
            Ok((bytes, content_type))
        })
        .await
    }

    // Summaries

    /// Live aggregation of one month, the current month by default
    pub async fn monthly_summary(&self, month: Option<MonthKey>) -> Result<MonthlySummaryView> {
        let month = month.unwrap_or_else(|| MonthKey::containing(now()));
        self.run("monthly_summary", move |db| {
            let conn = db.get_connection()?;
            let stats = Aggregator::new(&conn).snapshot(Window::Month(month))?;
            Ok(MonthlySummaryView::new(month, stats))
        })
        .await
    }

    /// Live aggregation of one year
    pub async fn annual_summary(&self, year: i32) -> Result<AnnualSummaryView> {
        InputValidator::validate_year(year)?;
        self.run("annual_summary", move |db| {
            let conn = db.get_connection()?;
            let stats = Aggregator::new(&conn).snapshot(Window::Year(year))?;
            Ok(AnnualSummaryView::new(year, stats))
        })
        .await
    }

    /// Recompute and store a month, the previous month by default
    pub async fn process_monthly(&self, month: Option<MonthKey>) -> Result<SummaryRecord> {
        let computed_at = now();
        let month = month.unwrap_or_else(|| default_rollup_month(computed_at));
        self.process(SummaryPeriod::Month(month), computed_at).await
    }

    /// Recompute and store a year
    pub async fn process_annual(&self, year: i32) -> Result<SummaryRecord> {
        InputValidator::validate_year(year)?;
        self.process(SummaryPeriod::Year(year), now()).await
    }

    async fn process(&self, period: SummaryPeriod, computed_at: NaiveDateTime) -> Result<SummaryRecord> {
        let record = self
            .run("process_summary", move |db| {
                let conn = db.get_connection()?;
                SummaryUpserter::new(&conn).process(period, computed_at)
            })
            .await?;
        self.metrics.record_summary_upsert(period.granularity());
        Ok(record)
    }

    /// Read a stored rollup; a period never computed is not found
    pub async fn stored_summary(&self, period: SummaryPeriod) -> Result<SummaryRecord> {
        self.run("stored_summary", move |db| {
            let conn = db.get_connection()?;
            SummaryUpserter::new(&conn).get(period)?.ok_or_else(|| {
                let key = match period {
                    SummaryPeriod::Month(month) => month.to_string(),
                    SummaryPeriod::Year(year) => year.to_string(),
                };
                TrackerError::not_found("Summary", key)
            })
        })
        .await
    }

    pub async fn yearly_trend(&self, year: i32) -> Result<YearlyTrend> {
        InputValidator::validate_year(year)?;
        self.run("yearly_trend", move |db| {
            let conn = db.get_connection()?;
            TrendComposer::new(&conn).yearly_trend(year)
        })
        .await
    }

    // Reports

    pub async fn monthly_report(&self) -> Result<MonthlyReport> {
        self.run("monthly_report", |db| {
            let conn = db.get_connection()?;
            MonthlyReport::compute(&conn)
        })
        .await
    }

    /// Per-month counts rendered by `renderer`
    pub async fn export_monthly_counts<R>(&self, renderer: R) -> Result<RenderedDocument>
    where
        R: ReportRenderer + 'static,
    {
        self.run("export_monthly_counts", move |db| {
            let conn = db.get_connection()?;
            let report = MonthlyReport::compute(&conn)?;
            renderer.render_monthly_counts(&report.monthly_issues)
        })
        .await
    }

    /// One month's issues rendered by `renderer`
    pub async fn export_month_listing<R>(&self, renderer: R, month: MonthKey) -> Result<RenderedDocument>
    where
        R: ReportRenderer + 'static,
    {
        self.run("export_month_listing", move |db| {
            let conn = db.get_connection()?;
            let issues = issues_in_month(&conn, month)?;
            renderer.render_issue_listing(month, &issues)
        })
        .await
    }
}
