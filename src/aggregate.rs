//! Grouped statistics over issues inside a time window.
//!
//! Every entry point here classifies status through
//! [`is_closed_label`](crate::models::is_closed_label), so monthly, annual,
//! trend, and report figures agree on what "completed" means.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use rusqlite::{params_from_iter, Connection};
use serde::Serialize;

use crate::error::{Result, TrackerError};
use crate::logging::OperationTimer;
use crate::models::is_closed_label;
use crate::schema::issues;
use crate::validation::InputValidator;

/// Group key used for NULL dimension values
pub const UNSET_GROUP_KEY: &str = "null";

/// A calendar month
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    /// Build a key, rejecting months outside 1..=12 and implausible years
    pub fn new(year: i32, month: u32) -> Result<Self> {
        InputValidator::validate_year(year)?;
        if !(1..=12).contains(&month) {
            return Err(TrackerError::validation(format!(
                "Month must be between 1 and 12, got {month}"
            )));
        }
        Ok(Self { year, month })
    }

    /// Parse a `YYYY-MM` parameter
    pub fn parse(value: &str) -> Result<Self> {
        let (year, month) = InputValidator::validate_month_param(value)?;
        Self::new(year, month)
    }

    /// Month containing `now`
    #[must_use]
    pub fn containing(now: NaiveDateTime) -> Self {
        Self {
            year: now.year(),
            month: now.month(),
        }
    }

    /// The calendar month before this one; January rolls back to December
    #[must_use]
    pub const fn previous(self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    /// The calendar month after this one
    #[must_use]
    pub const fn next(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Midnight on the first day of the month
    #[must_use]
    pub fn start(self) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap_or(NaiveDateTime::MIN)
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Time range an aggregation is restricted to, matched against `created_at`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// One calendar month
    Month(MonthKey),
    /// One calendar year
    Year(i32),
    /// No restriction
    AllTime,
}

impl Window {
    /// Half-open `[start, end)` bounds, `None` for [`Window::AllTime`]
    #[must_use]
    pub fn bounds(self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        match self {
            Self::Month(key) => Some((key.start(), key.next().start())),
            Self::Year(year) => {
                let start = MonthKey { year, month: 1 }.start();
                let end = MonthKey { year: year + 1, month: 1 }.start();
                Some((start, end))
            }
            Self::AllTime => None,
        }
    }

    /// WHERE clause restricting `created_at` to this window, with its parameters
    fn predicate(self) -> (String, Vec<NaiveDateTime>) {
        match self.bounds() {
            Some((start, end)) => (
                format!(
                    " WHERE {col} >= ?1 AND {col} < ?2",
                    col = issues::CREATED_AT
                ),
                vec![start, end],
            ),
            None => (String::new(), Vec::new()),
        }
    }
}

/// Categorical issue attribute used as a grouping key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Status,
    Source,
    IssueType,
}

impl Dimension {
    const fn column(self) -> &'static str {
        match self {
            Self::Status => issues::STATUS,
            Self::Source => issues::SOURCE,
            Self::IssueType => issues::ISSUE_TYPE,
        }
    }
}

/// Completed vs. everything else
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompletionSplit {
    pub completed: u64,
    pub uncompleted: u64,
}

impl CompletionSplit {
    /// Sum of both buckets
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.completed + self.uncompleted
    }
}

/// Everything a summary needs for one window
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PeriodStats {
    pub total: u64,
    pub completion: CompletionSplit,
    pub source_stats: BTreeMap<String, u64>,
    pub issue_types: BTreeMap<String, u64>,
}

/// Read-only statistics over the issues table
pub struct Aggregator<'conn> {
    conn: &'conn Connection,
}

impl<'conn> Aggregator<'conn> {
    pub const fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Number of issues created inside `window`
    pub fn count_by_period(&self, window: Window) -> Result<u64> {
        let (clause, params) = window.predicate();
        let sql = format!("SELECT COUNT(*) FROM {}{clause}", issues::TABLE);
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(params.iter()), |row| row.get(0))?;
        Ok(to_count(count))
    }

    /// Count per distinct value of `dimension`; NULL values are kept under
    /// [`UNSET_GROUP_KEY`] so the groups always sum to the window total
    pub fn group_by(&self, window: Window, dimension: Dimension) -> Result<BTreeMap<String, u64>> {
        let mut groups = BTreeMap::new();
        for (value, count) in self.raw_groups(window, dimension)? {
            let key = value.unwrap_or_else(|| UNSET_GROUP_KEY.to_string());
            *groups.entry(key).or_insert(0) += count;
        }
        Ok(groups)
    }

    /// Split the window into completed and uncompleted issues; unknown and
    /// NULL statuses count as uncompleted
    pub fn completion_split(&self, window: Window) -> Result<CompletionSplit> {
        let mut split = CompletionSplit::default();
        for (status, count) in self.raw_groups(window, Dimension::Status)? {
            if is_closed_label(status.as_deref()) {
                split.completed += count;
            } else {
                split.uncompleted += count;
            }
        }
        Ok(split)
    }

    /// Total, completion split, and both distributions for one window
    ///
    /// All four reads share one read transaction, so concurrent writers
    /// cannot make the figures disagree with each other. Inside a caller's
    /// transaction the caller's view is used as is.
    pub fn snapshot(&self, window: Window) -> Result<PeriodStats> {
        let timer = OperationTimer::new("aggregate_snapshot");
        let tx = if self.conn.is_autocommit() {
            Some(self.conn.unchecked_transaction()?)
        } else {
            None
        };
        let stats = PeriodStats {
            total: self.count_by_period(window)?,
            completion: self.completion_split(window)?,
            source_stats: self.group_by(window, Dimension::Source)?,
            issue_types: self.group_by(window, Dimension::IssueType)?,
        };
        if let Some(tx) = tx {
            tx.commit()?;
        }
        tracing::debug!(
            ?window,
            total = stats.total,
            elapsed_ms = timer.elapsed().as_millis(),
            "Computed period snapshot"
        );
        Ok(stats)
    }

    /// All-time issue counts per `YYYY-MM`, oldest first
    pub fn monthly_counts(&self) -> Result<Vec<(String, u64)>> {
        let sql = format!(
            "SELECT strftime('%Y-%m', {col}) AS period, COUNT(*) FROM {table} \
             GROUP BY period ORDER BY period",
            col = issues::CREATED_AT,
            table = issues::TABLE
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, Option<String>>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (period, count) = row?;
            results.push((period.unwrap_or_else(|| UNSET_GROUP_KEY.to_string()), to_count(count)));
        }
        Ok(results)
    }

    fn raw_groups(&self, window: Window, dimension: Dimension) -> Result<Vec<(Option<String>, u64)>> {
        let (clause, params) = window.predicate();
        let column = dimension.column();
        let sql = format!(
            "SELECT {column}, COUNT(*) FROM {table}{clause} GROUP BY {column} ORDER BY {column}",
            table = issues::TABLE
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
            Ok((row.get::<_, Option<String>>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (value, count) = row?;
            results.push((value, to_count(count)));
        }
        Ok(results)
    }
}

pub(crate) fn to_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}
