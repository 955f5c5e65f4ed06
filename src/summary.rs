//! Period-keyed rollups of the aggregation output.
//!
//! A rollup row is a derived cache: it is only ever written by
//! [`SummaryUpserter`], one row per period, overwritten in a single
//! `INSERT .. ON CONFLICT DO UPDATE` statement so readers see either the old
//! row or the new one.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::{info, warn};

use crate::aggregate::{to_count, Aggregator, MonthKey, PeriodStats, Window};
use crate::error::Result;
use crate::logging::OperationTimer;
use crate::schema::summaries;

/// Identity of a stored rollup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryPeriod {
    Month(MonthKey),
    Year(i32),
}

impl SummaryPeriod {
    /// Label used in logs and metrics
    #[must_use]
    pub const fn granularity(self) -> &'static str {
        match self {
            Self::Month(_) => "monthly",
            Self::Year(_) => "annual",
        }
    }

    /// Aggregation window covered by this period
    #[must_use]
    pub const fn window(self) -> Window {
        match self {
            Self::Month(key) => Window::Month(key),
            Self::Year(year) => Window::Year(year),
        }
    }

    #[must_use]
    pub const fn year(self) -> i32 {
        match self {
            Self::Month(key) => key.year,
            Self::Year(year) => year,
        }
    }

    #[must_use]
    pub const fn month(self) -> Option<u32> {
        match self {
            Self::Month(key) => Some(key.month),
            Self::Year(_) => None,
        }
    }
}

/// One stored rollup row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRecord {
    pub period: SummaryPeriod,
    pub total_issues: u64,
    pub closed_issues: u64,
    pub pending_issues: u64,
    pub source_stats: BTreeMap<String, u64>,
    pub issue_type_stats: BTreeMap<String, u64>,
    pub computed_at: NaiveDateTime,
}

/// Writes and reads rollup rows
pub struct SummaryUpserter<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SummaryUpserter<'conn> {
    pub const fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Replace the rollup for `period` with `stats`
    pub fn upsert(
        &self,
        period: SummaryPeriod,
        stats: &PeriodStats,
        computed_at: NaiveDateTime,
    ) -> Result<SummaryRecord> {
        let timer = OperationTimer::new("summary_upsert");
        let source_json = serde_json::to_string(&stats.source_stats)?;
        let type_json = serde_json::to_string(&stats.issue_types)?;
        let total = count_param(stats.total);
        let closed = count_param(stats.completion.completed);
        let pending = count_param(stats.completion.uncompleted);

        match period {
            SummaryPeriod::Month(key) => {
                self.conn.execute(
                    &format!(
                        "INSERT INTO {table} ({year}, {month}, {total}, {closed}, {pending}, {src}, {typ}, {at}) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
                         ON CONFLICT({year}, {month}) DO UPDATE SET \
                         {total} = excluded.{total}, {closed} = excluded.{closed}, \
                         {pending} = excluded.{pending}, {src} = excluded.{src}, \
                         {typ} = excluded.{typ}, {at} = excluded.{at}",
                        table = summaries::MONTHLY_TABLE,
                        year = summaries::YEAR,
                        month = summaries::MONTH,
                        total = summaries::TOTAL_ISSUES,
                        closed = summaries::CLOSED_ISSUES,
                        pending = summaries::PENDING_ISSUES,
                        src = summaries::SOURCE_STATS,
                        typ = summaries::ISSUE_TYPE_STATS,
                        at = summaries::COMPUTED_AT
                    ),
                    params![key.year, key.month, total, closed, pending, source_json, type_json, computed_at],
                )?;
            }
            SummaryPeriod::Year(year) => {
                self.conn.execute(
                    &format!(
                        "INSERT INTO {table} ({year}, {total}, {closed}, {pending}, {src}, {typ}, {at}) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
                         ON CONFLICT({year}) DO UPDATE SET \
                         {total} = excluded.{total}, {closed} = excluded.{closed}, \
                         {pending} = excluded.{pending}, {src} = excluded.{src}, \
                         {typ} = excluded.{typ}, {at} = excluded.{at}",
                        table = summaries::ANNUAL_TABLE,
                        year = summaries::YEAR,
                        total = summaries::TOTAL_ISSUES,
                        closed = summaries::CLOSED_ISSUES,
                        pending = summaries::PENDING_ISSUES,
                        src = summaries::SOURCE_STATS,
                        typ = summaries::ISSUE_TYPE_STATS,
                        at = summaries::COMPUTED_AT
                    ),
                    params![year, total, closed, pending, source_json, type_json, computed_at],
                )?;
            }
        }

        info!(
            granularity = period.granularity(),
            year = period.year(),
            month = ?period.month(),
            total = stats.total,
            elapsed_ms = timer.elapsed().as_millis(),
            "Upserted summary"
        );

        Ok(SummaryRecord {
            period,
            total_issues: stats.total,
            closed_issues: stats.completion.completed,
            pending_issues: stats.completion.uncompleted,
            source_stats: stats.source_stats.clone(),
            issue_type_stats: stats.issue_types.clone(),
            computed_at,
        })
    }

    /// Recompute `period` from the issues table and store it
    pub fn process(&self, period: SummaryPeriod, computed_at: NaiveDateTime) -> Result<SummaryRecord> {
        let stats = Aggregator::new(self.conn).snapshot(period.window())?;
        self.upsert(period, &stats, computed_at)
    }

    /// Read a stored rollup, `None` when the period was never computed
    pub fn get(&self, period: SummaryPeriod) -> Result<Option<SummaryRecord>> {
        let columns = format!(
            "{}, {}, {}, {}, {}, {}",
            summaries::TOTAL_ISSUES,
            summaries::CLOSED_ISSUES,
            summaries::PENDING_ISSUES,
            summaries::SOURCE_STATS,
            summaries::ISSUE_TYPE_STATS,
            summaries::COMPUTED_AT
        );

        let record = match period {
            SummaryPeriod::Month(key) => self
                .conn
                .query_row(
                    &format!(
                        "SELECT {columns} FROM {} WHERE {} = ?1 AND {} = ?2",
                        summaries::MONTHLY_TABLE,
                        summaries::YEAR,
                        summaries::MONTH
                    ),
                    params![key.year, key.month],
                    |row| map_summary(row, period),
                )
                .optional()?,
            SummaryPeriod::Year(year) => self
                .conn
                .query_row(
                    &format!(
                        "SELECT {columns} FROM {} WHERE {} = ?1",
                        summaries::ANNUAL_TABLE,
                        summaries::YEAR
                    ),
                    params![year],
                    |row| map_summary(row, period),
                )
                .optional()?,
        };
        Ok(record)
    }
}

/// Period the scheduled job rolls up when none is given: the month before `now`
#[must_use]
pub fn default_rollup_month(now: NaiveDateTime) -> MonthKey {
    MonthKey::containing(now).previous()
}

fn count_param(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn map_summary(row: &Row, period: SummaryPeriod) -> rusqlite::Result<SummaryRecord> {
    let source_raw: Option<String> = row.get(3)?;
    let type_raw: Option<String> = row.get(4)?;
    Ok(SummaryRecord {
        period,
        total_issues: to_count(row.get(0)?),
        closed_issues: to_count(row.get(1)?),
        pending_issues: to_count(row.get(2)?),
        source_stats: parse_distribution(source_raw.as_deref()),
        issue_type_stats: parse_distribution(type_raw.as_deref()),
        computed_at: row.get(5)?,
    })
}

/// Decode a stored distribution; unreadable JSON becomes an empty map
fn parse_distribution(raw: Option<&str>) -> BTreeMap<String, u64> {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return BTreeMap::new();
    };
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!(error = %e, "Discarding malformed stored distribution");
        BTreeMap::new()
    })
}

/// Live monthly aggregation as returned to the dashboard
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlySummaryView {
    pub target_month: String,
    pub issue_count: u64,
    pub issue_types: BTreeMap<String, u64>,
    pub completed: u64,
    pub uncompleted: u64,
    pub source_stats: BTreeMap<String, u64>,
}

impl MonthlySummaryView {
    #[must_use]
    pub fn new(month: MonthKey, stats: PeriodStats) -> Self {
        Self {
            target_month: month.to_string(),
            issue_count: stats.total,
            issue_types: stats.issue_types,
            completed: stats.completion.completed,
            uncompleted: stats.completion.uncompleted,
            source_stats: stats.source_stats,
        }
    }
}

/// Live annual aggregation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnualSummaryView {
    pub year: i32,
    pub total_issues: u64,
    pub completed: u64,
    pub uncompleted: u64,
    pub source_stats: BTreeMap<String, u64>,
    pub type_stats: BTreeMap<String, u64>,
}

impl AnnualSummaryView {
    #[must_use]
    pub fn new(year: i32, stats: PeriodStats) -> Self {
        Self {
            year,
            total_issues: stats.total,
            completed: stats.completion.completed,
            uncompleted: stats.completion.uncompleted,
            source_stats: stats.source_stats,
            type_stats: stats.issue_types,
        }
    }
}

/// A stored rollup row as returned to the dashboard
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSummaryView {
    pub year: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<u32>,
    pub issue_count: u64,
    pub completed: u64,
    pub uncompleted: u64,
    pub source_stats: BTreeMap<String, u64>,
    pub issue_types: BTreeMap<String, u64>,
    pub updated_at: NaiveDateTime,
}

impl From<SummaryRecord> for StoredSummaryView {
    fn from(record: SummaryRecord) -> Self {
        Self {
            year: record.period.year(),
            month: record.period.month(),
            issue_count: record.total_issues,
            completed: record.closed_issues,
            uncompleted: record.pending_issues,
            source_stats: record.source_stats,
            issue_types: record.issue_type_stats,
            updated_at: record.computed_at,
        }
    }
}

/// Acknowledgement of an on-demand rollup
#[derive(Debug, Clone, Serialize)]
pub struct ProcessOutcome {
    pub message: String,
    pub data: StoredSummaryView,
}

impl From<SummaryRecord> for ProcessOutcome {
    fn from(record: SummaryRecord) -> Self {
        let label = match record.period {
            SummaryPeriod::Month(key) => key.to_string(),
            SummaryPeriod::Year(year) => year.to_string(),
        };
        Self {
            message: format!("Stored {} summary for {label}", record.period.granularity()),
            data: record.into(),
        }
    }
}
