//! Per-month series for one year, recomputed from the issues table on every
//! call; the stored rollups are never consulted.

use rusqlite::Connection;
use serde::Serialize;
use tracing::debug;

use crate::aggregate::{Aggregator, MonthKey, Window};
use crate::error::Result;
use crate::logging::OperationTimer;

/// One month of the series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrendPoint {
    pub month: u32,
    pub total: u64,
    pub resolved: u64,
    pub pending: u64,
}

/// Yearly series plus year-level totals
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearlyTrend {
    pub year: i32,
    /// Ascending by month; months without issues are absent
    pub months: Vec<TrendPoint>,
    pub total_count: u64,
    pub closed_count: u64,
    pub pending_count: u64,
    /// Closed share in whole percent, 0 for an empty year
    pub resolution_rate: u64,
}

pub struct TrendComposer<'conn> {
    aggregator: Aggregator<'conn>,
}

impl<'conn> TrendComposer<'conn> {
    pub const fn new(conn: &'conn Connection) -> Self {
        Self {
            aggregator: Aggregator::new(conn),
        }
    }

    /// Build the series for `year`
    pub fn yearly_trend(&self, year: i32) -> Result<YearlyTrend> {
        let timer = OperationTimer::new("yearly_trend");
        let mut months = Vec::new();

        for month in 1..=12 {
            let key = MonthKey::new(year, month)?;
            let split = self.aggregator.completion_split(Window::Month(key))?;
            if split.total() == 0 {
                continue;
            }
            months.push(TrendPoint {
                month,
                total: split.total(),
                resolved: split.completed,
                pending: split.uncompleted,
            });
        }

        let year_split = self.aggregator.completion_split(Window::Year(year))?;
        let trend = YearlyTrend {
            year,
            months,
            total_count: year_split.total(),
            closed_count: year_split.completed,
            pending_count: year_split.uncompleted,
            resolution_rate: resolution_rate(year_split.completed, year_split.total()),
        };

        debug!(
            year,
            months = trend.months.len(),
            total = trend.total_count,
            elapsed_ms = timer.elapsed().as_millis(),
            "Composed yearly trend"
        );
        Ok(trend)
    }
}

/// `round(closed / total * 100)` with halves rounded up; 0 when `total` is 0
#[must_use]
pub const fn resolution_rate(closed: u64, total: u64) -> u64 {
    if total == 0 {
        0
    } else {
        (closed * 200 + total) / (total * 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_rate_rounding() {
        assert_eq!(resolution_rate(0, 0), 0);
        assert_eq!(resolution_rate(1, 3), 33);
        assert_eq!(resolution_rate(2, 3), 67);
        assert_eq!(resolution_rate(1, 8), 13);
        assert_eq!(resolution_rate(5, 5), 100);
    }
}
