//! Monthly rollup job: at 00:00 local time on the first of every month the
//! previous month is recomputed and stored. A failed run is logged and left
//! for the next firing.

use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::aggregate::MonthKey;
use crate::service::TrackerService;

/// First instant strictly after `now` at which the job fires
#[must_use]
pub fn next_run_after(now: NaiveDateTime) -> NaiveDateTime {
    MonthKey::containing(now).next().start()
}

/// Month rolled up by the firing planned for `fired_at`
#[must_use]
pub fn rollup_month_for(fired_at: NaiveDateTime) -> MonthKey {
    MonthKey::containing(fired_at).previous()
}

/// Run the monthly rollup forever; abort the handle to stop it
pub fn spawn_monthly_rollup(service: TrackerService) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let now = Local::now().naive_local();
            let next = next_run_after(now);
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            info!(next_run = %next, "Monthly rollup scheduled");

            tokio::time::sleep(wait).await;

            match service.process_monthly(Some(rollup_month_for(next))).await {
                Ok(record) => info!(
                    year = record.period.year(),
                    month = ?record.period.month(),
                    total = record.total_issues,
                    "Monthly rollup completed"
                ),
                Err(e) => error!(error = %e, "Monthly rollup failed"),
            }
        }
    })
}
