use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use chrono::Datelike;
use serde::Deserialize;

use super::{ApiQuery, AppState};
use crate::aggregate::MonthKey;
use crate::db::now;
use crate::error::{Result, TrackerError};
use crate::summary::{
    AnnualSummaryView, MonthlySummaryView, ProcessOutcome, StoredSummaryView, SummaryPeriod,
};
use crate::trend::YearlyTrend;
use crate::validation::InputValidator;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct MonthParam {
    month: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct YearParam {
    year: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StoredParams {
    year: Option<String>,
    month: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProcessMonthBody {
    #[serde(default)]
    month: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProcessYearBody {
    #[serde(default)]
    year: Option<serde_json::Value>,
}

fn optional_month(value: Option<&str>) -> Result<Option<MonthKey>> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(MonthKey::parse)
        .transpose()
}

/// Requested year, the current one when absent
fn year_or_current(value: Option<&str>) -> Result<i32> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(year) => InputValidator::parse_year(year),
        None => Ok(now().year()),
    }
}

/// Decode an optional JSON body; an empty body means "use the defaults"
fn optional_body<T: Default + for<'de> Deserialize<'de>>(body: &Bytes) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| TrackerError::validation(format!("Invalid JSON body: {e}")))
}

pub(crate) async fn monthly_summary(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<MonthParam>,
) -> Result<Json<MonthlySummaryView>> {
    let month = optional_month(params.month.as_deref())?;
    Ok(Json(state.service.monthly_summary(month).await?))
}

pub(crate) async fn process_monthly(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ProcessOutcome>> {
    let request: ProcessMonthBody = optional_body(&body)?;
    let month = optional_month(request.month.as_deref())?;
    let record = state.service.process_monthly(month).await?;
    Ok(Json(record.into()))
}

pub(crate) async fn process_annual(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ProcessOutcome>> {
    let request: ProcessYearBody = optional_body(&body)?;
    let year = match request.year {
        Some(serde_json::Value::Number(n)) => InputValidator::parse_year(&n.to_string())?,
        Some(serde_json::Value::String(s)) => year_or_current(Some(&s))?,
        Some(serde_json::Value::Null) | None => year_or_current(None)?,
        Some(other) => return Err(TrackerError::validation(format!("Invalid year: {other}"))),
    };
    let record = state.service.process_annual(year).await?;
    Ok(Json(record.into()))
}

pub(crate) async fn stored_summary(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<StoredParams>,
) -> Result<Json<StoredSummaryView>> {
    let year = params
        .year
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| TrackerError::validation("year is required"))
        .and_then(InputValidator::parse_year)?;

    let period = match params.month.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        Some(month) => {
            let month = month
                .parse::<u32>()
                .map_err(|_| TrackerError::validation(format!("Invalid month: {month}")))?;
            SummaryPeriod::Month(MonthKey::new(year, month)?)
        }
        None => SummaryPeriod::Year(year),
    };

    let record = state.service.stored_summary(period).await?;
    Ok(Json(record.into()))
}

pub(crate) async fn annual_summary(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<YearParam>,
) -> Result<Json<AnnualSummaryView>> {
    let year = year_or_current(params.year.as_deref())?;
    Ok(Json(state.service.annual_summary(year).await?))
}

pub(crate) async fn annual_trend(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<YearParam>,
) -> Result<Json<YearlyTrend>> {
    let year = year_or_current(params.year.as_deref())?;
    Ok(Json(state.service.yearly_trend(year).await?))
}
