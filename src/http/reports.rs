use axum::extract::State;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use super::{ApiQuery, AppState};
use crate::aggregate::MonthKey;
use crate::db::now;
use crate::error::Result;
use crate::report::{CsvRenderer, MonthlyReport, RenderedDocument, TextRenderer};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ExportParams {
    month: Option<String>,
}

fn download(document: RenderedDocument) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", document.file_name);
    (
        [
            (CONTENT_TYPE, document.content_type.to_string()),
            (CONTENT_DISPOSITION, disposition),
        ],
        document.body,
    )
        .into_response()
}

pub(crate) async fn monthly_report(State(state): State<AppState>) -> Result<Json<MonthlyReport>> {
    Ok(Json(state.service.monthly_report().await?))
}

pub(crate) async fn export_excel(State(state): State<AppState>) -> Result<Response> {
    let document = state.service.export_monthly_counts(CsvRenderer).await?;
    Ok(download(document))
}

pub(crate) async fn export_pdf_monthly(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ExportParams>,
) -> Result<Response> {
    let month = match params.month.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        Some(month) => MonthKey::parse(month)?,
        None => MonthKey::containing(now()),
    };
    let document = state.service.export_month_listing(TextRenderer, month).await?;
    Ok(download(document))
}
