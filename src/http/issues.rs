use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use super::{ApiJson, ApiQuery, AppState};
use crate::error::TrackerError;
use crate::models::{Issue, IssueChanges, NewIssue};
use crate::query::{IssuePage, ListParams};
use crate::service::IssueStats;
use crate::validation::InputValidator;

pub(crate) async fn list_issues(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> Result<Json<IssuePage>, TrackerError> {
    Ok(Json(state.service.list_issues(params).await?))
}

pub(crate) async fn get_issue(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Issue>, TrackerError> {
    let id = InputValidator::parse_id("issue id", &id)?;
    Ok(Json(state.service.get_issue(id).await?))
}

pub(crate) async fn create_issue(
    State(state): State<AppState>,
    ApiJson(new_issue): ApiJson<NewIssue>,
) -> Result<(StatusCode, Json<Issue>), TrackerError> {
    let issue = state.service.create_issue(new_issue).await?;
    Ok((StatusCode::CREATED, Json(issue)))
}

pub(crate) async fn update_issue(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(changes): ApiJson<IssueChanges>,
) -> Result<Json<Issue>, TrackerError> {
    let id = InputValidator::parse_id("issue id", &id)?;
    Ok(Json(state.service.update_issue(id, changes).await?))
}

pub(crate) async fn delete_issue(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, TrackerError> {
    let id = InputValidator::parse_id("issue id", &id)?;
    state.service.delete_issue(id).await?;
    Ok(Json(json!({ "message": "Issue deleted" })))
}

pub(crate) async fn issue_stats(State(state): State<AppState>) -> Result<Json<IssueStats>, TrackerError> {
    Ok(Json(state.service.issue_stats().await?))
}
