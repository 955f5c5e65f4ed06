//! Comment endpoints. Create and update accept either a multipart form
//! (with `files`) or a plain JSON body.

use axum::extract::{FromRequest, Multipart, Path, Request, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{ApiJson, AppState};
use crate::attachments::PendingUpload;
use crate::error::TrackerError;
use crate::models::Comment;
use crate::validation::InputValidator;

/// Comment fields as submitted by the dashboard
#[derive(Debug, Default)]
pub(crate) struct CommentForm {
    issue_id: Option<String>,
    content: Option<String>,
    author: Option<String>,
    created_by: Option<String>,
    uploads: Vec<PendingUpload>,
    remove_attachments: Vec<String>,
}

impl CommentForm {
    fn author(&self) -> Option<String> {
        self.author.clone().or_else(|| self.created_by.clone())
    }

    async fn from_multipart(mut multipart: Multipart) -> Result<Self, TrackerError> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();

            if let Some(file_name) = field.file_name().map(str::to_string) {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await?;
                // Browsers submit an empty part for an untouched file input
                if file_name.is_empty() && bytes.is_empty() {
                    continue;
                }
                form.uploads.push(PendingUpload {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
                continue;
            }

            let value = field.text().await?;
            match name.as_str() {
                "issue_id" => form.issue_id = Some(value),
                "content" => form.content = Some(value),
                "author" => form.author = Some(value),
                "created_by" => form.created_by = Some(value),
                "remove_attachments" | "remove_attachments[]" => form.remove_attachments.push(value),
                other => debug!(field = other, "Ignoring unknown form field"),
            }
        }

        Ok(form)
    }
}

#[derive(Debug, Deserialize)]
struct CommentJson {
    #[serde(default)]
    issue_id: Option<Value>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    created_by: Option<String>,
    #[serde(default)]
    remove_attachments: Vec<String>,
}

impl From<CommentJson> for CommentForm {
    fn from(body: CommentJson) -> Self {
        let issue_id = body.issue_id.map(|id| match id {
            Value::String(s) => s,
            other => other.to_string(),
        });
        Self {
            issue_id,
            content: body.content,
            author: body.author,
            created_by: body.created_by,
            uploads: Vec::new(),
            remove_attachments: body.remove_attachments,
        }
    }
}

#[axum::async_trait]
impl<S> FromRequest<S> for CommentForm
where
    S: Send + Sync,
{
    type Rejection = TrackerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));

        if is_json {
            let ApiJson(body) = ApiJson::<CommentJson>::from_request(req, state).await?;
            Ok(body.into())
        } else {
            let multipart = Multipart::from_request(req, state).await?;
            Self::from_multipart(multipart).await
        }
    }
}

pub(crate) async fn list_comments(
    State(state): State<AppState>,
    Path(issue_id): Path<String>,
) -> Result<Json<Vec<Comment>>, TrackerError> {
    let issue_id = InputValidator::parse_id("issue id", &issue_id)?;
    Ok(Json(state.service.list_comments(issue_id).await?))
}

pub(crate) async fn create_comment(
    State(state): State<AppState>,
    form: CommentForm,
) -> Result<(StatusCode, Json<Comment>), TrackerError> {
    let issue_id = form
        .issue_id
        .as_deref()
        .ok_or_else(|| TrackerError::validation("issue_id is required"))
        .and_then(|id| InputValidator::parse_id("issue_id", id))?;
    let author = form.author();
    let content = form.content.unwrap_or_default();

    let comment = state
        .service
        .add_comment(issue_id, content, author, form.uploads)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

pub(crate) async fn update_comment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    form: CommentForm,
) -> Result<Json<Comment>, TrackerError> {
    let id = InputValidator::parse_id("comment id", &id)?;
    let comment = state
        .service
        .update_comment(id, form.content, form.uploads, form.remove_attachments)
        .await?;
    Ok(Json(comment))
}

pub(crate) async fn delete_comment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, TrackerError> {
    let id = InputValidator::parse_id("comment id", &id)?;
    state.service.delete_comment(id).await?;
    Ok(Json(json!({ "message": "Comment deleted" })))
}

pub(crate) async fn download_attachment(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, TrackerError> {
    InputValidator::validate_stored_name(&filename)?;
    let disposition = format!("attachment; filename=\"{filename}\"");
    let (bytes, content_type) = state.service.read_attachment(filename).await?;
    Ok(([(CONTENT_TYPE, content_type), (CONTENT_DISPOSITION, disposition)], bytes))
}
