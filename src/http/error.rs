//! Single mapping from [`TrackerError`] to an HTTP response.

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::{ErrorKind, TrackerError};

const GENERIC_SERVER_ERROR: &str = "Internal server error";

/// Body of every error response
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

/// Full text of a 5xx error, attached to the response for the
/// detail-exposing layer
#[derive(Debug, Clone)]
pub struct ErrorDetail {
    kind: &'static str,
    message: String,
}

const fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Store | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for TrackerError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = status_for(kind);

        if status.is_server_error() {
            let detail = ErrorDetail {
                kind: kind.as_str(),
                message: self.to_string(),
            };
            let body = ErrorBody {
                error: kind.as_str(),
                message: GENERIC_SERVER_ERROR.to_string(),
            };
            let mut response = (status, Json(body)).into_response();
            response.extensions_mut().insert(detail);
            response
        } else {
            let body = ErrorBody {
                error: kind.as_str(),
                message: self.to_string(),
            };
            (status, Json(body)).into_response()
        }
    }
}

/// Response mapper that swaps the generic 5xx message for the real one
pub async fn expose_error_details(response: Response) -> Response {
    match response.extensions().get::<ErrorDetail>().cloned() {
        Some(detail) => {
            let status = response.status();
            let body = ErrorBody {
                error: detail.kind,
                message: detail.message,
            };
            (status, Json(body)).into_response()
        }
        None => response,
    }
}

impl From<JsonRejection> for TrackerError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for TrackerError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<MultipartRejection> for TrackerError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<MultipartError> for TrackerError {
    fn from(error: MultipartError) -> Self {
        Self::Validation(format!("Malformed multipart body: {}", error.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_validation_maps_to_400() {
        let response = TrackerError::validation("Title is required").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "validation_error");
        assert_eq!(body["message"], "Validation error: Title is required");
    }

    #[tokio::test]
    async fn test_not_found_maps_to_404() {
        let response = TrackerError::not_found("Issue", 9).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "not_found");
    }

    #[tokio::test]
    async fn test_server_errors_hide_details_unless_exposed() {
        let error = TrackerError::Other("disk on fire".to_string());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let exposed = expose_error_details(response).await;
        let body = body_json(exposed).await;
        assert_eq!(body["message"], "disk on fire");

        let hidden = TrackerError::Other("disk on fire".to_string()).into_response();
        assert_eq!(body_json(hidden).await["message"], GENERIC_SERVER_ERROR);
    }
}
