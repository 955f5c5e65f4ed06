//! HTTP surface: axum router over [`TrackerService`].

mod comments;
pub mod error;
mod issues;
mod reports;
mod summaries;

use axum::extract::{DefaultBodyLimit, FromRequest, FromRequestParts, Query, State};
use axum::middleware;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::TrackerError;
use crate::service::TrackerService;

/// Upper bound on files in one comment request
const MAX_FILES_PER_REQUEST: u64 = 10;

/// JSON body whose rejection is reported as a validation error
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(TrackerError))]
pub struct ApiJson<T>(pub T);

/// Query string whose rejection is reported as a validation error
#[derive(Debug, FromRequestParts)]
#[from_request(via(Query), rejection(TrackerError))]
pub struct ApiQuery<T>(pub T);

/// Router behaviour taken from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpSettings {
    /// Put store error text in 5xx bodies
    pub expose_error_details: bool,
    /// Largest accepted single upload, in bytes
    pub max_upload_bytes: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            expose_error_details: false,
            max_upload_bytes: 20 * 1024 * 1024,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub service: TrackerService,
}

async fn health(State(state): State<AppState>) -> Result<Json<Value>, TrackerError> {
    state.service.health().await?;
    Ok(Json(json!({ "status": "ok" })))
}

/// Build the application router
pub fn router(service: TrackerService, settings: HttpSettings) -> Router {
    let body_limit = settings
        .max_upload_bytes
        .saturating_mul(MAX_FILES_PER_REQUEST)
        .saturating_add(1024 * 1024);
    let body_limit = usize::try_from(body_limit).unwrap_or(usize::MAX);

    let issue_routes = Router::new()
        .route("/", get(issues::list_issues).post(issues::create_issue))
        .route("/stats", get(issues::issue_stats))
        .route(
            "/:id",
            get(issues::get_issue)
                .put(issues::update_issue)
                .delete(issues::delete_issue),
        );

    let comment_routes = Router::new()
        .route("/", post(comments::create_comment))
        .route("/issue/:issue_id", get(comments::list_comments))
        .route("/attachment/:filename", get(comments::download_attachment))
        .route(
            "/:id",
            put(comments::update_comment).delete(comments::delete_comment),
        )
        .layer(DefaultBodyLimit::max(body_limit));

    let summary_routes = Router::new()
        .route("/monthly", get(summaries::monthly_summary))
        .route("/process", post(summaries::process_monthly))
        .route("/process/annual", post(summaries::process_annual))
        .route("/stored", get(summaries::stored_summary))
        .route("/annual", get(summaries::annual_summary))
        .route("/annualTrend", get(summaries::annual_trend))
        .route("/immediateAnnualTrend", get(summaries::annual_trend));

    let report_routes = Router::new()
        .route("/monthly", get(reports::monthly_report))
        .route("/export/excel", get(reports::export_excel))
        .route("/export/pdf/monthly", get(reports::export_pdf_monthly));

    let api = Router::new()
        .nest("/issues", issue_routes)
        .nest("/comments", comment_routes)
        .nest("/summaries", summary_routes)
        .nest("/report", report_routes);

    let mut app = Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .with_state(AppState { service });

    if settings.expose_error_details {
        app = app.layer(middleware::map_response(error::expose_error_details));
    }

    app.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
