//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use chrono::NaiveDateTime;
use issue_tracker::attachments::LocalAttachmentStore;
use issue_tracker::db::Database;
use issue_tracker::http::{router, HttpSettings};
use issue_tracker::models::{Issue, NewIssue};
use issue_tracker::service::{PageLimits, TrackerService};
use tempfile::TempDir;

pub const UPLOAD_LIMIT: u64 = 1024 * 1024;

/// A file-backed database and upload directory that live as long as the value
pub struct TestEnv {
    pub dir: TempDir,
    pub db: Database,
    pub uploads: PathBuf,
    pub service: TrackerService,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp directory");
        let db_url = format!("sqlite:{}", dir.path().join("issues.db").display());
        let db = Database::new(&db_url).expect("Failed to create database");

        let uploads = dir.path().join("uploads");
        let store = LocalAttachmentStore::new(&uploads, UPLOAD_LIMIT).expect("Failed to open upload dir");
        let service = TrackerService::new(db.clone(), Arc::new(store), PageLimits::default());

        Self {
            dir,
            db,
            uploads,
            service,
        }
    }

    pub fn router(&self) -> Router {
        router(
            self.service.clone(),
            HttpSettings {
                expose_error_details: false,
                max_upload_bytes: UPLOAD_LIMIT,
            },
        )
    }

    /// Insert an issue with a fixed creation time, bypassing validation
    pub fn seed(
        &self,
        title: &str,
        status: &str,
        source: Option<&str>,
        issue_type: Option<&str>,
        created_at: &str,
    ) -> Issue {
        self.db
            .create_issue(&NewIssue {
                title: title.to_string(),
                status: Some(status.to_string()),
                source: source.map(str::to_string),
                issue_type: issue_type.map(str::to_string),
                created_at: Some(at(created_at)),
                ..NewIssue::default()
            })
            .expect("Failed to seed issue")
    }

    /// Number of files currently in the upload directory
    pub fn stored_files(&self) -> usize {
        std::fs::read_dir(&self.uploads)
            .expect("Failed to read upload dir")
            .count()
    }
}

pub fn at(value: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").expect("Invalid test timestamp")
}

/// March 2025: three issues, two closed (one per closed label), one pending.
/// Also one issue in February and one in May so window bounds are exercised.
pub fn seed_march_2025(env: &TestEnv) {
    env.seed("Printer jam", "Closed", Some("Email"), Some("設備"), "2025-03-03 09:15:00");
    env.seed("VPN drops", "已完成", Some("電話"), Some("網路"), "2025-03-14 16:40:00");
    env.seed("Login loop", "Pending", Some("Email"), Some("系統"), "2025-03-31 23:59:59");
    env.seed("Old report", "Closed", Some("業務"), Some("系統"), "2025-02-28 23:59:59");
    env.seed("Late report", "In Progress", None, None, "2025-05-01 00:00:00");
}
