//! Data models for issues, comments, and their attachments
//!
//! Row types mirror the stored columns. Status, source, and type are kept as
//! the raw stored strings so rows written before a label set changed still
//! load; the enums below define what the write path accepts.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};

/// Status labels counted as "completed" by every aggregation entry point.
pub const CLOSED_LABELS: [&str; 2] = ["Closed", "已完成"];

/// Default author for comments submitted without one.
pub const ANONYMOUS_AUTHOR: &str = "Anonymous";

/// True when `status` is one of the recognized closed labels.
#[must_use]
pub fn is_closed_label(status: Option<&str>) -> bool {
    status.is_some_and(|s| CLOSED_LABELS.contains(&s))
}

/// Workflow status accepted on writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueStatus {
    /// Not yet started
    Pending,
    /// Being worked on
    InProgress,
    /// Resolved
    Closed,
    /// Resolved (localized label kept for existing dashboards)
    Completed,
}

impl IssueStatus {
    /// Every accepted status
    pub const ALL: [Self; 4] = [Self::Pending, Self::InProgress, Self::Closed, Self::Completed];

    /// Stored label
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::InProgress => "In Progress",
            Self::Closed => "Closed",
            Self::Completed => "已完成",
        }
    }

    /// Exact-match lookup of a stored label
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == label)
    }

    /// Whether this status counts as completed
    #[must_use]
    pub fn is_closed(self) -> bool {
        is_closed_label(Some(self.as_str()))
    }
}

/// Channel an issue was reported through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSource {
    /// Raised by the sales team
    Sales,
    /// Line chat message
    LineChat,
    /// Reported on site
    OnSite,
    /// Email
    Email,
    /// Phone call
    Phone,
    /// Customer reported it directly
    CustomerReport,
}

impl IssueSource {
    /// Every accepted source
    pub const ALL: [Self; 6] = [
        Self::Sales,
        Self::LineChat,
        Self::OnSite,
        Self::Email,
        Self::Phone,
        Self::CustomerReport,
    ];

    /// Stored label
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sales => "業務",
            Self::LineChat => "Line chat",
            Self::OnSite => "現場",
            Self::Email => "Email",
            Self::Phone => "電話",
            Self::CustomerReport => "客戶主動回報",
        }
    }

    /// Exact-match lookup of a stored label
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == label)
    }
}

/// Issue category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueType {
    /// System-level fault
    System,
    /// Application feature problem
    SystemFeature,
    /// Networking
    Network,
    /// Hardware
    Equipment,
}

impl IssueType {
    /// Every accepted type
    pub const ALL: [Self; 4] = [Self::System, Self::SystemFeature, Self::Network, Self::Equipment];

    /// Stored label
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "系統",
            Self::SystemFeature => "系統功能",
            Self::Network => "網路",
            Self::Equipment => "設備",
        }
    }

    /// Exact-match lookup of a stored label
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == label)
    }
}

/// A stored issue row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Database primary key
    pub id: i64,
    /// Short summary, never empty
    pub title: String,
    /// Free-text body
    pub description: Option<String>,
    /// Origin channel label
    pub source: Option<String>,
    /// Category label
    pub issue_type: Option<String>,
    /// Workflow status label
    pub status: String,
    /// Warranty expiry for the affected equipment
    pub warranty_end_date: Option<NaiveDate>,
    /// Person or team handling the issue
    pub assigned_to: Option<String>,
    /// Creation time (local)
    pub created_at: NaiveDateTime,
    /// Last mutation time (local)
    pub updated_at: NaiveDateTime,
}

/// Body of an issue creation request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewIssue {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub issue_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    /// Defaults to the insert time when absent
    #[serde(default, deserialize_with = "flexible_datetime")]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub warranty_end_date: Option<NaiveDate>,
    #[serde(default)]
    pub assigned_to: Option<String>,
}

/// Partial update of an issue
///
/// The outer `Option` says whether the field was supplied; for nullable
/// columns the inner `Option` carries an explicit `null`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssueChanges {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub source: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub issue_type: Option<Option<String>>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub warranty_end_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "double_option")]
    pub assigned_to: Option<Option<String>>,
}

impl IssueChanges {
    /// True when the request supplied no updatable field
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.source.is_none()
            && self.issue_type.is_none()
            && self.status.is_none()
            && self.warranty_end_date.is_none()
            && self.assigned_to.is_none()
    }
}

/// A stored file referenced by a comment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Name the file was uploaded with
    pub filename: String,
    /// Key of the file inside the attachment store
    pub path: String,
    /// MIME type reported at upload
    pub mimetype: String,
    /// Size in bytes, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Decode a stored attachment list.
///
/// A missing, empty, or malformed value yields an empty list: a corrupt
/// attachment column must never make the comment unreadable.
#[must_use]
pub fn parse_attachments(raw: Option<&str>) -> Vec<Attachment> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Vec::new();
    };

    match serde_json::from_str::<Vec<Attachment>>(raw) {
        Ok(attachments) => attachments,
        Err(e) => {
            tracing::warn!(error = %e, "Discarding malformed attachment list");
            Vec::new()
        }
    }
}

/// Encode an attachment list for storage; an empty list is stored as NULL.
pub fn serialize_attachments(attachments: &[Attachment]) -> serde_json::Result<Option<String>> {
    if attachments.is_empty() {
        Ok(None)
    } else {
        serde_json::to_string(attachments).map(Some)
    }
}

/// A stored comment with its decoded attachments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// Database primary key
    pub id: i64,
    /// Owning issue
    pub issue_id: i64,
    /// Comment body
    pub content: String,
    /// Display name of the author
    pub author: String,
    /// Files attached to the comment, in upload order
    pub attachments: Vec<Attachment>,
    /// Set once content or attachments change after creation
    pub edited: bool,
    /// Creation time (local)
    pub created_at: NaiveDateTime,
    /// Last mutation time (local)
    pub updated_at: NaiveDateTime,
}

/// Data for creating a comment
#[derive(Debug, Clone)]
pub struct NewComment {
    /// Owning issue
    pub issue_id: i64,
    /// Comment body
    pub content: String,
    /// Author, `Anonymous` when absent
    pub author: Option<String>,
    /// Files already written to the attachment store
    pub attachments: Vec<Attachment>,
}

/// Changes applied to an existing comment
#[derive(Debug, Clone, Default)]
pub struct CommentChanges {
    /// Replacement body
    pub content: Option<String>,
    /// Newly stored files to append
    pub added: Vec<Attachment>,
    /// Store paths of attachments to drop
    pub removed: Vec<String>,
}

impl CommentChanges {
    /// True when nothing would change
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.added.is_empty() && self.removed.is_empty()
    }
}

fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM[:SS]`, or a bare date.
fn flexible_datetime<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_timestamp(value)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {value}"))),
    }
}

/// Parse a client-supplied timestamp into local naive time
#[must_use]
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Local).naive_local());
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_labels() {
        assert!(is_closed_label(Some("Closed")));
        assert!(is_closed_label(Some("已完成")));
        assert!(!is_closed_label(Some("closed")));
        assert!(!is_closed_label(None));
        assert!(IssueStatus::Completed.is_closed());
        assert!(!IssueStatus::InProgress.is_closed());
    }

    #[test]
    fn test_label_lookup() {
        assert_eq!(IssueStatus::from_label("In Progress"), Some(IssueStatus::InProgress));
        assert_eq!(IssueSource::from_label("Line chat"), Some(IssueSource::LineChat));
        assert_eq!(IssueType::from_label("網路"), Some(IssueType::Network));
        assert_eq!(IssueSource::from_label("Fax"), None);
    }

    #[test]
    fn test_parse_attachments_degrades_to_empty() {
        assert!(parse_attachments(None).is_empty());
        assert!(parse_attachments(Some("")).is_empty());
        assert!(parse_attachments(Some("{not json")).is_empty());
        assert!(parse_attachments(Some(r#"{"filename":"a"}"#)).is_empty());

        let parsed = parse_attachments(Some(
            r#"[{"filename":"a.png","path":"1-a.png","mimetype":"image/png","size":12}]"#,
        ));
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].size, Some(12));
    }

    #[test]
    fn test_serialize_empty_attachments_is_null() {
        assert_eq!(serialize_attachments(&[]).unwrap(), None);
    }

    #[test]
    fn test_issue_changes_null_vs_absent() {
        let changes: IssueChanges =
            serde_json::from_str(r#"{"description": null, "status": "Closed"}"#).unwrap();
        assert_eq!(changes.description, Some(None));
        assert_eq!(changes.source, None);
        assert_eq!(changes.status.as_deref(), Some("Closed"));
        assert!(!changes.is_empty());

        let empty: IssueChanges = serde_json::from_str("{}").unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_new_issue_timestamps() {
        let issue: NewIssue =
            serde_json::from_str(r#"{"title":"t","created_at":"2025-03-04 10:20:30"}"#).unwrap();
        assert_eq!(
            issue.created_at,
            NaiveDate::from_ymd_opt(2025, 3, 4).unwrap().and_hms_opt(10, 20, 30)
        );

        let bare: NewIssue = serde_json::from_str(r#"{"title":"t","created_at":"2025-03-04"}"#).unwrap();
        assert_eq!(bare.created_at.unwrap().date(), NaiveDate::from_ymd_opt(2025, 3, 4).unwrap());

        assert!(serde_json::from_str::<NewIssue>(r#"{"title":"t","created_at":"soon"}"#).is_err());
    }
}
