use std::path::Path;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::error::{Result, TrackerError};
use crate::models::{IssueChanges, IssueSource, IssueStatus, IssueType, NewIssue, ANONYMOUS_AUTHOR};

const MAX_TITLE_LEN: usize = 255;
const MAX_AUTHOR_LEN: usize = 100;
const MAX_CONTENT_LEN: usize = 20_000;

#[allow(clippy::expect_used)]
fn month_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d{4})-(\d{1,2})$").expect("month pattern compiles"))
}

fn invalid(message: impl Into<String>) -> TrackerError {
    TrackerError::validation(message)
}

/// Validation utilities for input sanitization and edge case handling
#[derive(Debug, Copy, Clone)]
pub struct InputValidator;

impl InputValidator {
    /// Validate issue title
    pub fn validate_title(title: &str) -> Result<()> {
        if title.trim().is_empty() {
            return Err(invalid("Title is required"));
        }

        if title.chars().count() > MAX_TITLE_LEN {
            return Err(invalid(format!("Title too long (max {MAX_TITLE_LEN} characters)")));
        }

        if title.contains('\0') {
            return Err(invalid("Title contains invalid characters"));
        }

        Ok(())
    }

    /// Validate a status label against the accepted set
    pub fn validate_status(status: &str) -> Result<IssueStatus> {
        IssueStatus::from_label(status).ok_or_else(|| {
            invalid(format!(
                "Invalid status \"{status}\". Allowed values: {}",
                join_labels(IssueStatus::ALL.iter().map(|s| s.as_str()))
            ))
        })
    }

    /// Validate a source label against the accepted set
    pub fn validate_source(source: &str) -> Result<IssueSource> {
        IssueSource::from_label(source).ok_or_else(|| {
            invalid(format!(
                "Invalid source \"{source}\". Allowed values: {}",
                join_labels(IssueSource::ALL.iter().map(|s| s.as_str()))
            ))
        })
    }

    /// Validate an issue type label against the accepted set
    pub fn validate_issue_type(issue_type: &str) -> Result<IssueType> {
        IssueType::from_label(issue_type).ok_or_else(|| {
            invalid(format!(
                "Invalid issue type \"{issue_type}\". Allowed values: {}",
                join_labels(IssueType::ALL.iter().map(|s| s.as_str()))
            ))
        })
    }

    /// Validate assignee / author style short names
    pub fn validate_short_name(field: &str, value: &str) -> Result<()> {
        if value.chars().count() > MAX_AUTHOR_LEN {
            return Err(invalid(format!("{field} too long (max {MAX_AUTHOR_LEN} characters)")));
        }

        if value.contains('\0') || value.contains('\r') || value.contains('\n') {
            return Err(invalid(format!("{field} contains invalid characters")));
        }

        Ok(())
    }

    /// Validate and normalize a creation request
    ///
    /// Blank optional text becomes `None`; status defaults to `Pending`.
    pub fn validate_new_issue(mut issue: NewIssue) -> Result<NewIssue> {
        issue.title = Self::sanitize_text(&issue.title);
        Self::validate_title(&issue.title)?;

        issue.description = blank_to_none(issue.description.as_deref().map(Self::sanitize_text));
        issue.source = blank_to_none(issue.source);
        issue.issue_type = blank_to_none(issue.issue_type);
        issue.assigned_to = blank_to_none(issue.assigned_to);

        if let Some(source) = &issue.source {
            Self::validate_source(source)?;
        }
        if let Some(issue_type) = &issue.issue_type {
            Self::validate_issue_type(issue_type)?;
        }
        if let Some(assigned_to) = &issue.assigned_to {
            Self::validate_short_name("assigned_to", assigned_to)?;
        }

        let status = blank_to_none(issue.status).unwrap_or_else(|| IssueStatus::Pending.as_str().to_string());
        Self::validate_status(&status)?;
        issue.status = Some(status);

        Ok(issue)
    }

    /// Validate and normalize a partial update
    pub fn validate_issue_changes(mut changes: IssueChanges) -> Result<IssueChanges> {
        if changes.is_empty() {
            return Err(invalid("No fields supplied for update"));
        }

        if let Some(title) = changes.title.as_mut() {
            *title = Self::sanitize_text(title);
            Self::validate_title(title)?;
        }
        if let Some(status) = &changes.status {
            Self::validate_status(status)?;
        }

        changes.description = changes
            .description
            .map(|d| blank_to_none(d.as_deref().map(Self::sanitize_text)));
        changes.source = changes.source.map(blank_to_none);
        changes.issue_type = changes.issue_type.map(blank_to_none);
        changes.assigned_to = changes.assigned_to.map(blank_to_none);

        if let Some(Some(source)) = &changes.source {
            Self::validate_source(source)?;
        }
        if let Some(Some(issue_type)) = &changes.issue_type {
            Self::validate_issue_type(issue_type)?;
        }
        if let Some(Some(assigned_to)) = &changes.assigned_to {
            Self::validate_short_name("assigned_to", assigned_to)?;
        }

        Ok(changes)
    }

    /// Validate comment body
    pub fn validate_comment_content(content: &str) -> Result<()> {
        if content.trim().is_empty() {
            return Err(invalid("Comment content is required"));
        }

        if content.chars().count() > MAX_CONTENT_LEN {
            return Err(invalid(format!("Comment too long (max {MAX_CONTENT_LEN} characters)")));
        }

        Ok(())
    }

    /// Resolve the stored author name, defaulting to `Anonymous`
    pub fn normalize_author(author: Option<&str>) -> Result<String> {
        match author.map(str::trim).filter(|a| !a.is_empty()) {
            Some(author) => {
                Self::validate_short_name("author", author)?;
                Ok(author.to_string())
            }
            None => Ok(ANONYMOUS_AUTHOR.to_string()),
        }
    }

    /// Validate an issue identifier supplied as text
    pub fn parse_id(field: &str, value: &str) -> Result<i64> {
        value
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|id| *id > 0)
            .ok_or_else(|| invalid(format!("Invalid {field}: {value}")))
    }

    /// Validate a `YYYY-MM` parameter, returning `(year, month)`
    pub fn validate_month_param(value: &str) -> Result<(i32, u32)> {
        let captures = month_pattern()
            .captures(value.trim())
            .ok_or_else(|| invalid(format!("Month must be formatted YYYY-MM, got \"{value}\"")))?;

        let year = captures[1]
            .parse::<i32>()
            .map_err(|_| invalid(format!("Invalid year in \"{value}\"")))?;
        let month = captures[2]
            .parse::<u32>()
            .map_err(|_| invalid(format!("Invalid month in \"{value}\"")))?;

        Ok((year, month))
    }

    /// Validate a year parameter
    pub fn validate_year(year: i32) -> Result<()> {
        if !(1970..=9999).contains(&year) {
            return Err(invalid(format!("Year must be between 1970 and 9999, got {year}")));
        }
        Ok(())
    }

    /// Parse and range-check a year supplied as text
    pub fn parse_year(value: &str) -> Result<i32> {
        let year = value
            .trim()
            .parse::<i32>()
            .map_err(|_| invalid(format!("Invalid year: {value}")))?;
        Self::validate_year(year)?;
        Ok(year)
    }

    /// Parse a `YYYY-MM-DD` filter bound
    pub fn validate_date_param(field: &str, value: &str) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
            .map_err(|_| invalid(format!("{field} must be formatted YYYY-MM-DD, got \"{value}\"")))
    }

    /// Validate date range
    pub fn validate_date_range(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<()> {
        if let (Some(start_date), Some(end_date)) = (start, end) {
            if start_date > end_date {
                return Err(invalid("date_from cannot be after date_to"));
            }
        }
        Ok(())
    }

    /// Validate a key inside the attachment store
    pub fn validate_stored_name(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(invalid("File name cannot be empty"));
        }

        // Check for path traversal attempts
        let path = Path::new(name);
        if name.contains("..")
            || name.contains('/')
            || name.contains('\\')
            || name.contains('~')
            || path.is_absolute()
        {
            return Err(invalid("File name contains potentially dangerous characters"));
        }

        if name.len() > 255 {
            return Err(invalid("File name too long (max 255 characters)"));
        }

        Ok(())
    }

    /// Sanitize text input
    #[must_use]
    pub fn sanitize_text(text: &str) -> String {
        text.chars()
            .filter(|c| !c.is_control() || *c == '\n' || *c == '\t' || *c == '\r')
            .collect::<String>()
            .trim()
            .to_string()
    }

    /// Validate database URL
    pub fn validate_database_url(url: &str) -> Result<()> {
        if url.trim().is_empty() {
            return Err(TrackerError::InvalidConfig("Database URL cannot be empty".into()));
        }

        if !url.starts_with("sqlite:") {
            return Err(TrackerError::InvalidConfig(
                "Only SQLite databases are supported".into(),
            ));
        }

        if url.len() > 1000 {
            return Err(TrackerError::InvalidConfig("Database URL too long".into()));
        }

        Ok(())
    }
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn join_labels<'a>(labels: impl Iterator<Item = &'a str>) -> String {
    labels.collect::<Vec<_>>().join(", ")
}
