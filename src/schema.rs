//! Database schema definitions
//!
//! This module provides constants for table and column names used with rusqlite.

/// Issues table schema
pub mod issues {
    /// Table name
    pub const TABLE: &str = "issues";
    /// Primary key column
    pub const ID: &str = "id";
    /// Short summary column
    pub const TITLE: &str = "title";
    /// Free-text body column
    pub const DESCRIPTION: &str = "description";
    /// Origin channel column
    pub const SOURCE: &str = "source";
    /// Category column
    pub const ISSUE_TYPE: &str = "issue_type";
    /// Workflow status column
    pub const STATUS: &str = "status";
    /// Warranty expiry date column
    pub const WARRANTY_END_DATE: &str = "warranty_end_date";
    /// Assignee column
    pub const ASSIGNED_TO: &str = "assigned_to";
    /// Creation timestamp column
    pub const CREATED_AT: &str = "created_at";
    /// Last mutation timestamp column
    pub const UPDATED_AT: &str = "updated_at";
}

/// Comments table schema
pub mod comments {
    /// Table name
    pub const TABLE: &str = "comments";
    /// Primary key column
    pub const ID: &str = "id";
    /// Foreign key to issues table
    pub const ISSUE_ID: &str = "issue_id";
    /// Comment body column
    pub const CONTENT: &str = "content";
    /// Author display name column
    pub const AUTHOR: &str = "author";
    /// JSON-encoded attachment list column
    pub const ATTACHMENTS: &str = "attachments";
    /// Edited flag column
    pub const EDITED: &str = "edited";
    /// Creation timestamp column
    pub const CREATED_AT: &str = "created_at";
    /// Last mutation timestamp column
    pub const UPDATED_AT: &str = "updated_at";
}

/// Columns shared by both summary tables
pub mod summaries {
    /// Monthly rollup table name
    pub const MONTHLY_TABLE: &str = "monthly_summaries";
    /// Annual rollup table name
    pub const ANNUAL_TABLE: &str = "annual_summaries";
    /// Period year column
    pub const YEAR: &str = "year";
    /// Period month column (monthly table only)
    pub const MONTH: &str = "month";
    /// Total issue count column
    pub const TOTAL_ISSUES: &str = "total_issues";
    /// Closed issue count column
    pub const CLOSED_ISSUES: &str = "closed_issues";
    /// Not-closed issue count column
    pub const PENDING_ISSUES: &str = "pending_issues";
    /// JSON source distribution column
    pub const SOURCE_STATS: &str = "source_stats";
    /// JSON issue-type distribution column
    pub const ISSUE_TYPE_STATS: &str = "issue_type_stats";
    /// Last computation timestamp column
    pub const COMPUTED_AT: &str = "computed_at";
}
