//! Issue Tracker - Support Ticket Backend
//!
//! A Rust library and HTTP service for tracking support and maintenance
//! issues, their comments and attachments, and the monthly and annual
//! statistics derived from them.
//!
//! # Features
//!
//! - Filtered, sorted, paginated issue listing
//! - Comments with file attachments
//! - Live monthly / annual aggregation and yearly trends
//! - Idempotent monthly and annual rollups, with a monthly scheduled job
//! - CSV and plain-text report exports

/// Grouped statistics over a time window
pub mod aggregate;
/// Attachment storage
pub mod attachments;
/// Configuration management
pub mod config;
/// Database operations and connection pooling
pub mod db;
/// Error types
pub mod error;
/// HTTP router and handlers
pub mod http;
/// Logging setup and utilities
pub mod logging;
/// Metrics collection
pub mod metrics;
/// Data models and structures
pub mod models;
/// Issue listing query builder
pub mod query;
/// All-time report and exports
pub mod report;
/// Monthly rollup job
pub mod scheduler;
/// Database schema definitions
pub mod schema;
/// Async service facade
pub mod service;
/// Stored rollups
pub mod summary;
/// Yearly trend series
pub mod trend;
/// Input validation and sanitization
pub mod validation;

// Re-export key components for easier access
pub use db::Database;
pub use error::{Result, TrackerError};
pub use models::{Comment, Issue, IssueChanges, NewIssue};
pub use service::{PageLimits, TrackerService};
