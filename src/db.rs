use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::{Local, NaiveDateTime, Timelike};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row, ToSql};
use tracing::{debug, info};

use crate::error::{Result, TrackerError};
use crate::models::{
    parse_attachments, serialize_attachments, Attachment, Comment, CommentChanges, Issue,
    IssueChanges, NewComment, NewIssue,
};
use crate::query::{IssuePage, IssueQuery};
use crate::schema::{comments, issues};
use crate::validation::InputValidator;

// Type alias for the database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = r2d2::PooledConnection<SqliteConnectionManager>;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// SQL function folding text to Unicode lowercase; NULL stays NULL
pub const CASE_FOLD_FN: &str = "casefold";

/// Register the scalar functions every pooled connection needs
pub fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        CASE_FOLD_FN,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|text| text.to_lowercase())),
    )
}

/// Current local time truncated to whole seconds
#[must_use]
pub fn now() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

/// Database manager for handling connections and operations
///
/// Cloning is cheap and shares the pool; the pool drains when the last
/// clone is dropped.
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Create a connection pool with default sizing
    pub fn new(database_url: &str) -> Result<Self> {
        Self::with_pool_settings(database_url, DEFAULT_MAX_CONNECTIONS, DEFAULT_CONNECTION_TIMEOUT)
    }

    /// Create a bounded connection pool and run migrations
    pub fn with_pool_settings(
        database_url: &str,
        max_connections: u32,
        connection_timeout: Duration,
    ) -> Result<Self> {
        InputValidator::validate_database_url(database_url)?;
        let path = database_path(database_url);

        let (manager, max_connections) = if path == ":memory:" {
            // Every in-memory connection is its own database, so share one
            (SqliteConnectionManager::memory(), 1)
        } else {
            // Create parent directory if it doesn't exist
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            (SqliteConnectionManager::file(path), max_connections)
        };

        let manager = manager.with_init(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")?;
            register_functions(conn)
        });

        let pool = Pool::builder()
            .max_size(max_connections)
            .connection_timeout(connection_timeout)
            .build(manager)?;

        // Run migrations
        let conn = pool.get()?;
        Self::run_migrations(&conn)?;

        info!(path, max_connections, "Database pool ready");
        Ok(Self { pool })
    }

    /// Run database migrations
    fn run_migrations(conn: &Connection) -> Result<()> {
        conn.execute_batch(include_str!("../migrations/2025-03-01-000000_create_issues/up.sql"))?;
        conn.execute_batch(include_str!("../migrations/2025-03-01-000001_create_comments/up.sql"))?;
        conn.execute_batch(include_str!("../migrations/2025-03-01-000002_create_summaries/up.sql"))?;
        Ok(())
    }

    /// Get a connection from the pool
    pub fn get_connection(&self) -> Result<DbConnection> {
        Ok(self.pool.get()?)
    }

    /// Configured upper bound on pooled connections
    #[must_use]
    pub fn max_connections(&self) -> u32 {
        self.pool.max_size()
    }

    /// Round-trip a trivial query through the pool
    pub fn health_check(&self) -> Result<()> {
        let conn = self.get_connection()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    /// Insert a validated issue and return the stored row
    pub fn create_issue(&self, new_issue: &NewIssue) -> Result<Issue> {
        let conn = self.get_connection()?;
        let now = now();
        let created_at = new_issue.created_at.unwrap_or(now);
        let status = new_issue.status.as_deref().unwrap_or("Pending");

        conn.execute(
            &format!(
                "INSERT INTO {} ({}, {}, {}, {}, {}, {}, {}, {}, {}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                issues::TABLE,
                issues::TITLE,
                issues::DESCRIPTION,
                issues::SOURCE,
                issues::ISSUE_TYPE,
                issues::STATUS,
                issues::WARRANTY_END_DATE,
                issues::ASSIGNED_TO,
                issues::CREATED_AT,
                issues::UPDATED_AT
            ),
            params![
                new_issue.title,
                new_issue.description,
                new_issue.source,
                new_issue.issue_type,
                status,
                new_issue.warranty_end_date,
                new_issue.assigned_to,
                created_at,
                now
            ],
        )?;

        let id = conn.last_insert_rowid();
        debug!(issue_id = id, "Inserted issue");

        Ok(Issue {
            id,
            title: new_issue.title.clone(),
            description: new_issue.description.clone(),
            source: new_issue.source.clone(),
            issue_type: new_issue.issue_type.clone(),
            status: status.to_string(),
            warranty_end_date: new_issue.warranty_end_date,
            assigned_to: new_issue.assigned_to.clone(),
            created_at,
            updated_at: now,
        })
    }

    /// Get an issue by ID
    pub fn get_issue(&self, issue_id: i64) -> Result<Option<Issue>> {
        let conn = self.get_connection()?;
        Self::find_issue(&conn, issue_id)
    }

    fn find_issue(conn: &Connection, issue_id: i64) -> Result<Option<Issue>> {
        let issue = conn
            .query_row(
                &format!("SELECT * FROM {} WHERE {} = ?", issues::TABLE, issues::ID),
                params![issue_id],
                map_issue,
            )
            .optional()?;
        Ok(issue)
    }

    /// Apply a validated partial update; `updated_at` is always refreshed
    pub fn update_issue(&self, issue_id: i64, changes: &IssueChanges) -> Result<Issue> {
        let conn = self.get_connection()?;

        let mut update_fields = Vec::new();
        let mut update_params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(title) = &changes.title {
            update_fields.push(format!("{} = ?", issues::TITLE));
            update_params.push(Box::new(title.clone()));
        }
        if let Some(description) = &changes.description {
            update_fields.push(format!("{} = ?", issues::DESCRIPTION));
            update_params.push(Box::new(description.clone()));
        }
        if let Some(source) = &changes.source {
            update_fields.push(format!("{} = ?", issues::SOURCE));
            update_params.push(Box::new(source.clone()));
        }
        if let Some(issue_type) = &changes.issue_type {
            update_fields.push(format!("{} = ?", issues::ISSUE_TYPE));
            update_params.push(Box::new(issue_type.clone()));
        }
        if let Some(status) = &changes.status {
            update_fields.push(format!("{} = ?", issues::STATUS));
            update_params.push(Box::new(status.clone()));
        }
        if let Some(warranty_end_date) = &changes.warranty_end_date {
            update_fields.push(format!("{} = ?", issues::WARRANTY_END_DATE));
            update_params.push(Box::new(*warranty_end_date));
        }
        if let Some(assigned_to) = &changes.assigned_to {
            update_fields.push(format!("{} = ?", issues::ASSIGNED_TO));
            update_params.push(Box::new(assigned_to.clone()));
        }

        if update_fields.is_empty() {
            return Err(TrackerError::validation("No fields supplied for update"));
        }

        // Add update timestamp and the ID for the WHERE clause
        update_fields.push(format!("{} = ?", issues::UPDATED_AT));
        update_params.push(Box::new(now()));
        update_params.push(Box::new(issue_id));

        let query = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            issues::TABLE,
            update_fields.join(", "),
            issues::ID
        );

        let affected = conn.execute(&query, params_from_iter(update_params.iter()))?;
        if affected == 0 {
            return Err(TrackerError::not_found("Issue", issue_id));
        }

        Self::find_issue(&conn, issue_id)?.ok_or_else(|| TrackerError::not_found("Issue", issue_id))
    }

    /// Delete an issue and, through the foreign key, its comments
    ///
    /// Returns the attachments the removed comments referenced so the caller
    /// can delete the stored files.
    pub fn delete_issue(&self, issue_id: i64) -> Result<Vec<Attachment>> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;

        let orphaned = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {} FROM {} WHERE {} = ?",
                comments::ATTACHMENTS,
                comments::TABLE,
                comments::ISSUE_ID
            ))?;
            let rows = stmt.query_map(params![issue_id], |row| row.get::<_, Option<String>>(0))?;

            let mut orphaned = Vec::new();
            for raw in rows {
                orphaned.extend(parse_attachments(raw?.as_deref()));
            }
            orphaned
        };

        let affected = tx.execute(
            &format!("DELETE FROM {} WHERE {} = ?", issues::TABLE, issues::ID),
            params![issue_id],
        )?;
        if affected == 0 {
            return Err(TrackerError::not_found("Issue", issue_id));
        }

        tx.commit()?;
        debug!(issue_id, attachments = orphaned.len(), "Deleted issue");
        Ok(orphaned)
    }

    /// Run a filtered, paginated listing
    pub fn list_issues(&self, query: &IssueQuery) -> Result<IssuePage> {
        let conn = self.get_connection()?;
        query.execute(&conn)
    }

    /// Insert a comment; a missing parent issue is reported as not found
    pub fn create_comment(&self, new_comment: &NewComment) -> Result<Comment> {
        let conn = self.get_connection()?;
        let now = now();
        let author = new_comment
            .author
            .clone()
            .unwrap_or_else(|| crate::models::ANONYMOUS_AUTHOR.to_string());
        let attachments = serialize_attachments(&new_comment.attachments)?;

        let inserted = conn.execute(
            &format!(
                "INSERT INTO {} ({}, {}, {}, {}, {}, {}, {}) VALUES (?, ?, ?, ?, 0, ?, ?)",
                comments::TABLE,
                comments::ISSUE_ID,
                comments::CONTENT,
                comments::AUTHOR,
                comments::ATTACHMENTS,
                comments::EDITED,
                comments::CREATED_AT,
                comments::UPDATED_AT
            ),
            params![new_comment.issue_id, new_comment.content, author, attachments, now, now],
        );

        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                return Err(TrackerError::not_found("Issue", new_comment.issue_id));
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Comment {
            id: conn.last_insert_rowid(),
            issue_id: new_comment.issue_id,
            content: new_comment.content.clone(),
            author,
            attachments: new_comment.attachments.clone(),
            edited: false,
            created_at: now,
            updated_at: now,
        })
    }

    /// Comments for an issue, newest first
    pub fn list_comments(&self, issue_id: i64) -> Result<Vec<Comment>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT * FROM {} WHERE {} = ? ORDER BY {} DESC, {} DESC",
            comments::TABLE,
            comments::ISSUE_ID,
            comments::CREATED_AT,
            comments::ID
        ))?;

        let comment_iter = stmt.query_map(params![issue_id], map_comment)?;

        let mut results = Vec::new();
        for comment in comment_iter {
            results.push(comment?);
        }
        Ok(results)
    }

    /// Get a comment by ID
    pub fn get_comment(&self, comment_id: i64) -> Result<Option<Comment>> {
        let conn = self.get_connection()?;
        Self::find_comment(&conn, comment_id)
    }

    fn find_comment(conn: &Connection, comment_id: i64) -> Result<Option<Comment>> {
        let comment = conn
            .query_row(
                &format!("SELECT * FROM {} WHERE {} = ?", comments::TABLE, comments::ID),
                params![comment_id],
                map_comment,
            )
            .optional()?;
        Ok(comment)
    }

    /// Replace content and/or edit the attachment list of a comment
    ///
    /// Returns the updated comment and the attachments that were dropped.
    pub fn update_comment(
        &self,
        comment_id: i64,
        changes: &CommentChanges,
    ) -> Result<(Comment, Vec<Attachment>)> {
        if changes.is_empty() {
            return Err(TrackerError::validation("No changes supplied for comment"));
        }

        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;

        let current = Self::find_comment(&tx, comment_id)?
            .ok_or_else(|| TrackerError::not_found("Comment", comment_id))?;

        let (removed, mut kept): (Vec<Attachment>, Vec<Attachment>) = current
            .attachments
            .into_iter()
            .partition(|a| changes.removed.contains(&a.path));

        if let Some(missing) = changes
            .removed
            .iter()
            .find(|path| !removed.iter().any(|a| &a.path == *path))
        {
            return Err(TrackerError::validation(format!(
                "Attachment {missing} does not belong to comment {comment_id}"
            )));
        }

        kept.extend(changes.added.iter().cloned());
        let content = changes.content.clone().unwrap_or(current.content);
        let now = now();

        let affected = tx.execute(
            &format!(
                "UPDATE {} SET {} = ?, {} = ?, {} = 1, {} = ? WHERE {} = ?",
                comments::TABLE,
                comments::CONTENT,
                comments::ATTACHMENTS,
                comments::EDITED,
                comments::UPDATED_AT,
                comments::ID
            ),
            params![content, serialize_attachments(&kept)?, now, comment_id],
        )?;
        if affected == 0 {
            return Err(TrackerError::not_found("Comment", comment_id));
        }

        let updated = Self::find_comment(&tx, comment_id)?
            .ok_or_else(|| TrackerError::not_found("Comment", comment_id))?;
        tx.commit()?;

        Ok((updated, removed))
    }

    /// Delete a comment, returning the attachments it referenced
    pub fn delete_comment(&self, comment_id: i64) -> Result<Vec<Attachment>> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;

        let attachments = tx
            .query_row(
                &format!(
                    "SELECT {} FROM {} WHERE {} = ?",
                    comments::ATTACHMENTS,
                    comments::TABLE,
                    comments::ID
                ),
                params![comment_id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?
            .map(|raw| parse_attachments(raw.as_deref()))
            .unwrap_or_default();

        let affected = tx.execute(
            &format!("DELETE FROM {} WHERE {} = ?", comments::TABLE, comments::ID),
            params![comment_id],
        )?;
        if affected == 0 {
            return Err(TrackerError::not_found("Comment", comment_id));
        }

        tx.commit()?;
        Ok(attachments)
    }

    /// Number of comments currently attached to an issue
    pub fn count_comments(&self, issue_id: i64) -> Result<u64> {
        let conn = self.get_connection()?;
        let count: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE {} = ?",
                comments::TABLE,
                comments::ISSUE_ID
            ),
            params![issue_id],
            |row| row.get(0),
        )?;
        Ok(crate::aggregate::to_count(count))
    }

    /// Attachment record for a stored file name, if any comment references it
    pub fn find_attachment(&self, stored_name: &str) -> Result<Option<Attachment>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {attachments} FROM {} WHERE instr({attachments}, ?) > 0",
            comments::TABLE,
            attachments = comments::ATTACHMENTS
        ))?;

        let rows = stmt.query_map(params![stored_name], |row| row.get::<_, Option<String>>(0))?;
        for raw in rows {
            if let Some(found) = parse_attachments(raw?.as_deref())
                .into_iter()
                .find(|a| a.path == stored_name)
            {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }
}

/// Strip the `sqlite:` / `sqlite://` scheme from a database URL
fn database_path(database_url: &str) -> &str {
    database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url)
}

/// Map a database row to an Issue
pub(crate) fn map_issue(row: &Row) -> rusqlite::Result<Issue> {
    Ok(Issue {
        id: row.get(issues::ID)?,
        title: row.get(issues::TITLE)?,
        description: row.get(issues::DESCRIPTION)?,
        source: row.get(issues::SOURCE)?,
        issue_type: row.get(issues::ISSUE_TYPE)?,
        status: row.get(issues::STATUS)?,
        warranty_end_date: row.get(issues::WARRANTY_END_DATE)?,
        assigned_to: row.get(issues::ASSIGNED_TO)?,
        created_at: row.get(issues::CREATED_AT)?,
        updated_at: row.get(issues::UPDATED_AT)?,
    })
}

/// Map a database row to a Comment, tolerating a corrupt attachment column
fn map_comment(row: &Row) -> rusqlite::Result<Comment> {
    let raw_attachments: Option<String> = row.get(comments::ATTACHMENTS)?;
    Ok(Comment {
        id: row.get(comments::ID)?,
        issue_id: row.get(comments::ISSUE_ID)?,
        content: row.get(comments::CONTENT)?,
        author: row.get(comments::AUTHOR)?,
        attachments: parse_attachments(raw_attachments.as_deref()),
        edited: row.get(comments::EDITED)?,
        created_at: row.get(comments::CREATED_AT)?,
        updated_at: row.get(comments::UPDATED_AT)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_path() {
        assert_eq!(database_path("sqlite:data/issues.db"), "data/issues.db");
        assert_eq!(database_path("sqlite:///tmp/x.db"), "/tmp/x.db");
        assert_eq!(database_path("sqlite::memory:"), ":memory:");
    }

    #[test]
    fn test_in_memory_database_runs_migrations() {
        let db = Database::new("sqlite::memory:").unwrap();
        assert_eq!(db.max_connections(), 1);
        db.health_check().unwrap();
        assert!(db.get_issue(1).unwrap().is_none());
    }

    #[test]
    fn test_rejects_non_sqlite_url() {
        assert!(Database::new("postgres://localhost/issues").is_err());
    }
}
