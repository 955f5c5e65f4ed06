mod common;

use common::{at, TestEnv};
use issue_tracker::error::TrackerError;
use issue_tracker::models::{Attachment, CommentChanges, IssueChanges, NewComment, NewIssue};
use issue_tracker::Database;

fn attachment(path: &str) -> Attachment {
    Attachment {
        filename: format!("{path}.txt"),
        path: path.to_string(),
        mimetype: "text/plain".to_string(),
        size: Some(4),
    }
}

#[test]
fn test_database_creation_and_initialization() {
    let env = TestEnv::new();
    let _conn = env.db.get_connection().expect("Failed to get database connection");
    env.db.health_check().expect("Health check failed");

    // Reopening runs the migrations again without error
    let db_url = format!("sqlite:{}", env.dir.path().join("issues.db").display());
    Database::new(&db_url).expect("Failed to reopen database");
}

#[test]
fn test_issue_create_get_update() {
    let env = TestEnv::new();

    let created = env
        .db
        .create_issue(&NewIssue {
            title: "Network outage".to_string(),
            source: Some("Email".to_string()),
            created_at: Some(at("2025-03-10 08:00:00")),
            ..NewIssue::default()
        })
        .expect("Failed to create issue");

    assert_eq!(created.status, "Pending");
    assert_eq!(created.created_at, at("2025-03-10 08:00:00"));

    let fetched = env.db.get_issue(created.id).expect("Query failed").expect("Issue missing");
    assert_eq!(fetched, created);

    let updated = env
        .db
        .update_issue(
            created.id,
            &IssueChanges {
                status: Some("Closed".to_string()),
                source: Some(None),
                ..IssueChanges::default()
            },
        )
        .expect("Failed to update issue");
    assert_eq!(updated.status, "Closed");
    assert_eq!(updated.source, None);
    assert_eq!(updated.title, "Network outage");
    assert_eq!(updated.created_at, created.created_at);
    assert!(updated.updated_at >= created.updated_at);
}

#[test]
fn test_update_and_delete_missing_issue() {
    let env = TestEnv::new();
    let changes = IssueChanges {
        title: Some("x".to_string()),
        ..IssueChanges::default()
    };

    assert!(matches!(
        env.db.update_issue(999, &changes),
        Err(TrackerError::NotFound { entity: "Issue", .. })
    ));
    assert!(matches!(
        env.db.delete_issue(999),
        Err(TrackerError::NotFound { entity: "Issue", .. })
    ));
}

#[test]
fn test_comment_on_missing_issue_is_not_found() {
    let env = TestEnv::new();
    let result = env.db.create_comment(&NewComment {
        issue_id: 42,
        content: "hello".to_string(),
        author: None,
        attachments: Vec::new(),
    });
    assert!(matches!(result, Err(TrackerError::NotFound { entity: "Issue", .. })));
}

#[test]
fn test_comments_cascade_with_issue() {
    let env = TestEnv::new();
    let issue = env.seed("Disk full", "Pending", None, None, "2025-03-01 10:00:00");

    for (content, file) in [("first", "a-1"), ("second", "b-2")] {
        env.db
            .create_comment(&NewComment {
                issue_id: issue.id,
                content: content.to_string(),
                author: None,
                attachments: vec![attachment(file)],
            })
            .expect("Failed to add comment");
    }
    assert_eq!(env.db.count_comments(issue.id).expect("count"), 2);

    let orphaned = env.db.delete_issue(issue.id).expect("Failed to delete issue");
    let mut paths: Vec<_> = orphaned.iter().map(|a| a.path.as_str()).collect();
    paths.sort_unstable();
    assert_eq!(paths, ["a-1", "b-2"]);

    assert_eq!(env.db.count_comments(issue.id).expect("count"), 0);
    assert!(env.db.get_issue(issue.id).expect("query").is_none());
}

#[test]
fn test_comment_defaults_and_ordering() {
    let env = TestEnv::new();
    let issue = env.seed("Slow UI", "Pending", None, None, "2025-03-01 10:00:00");

    let first = env
        .db
        .create_comment(&NewComment {
            issue_id: issue.id,
            content: "one".to_string(),
            author: None,
            attachments: Vec::new(),
        })
        .expect("comment");
    let second = env
        .db
        .create_comment(&NewComment {
            issue_id: issue.id,
            content: "two".to_string(),
            author: Some("Mei".to_string()),
            attachments: Vec::new(),
        })
        .expect("comment");

    assert_eq!(first.author, "Anonymous");
    assert!(!first.edited);
    assert!(first.attachments.is_empty());

    // Same-second inserts fall back to id DESC
    let listed = env.db.list_comments(issue.id).expect("list");
    assert_eq!(listed.iter().map(|c| c.id).collect::<Vec<_>>(), [second.id, first.id]);
}

#[test]
fn test_update_comment_attachments() {
    let env = TestEnv::new();
    let issue = env.seed("Scanner", "Pending", None, None, "2025-03-01 10:00:00");
    let comment = env
        .db
        .create_comment(&NewComment {
            issue_id: issue.id,
            content: "see photos".to_string(),
            author: None,
            attachments: vec![attachment("p-1"), attachment("p-2")],
        })
        .expect("comment");

    let (updated, removed) = env
        .db
        .update_comment(
            comment.id,
            &CommentChanges {
                content: None,
                added: vec![attachment("p-3")],
                removed: vec!["p-1".to_string()],
            },
        )
        .expect("update");

    assert!(updated.edited);
    assert_eq!(updated.content, "see photos");
    assert_eq!(removed, vec![attachment("p-1")]);
    assert_eq!(
        updated.attachments.iter().map(|a| a.path.as_str()).collect::<Vec<_>>(),
        ["p-2", "p-3"]
    );

    // Removing a file the comment does not own is rejected and changes nothing
    let err = env
        .db
        .update_comment(
            comment.id,
            &CommentChanges {
                content: Some("new".to_string()),
                added: Vec::new(),
                removed: vec!["p-1".to_string()],
            },
        )
        .expect_err("foreign attachment accepted");
    assert!(matches!(err, TrackerError::Validation(_)));
    let unchanged = env.db.get_comment(comment.id).expect("query").expect("comment");
    assert_eq!(unchanged.content, "see photos");
}

#[test]
fn test_corrupt_attachment_column_reads_as_empty() {
    let env = TestEnv::new();
    let issue = env.seed("Router", "Pending", None, None, "2025-03-01 10:00:00");
    let comment = env
        .db
        .create_comment(&NewComment {
            issue_id: issue.id,
            content: "x".to_string(),
            author: None,
            attachments: vec![attachment("r-1")],
        })
        .expect("comment");

    let conn = env.db.get_connection().expect("conn");
    conn.execute(
        "UPDATE comments SET attachments = '{not json' WHERE id = ?1",
        [comment.id],
    )
    .expect("corrupt");
    drop(conn);

    let listed = env.db.list_comments(issue.id).expect("list");
    assert_eq!(listed.len(), 1);
    assert!(listed[0].attachments.is_empty());

    // Deleting still works and reports nothing to clean up
    let removed = env.db.delete_comment(comment.id).expect("delete");
    assert!(removed.is_empty());
    assert!(matches!(
        env.db.delete_comment(comment.id),
        Err(TrackerError::NotFound { entity: "Comment", .. })
    ));
}
