mod common;

use std::sync::Arc;

use common::TestEnv;
use issue_tracker::attachments::{
    remove_all, save_all, AttachmentStore, LocalAttachmentStore, PendingUpload,
};
use issue_tracker::error::{Result, TrackerError};
use issue_tracker::models::Attachment;
use issue_tracker::service::{PageLimits, TrackerService};
use mockall::{mock, Sequence};

mock! {
    pub Store {}

    impl AttachmentStore for Store {
        fn save(&self, original_name: &str, mimetype: &str, bytes: &[u8]) -> Result<Attachment>;
        fn read(&self, stored_name: &str) -> Result<Vec<u8>>;
        fn remove(&self, stored_name: &str) -> Result<()>;
    }
}

fn upload(name: &str, bytes: &[u8]) -> PendingUpload {
    PendingUpload {
        file_name: name.to_string(),
        content_type: "text/plain".to_string(),
        bytes: bytes.to_vec(),
    }
}

fn stored(path: &str) -> Attachment {
    Attachment {
        filename: path.to_string(),
        path: path.to_string(),
        mimetype: "text/plain".to_string(),
        size: None,
    }
}

#[test]
fn test_local_store_round_trip() {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = LocalAttachmentStore::new(dir.path().join("files"), 16).expect("store");
    assert!(store.root().is_dir());

    let attachment = store.save("../../notes.txt", "text/plain", b"hello").expect("save");
    assert_eq!(attachment.filename, "../../notes.txt");
    assert!(attachment.path.ends_with("-notes.txt"));
    assert_eq!(attachment.size, Some(5));
    assert!(store.root().join(&attachment.path).is_file());

    assert_eq!(store.read(&attachment.path).expect("read"), b"hello");

    store.remove(&attachment.path).expect("remove");
    store.remove(&attachment.path).expect("second remove is a no-op");
    assert!(matches!(
        store.read(&attachment.path),
        Err(TrackerError::NotFound { entity: "Attachment", .. })
    ));
}

#[test]
fn test_local_store_limits() {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = LocalAttachmentStore::new(dir.path(), 4).expect("store");

    assert!(matches!(
        store.save("big.bin", "application/octet-stream", b"12345"),
        Err(TrackerError::Validation(_))
    ));
    assert!(store.read("../secret").is_err());
    assert!(store.remove("/etc/passwd").is_err());
}

#[test]
fn test_save_all_rolls_back_on_failure() {
    let mut store = MockStore::new();
    let mut seq = Sequence::new();

    store
        .expect_save()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _, _| Ok(stored("first")));
    store
        .expect_save()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _, _| Err(TrackerError::validation("too large")));
    store
        .expect_remove()
        .withf(|name| name == "first")
        .times(1)
        .returning(|_| Ok(()));

    let result = save_all(&store, &[upload("a.txt", b"a"), upload("b.txt", b"b"), upload("c.txt", b"c")]);
    assert!(matches!(result, Err(TrackerError::Validation(_))));
}

#[test]
fn test_remove_all_counts_successes() {
    let mut store = MockStore::new();
    store
        .expect_remove()
        .withf(|name| name == "gone")
        .returning(|_| Err(TrackerError::Io(std::io::Error::other("busy"))));
    store.expect_remove().returning(|_| Ok(()));

    let removed = remove_all(&store, &[stored("kept-1"), stored("gone"), stored("kept-2")]);
    assert_eq!(removed, 2);
}

#[tokio::test]
async fn test_failed_comment_insert_removes_saved_files() {
    let env = TestEnv::new();

    let mut store = MockStore::new();
    store
        .expect_save()
        .times(1)
        .returning(|name, mime, bytes| {
            Ok(Attachment {
                filename: name.to_string(),
                path: format!("1-1-{name}"),
                mimetype: mime.to_string(),
                size: Some(bytes.len() as u64),
            })
        });
    store
        .expect_remove()
        .withf(|name| name == "1-1-log.txt")
        .times(1)
        .returning(|_| Ok(()));

    let service = TrackerService::new(env.db.clone(), Arc::new(store), PageLimits::default());
    let result = service
        .add_comment(4040, "orphan".to_string(), None, vec![upload("log.txt", b"x")])
        .await;
    assert!(matches!(result, Err(TrackerError::NotFound { entity: "Issue", .. })));
}

#[tokio::test]
async fn test_invalid_comment_never_touches_the_store() {
    let env = TestEnv::new();
    let issue = env.seed("Copier", "Pending", None, None, "2025-03-01 09:00:00");

    // No expectations: any store call fails the test
    let store = MockStore::new();
    let service = TrackerService::new(env.db.clone(), Arc::new(store), PageLimits::default());
    let result = service
        .add_comment(issue.id, "  ".to_string(), None, vec![upload("log.txt", b"x")])
        .await;
    assert!(matches!(result, Err(TrackerError::Validation(_))));
}
