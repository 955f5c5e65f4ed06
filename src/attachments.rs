//! Storage for files attached to comments.
//!
//! Comments only hold keys into the store; the store owns the bytes.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{debug, warn};

use crate::error::{Result, TrackerError};
use crate::models::Attachment;
use crate::validation::InputValidator;

const MAX_STORED_STEM: usize = 100;

/// A file received with a request, not yet written to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Store every upload; if one fails, the ones already written are removed
pub fn save_all(store: &dyn AttachmentStore, uploads: &[PendingUpload]) -> Result<Vec<Attachment>> {
    let mut saved = Vec::with_capacity(uploads.len());
    for upload in uploads {
        match store.save(&upload.file_name, &upload.content_type, &upload.bytes) {
            Ok(attachment) => saved.push(attachment),
            Err(e) => {
                remove_all(store, &saved);
                return Err(e);
            }
        }
    }
    Ok(saved)
}

/// Where comment attachments live
pub trait AttachmentStore: Send + Sync {
    /// Persist an upload and describe it
    fn save(&self, original_name: &str, mimetype: &str, bytes: &[u8]) -> Result<Attachment>;

    /// Load a stored file by key
    fn read(&self, stored_name: &str) -> Result<Vec<u8>>;

    /// Delete a stored file; a key that is already gone is not an error
    fn remove(&self, stored_name: &str) -> Result<()>;
}

/// Delete every file in `attachments`, logging failures instead of returning them
pub fn remove_all(store: &dyn AttachmentStore, attachments: &[Attachment]) -> usize {
    let mut removed = 0;
    for attachment in attachments {
        match store.remove(&attachment.path) {
            Ok(()) => removed += 1,
            Err(e) => warn!(path = %attachment.path, error = %e, "Failed to remove attachment"),
        }
    }
    removed
}

/// Attachments kept as plain files under one directory
#[derive(Debug, Clone)]
pub struct LocalAttachmentStore {
    root: PathBuf,
    max_bytes: u64,
}

impl LocalAttachmentStore {
    /// Open (creating if needed) the upload directory
    pub fn new(root: impl Into<PathBuf>, max_bytes: u64) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root, max_bytes })
    }

    /// Directory files are written to
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, stored_name: &str) -> Result<PathBuf> {
        InputValidator::validate_stored_name(stored_name)?;
        Ok(self.root.join(stored_name))
    }
}

impl AttachmentStore for LocalAttachmentStore {
    fn save(&self, original_name: &str, mimetype: &str, bytes: &[u8]) -> Result<Attachment> {
        let size = bytes.len() as u64;
        if size > self.max_bytes {
            return Err(TrackerError::validation(format!(
                "File {original_name} exceeds the {} byte upload limit",
                self.max_bytes
            )));
        }

        let stored_name = format!(
            "{}-{}-{}",
            Local::now().timestamp_millis(),
            rand::random::<u32>(),
            sanitize_file_name(original_name)
        );
        let path = self.path_for(&stored_name)?;
        fs::write(&path, bytes)?;
        debug!(stored_name, size, "Stored attachment");

        Ok(Attachment {
            filename: original_name.to_string(),
            path: stored_name,
            mimetype: mimetype.to_string(),
            size: Some(size),
        })
    }

    fn read(&self, stored_name: &str) -> Result<Vec<u8>> {
        let path = self.path_for(stored_name)?;
        fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => TrackerError::not_found("Attachment", stored_name),
            _ => e.into(),
        })
    }

    fn remove(&self, stored_name: &str) -> Result<()> {
        let path = self.path_for(stored_name)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(stored_name, "Removed attachment");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Reduce an uploaded name to a safe ASCII file-name component
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_STORED_STEM)
        .collect();

    let cleaned = cleaned.trim_start_matches('.').replace("..", "_");
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

/// Content type for a download: the type recorded at upload, else a guess
/// from the stored file extension
#[must_use]
pub fn content_type_for(stored_name: &str, recorded: Option<&str>) -> String {
    match recorded.map(str::trim) {
        Some(mimetype) if !mimetype.is_empty() => mimetype.to_string(),
        _ => mime_guess::from_path(stored_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
    }
}
