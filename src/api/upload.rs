//! Multipart form intake with streamed file storage.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::multipart::{Field, MultipartError};
use axum::extract::Multipart;
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::dispatch::Attachment;

/// Default per-file size ceiling.
pub const DEFAULT_MAX_FILE_BYTES: usize = 10 * 1024 * 1024;

/// Global counter for upload name generation.
static COUNTER: AtomicU64 = AtomicU64::new(1);

/// On-disk name of a staged upload.
///
/// Displayed as `upload-<pid>-XXXXXXXX` so that two gateway processes
/// sharing an uploads directory do not race for the same names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UploadId {
    pid: u32,
    seq: u64,
}

impl UploadId {
    pub fn new() -> Self {
        Self {
            pid: std::process::id(),
            seq: COUNTER.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "upload-{}-{:08x}", self.pid, self.seq)
    }
}

/// Where and how large uploads may be.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub dir: PathBuf,
    pub max_file_bytes: usize,
}

impl UploadConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }

    pub fn with_max_file_bytes(mut self, max: usize) -> Self {
        self.max_file_bytes = max;
        self
    }
}

/// Upload failures.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("file exceeds the {0} byte limit")]
    TooLarge(usize),

    #[error("multipart error: {0}")]
    Multipart(#[from] MultipartError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl UploadError {
    /// Whether the client sent more than it is allowed to.
    pub fn is_too_large(&self) -> bool {
        match self {
            UploadError::TooLarge(_) => true,
            UploadError::Multipart(e) => e.status() == axum::http::StatusCode::PAYLOAD_TOO_LARGE,
            UploadError::Io(_) => false,
        }
    }
}

/// Text fields plus at most one staged file.
#[derive(Debug, Default)]
pub struct FormData {
    pub fields: HashMap<String, String>,
    pub file: Option<Attachment>,
}

impl FormData {
    /// A text field, `None` when absent.
    pub fn field(&self, name: &str) -> Option<String> {
        self.fields.get(name).cloned()
    }
}

/// Read every part of `multipart`, streaming the part named `file_field`
/// to a fresh file under the uploads directory.
///
/// Only the first file part is kept. On failure nothing stays on disk.
pub async fn read_form(
    mut multipart: Multipart,
    config: &UploadConfig,
    file_field: &str,
) -> Result<FormData, UploadError> {
    let mut form = FormData::default();

    if let Err(e) = collect(&mut multipart, config, file_field, &mut form).await {
        if let Some(file) = form.file.take() {
            discard(&file.path).await;
        }
        return Err(e);
    }

    Ok(form)
}

async fn collect(
    multipart: &mut Multipart,
    config: &UploadConfig,
    file_field: &str,
    form: &mut FormData,
) -> Result<(), UploadError> {
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        if name != file_field {
            if field.file_name().is_some() {
                debug!("Ignoring unexpected file part {:?}", name);
                continue;
            }
            let value = field.text().await?;
            form.fields.insert(name, value);
            continue;
        }

        let Some(file_name) = field.file_name().filter(|n| !n.is_empty()).map(str::to_string) else {
            continue;
        };
        if form.file.is_some() {
            debug!("Ignoring extra file part {}", file_name);
            continue;
        }

        let declared_type = field.content_type().map(str::to_string);
        let path = store(field, config).await?;
        debug!("Staged upload {} at {}", file_name, path.display());

        let mut attachment = Attachment::new(path, file_name);
        if let Some(media_type) = declared_type {
            attachment = attachment.with_declared_type(media_type);
        }
        form.file = Some(attachment);
    }

    Ok(())
}

/// Stream one field to disk, enforcing the size ceiling.
async fn store(mut field: Field<'_>, config: &UploadConfig) -> Result<PathBuf, UploadError> {
    let (path, mut file) = create_unique(&config.dir).await?;

    let result: Result<(), UploadError> = async {
        let mut written = 0usize;
        while let Some(chunk) = field.chunk().await? {
            written += chunk.len();
            if written > config.max_file_bytes {
                return Err(UploadError::TooLarge(config.max_file_bytes));
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }
    .await;

    match result {
        Ok(()) => Ok(path),
        Err(e) => {
            drop(file);
            discard(&path).await;
            Err(e)
        }
    }
}

async fn create_unique(dir: &Path) -> Result<(PathBuf, File), UploadError> {
    loop {
        let path = dir.join(UploadId::new().to_string());
        match OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

async fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        warn!("Failed to remove upload {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_uniqueness() {
        let mut ids = HashSet::new();
        for _ in 0..10_000 {
            let id = UploadId::new();
            assert!(ids.insert(id), "Duplicate ID generated: {}", id);
        }
    }

    #[test]
    fn test_display_format() {
        let id = UploadId { pid: 42, seq: 255 };
        assert_eq!(id.to_string(), "upload-42-000000ff");
    }

    #[test]
    fn test_config_defaults() {
        let config = UploadConfig::new("uploads");
        assert_eq!(config.dir, PathBuf::from("uploads"));
        assert_eq!(config.max_file_bytes, DEFAULT_MAX_FILE_BYTES);
        assert_eq!(config.with_max_file_bytes(5).max_file_bytes, 5);
    }

    #[tokio::test]
    async fn test_create_unique_distinct_names() {
        let dir = tempfile::tempdir().unwrap();
        let (a, _fa) = create_unique(dir.path()).await.unwrap();
        let (b, _fb) = create_unique(dir.path()).await.unwrap();
        assert_ne!(a, b);
        assert!(a.exists() && b.exists());
    }

    #[test]
    fn test_too_large_flag() {
        assert!(UploadError::TooLarge(1).is_too_large());
        assert!(!UploadError::Io(io::Error::other("x")).is_too_large());
    }
}
