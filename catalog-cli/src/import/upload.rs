//! Upload boundary: validate, store, enqueue
//!
//! Accepting an upload never reads the workbook. It only checks that the
//! payload looks like an xlsx of acceptable size, writes it to storage under a
//! fresh name and queues an import job for it.

use anyhow::Context;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use super::queue::JobQueue;
use super::storage::FileStorage;
use crate::api::ValidationErrors;

pub const ACCEPTED_MESSAGE: &str = "Uploading is in process and submitted successfully";
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
/// 5120 KiB
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 5120 * 1024;

/// Directory (storage key prefix) for uploaded workbooks
pub const UPLOAD_DIR: &str = "products";

const FILE_FIELD: &str = "file";
const ZIP_SIGNATURE: &[u8] = b"PK\x03\x04";

/// An uploaded file as received at the boundary
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            bytes,
        }
    }

    /// Read a local file as an upload
    pub async fn from_path(path: &Path) -> anyhow::Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read upload file: {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let content_type = has_xlsx_extension(&file_name).then(|| XLSX_CONTENT_TYPE.to_string());

        Ok(Self {
            file_name,
            content_type,
            bytes,
        })
    }
}

fn has_xlsx_extension(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xlsx"))
}

/// Check an upload against the required, xlsx and size rules
pub fn validate_upload(
    file: Option<&UploadedFile>,
    max_bytes: u64,
) -> Result<&UploadedFile, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let Some(file) = file.filter(|file| !file.bytes.is_empty()) else {
        errors.add(FILE_FIELD, "Please upload an Excel file.");
        return Err(errors);
    };

    if !has_xlsx_extension(&file.file_name) || !file.bytes.starts_with(ZIP_SIGNATURE) {
        errors.add(FILE_FIELD, "The file must be a .xlsx Excel file.");
    }

    if file.bytes.len() as u64 > max_bytes {
        errors.add(FILE_FIELD, "The Excel file must not exceed 5MB.");
    }

    errors.into_result(file)
}

/// Body returned once an upload is accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportAccepted {
    pub message: String,
    pub job_id: String,
    pub file_path: String,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("{0}")]
    Invalid(ValidationErrors),

    #[error("failed to store upload '{path}': {source}")]
    Storage {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to queue import: {0:#}")]
    Queue(anyhow::Error),
}

/// Accepts uploads on behalf of the import pipeline
#[derive(Clone)]
pub struct ImportService {
    storage: Arc<dyn FileStorage>,
    queue: Arc<dyn JobQueue>,
    max_upload_bytes: u64,
}

impl ImportService {
    pub fn new(storage: Arc<dyn FileStorage>, queue: Arc<dyn JobQueue>) -> Self {
        Self {
            storage,
            queue,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: u64) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }

    /// Validate, store and enqueue. Returns as soon as the job is queued.
    pub async fn accept(&self, file: Option<&UploadedFile>) -> Result<ImportAccepted, UploadError> {
        let file = validate_upload(file, self.max_upload_bytes).map_err(UploadError::Invalid)?;

        let path = format!("{}/{}.xlsx", UPLOAD_DIR, Uuid::new_v4());
        self.storage
            .put(&path, &file.bytes)
            .await
            .map_err(|source| UploadError::Storage {
                path: path.clone(),
                source,
            })?;

        let job = match self.queue.enqueue(&path).await {
            Ok(job) => job,
            Err(e) => {
                if let Err(cleanup) = self.storage.delete(&path).await {
                    log::warn!("Failed to remove unqueued upload {}: {}", path, cleanup);
                }
                return Err(UploadError::Queue(e));
            }
        };

        log::info!(
            "Accepted upload '{}' ({} bytes) as job {}",
            file.file_name,
            file.bytes.len(),
            job.id
        );

        Ok(ImportAccepted {
            message: ACCEPTED_MESSAGE.to_string(),
            job_id: job.id,
            file_path: path,
        })
    }
}
