//! Error taxonomy for the import pipeline
//!
//! The worker hands these to the job queue, which decides whether a failed
//! job goes back to `Queued` or ends in `Failed`. Nothing here retries.

use thiserror::Error;

/// Failure of an import job or of one of its chunks
#[derive(Debug, Error)]
pub enum ImportError {
    /// Stored file is gone (already cleaned up or never written)
    #[error("source file '{path}' is missing from storage")]
    SourceMissing { path: String },

    /// Storage returned an I/O error other than not-found
    #[error("failed to read source file '{path}': {source}")]
    SourceUnreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Bytes are not a readable xlsx workbook
    #[error("failed to read workbook: {0}")]
    Workbook(#[from] calamine::XlsxError),

    #[error("Excel file has no sheets")]
    NoSheets,

    /// The blocking reader thread panicked or was cancelled
    #[error("workbook reader stopped unexpectedly: {0}")]
    ReaderAborted(String),

    /// Batched lookup or batched upsert against the product store failed
    #[error("stock store failure: {0:#}")]
    Store(anyhow::Error),

    /// Another worker took over the job while this one was importing it
    #[error("import job {job_id} was reclaimed by another worker")]
    ClaimLost { job_id: String },

    /// Every chunk committed but the source file could not be deleted
    #[error("failed to delete source file '{path}': {source}")]
    Cleanup {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ImportError {
    /// Whether the queue may redeliver the job.
    ///
    /// Precondition failures (missing file, corrupt workbook, no sheets) are
    /// deterministic and will fail the same way again.
    pub fn is_retriable(&self) -> bool {
        match self {
            ImportError::SourceMissing { .. }
            | ImportError::Workbook(_)
            | ImportError::NoSheets
            | ImportError::ReaderAborted(_)
            | ImportError::ClaimLost { .. } => false,
            ImportError::SourceUnreadable { .. }
            | ImportError::Store(_)
            | ImportError::Cleanup { .. } => true,
        }
    }

    /// Map a storage read error, separating a missing file from transient I/O
    pub fn from_read(path: &str, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            ImportError::SourceMissing {
                path: path.to_string(),
            }
        } else {
            ImportError::SourceUnreadable {
                path: path.to_string(),
                source,
            }
        }
    }
}
