//! Asynchronous stock import
//!
//! An upload is validated and stored by [`ImportService`], which queues an
//! [`ImportJob`]. An [`ImportWorker`] later claims the job, streams the
//! workbook through the [`ingest`] reader and applies each chunk with the
//! [`StockReconciler`].

pub mod error;
pub mod ingest;
pub mod job;
pub mod queue;
pub mod reconcile;
pub mod storage;
pub mod upload;
pub mod worker;

#[cfg(test)]
pub(crate) mod fixtures;

pub use error::ImportError;
pub use ingest::{ChunkStream, RowChunk, SheetRow, Workbook};
pub use job::{ImportJob, JobStatus};
pub use queue::{JobQueue, MemoryJobQueue, SqliteJobQueue};
pub use reconcile::{ChunkOutcome, ImportSummary, NetChanges, StockReconciler};
pub use storage::{FileStorage, LocalStorage, MemoryStorage};
pub use upload::{ImportAccepted, ImportService, UploadError, UploadedFile};
pub use worker::{ImportWorker, JobReport};
