//! Import worker
//!
//! Claims one job at a time, streams its workbook chunk by chunk through the
//! reconciler and reports the outcome to the queue. Chunks are applied in
//! order, so a later chunk sees the quantities written by an earlier one.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::error::ImportError;
use super::ingest::{ChunkStream, DEFAULT_CHUNK_SIZE};
use super::job::{ImportJob, JobStatus};
use super::queue::{DEFAULT_STALE_AFTER, JobQueue};
use super::reconcile::{ImportSummary, StockReconciler};
use super::storage::FileStorage;
use crate::catalog::{ChunkReceipt, StockStore};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// What happened to one claimed job
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job_id: String,
    pub status: JobStatus,
    pub attempts: u32,
    pub summary: Option<ImportSummary>,
    pub error: Option<String>,
}

pub struct ImportWorker {
    storage: Arc<dyn FileStorage>,
    queue: Arc<dyn JobQueue>,
    reconciler: StockReconciler,
    chunk_size: usize,
    poll_interval: Duration,
    stale_after: Duration,
}

impl ImportWorker {
    pub fn new(
        storage: Arc<dyn FileStorage>,
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn StockStore>,
    ) -> Self {
        Self {
            storage,
            queue,
            reconciler: StockReconciler::new(store),
            chunk_size: DEFAULT_CHUNK_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stale_after: DEFAULT_STALE_AFTER,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Lease after which another worker's running job counts as abandoned
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Import one claimed job's workbook. The claim is refreshed after every
    /// chunk, and the source file is deleted only after every chunk has been
    /// committed.
    pub async fn run_job(&self, job: &ImportJob) -> Result<ImportSummary, ImportError> {
        let bytes = self
            .storage
            .get(&job.file_path)
            .await
            .map_err(|e| ImportError::from_read(&job.file_path, e))?;

        let mut chunks = ChunkStream::spawn(bytes, self.chunk_size);
        let mut summary = ImportSummary::default();

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            let receipt = ChunkReceipt::new(&job.id, chunk.sheet_index, chunk.index);
            let outcome = self.reconciler.apply_chunk(&receipt, &chunk.rows).await?;

            log::debug!(
                "Job {}: sheet '{}' chunk {} -> {} row(s), {} product(s) written{}",
                job.id,
                chunk.sheet_name,
                chunk.index,
                outcome.rows_seen,
                outcome.rows_written,
                if outcome.already_applied { " (already applied)" } else { "" }
            );
            summary.record(&outcome);
            self.keep_claim(job).await?;
        }

        self.storage
            .delete(&job.file_path)
            .await
            .map_err(|source| ImportError::Cleanup {
                path: job.file_path.clone(),
                source,
            })?;

        Ok(summary)
    }

    async fn keep_claim(&self, job: &ImportJob) -> Result<(), ImportError> {
        match self.queue.touch(job).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(ImportError::ClaimLost {
                job_id: job.id.clone(),
            }),
            Err(e) => {
                log::warn!("Could not refresh claim on import job {}: {:#}", job.id, e);
                Ok(())
            }
        }
    }

    /// Claim and process the next queued job, if there is one
    pub async fn process_next(&self) -> anyhow::Result<Option<JobReport>> {
        let Some(job) = self.queue.dequeue().await? else {
            return Ok(None);
        };
        self.process(job).await.map(Some)
    }

    /// Run a claimed job and report its outcome to the queue
    pub async fn process(&self, job: ImportJob) -> anyhow::Result<JobReport> {
        log::info!(
            "Processing import job {} (attempt {}) from {}",
            job.id,
            job.attempts,
            job.file_path
        );

        let report = match self.run_job(&job).await {
            Ok(summary) => {
                if !self.queue.complete(&job).await? {
                    return self.superseded(job, None).await;
                }
                log::info!(
                    "Import job {} completed: {} chunk(s), {} row(s), {} product update(s)",
                    job.id,
                    summary.chunks,
                    summary.rows_seen,
                    summary.rows_written
                );
                JobReport {
                    job_id: job.id,
                    status: JobStatus::Completed,
                    attempts: job.attempts,
                    summary: Some(summary),
                    error: None,
                }
            }
            Err(err) => {
                let message = err.to_string();
                if matches!(err, ImportError::ClaimLost { .. }) {
                    return self.superseded(job, Some(message)).await;
                }
                let Some(status) = self.queue.fail(&job, &message, err.is_retriable()).await?
                else {
                    return self.superseded(job, Some(message)).await;
                };
                match status {
                    JobStatus::Queued => {
                        log::warn!("Import job {} failed, will retry: {}", job.id, message)
                    }
                    _ => log::error!("Import job {} failed: {}", job.id, message),
                }
                JobReport {
                    job_id: job.id,
                    status,
                    attempts: job.attempts,
                    summary: None,
                    error: Some(message),
                }
            }
        };

        Ok(report)
    }

    /// Report on a job this worker no longer holds. Its stored state belongs
    /// to whichever worker claimed it last.
    async fn superseded(&self, job: ImportJob, error: Option<String>) -> anyhow::Result<JobReport> {
        let current = self
            .queue
            .get(&job.id)
            .await?
            .map_or(job.status, |stored| stored.status);

        if current.is_terminal() {
            log::warn!(
                "Import job {} was already {} by another worker, discarding attempt {}",
                job.id,
                current,
                job.attempts
            );
        } else {
            log::warn!(
                "Import job {} was reclaimed by another worker, discarding attempt {}",
                job.id,
                job.attempts
            );
        }

        Ok(JobReport {
            job_id: job.id,
            status: current,
            attempts: job.attempts,
            summary: None,
            error,
        })
    }

    /// Process jobs until the queue is empty
    pub async fn drain(&self) -> anyhow::Result<Vec<JobReport>> {
        let mut reports = Vec::new();
        while let Some(report) = self.process_next().await? {
            reports.push(report);
        }
        Ok(reports)
    }

    /// Requeue running jobs whose claim has outlived the lease
    pub async fn recover(&self) -> anyhow::Result<usize> {
        let recovered = self.queue.recover_interrupted(self.stale_after).await?;
        if recovered > 0 {
            log::warn!("Requeued {} interrupted import job(s)", recovered);
        }
        Ok(recovered)
    }

    /// Poll the queue until `shutdown` resolves, recovering stale jobs on
    /// every idle poll. Shutdown is only observed between jobs; a job in
    /// progress always runs to its end.
    pub async fn run<F>(&self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        log::info!(
            "Import worker started (chunk size {}, poll every {:?}, lease {:?})",
            self.chunk_size,
            self.poll_interval,
            self.stale_after
        );

        tokio::pin!(shutdown);
        loop {
            let pause = match self.process_next().await {
                Ok(Some(_)) => Duration::ZERO,
                Ok(None) => {
                    if let Err(e) = self.recover().await {
                        log::error!("Import worker could not recover stale jobs: {:#}", e);
                    }
                    self.poll_interval
                }
                Err(e) => {
                    log::error!("Import worker could not reach the queue: {:#}", e);
                    self.poll_interval
                }
            };

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    log::info!("Shutdown requested, import worker stopping");
                    return Ok(());
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }
}
