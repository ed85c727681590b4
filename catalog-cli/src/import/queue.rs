//! Durable job queue for imports
//!
//! Delivery is at-least-once: a job whose claim has gone stale (no update for
//! longer than the lease) is returned to the queue by
//! [`JobQueue::recover_interrupted`]. Each claim is identified by the job's
//! attempt number, and only the current claim may finish the job.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::time::Duration;
use tokio::sync::Mutex;

use super::job::{ImportJob, JobStatus};
use crate::config::repository::jobs;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// How long a running job may go without an update before it is presumed
/// abandoned
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(600);

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, file_path: &str) -> Result<ImportJob>;

    /// Claim the oldest queued job, marking it running
    async fn dequeue(&self) -> Result<Option<ImportJob>>;

    /// Keep a claim alive. `false` when the claim has been superseded.
    async fn touch(&self, claim: &ImportJob) -> Result<bool>;

    /// Mark a claimed job completed. `false` when the claim has been
    /// superseded and the job was left as it is.
    async fn complete(&self, claim: &ImportJob) -> Result<bool>;

    /// Record a failure on a claimed job. Returns the status it ended up in:
    /// `Queued` when it will be redelivered, otherwise `Failed`. `None` when
    /// the claim has been superseded and the job was left as it is.
    async fn fail(&self, claim: &ImportJob, error: &str, retriable: bool)
    -> Result<Option<JobStatus>>;

    /// Return running jobs with no update for at least `stale_after` to the
    /// queue
    async fn recover_interrupted(&self, stale_after: Duration) -> Result<usize>;

    async fn get(&self, id: &str) -> Result<Option<ImportJob>>;

    async fn list(&self, status: Option<JobStatus>, limit: u32) -> Result<Vec<ImportJob>>;
}

/// Where a failed job goes next
pub fn status_after_failure(attempts: u32, max_attempts: u32, retriable: bool) -> JobStatus {
    if retriable && attempts < max_attempts {
        JobStatus::Queued
    } else {
        JobStatus::Failed
    }
}

fn stale_cutoff(stale_after: Duration) -> Result<chrono::DateTime<Utc>> {
    let lease = chrono::Duration::from_std(stale_after).context("Lease is too long")?;
    Ok(Utc::now() - lease)
}

/// Queue persisted in the `import_jobs` table
#[derive(Debug, Clone)]
pub struct SqliteJobQueue {
    pool: SqlitePool,
    max_attempts: u32,
}

impl SqliteJobQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }
}

#[async_trait]
impl JobQueue for SqliteJobQueue {
    async fn enqueue(&self, file_path: &str) -> Result<ImportJob> {
        let job = ImportJob::new(file_path);
        jobs::insert_job(&self.pool, &job).await?;
        log::info!("Queued import job {} for {}", job.id, job.file_path);
        Ok(job)
    }

    async fn dequeue(&self) -> Result<Option<ImportJob>> {
        jobs::claim_next_job(&self.pool).await
    }

    async fn touch(&self, claim: &ImportJob) -> Result<bool> {
        jobs::touch_claim(&self.pool, claim).await
    }

    async fn complete(&self, claim: &ImportJob) -> Result<bool> {
        jobs::finish_claim(&self.pool, claim, JobStatus::Completed, None).await
    }

    async fn fail(
        &self,
        claim: &ImportJob,
        error: &str,
        retriable: bool,
    ) -> Result<Option<JobStatus>> {
        let next = status_after_failure(claim.attempts, self.max_attempts, retriable);
        let held = jobs::finish_claim(&self.pool, claim, next, Some(error)).await?;
        Ok(held.then_some(next))
    }

    async fn recover_interrupted(&self, stale_after: Duration) -> Result<usize> {
        let ids = jobs::requeue_stale_jobs(&self.pool, stale_cutoff(stale_after)?).await?;
        for id in &ids {
            log::warn!("Found interrupted import job {} (was Running), requeued", id);
        }
        Ok(ids.len())
    }

    async fn get(&self, id: &str) -> Result<Option<ImportJob>> {
        jobs::get_job(&self.pool, id).await
    }

    async fn list(&self, status: Option<JobStatus>, limit: u32) -> Result<Vec<ImportJob>> {
        jobs::list_jobs(&self.pool, status, limit).await
    }
}

/// Process-local queue for tests
#[derive(Debug, Default)]
pub struct MemoryJobQueue {
    jobs: Mutex<Vec<ImportJob>>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `next` if `claim` still holds the job
    async fn finish_claim(
        &self,
        claim: &ImportJob,
        next: JobStatus,
        error: Option<&str>,
    ) -> Result<bool> {
        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs.iter_mut().find(|job| job.id == claim.id) else {
            bail!("Import job {} not found", claim.id);
        };
        if job.attempts != claim.attempts || !job.status.can_transition_to(next) {
            return Ok(false);
        }
        job.status = next;
        job.last_error = error.map(str::to_string);
        job.updated_at = Utc::now();
        Ok(true)
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, file_path: &str) -> Result<ImportJob> {
        let job = ImportJob::new(file_path);
        self.jobs.lock().await.push(job.clone());
        Ok(job)
    }

    async fn dequeue(&self) -> Result<Option<ImportJob>> {
        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs.iter_mut().find(|job| job.status == JobStatus::Queued) else {
            return Ok(None);
        };
        job.status = JobStatus::Running;
        job.attempts += 1;
        job.updated_at = Utc::now();
        Ok(Some(job.clone()))
    }

    async fn touch(&self, claim: &ImportJob) -> Result<bool> {
        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs.iter_mut().find(|job| job.id == claim.id) else {
            bail!("Import job {} not found", claim.id);
        };
        if job.status != JobStatus::Running || job.attempts != claim.attempts {
            return Ok(false);
        }
        job.updated_at = Utc::now();
        Ok(true)
    }

    async fn complete(&self, claim: &ImportJob) -> Result<bool> {
        self.finish_claim(claim, JobStatus::Completed, None).await
    }

    async fn fail(
        &self,
        claim: &ImportJob,
        error: &str,
        retriable: bool,
    ) -> Result<Option<JobStatus>> {
        let next = status_after_failure(claim.attempts, DEFAULT_MAX_ATTEMPTS, retriable);
        let held = self.finish_claim(claim, next, Some(error)).await?;
        Ok(held.then_some(next))
    }

    async fn recover_interrupted(&self, stale_after: Duration) -> Result<usize> {
        let cutoff = stale_cutoff(stale_after)?;
        let mut jobs = self.jobs.lock().await;
        let mut recovered = 0;
        for job in jobs
            .iter_mut()
            .filter(|job| job.status == JobStatus::Running && job.updated_at <= cutoff)
        {
            job.status = JobStatus::Queued;
            job.updated_at = Utc::now();
            recovered += 1;
        }
        Ok(recovered)
    }

    async fn get(&self, id: &str) -> Result<Option<ImportJob>> {
        Ok(self.jobs.lock().await.iter().find(|job| job.id == id).cloned())
    }

    async fn list(&self, status: Option<JobStatus>, limit: u32) -> Result<Vec<ImportJob>> {
        let jobs = self.jobs.lock().await;
        Ok(jobs
            .iter()
            .rev()
            .filter(|job| status.is_none_or(|s| job.status == s))
            .take(limit as usize)
            .cloned()
            .collect())
    }
}
