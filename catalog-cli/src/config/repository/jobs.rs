//! Repository for import job records

use anyhow::{Context, Result, bail};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::import::{ImportJob, JobStatus};

const COLUMNS: &str = "id, file_path, status, attempts, last_error, created_at, updated_at";

/// Fixed-width RFC 3339 so text ordering matches time ordering
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Invalid timestamp in import_jobs: {}", raw))?;
    Ok(parsed.with_timezone(&Utc))
}

fn job_from_row(row: &SqliteRow) -> Result<ImportJob> {
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(ImportJob {
        id: row.try_get("id")?,
        file_path: row.try_get("file_path")?,
        status: status.parse()?,
        attempts: row.try_get::<i64, _>("attempts")? as u32,
        last_error: row.try_get("last_error")?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

pub async fn insert_job(pool: &SqlitePool, job: &ImportJob) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO import_jobs (id, file_path, status, attempts, last_error, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&job.id)
    .bind(&job.file_path)
    .bind(job.status.as_str())
    .bind(job.attempts as i64)
    .bind(&job.last_error)
    .bind(timestamp(job.created_at))
    .bind(timestamp(job.updated_at))
    .execute(pool)
    .await
    .context("Failed to insert import job")?;

    Ok(())
}

/// Atomically move the oldest queued job to running and count the attempt
pub async fn claim_next_job(pool: &SqlitePool) -> Result<Option<ImportJob>> {
    let row = sqlx::query(&format!(
        r#"
        UPDATE import_jobs
        SET status = 'running', attempts = attempts + 1, updated_at = ?
        WHERE id = (
            SELECT id FROM import_jobs
            WHERE status = 'queued'
            ORDER BY created_at, rowid
            LIMIT 1
        )
        RETURNING {}
        "#,
        COLUMNS
    ))
    .bind(timestamp(Utc::now()))
    .fetch_optional(pool)
    .await
    .context("Failed to claim import job")?;

    row.as_ref().map(job_from_row).transpose()
}

/// Move a claimed job out of `running`, replacing `last_error`.
///
/// The update only applies while the job is still held by the claim that
/// produced `job` (same attempt number, still running). Returns `false` when
/// the claim has been superseded; a missing job is an error.
pub async fn finish_claim(
    pool: &SqlitePool,
    job: &ImportJob,
    status: JobStatus,
    last_error: Option<&str>,
) -> Result<bool> {
    if !JobStatus::Running.can_transition_to(status) {
        bail!("Import job {} cannot move from running to {}", job.id, status);
    }

    let result = sqlx::query(
        r#"
        UPDATE import_jobs
        SET status = ?, last_error = ?, updated_at = ?
        WHERE id = ? AND status = 'running' AND attempts = ?
        "#,
    )
    .bind(status.as_str())
    .bind(last_error)
    .bind(timestamp(Utc::now()))
    .bind(&job.id)
    .bind(job.attempts as i64)
    .execute(pool)
    .await
    .with_context(|| format!("Failed to update import job {}", job.id))?;

    claim_held(pool, &job.id, result.rows_affected()).await
}

/// Refresh `updated_at` on a held claim so recovery leaves it alone
pub async fn touch_claim(pool: &SqlitePool, job: &ImportJob) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE import_jobs
        SET updated_at = ?
        WHERE id = ? AND status = 'running' AND attempts = ?
        "#,
    )
    .bind(timestamp(Utc::now()))
    .bind(&job.id)
    .bind(job.attempts as i64)
    .execute(pool)
    .await
    .with_context(|| format!("Failed to refresh import job {}", job.id))?;

    claim_held(pool, &job.id, result.rows_affected()).await
}

async fn claim_held(pool: &SqlitePool, id: &str, rows_affected: u64) -> Result<bool> {
    if rows_affected > 0 {
        return Ok(true);
    }
    if get_job(pool, id).await?.is_none() {
        bail!("Import job {} not found", id);
    }
    Ok(false)
}

/// Return running jobs not updated since `stale_before` to the queue,
/// keeping their attempt count
pub async fn requeue_stale_jobs(
    pool: &SqlitePool,
    stale_before: DateTime<Utc>,
) -> Result<Vec<String>> {
    let ids: Vec<String> = sqlx::query_scalar(
        r#"
        UPDATE import_jobs
        SET status = 'queued', updated_at = ?
        WHERE status = 'running' AND updated_at <= ?
        RETURNING id
        "#,
    )
    .bind(timestamp(Utc::now()))
    .bind(timestamp(stale_before))
    .fetch_all(pool)
    .await
    .context("Failed to requeue interrupted import jobs")?;

    Ok(ids)
}

pub async fn get_job(pool: &SqlitePool, id: &str) -> Result<Option<ImportJob>> {
    let row = sqlx::query(&format!("SELECT {} FROM import_jobs WHERE id = ?", COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get import job")?;

    row.as_ref().map(job_from_row).transpose()
}

/// Most recent jobs first, optionally restricted to one status
pub async fn list_jobs(
    pool: &SqlitePool,
    status: Option<JobStatus>,
    limit: u32,
) -> Result<Vec<ImportJob>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {} FROM import_jobs
        WHERE ?1 IS NULL OR status = ?1
        ORDER BY created_at DESC, rowid DESC
        LIMIT ?2
        "#,
        COLUMNS
    ))
    .bind(status.map(|s| s.as_str()))
    .bind(limit as i64)
    .fetch_all(pool)
    .await
    .context("Failed to list import jobs")?;

    rows.iter().map(job_from_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::repository::connect_in_memory;
    use chrono::Duration;

    fn job_at(file_path: &str, minutes_ago: i64) -> ImportJob {
        let mut job = ImportJob::new(file_path);
        job.created_at = Utc::now() - Duration::minutes(minutes_ago);
        job.updated_at = job.created_at;
        job
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let pool = connect_in_memory().await.unwrap();
        let job = ImportJob::new("products/a.xlsx");
        insert_job(&pool, &job).await.unwrap();

        let loaded = get_job(&pool, &job.id).await.unwrap().unwrap();
        assert_eq!(loaded.file_path, "products/a.xlsx");
        assert_eq!(loaded.status, JobStatus::Queued);
        assert_eq!(
            loaded.created_at.timestamp_micros(),
            job.created_at.timestamp_micros()
        );
        assert!(get_job(&pool, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_takes_oldest_and_counts_attempt() {
        let pool = connect_in_memory().await.unwrap();
        let newer = job_at("products/new.xlsx", 1);
        let older = job_at("products/old.xlsx", 5);
        insert_job(&pool, &newer).await.unwrap();
        insert_job(&pool, &older).await.unwrap();

        let claimed = claim_next_job(&pool).await.unwrap().unwrap();
        assert_eq!(claimed.id, older.id);
        assert_eq!(claimed.status, JobStatus::Running);
        assert_eq!(claimed.attempts, 1);

        let next = claim_next_job(&pool).await.unwrap().unwrap();
        assert_eq!(next.id, newer.id);
        assert!(claim_next_job(&pool).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_requeue_only_stale_jobs() {
        let pool = connect_in_memory().await.unwrap();
        let job = ImportJob::new("products/a.xlsx");
        insert_job(&pool, &job).await.unwrap();
        claim_next_job(&pool).await.unwrap();

        let fresh = requeue_stale_jobs(&pool, Utc::now() - Duration::minutes(10))
            .await
            .unwrap();
        assert!(fresh.is_empty());

        let requeued = requeue_stale_jobs(&pool, Utc::now()).await.unwrap();
        assert_eq!(requeued, vec![job.id.clone()]);

        let loaded = get_job(&pool, &job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Queued);
        assert_eq!(loaded.attempts, 1);
    }

    #[tokio::test]
    async fn test_finish_claim_and_list() {
        let pool = connect_in_memory().await.unwrap();
        let first = job_at("products/1.xlsx", 2);
        let second = job_at("products/2.xlsx", 1);
        insert_job(&pool, &first).await.unwrap();
        insert_job(&pool, &second).await.unwrap();

        let claim = claim_next_job(&pool).await.unwrap().unwrap();
        assert_eq!(claim.id, first.id);
        assert!(
            finish_claim(&pool, &claim, JobStatus::Failed, Some("Excel file has no sheets"))
                .await
                .unwrap()
        );

        let all = list_jobs(&pool, None, 10).await.unwrap();
        assert_eq!(all.iter().map(|j| j.id.as_str()).collect::<Vec<_>>(), vec![
            second.id.as_str(),
            first.id.as_str()
        ]);

        let failed = list_jobs(&pool, Some(JobStatus::Failed), 10).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].last_error.as_deref(), Some("Excel file has no sheets"));
    }

    #[tokio::test]
    async fn test_finished_job_cannot_be_overwritten() {
        let pool = connect_in_memory().await.unwrap();
        insert_job(&pool, &ImportJob::new("products/a.xlsx")).await.unwrap();
        let claim = claim_next_job(&pool).await.unwrap().unwrap();

        assert!(finish_claim(&pool, &claim, JobStatus::Completed, None).await.unwrap());
        assert!(!finish_claim(&pool, &claim, JobStatus::Failed, Some("late")).await.unwrap());
        assert!(!touch_claim(&pool, &claim).await.unwrap());

        let loaded = get_job(&pool, &claim.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Completed);
        assert_eq!(loaded.last_error, None);
    }

    #[tokio::test]
    async fn test_older_claim_is_superseded_by_reclaim() {
        let pool = connect_in_memory().await.unwrap();
        insert_job(&pool, &ImportJob::new("products/a.xlsx")).await.unwrap();
        let first = claim_next_job(&pool).await.unwrap().unwrap();
        requeue_stale_jobs(&pool, Utc::now()).await.unwrap();
        let second = claim_next_job(&pool).await.unwrap().unwrap();
        assert_eq!(second.attempts, 2);

        assert!(!touch_claim(&pool, &first).await.unwrap());
        assert!(!finish_claim(&pool, &first, JobStatus::Completed, None).await.unwrap());
        assert!(touch_claim(&pool, &second).await.unwrap());
    }

    #[tokio::test]
    async fn test_finish_claim_errors() {
        let pool = connect_in_memory().await.unwrap();
        let missing = ImportJob::new("products/gone.xlsx");
        assert!(finish_claim(&pool, &missing, JobStatus::Failed, None).await.is_err());

        insert_job(&pool, &missing).await.unwrap();
        let claim = claim_next_job(&pool).await.unwrap().unwrap();
        assert!(finish_claim(&pool, &claim, JobStatus::Running, None).await.is_err());
    }
}
