//! Import job inspection

use anyhow::Result;
use colored::*;

use crate::api::{ApiResponse, ValidationErrors};
use crate::app::AppContext;
use crate::import::{ImportJob, JobStatus};

/// Parse an optional `--status` filter
pub fn parse_status(raw: Option<&str>) -> Result<Option<JobStatus>, ValidationErrors> {
    raw.map(str::parse::<JobStatus>).transpose().map_err(|_| {
        let mut errors = ValidationErrors::new();
        errors.add("status", "The selected status is invalid.");
        errors
    })
}

pub async fn list(ctx: &AppContext, status: Option<JobStatus>, limit: u32) -> Result<Vec<ImportJob>> {
    ctx.queue.list(status, limit).await
}

pub async fn show(ctx: &AppContext, id: &str) -> Result<ApiResponse> {
    match ctx.queue.get(id).await? {
        Some(job) => ApiResponse::ok(&job),
        None => Ok(ApiResponse::not_found(format!("No import job found with id {}.", id))),
    }
}

fn paint_status(status: JobStatus) -> ColoredString {
    match status {
        JobStatus::Queued => status.as_str().yellow(),
        JobStatus::Running => status.as_str().cyan(),
        JobStatus::Completed => status.as_str().green(),
        JobStatus::Failed => status.as_str().red(),
    }
}

/// Plain-text table of jobs, newest first
pub fn render_table(jobs: &[ImportJob]) -> String {
    if jobs.is_empty() {
        return "No import jobs.".dimmed().to_string();
    }

    let mut out = format!(
        "{:<36}  {:<9}  {:>8}  {:<20}  {}\n",
        "ID".bold(),
        "STATUS".bold(),
        "ATTEMPTS".bold(),
        "CREATED".bold(),
        "LAST ERROR".bold()
    );

    for job in jobs {
        out.push_str(&format!(
            "{:<36}  {:<9}  {:>8}  {:<20}  {}\n",
            job.id,
            paint_status(job.status),
            job.attempts,
            job.created_at.format("%Y-%m-%d %H:%M:%S"),
            job.last_error.as_deref().unwrap_or("-")
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testing;

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let ctx = testing::context().await;
        let first = ctx.queue.enqueue("products/a.xlsx").await.unwrap();
        ctx.queue.enqueue("products/b.xlsx").await.unwrap();
        let claim = ctx.queue.dequeue().await.unwrap().unwrap();
        assert!(ctx.queue.complete(&claim).await.unwrap());

        let jobs = list(&ctx, Some(JobStatus::Completed), 10).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, first.id);
        assert_eq!(list(&ctx, None, 10).await.unwrap().len(), 2);
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status(None).unwrap(), None);
        assert_eq!(parse_status(Some("failed")).unwrap(), Some(JobStatus::Failed));

        let errors = parse_status(Some("paused")).unwrap_err();
        assert_eq!(errors.first_message(), Some("The selected status is invalid."));
    }

    #[tokio::test]
    async fn test_show_missing_job() {
        let ctx = testing::context().await;
        assert_eq!(show(&ctx, "nope").await.unwrap().code, 404);
    }

    #[test]
    fn test_render_table() {
        colored::control::set_override(false);
        let mut job = ImportJob::new("products/a.xlsx");
        job.last_error = Some("Excel file has no sheets".to_string());

        let table = render_table(&[job.clone()]);
        assert!(table.contains(&job.id));
        assert!(table.contains("queued"));
        assert!(table.contains("Excel file has no sheets"));
        assert_eq!(render_table(&[]), "No import jobs.");
    }
}
