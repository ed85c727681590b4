//! Worker command

use anyhow::Result;
use serde_json::json;

use crate::api::ApiResponse;
use crate::app::AppContext;

/// Run the import worker. With `once`, requeue stale jobs, drain the queue and
/// return; otherwise poll until Ctrl-C.
pub async fn run(ctx: &AppContext, once: bool) -> Result<ApiResponse> {
    let worker = ctx.worker();

    if once {
        worker.recover().await?;
        let reports = worker.drain().await?;
        return ApiResponse::ok(&json!({
            "message": format!("Processed {} import job(s)", reports.len()),
            "jobs": reports,
        }));
    }

    worker
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    ApiResponse::ok(&json!({ "message": "Import worker stopped" }))
}
