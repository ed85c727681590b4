//! Upload command

use anyhow::Result;
use std::path::Path;

use crate::api::ApiResponse;
use crate::app::AppContext;
use crate::import::{UploadError, UploadedFile};

/// Submit a local workbook for import. Returns once the job is queued.
pub async fn upload(ctx: &AppContext, path: &Path) -> Result<ApiResponse> {
    let file = match UploadedFile::from_path(path).await {
        Ok(file) => Some(file),
        Err(e) => {
            log::warn!("{:#}", e);
            None
        }
    };

    match ctx.import_service().accept(file.as_ref()).await {
        Ok(accepted) => ApiResponse::ok(&accepted),
        Err(UploadError::Invalid(errors)) => Ok(ApiResponse::validation_failed(&errors)),
        Err(e) => Err(e.into()),
    }
}
