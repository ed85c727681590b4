//! Command handlers
//!
//! Handlers return an [`ApiResponse`] envelope; expected failures such as
//! validation errors or missing records are envelopes too. Only unexpected
//! failures (database, storage) come back as `Err`.

pub mod import;
pub mod jobs;
pub mod products;
pub mod worker;

use anyhow::Result;

use super::{Commands, JobAction, Output, ProductAction};
use crate::api::ApiResponse;
use crate::app::AppContext;

pub async fn execute(ctx: &AppContext, command: Commands) -> Result<Output> {
    let output: Output = match command {
        Commands::Products { action } => match action {
            ProductAction::List { search, page } => {
                products::list(ctx, search.as_deref(), page).await?.into()
            }
            ProductAction::Show { id } => products::show(ctx, id).await?.into(),
            ProductAction::Create { json_body, file } => {
                let payload = products::read_payload(json_body.as_deref(), file.as_deref())?;
                products::create(ctx, &payload).await?.into()
            }
            ProductAction::Update {
                id,
                json_body,
                file,
            } => {
                let payload = products::read_payload(json_body.as_deref(), file.as_deref())?;
                products::update(ctx, id, &payload).await?.into()
            }
            ProductAction::Delete { id } => products::delete(ctx, id).await?.into(),
            ProductAction::Seed { fake } => products::seed(ctx, fake).await?.into(),
        },

        Commands::Import { file } => import::upload(ctx, &file).await?.into(),

        Commands::Jobs { action } => match action {
            JobAction::List {
                status,
                limit,
                table,
            } => match jobs::parse_status(status.as_deref()) {
                Err(errors) => ApiResponse::validation_failed(&errors).into(),
                Ok(status) => {
                    let listed = jobs::list(ctx, status, limit).await?;
                    if table {
                        Output::Text(jobs::render_table(&listed))
                    } else {
                        ApiResponse::ok(&listed)?.into()
                    }
                }
            },
            JobAction::Show { id } => jobs::show(ctx, &id).await?.into(),
        },

        Commands::Worker { once } => worker::run(ctx, once).await?.into(),
    };

    Ok(output)
}
