//! Product command handlers

use anyhow::{Context, Result, bail};
use serde_json::{Value, json};
use std::path::Path;

use crate::api::{ApiResponse, ValidationErrors};
use crate::app::AppContext;
use crate::catalog::{DEFAULT_PER_PAGE, ProductData, seed};
use crate::config::repository::products;

fn not_found(id: i64) -> ApiResponse {
    ApiResponse::not_found(format!("No product found with id {}.", id))
}

/// Parse a JSON body given inline or in a file
pub fn read_payload(json_body: Option<&str>, file: Option<&Path>) -> Result<Value> {
    let raw = match (json_body, file) {
        (Some(body), _) => body.to_string(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read payload file: {}", path.display()))?,
        (None, None) => bail!("Provide a JSON body with --json or --file"),
    };

    serde_json::from_str(&raw).context("Payload is not valid JSON")
}

pub async fn list(ctx: &AppContext, search: Option<&str>, page: u32) -> Result<ApiResponse> {
    let page = products::list_products(&ctx.pool, search, page, DEFAULT_PER_PAGE).await?;
    ApiResponse::ok(&page)
}

pub async fn show(ctx: &AppContext, id: i64) -> Result<ApiResponse> {
    match products::get_product(&ctx.pool, id).await? {
        Some(product) => ApiResponse::ok(&product),
        None => Ok(not_found(id)),
    }
}

pub async fn create(ctx: &AppContext, payload: &Value) -> Result<ApiResponse> {
    let data = match ProductData::from_json(payload) {
        Ok(data) => data,
        Err(errors) => return Ok(ApiResponse::validation_failed(&errors)),
    };

    if let Some(id) = data.product_id {
        if products::product_exists(&ctx.pool, id).await? {
            let mut errors = ValidationErrors::new();
            errors.add("product_id", "The product id has already been taken.");
            return Ok(ApiResponse::validation_failed(&errors));
        }
    }

    let product = products::create_product(&ctx.pool, &data).await?;
    log::info!("Created product {}", product.id);
    ApiResponse::created(&product)
}

pub async fn update(ctx: &AppContext, id: i64, payload: &Value) -> Result<ApiResponse> {
    if !products::product_exists(&ctx.pool, id).await? {
        return Ok(not_found(id));
    }

    let data = match ProductData::from_json(payload) {
        Ok(data) => data,
        Err(errors) => return Ok(ApiResponse::validation_failed(&errors)),
    };

    match products::update_product(&ctx.pool, id, &data).await? {
        Some(product) => {
            log::info!("Updated product {}", id);
            ApiResponse::ok(&product)
        }
        None => Ok(not_found(id)),
    }
}

pub async fn delete(ctx: &AppContext, id: i64) -> Result<ApiResponse> {
    match products::delete_product(&ctx.pool, id).await? {
        Some(product) => {
            log::info!("Deleted product {}", id);
            ApiResponse::ok(&product)
        }
        None => Ok(not_found(id)),
    }
}

/// Upsert the reference products and add `fake` random ones
pub async fn seed(ctx: &AppContext, fake: usize) -> Result<ApiResponse> {
    let reference = seed::reference_products();
    for product in &reference {
        products::upsert_product(&ctx.pool, product).await?;
    }

    let taken = products::product_ids(&ctx.pool).await?;
    let generated = seed::fake_products(&mut rand::rng(), fake, &taken);
    for product in &generated {
        products::create_product(&ctx.pool, product).await?;
    }

    if generated.len() < fake {
        log::warn!(
            "Only {} of {} fake products created, id range exhausted",
            generated.len(),
            fake
        );
    }
    log::info!(
        "Seeded {} reference and {} fake product(s)",
        reference.len(),
        generated.len()
    );

    ApiResponse::ok(&json!({
        "message": "Products seeded",
        "reference": reference.len(),
        "fake": generated.len(),
    }))
}
