//! Repository for product and stock operations

use anyhow::{Context, Result, bail};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::{HashMap, HashSet};

use super::placeholders;
use crate::catalog::{ChunkReceipt, Page, Product, ProductData, QuantityUpdate};

const COLUMNS: &str = "id, type, brand, model, capacity, quantity, created_at, updated_at";

fn product_from_row(row: &SqliteRow) -> Result<Product> {
    Ok(Product {
        id: row.try_get("id")?,
        kind: row.try_get("type")?,
        brand: row.try_get("brand")?,
        model: row.try_get("model")?,
        capacity: row.try_get("capacity")?,
        quantity: row.try_get("quantity")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// `%term%` with LIKE wildcards in the term escaped
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

/// List products ordered by id, optionally filtered by a case-insensitive
/// substring of id, type, brand, model or capacity
pub async fn list_products(
    pool: &SqlitePool,
    search: Option<&str>,
    page: u32,
    per_page: u32,
) -> Result<Page<Product>> {
    let pattern = search
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(like_pattern);

    let filter = r#"
        ?1 IS NULL
        OR CAST(id AS TEXT) LIKE ?1 ESCAPE '\'
        OR type LIKE ?1 ESCAPE '\'
        OR brand LIKE ?1 ESCAPE '\'
        OR model LIKE ?1 ESCAPE '\'
        OR capacity LIKE ?1 ESCAPE '\'
    "#;

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM products WHERE {}", filter))
        .bind(pattern.clone())
        .fetch_one(pool)
        .await
        .context("Failed to count products")?;

    let rows = sqlx::query(&format!(
        "SELECT {} FROM products WHERE {} ORDER BY id LIMIT ?2 OFFSET ?3",
        COLUMNS, filter
    ))
    .bind(pattern)
    .bind(per_page as i64)
    .bind(Page::<Product>::offset(page, per_page) as i64)
    .fetch_all(pool)
    .await
    .context("Failed to list products")?;

    let products = rows.iter().map(product_from_row).collect::<Result<Vec<_>>>()?;
    Ok(Page::new(products, total as u64, page, per_page))
}

pub async fn get_product(pool: &SqlitePool, id: i64) -> Result<Option<Product>> {
    let row = sqlx::query(&format!("SELECT {} FROM products WHERE id = ?", COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get product")?;

    row.as_ref().map(product_from_row).transpose()
}

pub async fn product_exists(pool: &SqlitePool, id: i64) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM products WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to check product")?;

    Ok(found.is_some())
}

pub async fn product_ids(pool: &SqlitePool) -> Result<HashSet<i64>> {
    let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM products")
        .fetch_all(pool)
        .await
        .context("Failed to list product ids")?;

    Ok(ids.into_iter().collect())
}

/// Insert a product. Without a `product_id` the database assigns the next id.
pub async fn create_product(pool: &SqlitePool, data: &ProductData) -> Result<Product> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO products (id, type, brand, model, capacity, quantity)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING {}
        "#,
        COLUMNS
    ))
    .bind(data.product_id)
    .bind(&data.kind)
    .bind(&data.brand)
    .bind(&data.model)
    .bind(&data.capacity)
    .bind(data.quantity)
    .fetch_one(pool)
    .await
    .context("Failed to create product")?;

    product_from_row(&row)
}

/// Replace every attribute of an existing product; `None` if it does not exist
pub async fn update_product(pool: &SqlitePool, id: i64, data: &ProductData) -> Result<Option<Product>> {
    let row = sqlx::query(&format!(
        r#"
        UPDATE products
        SET type = ?, brand = ?, model = ?, capacity = ?, quantity = ?,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        RETURNING {}
        "#,
        COLUMNS
    ))
    .bind(&data.kind)
    .bind(&data.brand)
    .bind(&data.model)
    .bind(&data.capacity)
    .bind(data.quantity)
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to update product")?;

    row.as_ref().map(product_from_row).transpose()
}

/// Delete a product, returning it as it was
pub async fn delete_product(pool: &SqlitePool, id: i64) -> Result<Option<Product>> {
    let row = sqlx::query(&format!("DELETE FROM products WHERE id = ? RETURNING {}", COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to delete product")?;

    row.as_ref().map(product_from_row).transpose()
}

/// Insert or fully overwrite a product by id
pub async fn upsert_product(pool: &SqlitePool, data: &ProductData) -> Result<Product> {
    let Some(id) = data.product_id else {
        bail!("Cannot upsert a product without an id");
    };

    let row = sqlx::query(&format!(
        r#"
        INSERT INTO products (id, type, brand, model, capacity, quantity)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            type = excluded.type,
            brand = excluded.brand,
            model = excluded.model,
            capacity = excluded.capacity,
            quantity = excluded.quantity,
            updated_at = CURRENT_TIMESTAMP
        RETURNING {}
        "#,
        COLUMNS
    ))
    .bind(id)
    .bind(&data.kind)
    .bind(&data.brand)
    .bind(&data.model)
    .bind(&data.capacity)
    .bind(data.quantity)
    .fetch_one(pool)
    .await
    .with_context(|| format!("Failed to upsert product {}", id))?;

    product_from_row(&row)
}

/// Current quantities for the given ids; unknown ids are left out
pub async fn quantities_by_ids(pool: &SqlitePool, ids: &[i64]) -> Result<HashMap<i64, i64>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let sql = format!(
        "SELECT id, quantity FROM products WHERE id IN ({})",
        placeholders(ids.len())
    );
    let mut query = sqlx::query(&sql);
    for id in ids {
        query = query.bind(*id);
    }

    let rows = query
        .fetch_all(pool)
        .await
        .context("Failed to look up product quantities")?;

    let mut quantities = HashMap::with_capacity(rows.len());
    for row in rows {
        quantities.insert(row.try_get("id")?, row.try_get("quantity")?);
    }

    Ok(quantities)
}

pub async fn chunk_receipt_exists(pool: &SqlitePool, receipt: &ChunkReceipt) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT 1 FROM import_chunk_receipts
        WHERE job_id = ? AND sheet_index = ? AND chunk_index = ?
        "#,
    )
    .bind(&receipt.job_id)
    .bind(receipt.sheet_index as i64)
    .bind(receipt.chunk_index as i64)
    .fetch_optional(pool)
    .await
    .context("Failed to check chunk receipt")?;

    Ok(found.is_some())
}

/// Record the chunk receipt and write every quantity in one transaction.
///
/// Only `quantity` is updated on existing rows, and a product deleted since
/// its quantity was read is not recreated. Returns `false`, with nothing
/// written, when the receipt already exists.
pub async fn apply_quantity_updates(
    pool: &SqlitePool,
    receipt: &ChunkReceipt,
    updates: &[QuantityUpdate],
) -> Result<bool> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let claimed = sqlx::query(
        r#"
        INSERT OR IGNORE INTO import_chunk_receipts (job_id, sheet_index, chunk_index, rows_written)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(&receipt.job_id)
    .bind(receipt.sheet_index as i64)
    .bind(receipt.chunk_index as i64)
    .bind(updates.len() as i64)
    .execute(&mut *tx)
    .await
    .context("Failed to record chunk receipt")?;

    if claimed.rows_affected() == 0 {
        tx.rollback().await.context("Failed to roll back transaction")?;
        return Ok(false);
    }

    for update in updates {
        sqlx::query(
            r#"
            INSERT INTO products (id, type, brand, model, capacity, quantity)
            SELECT ?1, '', '', '', '', ?2
            WHERE EXISTS (SELECT 1 FROM products WHERE id = ?1)
            ON CONFLICT(id) DO UPDATE SET
                quantity = excluded.quantity,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(update.product_id)
        .bind(update.quantity)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to upsert quantity for product {}", update.product_id))?;
    }

    tx.commit().await.context("Failed to commit transaction")?;
    Ok(true)
}
