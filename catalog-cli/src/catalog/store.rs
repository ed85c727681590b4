//! Product store seam used by stock reconciliation
//!
//! Reconciliation only ever needs two batched operations: read the current
//! quantity of a set of products, and atomically write a set of new
//! quantities. Writes are tagged with a [`ChunkReceipt`] so a redelivered
//! chunk is recognized and not applied twice.

use anyhow::{Result, bail};
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use crate::config::repository::products;

/// New absolute quantity for one product
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantityUpdate {
    pub product_id: i64,
    pub quantity: i64,
}

/// Identity of one reconciled chunk within a job
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkReceipt {
    pub job_id: String,
    pub sheet_index: usize,
    pub chunk_index: usize,
}

impl ChunkReceipt {
    pub fn new(job_id: impl Into<String>, sheet_index: usize, chunk_index: usize) -> Self {
        Self {
            job_id: job_id.into(),
            sheet_index,
            chunk_index,
        }
    }
}

#[async_trait]
pub trait StockStore: Send + Sync {
    /// Current quantities for exactly the given ids. Unknown ids are absent
    /// from the result.
    async fn batch_get_quantities(&self, ids: &[i64]) -> Result<HashMap<i64, i64>>;

    async fn chunk_applied(&self, receipt: &ChunkReceipt) -> Result<bool>;

    /// Record `receipt` and write every update in one transaction, touching
    /// only `quantity`. Returns `false` without writing anything when the
    /// receipt was already recorded.
    async fn batch_upsert_quantities(
        &self,
        receipt: &ChunkReceipt,
        updates: &[QuantityUpdate],
    ) -> Result<bool>;
}

/// SQLite-backed store over the `products` table
#[derive(Debug, Clone)]
pub struct SqliteStockStore {
    pool: SqlitePool,
}

impl SqliteStockStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StockStore for SqliteStockStore {
    async fn batch_get_quantities(&self, ids: &[i64]) -> Result<HashMap<i64, i64>> {
        products::quantities_by_ids(&self.pool, ids).await
    }

    async fn chunk_applied(&self, receipt: &ChunkReceipt) -> Result<bool> {
        products::chunk_receipt_exists(&self.pool, receipt).await
    }

    async fn batch_upsert_quantities(
        &self,
        receipt: &ChunkReceipt,
        updates: &[QuantityUpdate],
    ) -> Result<bool> {
        products::apply_quantity_updates(&self.pool, receipt, updates).await
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    quantities: HashMap<i64, i64>,
    receipts: HashSet<ChunkReceipt>,
}

/// In-memory store for tests
#[derive(Debug, Default)]
pub struct MemoryStockStore {
    state: Mutex<MemoryState>,
    fail_writes: AtomicBool,
}

impl MemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(products: &[(i64, i64)]) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                quantities: products.iter().copied().collect(),
                receipts: HashSet::new(),
            }),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub async fn quantity(&self, product_id: i64) -> Option<i64> {
        self.state.lock().await.quantities.get(&product_id).copied()
    }

    pub async fn snapshot(&self) -> HashMap<i64, i64> {
        self.state.lock().await.quantities.clone()
    }

    pub async fn receipt_count(&self) -> usize {
        self.state.lock().await.receipts.len()
    }

    /// Make every subsequent upsert fail, as a lost database would
    #[cfg(test)]
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl StockStore for MemoryStockStore {
    async fn batch_get_quantities(&self, ids: &[i64]) -> Result<HashMap<i64, i64>> {
        let state = self.state.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.quantities.get(id).map(|q| (*id, *q)))
            .collect())
    }

    async fn chunk_applied(&self, receipt: &ChunkReceipt) -> Result<bool> {
        Ok(self.state.lock().await.receipts.contains(receipt))
    }

    async fn batch_upsert_quantities(
        &self,
        receipt: &ChunkReceipt,
        updates: &[QuantityUpdate],
    ) -> Result<bool> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("Failed to upsert product quantities: store unavailable");
        }

        let mut state = self.state.lock().await;
        if !state.receipts.insert(receipt.clone()) {
            return Ok(false);
        }
        for update in updates {
            if let Some(quantity) = state.quantities.get_mut(&update.product_id) {
                *quantity = update.quantity;
            }
        }
        Ok(true)
    }
}
