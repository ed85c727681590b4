//! Stock reconciliation
//!
//! Every chunk of sheet rows is reduced to a net quantity change per product,
//! resolved against current stock in one batched read, and written back in
//! one transaction.
//!
//! A product is left untouched when any of these hold:
//! - it is not in the catalog (imports never create products)
//! - its net change is zero
//! - its resolved quantity is zero
//! - its resolved quantity is negative

use calamine::Data;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::error::ImportError;
use super::ingest::{SheetRow, cell_to_string};
use crate::catalog::{ChunkReceipt, QuantityUpdate, StockStore};

pub const PRODUCT_ID_COLUMN: &str = "product_id";
pub const STATUS_COLUMN: &str = "status";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockMovement {
    Sold,
    Buy,
}

impl StockMovement {
    /// Case- and whitespace-insensitive; `None` for any other status
    pub fn parse(status: &str) -> Option<Self> {
        match status.trim().to_lowercase().as_str() {
            "sold" => Some(StockMovement::Sold),
            "buy" => Some(StockMovement::Buy),
            _ => None,
        }
    }

    pub fn effect(&self) -> i64 {
        match self {
            StockMovement::Sold => -1,
            StockMovement::Buy => 1,
        }
    }
}

/// Integer value of a product id cell, `None` if missing, zero or not integral
pub fn coerce_product_id(cell: &Data) -> Option<i64> {
    let id = match cell {
        Data::Int(i) => Some(*i),
        Data::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
        Data::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.fract() == 0.0 && f.is_finite())
                    .map(|f| f as i64)
            })
        }
        _ => None,
    };

    id.filter(|id| *id != 0)
}

/// One usable sheet row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRow {
    pub product_id: i64,
    /// Trimmed and lowercased
    pub status: String,
}

impl ImportRow {
    /// `None` when the row has no usable product id or an empty status
    pub fn from_sheet_row(row: &SheetRow) -> Option<Self> {
        let product_id = row.get(PRODUCT_ID_COLUMN).and_then(coerce_product_id)?;
        let status = row
            .get(STATUS_COLUMN)
            .map(|cell| cell_to_string(cell).trim().to_lowercase())
            .filter(|status| !status.is_empty())?;

        Some(Self { product_id, status })
    }

    pub fn movement(&self) -> Option<StockMovement> {
        StockMovement::parse(&self.status)
    }
}

/// Net quantity change per product for one chunk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetChanges {
    deltas: BTreeMap<i64, i64>,
    /// Rows that produced a sold/buy movement
    pub rows_used: usize,
    /// Rows discarded: missing id, empty status or unrecognized status
    pub rows_skipped: usize,
}

impl NetChanges {
    pub fn from_rows(rows: &[SheetRow]) -> Self {
        let mut changes = Self::default();

        for row in rows {
            let Some((product_id, movement)) = ImportRow::from_sheet_row(row)
                .and_then(|row| row.movement().map(|m| (row.product_id, m)))
            else {
                changes.rows_skipped += 1;
                continue;
            };

            *changes.deltas.entry(product_id).or_insert(0) += movement.effect();
            changes.rows_used += 1;
        }

        changes
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    /// Ids in ascending order
    pub fn ids(&self) -> Vec<i64> {
        self.deltas.keys().copied().collect()
    }

    pub fn get(&self, product_id: i64) -> Option<i64> {
        self.deltas.get(&product_id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        self.deltas.iter().map(|(id, delta)| (*id, *delta))
    }
}

/// What to write for one chunk, and what was left out
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdatePlan {
    pub updates: Vec<QuantityUpdate>,
    pub unknown: Vec<i64>,
    pub unchanged: Vec<i64>,
    pub zeroed: Vec<i64>,
    pub negative: Vec<i64>,
}

/// Apply net changes to current quantities
pub fn plan_updates(changes: &NetChanges, current: &HashMap<i64, i64>) -> UpdatePlan {
    let mut plan = UpdatePlan::default();

    for (product_id, delta) in changes.iter() {
        let Some(quantity) = current.get(&product_id) else {
            plan.unknown.push(product_id);
            continue;
        };

        if delta == 0 {
            plan.unchanged.push(product_id);
            continue;
        }

        let quantity = quantity + delta;
        match quantity {
            0 => plan.zeroed.push(product_id),
            // Stored quantities are never negative, so an oversold product is
            // skipped too rather than written below zero
            q if q < 0 => plan.negative.push(product_id),
            _ => plan.updates.push(QuantityUpdate {
                product_id,
                quantity,
            }),
        }
    }

    plan
}

/// Result of reconciling one chunk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkOutcome {
    pub rows_seen: usize,
    /// Rows with a sold/buy movement
    pub rows_used: usize,
    pub rows_skipped: usize,
    /// Distinct products with a sold/buy movement
    pub products_changed: usize,
    pub unknown_ids: usize,
    /// Known products dropped as unchanged, zeroed or negative
    pub filtered_ids: usize,
    pub rows_written: usize,
    /// The chunk had been committed by an earlier delivery
    pub already_applied: bool,
}

/// Totals over every chunk of a job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub chunks: usize,
    pub chunks_skipped: usize,
    pub rows_seen: usize,
    pub rows_used: usize,
    pub rows_skipped: usize,
    pub unknown_ids: usize,
    pub filtered_ids: usize,
    pub rows_written: usize,
}

impl ImportSummary {
    pub fn record(&mut self, outcome: &ChunkOutcome) {
        self.chunks += 1;
        if outcome.already_applied {
            self.chunks_skipped += 1;
        }
        self.rows_seen += outcome.rows_seen;
        self.rows_used += outcome.rows_used;
        self.rows_skipped += outcome.rows_skipped;
        self.unknown_ids += outcome.unknown_ids;
        self.filtered_ids += outcome.filtered_ids;
        self.rows_written += outcome.rows_written;
    }
}

/// Applies chunks of sheet rows to a [`StockStore`]
#[derive(Clone)]
pub struct StockReconciler {
    store: Arc<dyn StockStore>,
}

impl StockReconciler {
    pub fn new(store: Arc<dyn StockStore>) -> Self {
        Self { store }
    }

    /// Reconcile one chunk. Either every surviving update is written or none.
    pub async fn apply_chunk(
        &self,
        receipt: &ChunkReceipt,
        rows: &[SheetRow],
    ) -> Result<ChunkOutcome, ImportError> {
        let changes = NetChanges::from_rows(rows);
        let mut outcome = ChunkOutcome {
            rows_seen: rows.len(),
            rows_used: changes.rows_used,
            rows_skipped: changes.rows_skipped,
            products_changed: changes.len(),
            ..Default::default()
        };

        if changes.is_empty() {
            return Ok(outcome);
        }

        if self
            .store
            .chunk_applied(receipt)
            .await
            .map_err(ImportError::Store)?
        {
            log::debug!(
                "Chunk {}/{} of job {} already applied, skipping",
                receipt.sheet_index,
                receipt.chunk_index,
                receipt.job_id
            );
            outcome.already_applied = true;
            return Ok(outcome);
        }

        let current = self
            .store
            .batch_get_quantities(&changes.ids())
            .await
            .map_err(ImportError::Store)?;

        let plan = plan_updates(&changes, &current);
        outcome.unknown_ids = plan.unknown.len();
        outcome.filtered_ids = plan.unchanged.len() + plan.zeroed.len() + plan.negative.len();

        if !plan.unknown.is_empty() {
            log::debug!("Ignoring unknown product ids: {:?}", plan.unknown);
        }
        if !plan.negative.is_empty() {
            log::warn!(
                "Skipping products whose stock would drop below zero: {:?}",
                plan.negative
            );
        }

        let written = self
            .store
            .batch_upsert_quantities(receipt, &plan.updates)
            .await
            .map_err(ImportError::Store)?;

        if written {
            outcome.rows_written = plan.updates.len();
        } else {
            outcome.already_applied = true;
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryStockStore;

    fn row(product_id: Data, status: &str) -> SheetRow {
        SheetRow::new(2)
            .with("Product ID", product_id)
            .with("Status", Data::String(status.to_string()))
    }

    fn rows(movements: &[(i64, &str)]) -> Vec<SheetRow> {
        movements
            .iter()
            .map(|(id, status)| row(Data::Float(*id as f64), status))
            .collect()
    }

    fn reconciler(products: &[(i64, i64)]) -> (Arc<MemoryStockStore>, StockReconciler) {
        let store = Arc::new(MemoryStockStore::with_products(products));
        (store.clone(), StockReconciler::new(store))
    }

    #[test]
    fn test_parse_movement() {
        assert_eq!(StockMovement::parse(" SOLD "), Some(StockMovement::Sold));
        assert_eq!(StockMovement::parse("Buy"), Some(StockMovement::Buy));
        assert_eq!(StockMovement::parse("returned"), None);
        assert_eq!(StockMovement::parse(""), None);
        assert_eq!(StockMovement::Sold.effect() + StockMovement::Buy.effect(), 0);
    }

    #[test]
    fn test_coerce_product_id() {
        assert_eq!(coerce_product_id(&Data::Float(4450.0)), Some(4450));
        assert_eq!(coerce_product_id(&Data::Int(4768)), Some(4768));
        assert_eq!(coerce_product_id(&Data::String(" 6039 ".into())), Some(6039));
        assert_eq!(coerce_product_id(&Data::String("4451.0".into())), Some(4451));
        assert_eq!(coerce_product_id(&Data::Float(0.0)), None);
        assert_eq!(coerce_product_id(&Data::Float(12.5)), None);
        assert_eq!(coerce_product_id(&Data::String("abc".into())), None);
        assert_eq!(coerce_product_id(&Data::Empty), None);
    }

    #[test]
    fn test_import_row_requires_id_and_status() {
        let valid = ImportRow::from_sheet_row(&row(Data::Int(4450), " Sold ")).unwrap();
        assert_eq!(valid.status, "sold");
        assert_eq!(valid.movement(), Some(StockMovement::Sold));

        assert!(ImportRow::from_sheet_row(&row(Data::Int(0), "sold")).is_none());
        assert!(ImportRow::from_sheet_row(&row(Data::Int(4450), "  ")).is_none());
        assert!(ImportRow::from_sheet_row(&SheetRow::new(2).with("status", Data::String("sold".into()))).is_none());
    }

    #[test]
    fn test_n_sold_rows_decrease_by_n() {
        let changes = NetChanges::from_rows(&rows(&[(4450, "sold"); 7]));
        assert_eq!(changes.get(4450), Some(-7));

        let changes = NetChanges::from_rows(&rows(&[(4450, "buy"); 4]));
        assert_eq!(changes.get(4450), Some(4));
    }

    #[test]
    fn test_net_change_is_order_independent() {
        let movements = [
            (4450, "sold"),
            (4768, "buy"),
            (4450, "buy"),
            (4450, "sold"),
            (4768, "buy"),
        ];
        let mut reversed = movements;
        reversed.reverse();

        assert_eq!(
            NetChanges::from_rows(&rows(&movements)),
            NetChanges::from_rows(&rows(&reversed))
        );
    }

    #[test]
    fn test_unrecognized_status_creates_no_entry() {
        let changes = NetChanges::from_rows(&rows(&[
            (4450, "returned"),
            (4450, "lost"),
            (4768, "sold"),
        ]));

        assert_eq!(changes.get(4450), None);
        assert_eq!(changes.ids(), vec![4768]);
        assert_eq!(changes.rows_used, 1);
        assert_eq!(changes.rows_skipped, 2);
    }

    #[test]
    fn test_plan_updates_filters() {
        let changes = NetChanges::from_rows(&rows(&[
            (4450, "sold"),
            (4451, "sold"),
            (4451, "buy"),
            (4574, "sold"),
            (4768, "sold"),
            (4768, "sold"),
            (9999, "buy"),
            (6039, "buy"),
        ]));
        let current = HashMap::from([(4450, 13), (4451, 20), (4574, 1), (4768, 1), (6039, 18)]);

        let plan = plan_updates(&changes, &current);
        assert_eq!(
            plan.updates,
            vec![
                QuantityUpdate {
                    product_id: 4450,
                    quantity: 12
                },
                QuantityUpdate {
                    product_id: 6039,
                    quantity: 19
                },
            ]
        );
        assert_eq!(plan.unchanged, vec![4451]);
        assert_eq!(plan.zeroed, vec![4574]);
        assert_eq!(plan.negative, vec![4768]);
        assert_eq!(plan.unknown, vec![9999]);
    }

    #[tokio::test]
    async fn test_apply_chunk_writes_net_quantities() {
        let (store, reconciler) = reconciler(&[(4450, 13), (6039, 18)]);
        let receipt = ChunkReceipt::new("job-1", 0, 0);

        let outcome = reconciler
            .apply_chunk(
                &receipt,
                &rows(&[(4450, "sold"), (6039, "buy"), (6039, "buy"), (6039, "returned")]),
            )
            .await
            .unwrap();

        assert_eq!(outcome.rows_seen, 4);
        assert_eq!(outcome.rows_used, 3);
        assert_eq!(outcome.rows_skipped, 1);
        assert_eq!(outcome.rows_written, 2);
        assert_eq!(store.quantity(4450).await, Some(12));
        assert_eq!(store.quantity(6039).await, Some(20));
    }

    #[tokio::test]
    async fn test_unknown_id_leaves_store_unchanged() {
        let (store, reconciler) = reconciler(&[(4450, 13)]);
        let before = store.snapshot().await;

        let outcome = reconciler
            .apply_chunk(&ChunkReceipt::new("job-1", 0, 0), &rows(&[(9999, "buy")]))
            .await
            .unwrap();

        assert_eq!(outcome.unknown_ids, 1);
        assert_eq!(outcome.rows_written, 0);
        assert_eq!(store.snapshot().await, before);
    }

    #[tokio::test]
    async fn test_resolved_zero_keeps_stored_quantity() {
        let (store, reconciler) = reconciler(&[(4574, 2)]);

        reconciler
            .apply_chunk(
                &ChunkReceipt::new("job-1", 0, 0),
                &rows(&[(4574, "sold"), (4574, "sold")]),
            )
            .await
            .unwrap();

        assert_eq!(store.quantity(4574).await, Some(2));
    }

    #[tokio::test]
    async fn test_chunk_without_movements_is_a_no_op() {
        let (store, reconciler) = reconciler(&[(4450, 13)]);

        let outcome = reconciler
            .apply_chunk(&ChunkReceipt::new("job-1", 0, 0), &rows(&[(4450, "returned")]))
            .await
            .unwrap();

        assert_eq!(outcome.products_changed, 0);
        assert_eq!(store.receipt_count().await, 0);
    }

    #[tokio::test]
    async fn test_redelivered_chunk_is_skipped() {
        let (store, reconciler) = reconciler(&[(4450, 13)]);
        let receipt = ChunkReceipt::new("job-1", 0, 0);
        let chunk = rows(&[(4450, "sold")]);

        reconciler.apply_chunk(&receipt, &chunk).await.unwrap();
        let second = reconciler.apply_chunk(&receipt, &chunk).await.unwrap();

        assert!(second.already_applied);
        assert_eq!(second.rows_written, 0);
        assert_eq!(store.quantity(4450).await, Some(12));
    }

    #[tokio::test]
    async fn test_store_failure_is_retriable() {
        let (store, reconciler) = reconciler(&[(4450, 13)]);
        store.set_fail_writes(true);

        let err = reconciler
            .apply_chunk(&ChunkReceipt::new("job-1", 0, 0), &rows(&[(4450, "sold")]))
            .await
            .unwrap_err();

        assert!(matches!(err, ImportError::Store(_)));
        assert!(err.is_retriable());
        assert_eq!(store.quantity(4450).await, Some(13));
    }

    #[test]
    fn test_summary_folds_outcomes() {
        let mut summary = ImportSummary::default();
        summary.record(&ChunkOutcome {
            rows_seen: 100,
            rows_used: 97,
            rows_skipped: 3,
            rows_written: 40,
            ..Default::default()
        });
        summary.record(&ChunkOutcome {
            rows_seen: 20,
            already_applied: true,
            ..Default::default()
        });

        assert_eq!(summary.chunks, 2);
        assert_eq!(summary.chunks_skipped, 1);
        assert_eq!(summary.rows_seen, 120);
        assert_eq!(summary.rows_used, 97);
        assert_eq!(summary.rows_written, 40);
    }
}
