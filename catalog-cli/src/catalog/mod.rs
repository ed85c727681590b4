//! Product catalog: entity, pagination, seeding and the stock store seam

pub mod page;
pub mod product;
pub mod seed;
pub mod store;

pub use page::{DEFAULT_PER_PAGE, Page};
pub use product::{Product, ProductData};
pub use store::{ChunkReceipt, MemoryStockStore, QuantityUpdate, SqliteStockStore, StockStore};
